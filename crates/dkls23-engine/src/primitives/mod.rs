//! Cryptographic building blocks used by the phase engines
//!
//! Every function here is pure and fallible: callers turn failures into
//! [`Error::PrimitiveFailure`](crate::Error::PrimitiveFailure) or attribute
//! them to the sending party.

pub mod channel;
pub mod commitment;
pub mod dlog;
pub mod hash;
pub mod polynomial;
pub mod zero_share;

pub use channel::{ChannelKey, SealedBox};
pub use commitment::{commit, verify_commitment, Commitment, Salt};
pub use dlog::DLogProof;
pub use polynomial::{lagrange_coefficient, FeldmanCommitment, Polynomial};
pub use zero_share::ZeroShare;
