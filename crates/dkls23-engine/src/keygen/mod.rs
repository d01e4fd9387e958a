//! Distributed Key Generation (DKG) module
//!
//! Implements the DKG of DKLs23 as a phase engine, proactive refresh of
//! the resulting shares, and a trusted dealer for importing keys.

pub(crate) mod dealing;
mod dkg;
mod key_refresh;
mod messages;
pub(crate) mod resharing;
pub mod trusted_dealer;

pub use dkg::DkgEngine;
pub use key_refresh::ReKeyEngine;
pub use messages::*;
pub use trusted_dealer::{mock_keygen, split_secret};
