//! Oblivious Transfer (OT) primitives
//!
//! This module provides the OT-based pieces of the DKLs23 signing protocol:
//! - base OT ("simplest OT" of Chou and Orlandi over secp256k1)
//! - two-party multiplication turning a product of secrets held by two
//!   parties into additive shares (Gilboa's construction over base OT,
//!   with a randomized encoding of the receiver input)

pub mod base_ot;
pub mod multiplication;

pub use base_ot::{OtSenderKey, OT_BATCH};
pub use multiplication::{respond, MulError, MulReceiverKeep, MulReceiverMessage, MulSenderMessage};
