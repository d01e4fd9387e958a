//! Distributed Signature Generation (DSG) module
//!
//! Implements the signing protocol of DKLs23: three message rounds among
//! exactly `threshold` signers and a local combination step.

mod dsg;
mod messages;

pub use dsg::{SignEngine, SignOptions};
pub use messages::*;
