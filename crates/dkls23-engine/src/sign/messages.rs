//! DSG message types

use serde::{Deserialize, Serialize};

use crate::oblivious::{MulReceiverMessage, MulSenderMessage};
use crate::primitives::{Commitment, Salt};

/// Phase 1 (point-to-point): nonce commitment and OT receiver choices
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignRound1 {
    /// Commitment to the instance point `R_i`
    pub commitment: Commitment,
    pub mul: MulReceiverMessage,
}

/// Phase 2 (point-to-point): multiplication output and check values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignRound2 {
    /// `c_u·G`
    pub gamma_u: Vec<u8>,
    /// `c_v·G`
    pub gamma_v: Vec<u8>,
    /// `φ_i - χ_ij`
    pub psi: [u8; 32],
    /// `sk_i·G`
    pub public_share: Vec<u8>,
    /// Opening of the phase 1 commitment
    pub instance_point: Vec<u8>,
    pub salt: Salt,
    pub mul: MulSenderMessage,
}

/// Phase 3 (broadcast): additive shares of the signature fraction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignRound3 {
    pub u: [u8; 32],
    pub w: [u8; 32],
}
