//! Round payloads of key generation and resharing

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::primitives::{Commitment, DLogProof, Salt, SealedBox};
use crate::types::PartyIndex;

/// DKG round 1 (broadcast): commitments and channel key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DkgRound1 {
    /// Commitment to the Feldman commitments and the chain-code contribution
    pub commitment: Commitment,
    /// Commitment to the zero-share seed contribution for each counterparty
    pub seed_commitments: BTreeMap<PartyIndex, Commitment>,
    /// X25519 public key for the encrypted round
    pub channel_key: [u8; 32],
}

/// DKG round 2 (broadcast): opening and proofs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DkgRound2 {
    /// Feldman commitments `a_k·G`
    pub feldman: Vec<Vec<u8>>,
    pub chain_code_contribution: [u8; 32],
    pub salt: Salt,
    /// Proof of knowledge for every coefficient
    pub proofs: Vec<DLogProof>,
    /// OT sender public key and its proof
    pub ot_public_key: Vec<u8>,
    pub ot_proof: DLogProof,
}

/// DKG round 3 (point-to-point): sealed [`DkgFragment`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DkgRound3 {
    pub sealed: SealedBox,
}

/// Plaintext of [`DkgRound3`]
#[derive(Serialize, Deserialize)]
pub(crate) struct DkgFragment {
    /// `p_i(j)`
    pub fragment: [u8; 32],
    pub zero_seed: [u8; 32],
    pub seed_salt: Salt,
}

/// Round 4 (broadcast) of DKG and resharing: values every party must agree on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyRound {
    pub public_key: Vec<u8>,
    pub public_share: Vec<u8>,
    pub chain_code: [u8; 32],
}

/// Resharing round 1 (broadcast from every holder)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReshareRound1 {
    pub channel_key: [u8; 32],
    /// Commitment to the Feldman commitments, dealers only
    pub commitment: Option<Commitment>,
    /// Commitment to the fresh zero-share seed contribution for each counterparty
    pub seed_commitments: BTreeMap<PartyIndex, Commitment>,
    /// Fresh OT sender public key and its proof
    pub ot_public_key: Vec<u8>,
    pub ot_proof: DLogProof,
}

/// Resharing round 2 (broadcast from dealers)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReshareRound2 {
    pub feldman: Vec<Vec<u8>>,
    pub salt: Salt,
    /// Proofs for the committed coefficients; the constant term is
    /// skipped when it is fixed to zero
    pub proofs: Vec<DLogProof>,
}

/// Resharing round 3 (point-to-point from every holder): sealed [`ReshareFragment`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReshareRound3 {
    pub sealed: SealedBox,
}

/// Plaintext of [`ReshareRound3`]
#[derive(Serialize, Deserialize)]
pub(crate) struct ReshareFragment {
    /// `δ_i(j)`, dealers only
    pub fragment: Option<[u8; 32]>,
    pub zero_seed: [u8; 32],
    pub seed_salt: Salt,
}

impl Drop for DkgFragment {
    fn drop(&mut self) {
        self.fragment.zeroize();
        self.zero_seed.zeroize();
    }
}

impl Drop for ReshareFragment {
    fn drop(&mut self) {
        self.fragment.zeroize();
        self.zero_seed.zeroize();
    }
}
