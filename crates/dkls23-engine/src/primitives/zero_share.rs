//! Pairwise zero sharing
//!
//! During key generation every pair of parties agrees on a secret seed.
//! For a signing session each party derives `ζ_i = Σ_j ±PRF(seed_ij, sid)`
//! over its counterparties, with `+` towards higher indices and `-`
//! towards lower ones, so the shares of any signing set sum to zero.

use std::collections::BTreeMap;

use k256::Scalar;
use zeroize::Zeroize;

use super::hash::{hash_parts, hash_to_scalar};
use crate::types::PartyIndex;

/// Combine both parties' seed contributions into the pair seed.
///
/// Ordered by party index so both ends compute the same value.
pub fn pair_seed(
    me: PartyIndex,
    my_contribution: &[u8; 32],
    peer: PartyIndex,
    peer_contribution: &[u8; 32],
) -> [u8; 32] {
    let (low, high) = if me < peer {
        (my_contribution, peer_contribution)
    } else {
        (peer_contribution, my_contribution)
    };
    hash_parts(b"dkls23-engine/zero-seed", &[low, high])
}

/// Zero-share state of one party
pub struct ZeroShare<'a> {
    party: PartyIndex,
    seeds: &'a BTreeMap<PartyIndex, [u8; 32]>,
}

impl<'a> ZeroShare<'a> {
    pub fn new(party: PartyIndex, seeds: &'a BTreeMap<PartyIndex, [u8; 32]>) -> Self {
        Self { party, seeds }
    }

    /// This party's share of zero for `session`, or `None` if a seed for
    /// one of the counterparties is missing
    pub fn compute(&self, counterparties: &[PartyIndex], session: &[u8]) -> Option<Scalar> {
        let mut total = Scalar::ZERO;
        for &peer in counterparties {
            let seed = self.seeds.get(&peer)?;
            let mut value = hash_to_scalar(b"dkls23-engine/zero-share", &[seed, session]);
            if self.party < peer {
                total += value;
            } else {
                total -= value;
            }
            value.zeroize();
        }
        Some(total)
    }
}
