//! Hash commitments
//!
//! `commit(v) = SHA-256(domain || v || salt)` with a fresh 32-byte salt.
//! The value is bound to the session and sender by the caller through
//! the parts it passes in.

use rand::{rngs::OsRng, RngCore};
use subtle::ConstantTimeEq;

use super::hash::hash_parts;

pub type Commitment = [u8; 32];
pub type Salt = [u8; 32];

const COMMIT_DOMAIN: &[u8] = b"dkls23-engine/commitment";

/// Commit to `parts` under a freshly sampled salt
pub fn commit(parts: &[&[u8]]) -> (Commitment, Salt) {
    let mut salt = [0u8; 32];
    OsRng.fill_bytes(&mut salt);
    (commit_with_salt(parts, &salt), salt)
}

pub fn commit_with_salt(parts: &[&[u8]], salt: &Salt) -> Commitment {
    let mut all: Vec<&[u8]> = parts.to_vec();
    all.push(salt);
    hash_parts(COMMIT_DOMAIN, &all)
}

/// Check an opening in constant time
pub fn verify_commitment(commitment: &Commitment, parts: &[&[u8]], salt: &Salt) -> bool {
    commit_with_salt(parts, salt).ct_eq(commitment).into()
}
