//! Domain-separated hashing

use digest::Digest;
use k256::Scalar;
use sha2::Sha256;

use crate::types::reduce_bytes;

/// Hash length-prefixed parts under a domain tag.
///
/// Length prefixes keep `("ab", "c")` and `("a", "bc")` apart.
pub fn hash_parts(domain: &[u8], parts: &[&[u8]]) -> [u8; 32] {
    hash_parts_with::<Sha256>(domain, parts).into()
}

pub(crate) fn hash_parts_with<D: Digest>(domain: &[u8], parts: &[&[u8]]) -> digest::Output<D> {
    let mut hasher = D::new();
    hasher.update((domain.len() as u64).to_be_bytes());
    hasher.update(domain);
    for part in parts {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part);
    }
    hasher.finalize()
}

/// Hash to a scalar by reducing the digest mod n
pub fn hash_to_scalar(domain: &[u8], parts: &[&[u8]]) -> Scalar {
    reduce_bytes(&hash_parts(domain, parts))
}
