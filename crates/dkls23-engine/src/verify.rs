//! ECDSA verification and public-key recovery

use k256::{
    ecdsa::{self, signature::hazmat::PrehashVerifier, RecoveryId, VerifyingKey},
    elliptic_curve::point::AffineCoordinates,
    ProjectivePoint, Scalar,
};

use crate::types::{reduce_bytes, scalar_from_bytes, Signature};
use crate::{Error, Result};

/// `(r, s)` as a k256 signature with low `s`, and whether `s` was flipped
fn normalized(signature: &Signature) -> Option<(ecdsa::Signature, bool)> {
    let sig = ecdsa::Signature::from_scalars(signature.r, signature.s).ok()?;
    Some(match sig.normalize_s() {
        Some(low) => (low, true),
        None => (sig, false),
    })
}

/// Verify an ECDSA signature over a 32-byte digest.
///
/// Both low and high `s` are accepted; malformed input is simply invalid.
pub fn verify(public_key: &[u8], digest: &[u8; 32], signature: &Signature) -> bool {
    let Ok(key) = VerifyingKey::from_sec1_bytes(public_key) else {
        return false;
    };
    let Some((sig, _)) = normalized(signature) else {
        return false;
    };
    key.verify_prehash(digest, &sig).is_ok()
}

/// Recover the compressed public key from a signature and its recovery id
pub fn recover_public_key(digest: &[u8; 32], signature: &Signature) -> Result<Vec<u8>> {
    if signature.recovery_id > 3 {
        return Err(Error::InvalidParameters(format!(
            "recovery id {} out of range",
            signature.recovery_id
        )));
    }
    let (sig, flipped) = normalized(signature).ok_or_else(|| Error::primitive("signature encoding"))?;
    let recovery_id = RecoveryId::from_byte(signature.recovery_id ^ u8::from(flipped))
        .ok_or_else(|| Error::primitive("recovery id"))?;
    let key = VerifyingKey::recover_from_prehash(digest, &sig, recovery_id)
        .map_err(|_| Error::primitive("public key recovery"))?;
    Ok(key.to_encoded_point(true).as_bytes().to_vec())
}

/// x-coordinate of a point reduced mod n
pub(crate) fn x_scalar(point: &ProjectivePoint) -> Scalar {
    let x: [u8; 32] = point.to_affine().x().into();
    reduce_bytes(&x)
}

/// Recovery id of a nonce point: bit 0 is the parity of y, bit 1 is set
/// when the x-coordinate is not below the group order
pub(crate) fn recovery_id(point: &ProjectivePoint) -> u8 {
    let affine = point.to_affine();
    let x: [u8; 32] = affine.x().into();
    let overflow = scalar_from_bytes(&x).is_none();
    u8::from(bool::from(affine.y_is_odd())) | (u8::from(overflow) << 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{point_to_bytes, scalar_to_bytes};
    use k256::ecdsa::{signature::hazmat::PrehashSigner, RecoveryId, SigningKey};
    use rand::rngs::OsRng;
    use sha2::{Digest, Sha256};

    fn sign(key: &SigningKey, digest: &[u8; 32]) -> Signature {
        let (sig, recid): (k256::ecdsa::Signature, RecoveryId) = key.sign_prehash(digest).unwrap();
        let (r, s) = sig.split_bytes();
        Signature::new(r.into(), s.into(), recid.to_byte())
    }

    #[test]
    fn verifies_k256_signature() {
        let key = SigningKey::random(&mut OsRng);
        let public_key = key.verifying_key().to_encoded_point(true).as_bytes().to_vec();
        let digest: [u8; 32] = Sha256::digest(b"hello").into();
        let sig = sign(&key, &digest);

        assert!(verify(&public_key, &digest, &sig));
        assert_eq!(recover_public_key(&digest, &sig).unwrap(), public_key);

        let mut other = digest;
        other[0] ^= 1;
        assert!(!verify(&public_key, &other, &sig));
    }

    #[test]
    fn accepts_high_s() {
        let key = SigningKey::random(&mut OsRng);
        let public_key = key.verifying_key().to_encoded_point(true).as_bytes().to_vec();
        let digest = [9u8; 32];
        let mut sig = sign(&key, &digest);
        let s = scalar_from_bytes(&sig.s).unwrap();
        sig.s = scalar_to_bytes(&(-s));
        sig.recovery_id ^= 1;
        assert!(verify(&public_key, &digest, &sig));
        assert_eq!(recover_public_key(&digest, &sig).unwrap(), public_key);
    }

    #[test]
    fn recovery_id_is_checked() {
        let key = SigningKey::random(&mut OsRng);
        let public_key = key.verifying_key().to_encoded_point(true).as_bytes().to_vec();
        let digest = [3u8; 32];
        let mut sig = sign(&key, &digest);

        sig.recovery_id ^= 1;
        assert_ne!(recover_public_key(&digest, &sig).unwrap(), public_key);
        sig.recovery_id = 4;
        assert!(matches!(
            recover_public_key(&digest, &sig),
            Err(Error::InvalidParameters(_))
        ));
        // R.x + n is not on the curve for an ordinary r
        sig.recovery_id = 2;
        assert!(matches!(
            recover_public_key(&digest, &sig),
            Err(Error::PrimitiveFailure { .. })
        ));
    }

    #[test]
    fn malformed_input_is_invalid() {
        let digest = [1u8; 32];
        let sig = Signature::new([0u8; 32], [1u8; 32], 0);
        let pk = point_to_bytes(&ProjectivePoint::GENERATOR);
        assert!(!verify(&pk, &digest, &sig));
        assert!(!verify(&[1, 2, 3], &digest, &Signature::new([1u8; 32], [1u8; 32], 0)));
        assert!(!verify(&pk, &digest, &Signature::new([0xff; 32], [1u8; 32], 0)));
    }
}
