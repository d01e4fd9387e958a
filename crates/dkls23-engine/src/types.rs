//! Core types for the DKLs23 engine

use k256::{
    ecdsa,
    elliptic_curve::{
        group::Group,
        ops::Reduce,
        bigint::U256,
        sec1::{FromEncodedPoint, ToEncodedPoint},
        PrimeField,
    },
    AffinePoint, EncodedPoint, FieldBytes, ProjectivePoint, Scalar,
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Index of a party in the MPC group, `1..=share_count`
pub type PartyIndex = u16;

/// Unique identifier for a session
pub type SessionId = [u8; 32];

/// Largest number of parties a group may have
pub const MAX_PARTIES: u16 = 255;

/// Supported curves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Curve {
    Secp256k1,
}

/// Threshold parameters of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Parameters {
    /// Number of parties needed to sign
    pub threshold: u16,
    /// Number of key share holders
    pub share_count: u16,
}

impl Parameters {
    /// Create validated parameters, `1 <= threshold <= share_count <= 255`
    pub fn new(threshold: u16, share_count: u16) -> Result<Self> {
        let params = Self {
            threshold,
            share_count,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if self.share_count == 0 || self.share_count > MAX_PARTIES {
            return Err(Error::InvalidParameters(format!(
                "share count must be in 1..={MAX_PARTIES}, got {}",
                self.share_count
            )));
        }
        if self.threshold == 0 {
            return Err(Error::InvalidParameters("threshold must be at least 1".into()));
        }
        if self.threshold > self.share_count {
            return Err(Error::InvalidParameters(
                "Threshold cannot exceed number of parties".into(),
            ));
        }
        Ok(())
    }

    /// All party indices of the group
    pub fn parties(&self) -> impl Iterator<Item = PartyIndex> {
        1..=self.share_count
    }

    pub fn contains(&self, party: PartyIndex) -> bool {
        (1..=self.share_count).contains(&party)
    }
}

/// ECDSA signature (r, s)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// R component
    pub r: [u8; 32],
    /// S component
    pub s: [u8; 32],
    /// Recovery ID: bit 0 is the parity of R.y, bit 1 is set when R.x >= n
    pub recovery_id: u8,
}

impl Signature {
    /// Create a new signature
    pub fn new(r: [u8; 32], s: [u8; 32], recovery_id: u8) -> Self {
        Self { r, s, recovery_id }
    }

    /// Convert to DER format
    pub fn to_der(&self) -> Result<Vec<u8>> {
        let sig = ecdsa::Signature::from_scalars(
            *FieldBytes::from_slice(&self.r),
            *FieldBytes::from_slice(&self.s),
        )
        .map_err(|_| Error::primitive("signature encoding"))?;
        Ok(sig.to_der().as_bytes().to_vec())
    }

    /// Convert to bytes (r || s)
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&self.r);
        bytes[32..].copy_from_slice(&self.s);
        bytes
    }
}

/// Compressed SEC1 encoding, a single `0x00` byte for the identity
pub(crate) fn point_to_bytes(point: &ProjectivePoint) -> Vec<u8> {
    point.to_affine().to_encoded_point(true).as_bytes().to_vec()
}

/// Decode a SEC1 point, `None` when the bytes are not on the curve
pub(crate) fn point_from_bytes(bytes: &[u8]) -> Option<ProjectivePoint> {
    let encoded = EncodedPoint::from_bytes(bytes).ok()?;
    Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&encoded)).map(ProjectivePoint::from)
}

/// Decode a point that must not be the identity
pub(crate) fn nonzero_point_from_bytes(bytes: &[u8]) -> Option<ProjectivePoint> {
    point_from_bytes(bytes).filter(|p| !bool::from(p.is_identity()))
}

/// Canonical 32-byte big-endian scalar, `None` when `>= n`
pub(crate) fn scalar_from_bytes(bytes: &[u8]) -> Option<Scalar> {
    if bytes.len() != 32 {
        return None;
    }
    Option::from(Scalar::from_repr(FieldBytes::clone_from_slice(bytes)))
}

pub(crate) fn scalar_to_bytes(scalar: &Scalar) -> [u8; 32] {
    scalar.to_bytes().into()
}

/// Interpret 32 bytes as an integer and reduce it mod n
pub(crate) fn reduce_bytes(bytes: &[u8; 32]) -> Scalar {
    <Scalar as Reduce<U256>>::reduce_bytes(&(*bytes).into())
}

/// Party index as a field element
pub(crate) fn index_scalar(index: PartyIndex) -> Scalar {
    Scalar::from(u64::from(index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::elliptic_curve::Field;
    use rand::rngs::OsRng;

    #[test]
    fn parameters_are_validated() {
        assert!(Parameters::new(2, 3).is_ok());
        assert!(Parameters::new(1, 1).is_ok());
        assert!(matches!(
            Parameters::new(3, 2),
            Err(Error::InvalidParameters(_))
        ));
        assert!(Parameters::new(0, 2).is_err());
        assert!(Parameters::new(1, 0).is_err());
        assert!(Parameters::new(2, 256).is_err());
    }

    #[test]
    fn parameters_serde_shape() {
        let params: Parameters =
            serde_json::from_str(r#"{"threshold":2,"share_count":3}"#).unwrap();
        assert_eq!(params, Parameters::new(2, 3).unwrap());
    }

    #[test]
    fn point_encoding_handles_identity() {
        let identity = ProjectivePoint::IDENTITY;
        let bytes = point_to_bytes(&identity);
        assert_eq!(bytes, vec![0u8]);
        assert_eq!(point_from_bytes(&bytes), Some(identity));
        assert_eq!(nonzero_point_from_bytes(&bytes), None);

        let point = ProjectivePoint::GENERATOR * Scalar::random(&mut OsRng);
        assert_eq!(point_from_bytes(&point_to_bytes(&point)), Some(point));
        assert_eq!(point_from_bytes(&[2u8; 33]), None);
    }

    #[test]
    fn non_canonical_scalar_is_rejected() {
        assert!(scalar_from_bytes(&[0xff; 32]).is_none());
        assert!(scalar_from_bytes(&[1u8; 31]).is_none());
        let s = Scalar::random(&mut OsRng);
        assert_eq!(scalar_from_bytes(&scalar_to_bytes(&s)), Some(s));
    }
}
