//! Durable output of key generation

use std::collections::BTreeMap;
use std::fmt;

use k256::{ProjectivePoint, Scalar};
use ripemd::Ripemd160;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::primitives::polynomial::lagrange_coefficient;
use crate::types::{
    nonzero_point_from_bytes, point_from_bytes, point_to_bytes, Parameters,
    PartyIndex, SessionId,
};
use crate::{Error, Result};

/// Identifier of a group key: `blake3` of the compressed public key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyId(pub [u8; 32]);

impl KeyId {
    pub fn from_public_key(public_key: &[u8]) -> Self {
        Self(*blake3::hash(public_key).as_bytes())
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Key share held by a party after DKG
#[derive(Clone, Serialize, Deserialize)]
pub struct KeyShare {
    /// This party's index
    pub party_index: PartyIndex,

    /// Threshold parameters of the group
    pub parameters: Parameters,

    /// Shamir share `p(i)` of the group secret
    #[serde(with = "scalar_serde")]
    pub(crate) secret_share: Scalar,

    /// Group public key (compressed)
    pub public_key: Vec<u8>,

    /// `p(j)·G` for every party `j`
    pub public_shares: BTreeMap<PartyIndex, Vec<u8>>,

    /// Chain code for BIP32 derivation
    pub chain_code: [u8; 32],

    /// Depth in the derivation tree, 0 for the DKG output
    pub depth: u8,

    /// Child number this share was derived with
    pub child_number: u32,

    /// First four bytes of the parent key identifier
    pub parent_fingerprint: [u8; 4],

    /// Session id of the key generation that produced the root key
    pub dkg_session_id: SessionId,

    /// Pairwise seeds for zero sharing, keyed by counterparty
    pub(crate) zero_seeds: BTreeMap<PartyIndex, [u8; 32]>,

    /// Secret of this party's OT sender key
    #[serde(with = "scalar_serde")]
    pub(crate) ot_secret: Scalar,

    /// OT sender public keys of every party
    pub ot_public_keys: BTreeMap<PartyIndex, Vec<u8>>,
}

mod scalar_serde {
    use k256::Scalar;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::types::{scalar_from_bytes, scalar_to_bytes};

    pub fn serialize<S>(scalar: &Scalar, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(&scalar_to_bytes(scalar))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Scalar, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes: Vec<u8> = Vec::deserialize(deserializer)?;
        scalar_from_bytes(&bytes).ok_or_else(|| serde::de::Error::custom("Invalid scalar"))
    }
}

impl KeyShare {
    /// Identifier of the group key
    pub fn key_id(&self) -> KeyId {
        KeyId::from_public_key(&self.public_key)
    }

    /// Get the group public key as a point
    pub fn public_key_point(&self) -> Result<ProjectivePoint> {
        nonzero_point_from_bytes(&self.public_key)
            .ok_or_else(|| Error::Serialization("invalid group public key".into()))
    }

    /// Public share `p(j)·G` of party `j`
    pub fn public_share_point(&self, party: PartyIndex) -> Result<ProjectivePoint> {
        self.public_shares
            .get(&party)
            .and_then(|bytes| point_from_bytes(bytes))
            .ok_or_else(|| Error::Serialization(format!("invalid public share of party {party}")))
    }

    pub(crate) fn ot_public_key(&self, party: PartyIndex) -> Result<ProjectivePoint> {
        self.ot_public_keys
            .get(&party)
            .and_then(|bytes| nonzero_point_from_bytes(bytes))
            .ok_or_else(|| Error::Serialization(format!("invalid OT key of party {party}")))
    }

    /// BIP32 identifier prefix of the group key
    pub fn fingerprint(&self) -> [u8; 4] {
        fingerprint(&self.public_key)
    }

    /// Check the share against the public data it carries.
    ///
    /// Verifies that `p(i)·G` matches this party's public share and that
    /// any `T` public shares interpolate to the group key.
    pub fn validate(&self) -> Result<()> {
        self.parameters.validate()?;
        if !self.parameters.contains(self.party_index) {
            return Err(Error::InvalidParameters(format!(
                "party index {} out of range",
                self.party_index
            )));
        }
        if self.public_shares.len() != usize::from(self.parameters.share_count) {
            return Err(Error::consistency(None, "public share count mismatch"));
        }
        let own = self.public_share_point(self.party_index)?;
        if ProjectivePoint::GENERATOR * self.secret_share != own {
            return Err(Error::consistency(
                Some(self.party_index),
                "secret share does not match public share",
            ));
        }
        let set: Vec<PartyIndex> = self
            .parameters
            .parties()
            .take(usize::from(self.parameters.threshold))
            .collect();
        let mut interpolated = ProjectivePoint::IDENTITY;
        for &j in &set {
            let lambda = lagrange_coefficient(j, &set)
                .ok_or_else(|| Error::primitive("lagrange coefficient"))?;
            interpolated += self.public_share_point(j)? * lambda;
        }
        if interpolated != self.public_key_point()? {
            return Err(Error::consistency(
                None,
                "public shares do not interpolate to the group key",
            ));
        }
        Ok(())
    }

    /// Additive share `λ_i·p(i)` of the group secret for a signing set
    pub(crate) fn additive_share(&self, signers: &[PartyIndex]) -> Result<Scalar> {
        let lambda = lagrange_coefficient(self.party_index, signers).ok_or_else(|| {
            Error::InvalidParameters("signing set does not contain this party".into())
        })?;
        Ok(lambda * self.secret_share)
    }

    /// Shift the shared secret by `tweak`: every Shamir share and every
    /// public share moves by the same constant
    pub(crate) fn shift(&mut self, tweak: &Scalar) -> Result<()> {
        let delta = ProjectivePoint::GENERATOR * tweak;
        let public_key = self.public_key_point()? + delta;
        let mut public_shares = BTreeMap::new();
        for &j in self.public_shares.keys() {
            public_shares.insert(j, point_to_bytes(&(self.public_share_point(j)? + delta)));
        }
        self.secret_share += tweak;
        self.public_key = point_to_bytes(&public_key);
        self.public_shares = public_shares;
        Ok(())
    }
}

/// `RIPEMD160(SHA256(pk))[0..4]`
pub(crate) fn fingerprint(public_key: &[u8]) -> [u8; 4] {
    let digest = Ripemd160::digest(Sha256::digest(public_key));
    let mut out = [0u8; 4];
    out.copy_from_slice(&digest[..4]);
    out
}

impl Drop for KeyShare {
    fn drop(&mut self) {
        self.secret_share.zeroize();
        self.ot_secret.zeroize();
        for seed in self.zero_seeds.values_mut() {
            seed.zeroize();
        }
    }
}

impl fmt::Debug for KeyShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyShare")
            .field("party_index", &self.party_index)
            .field("parameters", &self.parameters)
            .field("public_key", &hex::encode(&self.public_key))
            .field("depth", &self.depth)
            .field("child_number", &self.child_number)
            .field("secret_share", &"<redacted>")
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keygen::mock_keygen;
    use rand::rngs::OsRng;

    fn shares() -> Vec<KeyShare> {
        mock_keygen(&mut OsRng, Parameters::new(2, 3).unwrap()).unwrap()
    }

    #[test]
    fn json_keeps_secret_material() {
        let share = shares().remove(1);
        let json = serde_json::to_string(&share).unwrap();
        let restored: KeyShare = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.secret_share, share.secret_share);
        assert_eq!(restored.ot_secret, share.ot_secret);
        assert_eq!(restored.zero_seeds, share.zero_seeds);
        assert_eq!(restored.key_id(), share.key_id());
        restored.validate().unwrap();
    }

    #[test]
    fn debug_redacts_secrets() {
        let share = shares().remove(0);
        let debug = format!("{share:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains(&hex::encode(share.secret_share.to_bytes())));
    }

    #[test]
    fn validate_catches_wrong_secret() {
        let mut share = shares().remove(0);
        share.secret_share += Scalar::ONE;
        assert!(matches!(
            share.validate(),
            Err(Error::ConsistencyCheckFailed { party: Some(1), .. })
        ));
    }

    #[test]
    fn shift_moves_key_and_shares_together() {
        let mut share = shares().remove(2);
        let before = share.public_key_point().unwrap();
        let tweak = Scalar::from(5u64);
        share.shift(&tweak).unwrap();
        assert_eq!(
            share.public_key_point().unwrap(),
            before + ProjectivePoint::GENERATOR * tweak
        );
        share.validate().unwrap();
    }

    #[test]
    fn additive_shares_sum_to_secret() {
        let shares = shares();
        let signers = [1u16, 3];
        let sum = shares[0].additive_share(&signers).unwrap() + shares[2].additive_share(&signers).unwrap();
        assert_eq!(ProjectivePoint::GENERATOR * sum, shares[0].public_key_point().unwrap());
        assert!(shares[1].additive_share(&signers).is_err());
    }
}
