//! BIP32 key derivation for threshold key shares
//!
//! Non-hardened children are derived locally: every party adds the same
//! tweak to its Shamir share, so the shared secret moves by the tweak and
//! public data moves by `tweak·G`. Hardened children need the secret key
//! and are derived interactively by [`HardenedDerivationEngine`].

mod hardened;

use std::fmt;
use std::str::FromStr;

use hmac::{Hmac, Mac};
use k256::{elliptic_curve::group::Group, ProjectivePoint, Scalar};
use serde::{Deserialize, Serialize};
use sha2::Sha512;

pub use hardened::HardenedDerivationEngine;

use crate::key_share::{fingerprint, KeyShare};
use crate::types::{nonzero_point_from_bytes, point_to_bytes, scalar_from_bytes};
use crate::{Error, Result};

/// BIP32 version bytes of a mainnet extended public key
const XPUB_VERSION: [u8; 4] = [0x04, 0x88, 0xB2, 0x1E];

/// A step of a derivation path, in the BIP32 encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChildNumber(u32);

impl ChildNumber {
    pub const HARDENED_BIT: u32 = 1 << 31;

    pub fn normal(index: u32) -> Result<Self> {
        if index & Self::HARDENED_BIT != 0 {
            return Err(Error::Derivation(format!("index {index} out of range")));
        }
        Ok(Self(index))
    }

    pub fn hardened(index: u32) -> Result<Self> {
        if index & Self::HARDENED_BIT != 0 {
            return Err(Error::Derivation(format!("index {index} out of range")));
        }
        Ok(Self(index | Self::HARDENED_BIT))
    }

    /// From the raw 32-bit encoding, hardened bit included
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }

    /// Index without the hardened bit
    pub fn index(&self) -> u32 {
        self.0 & !Self::HARDENED_BIT
    }

    pub fn is_hardened(&self) -> bool {
        self.0 & Self::HARDENED_BIT != 0
    }
}

impl fmt::Display for ChildNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_hardened() {
            write!(f, "{}'", self.index())
        } else {
            write!(f, "{}", self.index())
        }
    }
}

/// Ordered list of child numbers, written `m/0/1'/2`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DerivationPath(Vec<ChildNumber>);

impl DerivationPath {
    pub fn new(children: Vec<ChildNumber>) -> Self {
        Self(children)
    }

    pub fn children(&self) -> &[ChildNumber] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has_hardened(&self) -> bool {
        self.0.iter().any(ChildNumber::is_hardened)
    }
}

impl FromStr for DerivationPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s == "m" {
            return Ok(Self::default());
        }
        let parsed: derivation_path::DerivationPath = s
            .parse()
            .map_err(|e| Error::Derivation(format!("Invalid path {s:?}: {e:?}")))?;
        parsed
            .path()
            .iter()
            .map(|child| match child {
                derivation_path::ChildIndex::Normal(i) => ChildNumber::normal(*i),
                derivation_path::ChildIndex::Hardened(i) => ChildNumber::hardened(*i),
            })
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("m")?;
        for child in &self.0 {
            write!(f, "/{child}")?;
        }
        Ok(())
    }
}

/// Public-only view of a key for BIP32 public derivation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedPublicKey {
    /// Compressed public key
    pub public_key: Vec<u8>,
    pub chain_code: [u8; 32],
    pub depth: u8,
    pub child_number: u32,
    pub parent_fingerprint: [u8; 4],
}

impl ExtendedPublicKey {
    pub fn public_key_point(&self) -> Result<ProjectivePoint> {
        nonzero_point_from_bytes(&self.public_key)
            .ok_or_else(|| Error::Derivation("invalid public key".into()))
    }

    pub fn fingerprint(&self) -> [u8; 4] {
        fingerprint(&self.public_key)
    }

    /// One non-hardened step; also returns the tweak added to the key
    pub fn derive_child(&self, child: ChildNumber) -> Result<(Self, Scalar)> {
        if child.is_hardened() {
            return Err(Error::Derivation(
                "hardened child cannot be derived from public data".into(),
            ));
        }
        let mut data = self.public_key.clone();
        data.extend_from_slice(&child.raw().to_be_bytes());
        let output = hmac_sha512(&self.chain_code, &data)?;

        let tweak = scalar_from_bytes(&output[..32])
            .ok_or_else(|| Error::Derivation(format!("tweak for child {child} is out of range")))?;
        let public_key = self.public_key_point()? + ProjectivePoint::GENERATOR * tweak;
        if bool::from(public_key.is_identity()) {
            return Err(Error::Derivation(format!("child {child} is the point at infinity")));
        }
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&output[32..]);

        let derived = Self {
            public_key: point_to_bytes(&public_key),
            chain_code,
            depth: self
                .depth
                .checked_add(1)
                .ok_or_else(|| Error::Derivation("maximum depth reached".into()))?,
            child_number: child.raw(),
            parent_fingerprint: self.fingerprint(),
        };
        Ok((derived, tweak))
    }

    /// Follow a non-hardened path
    pub fn derive(&self, path: &DerivationPath) -> Result<Self> {
        let mut current = self.clone();
        for child in path.children() {
            current = current.derive_child(*child)?.0;
        }
        Ok(current)
    }

    /// Base58Check `xpub` serialization
    pub fn to_xpub(&self) -> String {
        let mut data = Vec::with_capacity(78);
        data.extend_from_slice(&XPUB_VERSION);
        data.push(self.depth);
        data.extend_from_slice(&self.parent_fingerprint);
        data.extend_from_slice(&self.child_number.to_be_bytes());
        data.extend_from_slice(&self.chain_code);
        data.extend_from_slice(&self.public_key);
        bs58::encode(data).with_check().into_string()
    }
}

impl KeyShare {
    /// Public derivation data of this share's key
    pub fn extended_public_key(&self) -> ExtendedPublicKey {
        ExtendedPublicKey {
            public_key: self.public_key.clone(),
            chain_code: self.chain_code,
            depth: self.depth,
            child_number: self.child_number,
            parent_fingerprint: self.parent_fingerprint,
        }
    }

    /// Derive a child key share along a non-hardened path such as `m/0/1`
    pub fn derive_child(&self, path: &str) -> Result<KeyShare> {
        derive_nonhardened(self, &path.parse()?)
    }
}

/// Derive a child key share along a non-hardened path.
///
/// Local and deterministic: every holder of the key gets matching child
/// shares from its own share.
pub fn derive_nonhardened(share: &KeyShare, path: &DerivationPath) -> Result<KeyShare> {
    if path.has_hardened() {
        return Err(Error::Derivation(
            "Hardened derivation requires the interactive protocol".into(),
        ));
    }
    let mut child = share.clone();
    let mut xpub = share.extended_public_key();
    for step in path.children() {
        let (next, mut tweak) = xpub.derive_child(*step)?;
        child.shift(&tweak)?;
        zeroize::Zeroize::zeroize(&mut tweak);
        xpub = next;
    }
    child.chain_code = xpub.chain_code;
    child.depth = xpub.depth;
    child.child_number = xpub.child_number;
    child.parent_fingerprint = xpub.parent_fingerprint;
    Ok(child)
}

/// HMAC-SHA512
pub(crate) fn hmac_sha512(key: &[u8], data: &[u8]) -> Result<[u8; 64]> {
    let mut mac = Hmac::<Sha512>::new_from_slice(key).map_err(|e| Error::Derivation(e.to_string()))?;
    mac.update(data);
    let mut out = [0u8; 64];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}
