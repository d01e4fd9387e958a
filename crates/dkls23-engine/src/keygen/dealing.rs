//! Building blocks shared by DKG and resharing: a dealer's polynomial with
//! its commitments, opening checks, and sealed fragments

use std::collections::BTreeMap;

use k256::{ProjectivePoint, Scalar};
use serde::{de::DeserializeOwned, Serialize};
use zeroize::Zeroize;

use crate::primitives::{
    commitment::{commit, verify_commitment},
    ChannelKey, Commitment, DLogProof, FeldmanCommitment, Polynomial, Salt, SealedBox,
};
use crate::types::{PartyIndex, SessionId};
use crate::{Error, Result};

/// A dealer's polynomial together with its hiding commitment
pub(crate) struct Dealing {
    pub polynomial: Polynomial,
    pub feldman: FeldmanCommitment,
    pub commitment: Commitment,
    pub salt: Salt,
}

impl Dealing {
    /// Commit to the Feldman commitments of `polynomial` and `extra`
    pub fn new(polynomial: Polynomial, session_id: &SessionId, dealer: PartyIndex, extra: &[u8]) -> Self {
        let feldman = polynomial.commit();
        let encoded = feldman.to_bytes();
        let parts = opening_parts(session_id, dealer, &encoded, extra);
        let parts: Vec<&[u8]> = parts.iter().map(Vec::as_slice).collect();
        let (commitment, salt) = commit(&parts);
        Self {
            polynomial,
            feldman,
            commitment,
            salt,
        }
    }

    /// Proofs of knowledge for the coefficients, starting at `from`
    pub fn proofs(&self, label: &'static [u8], session_id: &SessionId, dealer: PartyIndex, from: usize) -> Vec<DLogProof> {
        self.polynomial.coefficients()[from..]
            .iter()
            .map(|a| DLogProof::prove(label, session_id, dealer, a))
            .collect()
    }
}

fn opening_parts(session_id: &SessionId, dealer: PartyIndex, feldman: &[Vec<u8>], extra: &[u8]) -> Vec<Vec<u8>> {
    let mut parts = Vec::with_capacity(feldman.len() + 3);
    parts.push(session_id.to_vec());
    parts.push(dealer.to_be_bytes().to_vec());
    parts.extend(feldman.iter().cloned());
    parts.push(extra.to_vec());
    parts
}

/// Check a dealer's opening against its first-round commitment and decode
/// the Feldman commitments
pub(crate) fn open_feldman(
    session_id: &SessionId,
    dealer: PartyIndex,
    commitment: &Commitment,
    feldman: &[Vec<u8>],
    extra: &[u8],
    salt: &Salt,
    threshold: u16,
) -> Result<FeldmanCommitment> {
    let parts = opening_parts(session_id, dealer, feldman, extra);
    let parts: Vec<&[u8]> = parts.iter().map(Vec::as_slice).collect();
    if !verify_commitment(commitment, &parts, salt) {
        return Err(Error::proof(dealer, "commitment opening does not match"));
    }
    if feldman.len() != usize::from(threshold) {
        return Err(Error::proof(
            dealer,
            format!("expected {threshold} Feldman commitments, got {}", feldman.len()),
        ));
    }
    FeldmanCommitment::from_bytes(feldman)
        .ok_or_else(|| Error::proof(dealer, "Feldman commitment is not a curve point"))
}

/// Verify proofs for `feldman.points()[from..]`
pub(crate) fn check_coefficient_proofs(
    label: &'static [u8],
    session_id: &SessionId,
    dealer: PartyIndex,
    feldman: &FeldmanCommitment,
    proofs: &[DLogProof],
    from: usize,
) -> Result<()> {
    let statements = &feldman.points()[from..];
    if proofs.len() != statements.len() {
        return Err(Error::proof(dealer, "wrong number of coefficient proofs"));
    }
    for (k, (proof, statement)) in proofs.iter().zip(statements).enumerate() {
        if !proof.verify(label, session_id, dealer, statement) {
            return Err(Error::proof(
                dealer,
                format!("proof for coefficient {} does not verify", k + from),
            ));
        }
    }
    Ok(())
}

/// Serialize and seal a payload for `receiver`
pub(crate) fn seal<T: Serialize>(
    channel: &ChannelKey,
    peer_key: &[u8; 32],
    session_id: &SessionId,
    sender: PartyIndex,
    receiver: PartyIndex,
    payload: &T,
) -> Result<SealedBox> {
    let mut plaintext = serde_json::to_vec(payload)?;
    let sealed = channel.seal(peer_key, session_id, sender, receiver, &plaintext);
    plaintext.zeroize();
    sealed.ok_or_else(|| Error::primitive("channel encryption"))
}

/// Open and decode a sealed payload from `sender`
pub(crate) fn open<T: DeserializeOwned>(
    channel: &ChannelKey,
    peer_key: &[u8; 32],
    session_id: &SessionId,
    sender: PartyIndex,
    receiver: PartyIndex,
    sealed: &SealedBox,
) -> Result<T> {
    let mut plaintext = channel
        .open(peer_key, session_id, sender, receiver, sealed)
        .ok_or_else(|| Error::proof(sender, "sealed payload does not decrypt"))?;
    let decoded = serde_json::from_slice(&plaintext).map_err(|e| Error::MalformedPayload {
        party: sender,
        reason: e.to_string(),
    });
    plaintext.zeroize();
    decoded
}

/// Check a received fragment against the dealer's Feldman commitments
pub(crate) fn check_fragment(
    dealer: PartyIndex,
    receiver: PartyIndex,
    feldman: &FeldmanCommitment,
    fragment: &[u8; 32],
) -> Result<Scalar> {
    let value = crate::types::scalar_from_bytes(fragment).ok_or_else(|| Error::MalformedPayload {
        party: dealer,
        reason: "fragment is not a canonical scalar".into(),
    })?;
    if !feldman.verify_share(receiver, &value) {
        return Err(Error::proof(dealer, "fragment does not match Feldman commitments"));
    }
    Ok(value)
}

/// `Σ_d C_d(j)` for every party `j`
pub(crate) fn public_shares(
    feldman: &BTreeMap<PartyIndex, FeldmanCommitment>,
    parties: impl Iterator<Item = PartyIndex>,
) -> BTreeMap<PartyIndex, ProjectivePoint> {
    parties
        .map(|j| {
            let point = feldman
                .values()
                .fold(ProjectivePoint::IDENTITY, |acc, c| acc + c.evaluate_at(j));
            (j, point)
        })
        .collect()
}

/// Run `check` for every peer and collect the results, in parallel with
/// the `multi-thread` feature
#[cfg(feature = "multi-thread")]
pub(crate) fn verify_each<T, U, F>(items: &BTreeMap<PartyIndex, T>, check: F) -> Result<BTreeMap<PartyIndex, U>>
where
    T: Sync,
    U: Send,
    F: Fn(PartyIndex, &T) -> Result<U> + Sync + Send,
{
    use rayon::prelude::*;
    items
        .par_iter()
        .map(|(party, item)| check(*party, item).map(|out| (*party, out)))
        .collect()
}

#[cfg(not(feature = "multi-thread"))]
pub(crate) fn verify_each<T, U, F>(items: &BTreeMap<PartyIndex, T>, check: F) -> Result<BTreeMap<PartyIndex, U>>
where
    F: Fn(PartyIndex, &T) -> Result<U>,
{
    items
        .iter()
        .map(|(party, item)| check(*party, item).map(|out| (*party, out)))
        .collect()
}
