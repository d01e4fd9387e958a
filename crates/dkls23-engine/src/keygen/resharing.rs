//! Resharing exchange shared by key refresh and hardened derivation
//!
//! A set of dealers each deals a polynomial to every holder of an existing
//! key. In refresh mode the polynomials have a zero constant term, so the
//! shared secret stays the same and only the shares change. In hardened
//! derivation mode every holder deals a random polynomial and the shared
//! secret moves by the sum of the constant terms.
//!
//! In both modes every holder also replaces its OT sender key and its
//! pairwise zero-share seeds, so material from before the exchange is of
//! no use against signing sessions after it.
//!
//! Rounds:
//! 1. every holder broadcasts its channel key, fresh OT key with proof and
//!    zero-seed commitments; dealers also a commitment to their polynomial
//! 2. dealers broadcast the opening and coefficient proofs
//! 3. every holder sends each other holder its seed contribution and,
//!    for dealers, its fragment, encrypted
//! 4. every holder broadcasts the resulting public values

use std::collections::BTreeMap;

use k256::{elliptic_curve::group::Group, ProjectivePoint, Scalar};
use rand::{rngs::OsRng, RngCore};
use tracing::{debug, info};
use zeroize::Zeroize;

use super::dealing::{self, Dealing};
use super::dkg::check_consistency;
use super::messages::{ConsistencyRound, ReshareFragment, ReshareRound1, ReshareRound2, ReshareRound3};
use crate::derivation::hmac_sha512;
use crate::key_share::{fingerprint, KeyShare};
use crate::oblivious::OtSenderKey;
use crate::primitives::{
    commitment::{commit, verify_commitment},
    lagrange_coefficient,
    zero_share::pair_seed,
    ChannelKey, DLogProof, FeldmanCommitment, Polynomial, Salt,
};
use crate::session::{
    engine::EngineCore, message::decode_batch, transcript::Delivery, EngineState, RoundMessage,
    SessionContext, Step,
};
use crate::types::{nonzero_point_from_bytes, point_to_bytes, scalar_to_bytes, PartyIndex, SessionId};
use crate::{Error, Result};

const REFRESH_LABEL: &[u8] = b"refresh/coefficient";
const HARDENED_LABEL: &[u8] = b"hardened/coefficient";
const OT_KEY_LABEL: &[u8] = b"reshare/ot-key";

/// What the exchange does to the shared secret
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    /// Zero-constant polynomials; the key stays
    Refresh,
    /// Random polynomials; the key moves to a hardened child
    Hardened { index: u32 },
}

impl Mode {
    fn label(&self) -> &'static [u8] {
        match self {
            Mode::Refresh => REFRESH_LABEL,
            Mode::Hardened { .. } => HARDENED_LABEL,
        }
    }

    /// First coefficient covered by proofs
    fn first_proven(&self) -> usize {
        match self {
            Mode::Refresh => 1,
            Mode::Hardened { .. } => 0,
        }
    }

    fn commitment_extra(&self) -> Vec<u8> {
        match self {
            Mode::Refresh => b"refresh".to_vec(),
            Mode::Hardened { index } => [b"hardened".as_slice(), &index.to_be_bytes()].concat(),
        }
    }
}

struct ReshareSecrets {
    dealing: Option<Dealing>,
    channel: ChannelKey,
    /// Own zero-seed contribution and its salt, per counterparty
    seed_contributions: BTreeMap<PartyIndex, ([u8; 32], Salt)>,
    ot_key: OtSenderKey,
}

impl Drop for ReshareSecrets {
    fn drop(&mut self) {
        for (seed, _) in self.seed_contributions.values_mut() {
            seed.zeroize();
        }
    }
}

pub(crate) struct Resharing {
    core: EngineCore,
    mode: Mode,
    dealers: Vec<PartyIndex>,
    share: KeyShare,
    secrets: Option<ReshareSecrets>,
    round1: BTreeMap<PartyIndex, ReshareRound1>,
    feldman: BTreeMap<PartyIndex, FeldmanCommitment>,
    candidate: Option<KeyShare>,
}

impl Resharing {
    pub(crate) fn new(
        context: SessionContext,
        share: KeyShare,
        dealers: Vec<PartyIndex>,
        mode: Mode,
        name: &'static str,
    ) -> Result<Self> {
        if context.parameters() != share.parameters || context.party_index() != share.party_index {
            return Err(Error::InvalidParameters(
                "session context does not match the key share".into(),
            ));
        }
        let parameters = share.parameters;
        let mut sorted = dealers.clone();
        sorted.sort_unstable();
        sorted.dedup();
        if sorted.len() != dealers.len() || sorted.iter().any(|d| !parameters.contains(*d)) {
            return Err(Error::InvalidParameters(format!("invalid dealer set {dealers:?}")));
        }
        let participants = parameters.parties().collect();
        Ok(Self {
            core: EngineCore::new(context, participants, name),
            mode,
            dealers: sorted,
            share,
            secrets: None,
            round1: BTreeMap::new(),
            feldman: BTreeMap::new(),
            candidate: None,
        })
    }

    pub(crate) fn context(&self) -> &SessionContext {
        &self.core.context
    }

    pub(crate) fn state(&self) -> EngineState {
        self.core.state
    }

    pub(crate) fn dealers(&self) -> &[PartyIndex] {
        &self.dealers
    }

    fn is_dealer(&self, party: PartyIndex) -> bool {
        self.dealers.contains(&party)
    }

    fn session_id(&self) -> SessionId {
        *self.core.context.session_id()
    }

    fn senders(&self, phase: u8) -> Vec<PartyIndex> {
        match phase {
            2 => self.dealers.clone(),
            _ => self.core.participants.clone(),
        }
    }

    pub(crate) fn expected_senders(&self) -> Vec<PartyIndex> {
        let me = self.core.me();
        match self.core.state {
            EngineState::Round(phase) => self
                .senders(phase)
                .into_iter()
                .filter(|p| *p != me)
                .collect(),
            _ => Vec::new(),
        }
    }

    fn secrets(&self) -> Result<&ReshareSecrets> {
        self.secrets
            .as_ref()
            .ok_or_else(|| Error::SessionClosed("resharing secrets already released".into()))
    }

    pub(crate) fn start(&mut self) -> Result<Vec<RoundMessage>> {
        self.core.ensure_init()?;
        let me = self.core.me();
        let sid = self.session_id();
        let threshold = self.share.parameters.threshold;
        info!(
            party_index = me,
            session_id = %self.core.context.session_hex(),
            dealers = ?self.dealers,
            mode = ?self.mode,
            "Starting resharing"
        );

        let dealing = self.is_dealer(me).then(|| {
            let polynomial = match self.mode {
                Mode::Refresh => Polynomial::with_constant(Scalar::ZERO, threshold),
                Mode::Hardened { .. } => Polynomial::random(threshold),
            };
            Dealing::new(polynomial, &sid, me, &self.mode.commitment_extra())
        });
        let mut seed_contributions = BTreeMap::new();
        let mut seed_commitments = BTreeMap::new();
        for peer in self.core.peers() {
            let mut seed = [0u8; 32];
            OsRng.fill_bytes(&mut seed);
            let (commitment, salt) = commit(&[&sid, &me.to_be_bytes(), &peer.to_be_bytes(), &seed]);
            seed_commitments.insert(peer, commitment);
            seed_contributions.insert(peer, (seed, salt));
        }

        let channel = ChannelKey::generate();
        let ot_key = OtSenderKey::generate();
        let payload = ReshareRound1 {
            channel_key: channel.public_bytes(),
            commitment: dealing.as_ref().map(|d| d.commitment),
            seed_commitments,
            ot_public_key: point_to_bytes(&ot_key.public()),
            ot_proof: DLogProof::prove(OT_KEY_LABEL, &sid, me, ot_key.secret()),
        };
        let message = RoundMessage::broadcast(sid, me, 1, &payload)?;

        if let Some(dealing) = &dealing {
            self.feldman.insert(me, dealing.feldman.clone());
        }
        self.secrets = Some(ReshareSecrets {
            dealing,
            channel,
            seed_contributions,
            ot_key,
        });
        Ok(self.core.emit(1, vec![message]))
    }

    pub(crate) fn advance(&mut self, incoming: Vec<RoundMessage>) -> Result<Step<KeyShare>> {
        let phase = self.core.waiting_phase()?;
        let senders = self.senders(phase);
        let delivery = if phase == 3 {
            Delivery::Direct
        } else {
            Delivery::Broadcast
        };
        let batch = self.core.accept(phase, &senders, delivery, incoming)?;

        let result = match phase {
            1 => self.after_round1(batch).map(Step::Continue),
            2 => self.after_round2(batch).map(Step::Continue),
            3 => self.after_round3(batch).map(Step::Continue),
            _ => self.after_round4(batch).map(Step::Complete),
        };
        if let Err(error) = &result {
            self.core.abort(error);
            self.wipe();
        }
        result
    }

    pub(crate) fn cancel(&mut self) {
        self.core.cancel();
        self.wipe();
    }

    fn wipe(&mut self) {
        self.secrets = None;
        self.candidate = None;
    }

    fn after_round1(&mut self, batch: BTreeMap<PartyIndex, RoundMessage>) -> Result<Vec<RoundMessage>> {
        let me = self.core.me();
        let sid = self.session_id();
        let decoded: BTreeMap<PartyIndex, ReshareRound1> = decode_batch(&batch)?;
        for (&party, payload) in &decoded {
            if payload.commitment.is_some() != self.is_dealer(party) {
                return Err(Error::MalformedPayload {
                    party,
                    reason: "dealer commitment present for a non-dealer or missing for a dealer".into(),
                });
            }
            if !payload.seed_commitments.contains_key(&me) {
                return Err(Error::MalformedPayload {
                    party,
                    reason: "no zero-seed commitment for this party".into(),
                });
            }
        }
        dealing::verify_each(&decoded, |party, payload| {
            let ot_key = nonzero_point_from_bytes(&payload.ot_public_key)
                .ok_or_else(|| Error::proof(party, "invalid OT public key"))?;
            if !payload.ot_proof.verify(OT_KEY_LABEL, &sid, party, &ot_key) {
                return Err(Error::proof(party, "OT key proof does not verify"));
            }
            Ok(())
        })?;
        self.round1 = decoded;

        let mut messages = Vec::new();
        if let Some(dealing) = &self.secrets()?.dealing {
            let payload = ReshareRound2 {
                feldman: dealing.feldman.to_bytes(),
                salt: dealing.salt,
                proofs: dealing.proofs(self.mode.label(), &sid, me, self.mode.first_proven()),
            };
            messages.push(RoundMessage::broadcast(sid, me, 2, &payload)?);
        }
        Ok(self.core.emit(2, messages))
    }

    fn after_round2(&mut self, batch: BTreeMap<PartyIndex, RoundMessage>) -> Result<Vec<RoundMessage>> {
        let me = self.core.me();
        let sid = self.session_id();
        let threshold = self.share.parameters.threshold;
        let mode = self.mode;
        let decoded: BTreeMap<PartyIndex, ReshareRound2> = decode_batch(&batch)?;

        let round1 = &self.round1;
        let extra = mode.commitment_extra();
        let verified = dealing::verify_each(&decoded, |dealer, payload| {
            let commitment = round1
                .get(&dealer)
                .and_then(|r| r.commitment)
                .ok_or_else(|| Error::proof(dealer, "no round 1 commitment"))?;
            let feldman = dealing::open_feldman(
                &sid,
                dealer,
                &commitment,
                &payload.feldman,
                &extra,
                &payload.salt,
                threshold,
            )?;
            if mode == Mode::Refresh && !bool::from(feldman.constant_term().is_identity()) {
                return Err(Error::proof(dealer, "refresh polynomial has a non-zero constant term"));
            }
            dealing::check_coefficient_proofs(
                mode.label(),
                &sid,
                dealer,
                &feldman,
                &payload.proofs,
                mode.first_proven(),
            )?;
            Ok(feldman)
        })?;
        self.feldman.extend(verified);

        let secrets = self.secrets()?;
        let mut messages = Vec::with_capacity(self.round1.len());
        for (&holder, first) in &self.round1 {
            let (zero_seed, seed_salt) = secrets
                .seed_contributions
                .get(&holder)
                .ok_or_else(|| Error::primitive("zero seed"))?;
            let fragment = ReshareFragment {
                fragment: secrets
                    .dealing
                    .as_ref()
                    .map(|d| scalar_to_bytes(&d.polynomial.evaluate_at(holder))),
                zero_seed: *zero_seed,
                seed_salt: *seed_salt,
            };
            let sealed = dealing::seal(&secrets.channel, &first.channel_key, &sid, me, holder, &fragment)?;
            messages.push(RoundMessage::direct(sid, me, holder, 3, &ReshareRound3 { sealed })?);
        }
        debug!(party_index = me, "Resharing openings and proofs verified");
        Ok(self.core.emit(3, messages))
    }

    fn after_round3(&mut self, batch: BTreeMap<PartyIndex, RoundMessage>) -> Result<Vec<RoundMessage>> {
        let me = self.core.me();
        let sid = self.session_id();
        let parameters = self.share.parameters;
        let decoded: BTreeMap<PartyIndex, ReshareRound3> = decode_batch(&batch)?;
        let secrets = self.secrets()?;

        let mut delta_share = secrets
            .dealing
            .as_ref()
            .map(|d| d.polynomial.evaluate_at(me))
            .unwrap_or(Scalar::ZERO);
        let mut zero_seeds = BTreeMap::new();
        for (&holder, payload) in &decoded {
            let first = self
                .round1
                .get(&holder)
                .ok_or_else(|| Error::proof(holder, "no round 1 message"))?;
            let opened: ReshareFragment =
                dealing::open(&secrets.channel, &first.channel_key, &sid, holder, me, &payload.sealed)?;
            match (&opened.fragment, self.feldman.get(&holder)) {
                (Some(fragment), Some(feldman)) => {
                    delta_share += dealing::check_fragment(holder, me, feldman, fragment)?;
                }
                (None, None) => {}
                _ => {
                    return Err(Error::MalformedPayload {
                        party: holder,
                        reason: "fragment present for a non-dealer or missing for a dealer".into(),
                    })
                }
            }

            let seed_commitment = first
                .seed_commitments
                .get(&me)
                .ok_or_else(|| Error::proof(holder, "no zero-seed commitment"))?;
            if !verify_commitment(
                seed_commitment,
                &[&sid, &holder.to_be_bytes(), &me.to_be_bytes(), &opened.zero_seed],
                &opened.seed_salt,
            ) {
                return Err(Error::proof(holder, "zero seed does not match its commitment"));
            }
            let (own_seed, _) = secrets
                .seed_contributions
                .get(&holder)
                .ok_or_else(|| Error::primitive("zero seed"))?;
            zero_seeds.insert(holder, pair_seed(me, own_seed, holder, &opened.zero_seed));
        }

        let delta_key = self
            .feldman
            .values()
            .fold(ProjectivePoint::IDENTITY, |acc, c| acc + c.constant_term());
        let deltas = dealing::public_shares(&self.feldman, parameters.parties());

        let parent_key = self.share.public_key_point()?;
        let mut child = self.share.clone();
        child.secret_share += delta_share;
        let mut public_shares = BTreeMap::new();
        for (&j, delta) in &deltas {
            public_shares.insert(j, self.share.public_share_point(j)? + delta);
        }
        let public_key = parent_key + delta_key;

        match self.mode {
            Mode::Refresh => {
                if public_key != parent_key || interpolate(&public_shares, parameters.threshold)? != parent_key {
                    return Err(Error::consistency(None, "refreshed shares do not match the group key"));
                }
            }
            Mode::Hardened { index } => {
                if bool::from(public_key.is_identity()) {
                    return Err(Error::consistency(None, "derived key is the identity"));
                }
                let mut data = vec![0u8];
                data.extend_from_slice(&point_to_bytes(&delta_key));
                data.extend_from_slice(&index.to_be_bytes());
                let output = hmac_sha512(&self.share.chain_code, &data)?;
                child.chain_code.copy_from_slice(&output[32..]);
                child.depth = self.share.depth.saturating_add(1);
                child.child_number = index;
                child.parent_fingerprint = fingerprint(&self.share.public_key);
                child.public_key = point_to_bytes(&public_key);
            }
        }
        if public_shares.get(&me) != Some(&(ProjectivePoint::GENERATOR * child.secret_share)) {
            return Err(Error::consistency(Some(me), "own share does not match commitments"));
        }
        child.public_shares = public_shares
            .iter()
            .map(|(j, p)| (*j, point_to_bytes(p)))
            .collect();
        child.zero_seeds = zero_seeds;
        child.ot_secret = *secrets.ot_key.secret();
        child.ot_public_keys = self
            .round1
            .iter()
            .map(|(j, first)| (*j, first.ot_public_key.clone()))
            .collect();
        child.ot_public_keys.insert(me, point_to_bytes(&secrets.ot_key.public()));

        let payload = ConsistencyRound {
            public_key: child.public_key.clone(),
            public_share: child.public_shares.get(&me).cloned().unwrap_or_default(),
            chain_code: child.chain_code,
        };
        self.candidate = Some(child);
        let message = RoundMessage::broadcast(sid, me, 4, &payload)?;
        Ok(self.core.emit(4, vec![message]))
    }

    fn after_round4(&mut self, batch: BTreeMap<PartyIndex, RoundMessage>) -> Result<KeyShare> {
        let decoded: BTreeMap<PartyIndex, ConsistencyRound> = decode_batch(&batch)?;
        let candidate = self
            .candidate
            .take()
            .ok_or_else(|| Error::SessionClosed("resharing output already released".into()))?;
        let public_shares = candidate
            .public_shares
            .keys()
            .map(|j| candidate.public_share_point(*j).map(|p| (*j, p)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        check_consistency(
            &decoded,
            &candidate.public_key_point()?,
            &public_shares,
            &candidate.chain_code,
        )?;

        self.core.complete();
        self.secrets = None;
        info!(
            party_index = self.core.me(),
            session_id = %self.core.context.session_hex(),
            public_key = %hex::encode(&candidate.public_key),
            "Resharing completed successfully"
        );
        Ok(candidate)
    }
}

/// Interpolate the public shares of the first `threshold` parties at zero
fn interpolate(public_shares: &BTreeMap<PartyIndex, ProjectivePoint>, threshold: u16) -> Result<ProjectivePoint> {
    let set: Vec<PartyIndex> = public_shares
        .keys()
        .copied()
        .take(usize::from(threshold))
        .collect();
    let mut total = ProjectivePoint::IDENTITY;
    for &j in &set {
        let lambda = lagrange_coefficient(j, &set).ok_or_else(|| Error::primitive("lagrange coefficient"))?;
        total += public_shares[&j] * lambda;
    }
    Ok(total)
}
