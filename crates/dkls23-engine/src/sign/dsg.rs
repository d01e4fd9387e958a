//! DSG protocol implementation
//!
//! Phases:
//! 1. (P2P) sample the instance key `r_i` and inversion mask `φ_i`, commit
//!    to `R_i = r_i·G`, start a two-party multiplication with every peer
//!    as the OT receiver of a random `χ_ij`
//! 2. (P2P) as the OT sender multiply `(r_i, sk_i)` by the peer's `χ_ji`,
//!    send the check values and open the commitment
//! 3. (broadcast) finish the multiplications, run the consistency checks
//!    and broadcast `u_i` and `w_i`
//! 4. (local) `s = Σw / Σu`

use std::collections::BTreeMap;

use k256::{
    elliptic_curve::{group::Group, scalar::IsHigh, Field},
    ProjectivePoint, Scalar,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use zeroize::Zeroize;

use super::messages::{SignRound1, SignRound2, SignRound3};
use crate::key_share::KeyShare;
use crate::oblivious::{respond, MulReceiverKeep, OtSenderKey};
use crate::primitives::{
    commitment::{commit, verify_commitment},
    Salt, ZeroShare,
};
use crate::session::{
    engine::EngineCore, message::decode_batch, transcript::Delivery, EngineState, PhaseEngine,
    RoundMessage, SessionContext, Step,
};
use crate::types::{
    nonzero_point_from_bytes, point_from_bytes, point_to_bytes, reduce_bytes, scalar_from_bytes,
    scalar_to_bytes, PartyIndex, SessionId, Signature,
};
use crate::verify::{recover_public_key, recovery_id, verify, x_scalar};
use crate::{Error, Result};

/// Signing configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignOptions {
    /// Replace a high `s` by `n - s`
    pub normalize_s: bool,
}

impl Default for SignOptions {
    fn default() -> Self {
        Self { normalize_s: true }
    }
}

/// Per-counterparty signing state
struct PeerState {
    salt: Salt,
    receiver: MulReceiverKeep,
    /// Commitment to the peer's instance point
    commitment: Option<[u8; 32]>,
    /// Sender shares of `r_i·χ_ji` and `sk_i·χ_ji`
    c_u: Scalar,
    c_v: Scalar,
}

impl Drop for PeerState {
    fn drop(&mut self) {
        self.c_u.zeroize();
        self.c_v.zeroize();
    }
}

struct SignSecrets {
    instance_key: Scalar,
    instance_point: ProjectivePoint,
    inversion_mask: Scalar,
    zero_share: Scalar,
    /// `λ_i·p(i) + ζ_i`
    key_share: Scalar,
    peers: BTreeMap<PartyIndex, PeerState>,
}

impl Drop for SignSecrets {
    fn drop(&mut self) {
        self.instance_key.zeroize();
        self.inversion_mask.zeroize();
        self.zero_share.zeroize();
        self.key_share.zeroize();
    }
}

/// Values kept for the local combination
struct Combination {
    instance_point: ProjectivePoint,
    u: Scalar,
    w: Scalar,
}

/// Signing engine for one of exactly `threshold` signers
pub struct SignEngine {
    core: EngineCore,
    share: KeyShare,
    message_hash: [u8; 32],
    options: SignOptions,
    secrets: Option<SignSecrets>,
    combination: Option<Combination>,
}

impl SignEngine {
    /// Create a signing engine with default options
    pub fn new(
        context: SessionContext,
        share: KeyShare,
        signers: &[PartyIndex],
        message_hash: [u8; 32],
    ) -> Result<Self> {
        Self::with_options(context, share, signers, message_hash, SignOptions::default())
    }

    pub fn with_options(
        context: SessionContext,
        share: KeyShare,
        signers: &[PartyIndex],
        message_hash: [u8; 32],
        options: SignOptions,
    ) -> Result<Self> {
        if context.parameters() != share.parameters || context.party_index() != share.party_index {
            return Err(Error::InvalidParameters(
                "session context does not match the key share".into(),
            ));
        }
        if context.session_id() == &share.dkg_session_id {
            return Err(Error::SessionReused(context.session_hex()));
        }
        let threshold = usize::from(share.parameters.threshold);
        if signers.len() < threshold {
            return Err(Error::InsufficientParticipants {
                required: threshold,
                actual: signers.len(),
            });
        }
        if signers.len() > threshold {
            return Err(Error::InvalidParameters(format!(
                "exactly {threshold} signers required, got {}",
                signers.len()
            )));
        }
        let mut sorted = signers.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        if sorted.len() != signers.len() {
            return Err(Error::InvalidParameters("duplicate signer".into()));
        }
        if let Some(outside) = sorted.iter().find(|p| !share.parameters.contains(**p)) {
            return Err(Error::InvalidParameters(format!("signer {outside} out of range")));
        }
        if !sorted.contains(&share.party_index) {
            return Err(Error::InvalidParameters(
                "signing set does not contain this party".into(),
            ));
        }
        Ok(Self {
            core: EngineCore::new(context, sorted, "Signing"),
            share,
            message_hash,
            options,
            secrets: None,
            combination: None,
        })
    }

    pub fn signers(&self) -> &[PartyIndex] {
        &self.core.participants
    }

    pub fn message_hash(&self) -> &[u8; 32] {
        &self.message_hash
    }

    pub fn transcript(&self) -> &crate::session::PartyTranscript {
        &self.core.transcript
    }

    fn session_id(&self) -> SessionId {
        *self.core.context.session_id()
    }

    /// Session id of the multiplication between `receiver` and `sender`
    fn mul_session(&self, receiver: PartyIndex, sender: PartyIndex) -> Vec<u8> {
        [
            receiver.to_be_bytes().as_slice(),
            &sender.to_be_bytes(),
            &self.share.dkg_session_id,
            self.core.context.session_id(),
        ]
        .concat()
    }

    fn secrets_mut(&mut self) -> Result<&mut SignSecrets> {
        self.secrets
            .as_mut()
            .ok_or_else(|| Error::SessionClosed("signing secrets already released".into()))
    }

    fn after_round1(&mut self, batch: BTreeMap<PartyIndex, RoundMessage>) -> Result<Vec<RoundMessage>> {
        let me = self.core.me();
        let sid = self.session_id();
        let decoded: BTreeMap<PartyIndex, SignRound1> = decode_batch(&batch)?;

        let additive = self.share.additive_share(&self.core.participants)?;
        let ot_key = OtSenderKey::from_secret(self.share.ot_secret);
        let sessions: BTreeMap<PartyIndex, Vec<u8>> = decoded
            .keys()
            .map(|&j| (j, self.mul_session(j, me)))
            .collect();

        let secrets = self.secrets_mut()?;
        secrets.key_share = additive + secrets.zero_share;
        let public_share = point_to_bytes(&(ProjectivePoint::GENERATOR * secrets.key_share));
        let instance_point = point_to_bytes(&secrets.instance_point);
        let inputs = [secrets.instance_key, secrets.key_share];

        let mut messages = Vec::with_capacity(decoded.len());
        for (&peer, payload) in &decoded {
            let session = sessions
                .get(&peer)
                .ok_or_else(|| Error::primitive("multiplication session"))?;
            let (shares, mul) = respond(&ot_key, session, &inputs, &payload.mul)
                .map_err(|e| Error::proof(peer, e.to_string()))?;
            let state = secrets
                .peers
                .get_mut(&peer)
                .ok_or_else(|| Error::primitive("peer state"))?;
            state.commitment = Some(payload.commitment);
            state.c_u = shares[0];
            state.c_v = shares[1];

            let psi = secrets.inversion_mask - state.receiver.chi();
            let round = SignRound2 {
                gamma_u: point_to_bytes(&(ProjectivePoint::GENERATOR * state.c_u)),
                gamma_v: point_to_bytes(&(ProjectivePoint::GENERATOR * state.c_v)),
                psi: scalar_to_bytes(&psi),
                public_share: public_share.clone(),
                instance_point: instance_point.clone(),
                salt: state.salt,
                mul,
            };
            messages.push(RoundMessage::direct(sid, me, peer, 2, &round)?);
        }
        Ok(self.core.emit(2, messages))
    }

    fn after_round2(&mut self, batch: BTreeMap<PartyIndex, RoundMessage>) -> Result<Vec<RoundMessage>> {
        let me = self.core.me();
        let sid = self.session_id();
        let decoded: BTreeMap<PartyIndex, SignRound2> = decode_batch(&batch)?;
        let group_key = self.share.public_key_point()?;
        let mut peer_inputs = BTreeMap::new();
        for &peer in decoded.keys() {
            peer_inputs.insert(peer, (self.mul_session(me, peer), self.share.ot_public_key(peer)?));
        }
        let digest = reduce_bytes(&self.message_hash);

        let secrets = self
            .secrets
            .as_ref()
            .ok_or_else(|| Error::SessionClosed("signing secrets already released".into()))?;
        let mut expected_key = ProjectivePoint::GENERATOR * secrets.key_share;
        let mut total_instance = secrets.instance_point;
        let mut first_sum = secrets.inversion_mask;
        let mut second_u = Scalar::ZERO;
        let mut second_v = Scalar::ZERO;

        for (&peer, payload) in &decoded {
            let state = secrets
                .peers
                .get(&peer)
                .ok_or_else(|| Error::primitive("peer state"))?;
            let commitment = state
                .commitment
                .ok_or_else(|| Error::proof(peer, "no instance point commitment"))?;
            if !verify_commitment(
                &commitment,
                &[&sid, &peer.to_be_bytes(), &me.to_be_bytes(), &payload.instance_point],
                &payload.salt,
            ) {
                return Err(Error::proof(peer, "instance point does not match its commitment"));
            }
            let malformed = |reason: &str| Error::MalformedPayload {
                party: peer,
                reason: reason.into(),
            };
            let instance_point =
                nonzero_point_from_bytes(&payload.instance_point).ok_or_else(|| malformed("instance point"))?;
            let public_share =
                point_from_bytes(&payload.public_share).ok_or_else(|| malformed("public share"))?;
            let gamma_u = point_from_bytes(&payload.gamma_u).ok_or_else(|| malformed("gamma_u"))?;
            let gamma_v = point_from_bytes(&payload.gamma_v).ok_or_else(|| malformed("gamma_v"))?;
            let psi = scalar_from_bytes(&payload.psi).ok_or_else(|| malformed("psi"))?;

            let (session, sender_key) = peer_inputs
                .get(&peer)
                .ok_or_else(|| Error::primitive("multiplication session"))?;
            let shares = state
                .receiver
                .finish(session, sender_key, 2, &payload.mul)
                .map_err(|e| Error::proof(peer, e.to_string()))?;
            let (d_u, d_v) = (shares[0], shares[1]);

            let chi = state.receiver.chi();
            if instance_point * chi != gamma_u + ProjectivePoint::GENERATOR * d_u {
                return Err(Error::proof(peer, "consistency check on u failed"));
            }
            if public_share * chi != gamma_v + ProjectivePoint::GENERATOR * d_v {
                return Err(Error::proof(peer, "consistency check on v failed"));
            }

            expected_key += public_share;
            total_instance += instance_point;
            first_sum += psi;
            second_u += state.c_u + d_u;
            second_v += state.c_v + d_v;
        }

        if expected_key != group_key {
            return Err(Error::consistency(None, "public shares do not add up to the group key"));
        }
        if bool::from(total_instance.is_identity()) {
            return Err(Error::consistency(None, "nonce point is the identity"));
        }

        let u = secrets.instance_key * first_sum + second_u;
        let mut v = secrets.key_share * first_sum + second_v;
        let r_x = x_scalar(&total_instance);
        let w = digest * secrets.inversion_mask + r_x * v;
        v.zeroize();

        let round = SignRound3 {
            u: scalar_to_bytes(&u),
            w: scalar_to_bytes(&w),
        };
        self.combination = Some(Combination {
            instance_point: total_instance,
            u,
            w,
        });
        let message = RoundMessage::broadcast(sid, me, 3, &round)?;
        debug!(party_index = me, "Signing checks passed");
        Ok(self.core.emit(3, vec![message]))
    }

    fn after_round3(&mut self, batch: BTreeMap<PartyIndex, RoundMessage>) -> Result<Signature> {
        let decoded: BTreeMap<PartyIndex, SignRound3> = decode_batch(&batch)?;
        let combination = self
            .combination
            .take()
            .ok_or_else(|| Error::SessionClosed("signing output already released".into()))?;

        let mut numerator = combination.w;
        let mut denominator = combination.u;
        for (&peer, payload) in &decoded {
            let (Some(u), Some(w)) = (scalar_from_bytes(&payload.u), scalar_from_bytes(&payload.w)) else {
                return Err(Error::MalformedPayload {
                    party: peer,
                    reason: "u or w is not a canonical scalar".into(),
                });
            };
            numerator += w;
            denominator += u;
        }

        let inverse = Option::<Scalar>::from(denominator.invert())
            .ok_or_else(|| Error::consistency(None, "sum of u is zero"))?;
        let mut s = numerator * inverse;
        let r = x_scalar(&combination.instance_point);
        if bool::from(r.is_zero() | s.is_zero()) {
            return Err(Error::consistency(None, "degenerate signature"));
        }
        let mut recovery = recovery_id(&combination.instance_point);
        if self.options.normalize_s && bool::from(s.is_high()) {
            s = -s;
            recovery ^= 1;
        }
        let signature = Signature::new(scalar_to_bytes(&r), scalar_to_bytes(&s), recovery);

        if !verify(&self.share.public_key, &self.message_hash, &signature) {
            return Err(Error::consistency(None, "combined signature does not verify"));
        }
        if recover_public_key(&self.message_hash, &signature)? != self.share.public_key {
            return Err(Error::consistency(None, "recovery id does not recover the group key"));
        }
        Ok(signature)
    }

    fn wipe(&mut self) {
        self.secrets = None;
        self.combination = None;
    }
}

impl Drop for Combination {
    fn drop(&mut self) {
        self.u.zeroize();
        self.w.zeroize();
    }
}

impl PhaseEngine for SignEngine {
    type Output = Signature;

    fn context(&self) -> &SessionContext {
        &self.core.context
    }

    fn state(&self) -> EngineState {
        self.core.state
    }

    fn expected_senders(&self) -> Vec<PartyIndex> {
        match self.core.state {
            EngineState::Round(_) => self.core.peers(),
            _ => Vec::new(),
        }
    }

    fn start(&mut self) -> Result<Vec<RoundMessage>> {
        self.core.ensure_init()?;
        let me = self.core.me();
        let sid = self.session_id();
        info!(
            party_index = me,
            signers = ?self.core.participants,
            session_id = %self.core.context.session_hex(),
            "Starting DSG"
        );

        let peers = self.core.peers();
        let zero_session = [self.share.dkg_session_id.as_slice(), &sid].concat();
        let zero_share = ZeroShare::new(me, &self.share.zero_seeds)
            .compute(&peers, &zero_session)
            .ok_or_else(|| Error::primitive("zero share"))?;

        let instance_key = Scalar::random(&mut OsRng);
        let instance_point = ProjectivePoint::GENERATOR * instance_key;
        let encoded_instance = point_to_bytes(&instance_point);

        let mut states = BTreeMap::new();
        let mut messages = Vec::with_capacity(peers.len());
        for &peer in &peers {
            let (commitment, salt) = commit(&[&sid, &me.to_be_bytes(), &peer.to_be_bytes(), &encoded_instance]);
            let session = self.mul_session(me, peer);
            let (receiver, mul) = MulReceiverKeep::start(&session, &self.share.ot_public_key(peer)?);
            messages.push(RoundMessage::direct(sid, me, peer, 1, &SignRound1 { commitment, mul })?);
            states.insert(
                peer,
                PeerState {
                    salt,
                    receiver,
                    commitment: None,
                    c_u: Scalar::ZERO,
                    c_v: Scalar::ZERO,
                },
            );
        }

        self.secrets = Some(SignSecrets {
            instance_key,
            instance_point,
            inversion_mask: Scalar::random(&mut OsRng),
            zero_share,
            key_share: Scalar::ZERO,
            peers: states,
        });
        Ok(self.core.emit(1, messages))
    }

    fn advance(&mut self, incoming: Vec<RoundMessage>) -> Result<Step<Signature>> {
        let phase = self.core.waiting_phase()?;
        let senders = self.core.participants.clone();
        let delivery = if phase == 3 {
            Delivery::Broadcast
        } else {
            Delivery::Direct
        };
        let batch = self.core.accept(phase, &senders, delivery, incoming)?;

        let result = match phase {
            1 => self.after_round1(batch).map(Step::Continue),
            2 => self.after_round2(batch).map(Step::Continue),
            _ => self.after_round3(batch).map(Step::Complete),
        };
        match &result {
            Ok(Step::Complete(signature)) => {
                self.core.complete();
                self.wipe();
                info!(
                    party_index = self.core.me(),
                    session_id = %self.core.context.session_hex(),
                    r = %hex::encode(signature.r),
                    "DSG completed successfully"
                );
            }
            Ok(Step::Continue(_)) => {}
            Err(error) => {
                self.core.abort(error);
                self.wipe();
            }
        }
        result
    }

    fn cancel(&mut self) {
        self.core.cancel();
        self.wipe();
    }
}
