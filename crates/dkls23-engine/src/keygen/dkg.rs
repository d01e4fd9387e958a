//! DKG protocol implementation
//!
//! Four rounds, every party dealing a random polynomial:
//! 1. broadcast commitments (Feldman commitments with the chain-code
//!    contribution, zero-share seeds) and a channel key
//! 2. broadcast the openings, coefficient proofs and the OT sender key
//! 3. send each party its fragment and zero-share seed, encrypted
//! 4. broadcast the group key, own public share and chain code for a
//!    final consistency check

use std::collections::BTreeMap;

use k256::{elliptic_curve::group::Group, ProjectivePoint, Scalar};
use rand::{rngs::OsRng, RngCore};
use tracing::{debug, info};
use zeroize::Zeroize;

use super::dealing::{self, Dealing};
use super::messages::{ConsistencyRound, DkgFragment, DkgRound1, DkgRound2, DkgRound3};
use crate::key_share::KeyShare;
use crate::oblivious::OtSenderKey;
use crate::primitives::{
    commitment::{commit, verify_commitment},
    hash::hash_parts,
    zero_share::pair_seed,
    ChannelKey, DLogProof, FeldmanCommitment, Polynomial, Salt,
};
use crate::session::{
    engine::EngineCore, message::decode_batch, transcript::Delivery, EngineState, PhaseEngine,
    RoundMessage, SessionContext, Step,
};
use crate::types::{nonzero_point_from_bytes, point_to_bytes, scalar_to_bytes, PartyIndex, SessionId};
use crate::{Error, Result};

const COEFFICIENT_LABEL: &[u8] = b"dkg/coefficient";
const OT_KEY_LABEL: &[u8] = b"dkg/ot-key";

struct DkgSecrets {
    dealing: Dealing,
    chain_code_contribution: [u8; 32],
    /// Own zero-seed contribution and its salt, per counterparty
    seed_contributions: BTreeMap<PartyIndex, ([u8; 32], Salt)>,
    ot_key: OtSenderKey,
    channel: ChannelKey,
}

impl Drop for DkgSecrets {
    fn drop(&mut self) {
        for (seed, _) in self.seed_contributions.values_mut() {
            seed.zeroize();
        }
    }
}

/// Output of round 3, confirmed by round 4
struct Candidate {
    secret_share: Scalar,
    public_key: ProjectivePoint,
    public_shares: BTreeMap<PartyIndex, ProjectivePoint>,
    chain_code: [u8; 32],
    zero_seeds: BTreeMap<PartyIndex, [u8; 32]>,
}

impl Drop for Candidate {
    fn drop(&mut self) {
        self.secret_share.zeroize();
        for seed in self.zero_seeds.values_mut() {
            seed.zeroize();
        }
    }
}

/// Distributed key generation for one party
pub struct DkgEngine {
    core: EngineCore,
    secrets: Option<DkgSecrets>,
    round1: BTreeMap<PartyIndex, DkgRound1>,
    feldman: BTreeMap<PartyIndex, FeldmanCommitment>,
    chain_code_contributions: BTreeMap<PartyIndex, [u8; 32]>,
    ot_public_keys: BTreeMap<PartyIndex, Vec<u8>>,
    candidate: Option<Candidate>,
}

impl DkgEngine {
    /// Create a DKG engine; all `share_count` parties take part
    pub fn new(context: SessionContext) -> Result<Self> {
        let participants = context.parameters().parties().collect();
        Ok(Self {
            core: EngineCore::new(context, participants, "DKG"),
            secrets: None,
            round1: BTreeMap::new(),
            feldman: BTreeMap::new(),
            chain_code_contributions: BTreeMap::new(),
            ot_public_keys: BTreeMap::new(),
            candidate: None,
        })
    }

    pub fn transcript(&self) -> &crate::session::PartyTranscript {
        &self.core.transcript
    }

    fn session_id(&self) -> SessionId {
        *self.core.context.session_id()
    }

    fn secrets(&self) -> Result<&DkgSecrets> {
        self.secrets
            .as_ref()
            .ok_or_else(|| Error::SessionClosed("DKG secrets already released".into()))
    }

    fn after_round1(&mut self, batch: BTreeMap<PartyIndex, RoundMessage>) -> Result<Vec<RoundMessage>> {
        let me = self.core.me();
        let sid = self.session_id();
        let decoded: BTreeMap<PartyIndex, DkgRound1> = decode_batch(&batch)?;
        for (party, payload) in &decoded {
            if !payload.seed_commitments.contains_key(&me) {
                return Err(Error::MalformedPayload {
                    party: *party,
                    reason: "no zero-seed commitment for this party".into(),
                });
            }
        }
        self.round1 = decoded;

        let secrets = self.secrets()?;
        let payload = DkgRound2 {
            feldman: secrets.dealing.feldman.to_bytes(),
            chain_code_contribution: secrets.chain_code_contribution,
            salt: secrets.dealing.salt,
            proofs: secrets.dealing.proofs(COEFFICIENT_LABEL, &sid, me, 0),
            ot_public_key: point_to_bytes(&secrets.ot_key.public()),
            ot_proof: DLogProof::prove(OT_KEY_LABEL, &sid, me, secrets.ot_key.secret()),
        };
        let message = RoundMessage::broadcast(sid, me, 2, &payload)?;
        Ok(self.core.emit(2, vec![message]))
    }

    fn after_round2(&mut self, batch: BTreeMap<PartyIndex, RoundMessage>) -> Result<Vec<RoundMessage>> {
        let me = self.core.me();
        let sid = self.session_id();
        let threshold = self.core.context.parameters().threshold;
        let decoded: BTreeMap<PartyIndex, DkgRound2> = decode_batch(&batch)?;

        let round1 = &self.round1;
        let verified = dealing::verify_each(&decoded, |party, payload| {
            let first = round1
                .get(&party)
                .ok_or_else(|| Error::proof(party, "no round 1 commitment"))?;
            let feldman = dealing::open_feldman(
                &sid,
                party,
                &first.commitment,
                &payload.feldman,
                &payload.chain_code_contribution,
                &payload.salt,
                threshold,
            )?;
            dealing::check_coefficient_proofs(COEFFICIENT_LABEL, &sid, party, &feldman, &payload.proofs, 0)?;
            let ot_key = nonzero_point_from_bytes(&payload.ot_public_key)
                .ok_or_else(|| Error::proof(party, "invalid OT public key"))?;
            if !payload.ot_proof.verify(OT_KEY_LABEL, &sid, party, &ot_key) {
                return Err(Error::proof(party, "OT key proof does not verify"));
            }
            Ok(feldman)
        })?;

        for (party, feldman) in verified {
            self.feldman.insert(party, feldman);
        }
        for (party, payload) in decoded {
            self.chain_code_contributions
                .insert(party, payload.chain_code_contribution);
            self.ot_public_keys.insert(party, payload.ot_public_key);
        }

        let secrets = self.secrets()?;
        let mut messages = Vec::with_capacity(self.round1.len());
        for (&peer, first) in &self.round1 {
            let (zero_seed, seed_salt) = secrets
                .seed_contributions
                .get(&peer)
                .ok_or_else(|| Error::primitive("zero seed"))?;
            let fragment = DkgFragment {
                fragment: scalar_to_bytes(&secrets.dealing.polynomial.evaluate_at(peer)),
                zero_seed: *zero_seed,
                seed_salt: *seed_salt,
            };
            let sealed = dealing::seal(&secrets.channel, &first.channel_key, &sid, me, peer, &fragment)?;
            messages.push(RoundMessage::direct(sid, me, peer, 3, &DkgRound3 { sealed })?);
        }
        debug!(party_index = me, "DKG openings and proofs verified");
        Ok(self.core.emit(3, messages))
    }

    fn after_round3(&mut self, batch: BTreeMap<PartyIndex, RoundMessage>) -> Result<Vec<RoundMessage>> {
        let me = self.core.me();
        let sid = self.session_id();
        let parameters = self.core.context.parameters();
        let decoded: BTreeMap<PartyIndex, DkgRound3> = decode_batch(&batch)?;
        let secrets = self.secrets()?;

        let mut secret_share = secrets.dealing.polynomial.evaluate_at(me);
        let mut zero_seeds = BTreeMap::new();
        for (&dealer, payload) in &decoded {
            let first = self
                .round1
                .get(&dealer)
                .ok_or_else(|| Error::proof(dealer, "no round 1 commitment"))?;
            let feldman = self
                .feldman
                .get(&dealer)
                .ok_or_else(|| Error::proof(dealer, "no Feldman commitment"))?;
            let opened: DkgFragment =
                dealing::open(&secrets.channel, &first.channel_key, &sid, dealer, me, &payload.sealed)?;
            let fragment = dealing::check_fragment(dealer, me, feldman, &opened.fragment)?;

            let seed_commitment = first
                .seed_commitments
                .get(&me)
                .ok_or_else(|| Error::proof(dealer, "no zero-seed commitment"))?;
            if !verify_commitment(
                seed_commitment,
                &[&sid, &dealer.to_be_bytes(), &me.to_be_bytes(), &opened.zero_seed],
                &opened.seed_salt,
            ) {
                return Err(Error::proof(dealer, "zero seed does not match its commitment"));
            }
            let (own_seed, _) = secrets
                .seed_contributions
                .get(&dealer)
                .ok_or_else(|| Error::primitive("zero seed"))?;
            zero_seeds.insert(dealer, pair_seed(me, own_seed, dealer, &opened.zero_seed));
            secret_share += fragment;
        }

        let public_key = self
            .feldman
            .values()
            .fold(ProjectivePoint::IDENTITY, |acc, c| acc + c.constant_term());
        if bool::from(public_key.is_identity()) {
            return Err(Error::consistency(None, "group public key is the identity"));
        }
        let public_shares = dealing::public_shares(&self.feldman, parameters.parties());
        if public_shares.get(&me) != Some(&(ProjectivePoint::GENERATOR * secret_share)) {
            return Err(Error::consistency(Some(me), "own share does not match commitments"));
        }
        let contributions: Vec<&[u8]> = self
            .chain_code_contributions
            .values()
            .map(|c| c.as_slice())
            .collect();
        let chain_code = hash_parts(b"dkls23-engine/chain-code", &contributions);

        let payload = ConsistencyRound {
            public_key: point_to_bytes(&public_key),
            public_share: point_to_bytes(&(ProjectivePoint::GENERATOR * secret_share)),
            chain_code,
        };
        self.candidate = Some(Candidate {
            secret_share,
            public_key,
            public_shares,
            chain_code,
            zero_seeds,
        });
        let message = RoundMessage::broadcast(sid, me, 4, &payload)?;
        Ok(self.core.emit(4, vec![message]))
    }

    fn after_round4(&mut self, batch: BTreeMap<PartyIndex, RoundMessage>) -> Result<KeyShare> {
        let me = self.core.me();
        let decoded: BTreeMap<PartyIndex, ConsistencyRound> = decode_batch(&batch)?;
        let candidate = self
            .candidate
            .as_ref()
            .ok_or_else(|| Error::SessionClosed("DKG output already released".into()))?;
        check_consistency(&decoded, &candidate.public_key, &candidate.public_shares, &candidate.chain_code)?;

        let secrets = self.secrets()?;
        let mut ot_public_keys = self.ot_public_keys.clone();
        ot_public_keys.insert(me, point_to_bytes(&secrets.ot_key.public()));
        let key_share = KeyShare {
            party_index: me,
            parameters: self.core.context.parameters(),
            secret_share: candidate.secret_share,
            public_key: point_to_bytes(&candidate.public_key),
            public_shares: candidate
                .public_shares
                .iter()
                .map(|(j, p)| (*j, point_to_bytes(p)))
                .collect(),
            chain_code: candidate.chain_code,
            depth: 0,
            child_number: 0,
            parent_fingerprint: [0u8; 4],
            dkg_session_id: self.session_id(),
            zero_seeds: candidate.zero_seeds.clone(),
            ot_secret: *secrets.ot_key.secret(),
            ot_public_keys,
        };

        self.core.complete();
        self.secrets = None;
        self.candidate = None;
        info!(
            party_index = me,
            session_id = %self.core.context.session_hex(),
            public_key = %hex::encode(&key_share.public_key),
            "DKG completed successfully"
        );
        Ok(key_share)
    }

    fn abort(&mut self, error: &Error) {
        self.core.abort(error);
        self.secrets = None;
        self.candidate = None;
    }
}

/// Round 4 check shared with resharing: every peer reports the same group
/// key and chain code, and the public share computed locally for it
pub(crate) fn check_consistency(
    reports: &BTreeMap<PartyIndex, ConsistencyRound>,
    public_key: &ProjectivePoint,
    public_shares: &BTreeMap<PartyIndex, ProjectivePoint>,
    chain_code: &[u8; 32],
) -> Result<()> {
    let public_key = point_to_bytes(public_key);
    for (&party, report) in reports {
        if report.public_key != public_key {
            return Err(Error::consistency(Some(party), "group public key mismatch"));
        }
        if &report.chain_code != chain_code {
            return Err(Error::consistency(Some(party), "chain code mismatch"));
        }
        let expected = public_shares
            .get(&party)
            .map(point_to_bytes)
            .ok_or_else(|| Error::consistency(Some(party), "unknown party"))?;
        if report.public_share != expected {
            return Err(Error::consistency(Some(party), "public share mismatch"));
        }
    }
    Ok(())
}

impl PhaseEngine for DkgEngine {
    type Output = KeyShare;

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
        let parameters = self.core.context.parameters();
        info!(
            party_index = me,
            share_count = parameters.share_count,
            threshold = parameters.threshold,
            session_id = %self.core.context.session_hex(),
            "Starting DKG"
        );

        let mut chain_code_contribution = [0u8; 32];
        OsRng.fill_bytes(&mut chain_code_contribution);
        let dealing = Dealing::new(
            Polynomial::random(parameters.threshold),
            &sid,
            me,
            &chain_code_contribution,
        );

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
        let payload = DkgRound1 {
            commitment: dealing.commitment,
            seed_commitments,
            channel_key: channel.public_bytes(),
        };
        let message = RoundMessage::broadcast(sid, me, 1, &payload)?;

        self.feldman.insert(me, dealing.feldman.clone());
        self.chain_code_contributions.insert(me, chain_code_contribution);
        self.secrets = Some(DkgSecrets {
            dealing,
            chain_code_contribution,
            seed_contributions,
            ot_key: OtSenderKey::generate(),
            channel,
        });
        Ok(self.core.emit(1, vec![message]))
    }

    fn advance(&mut self, incoming: Vec<RoundMessage>) -> Result<Step<KeyShare>> {
        let phase = self.core.waiting_phase()?;
        let senders = self.core.participants.clone();
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
            self.abort(error);
        }
        result
    }

    fn cancel(&mut self) {
        self.core.cancel();
        self.secrets = None;
        self.candidate = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpc::LocalNetwork;
    use crate::primitives::polynomial::interpolate_at_zero;
    use crate::types::Parameters;

    fn run_dkg(threshold: u16, share_count: u16) -> Vec<KeyShare> {
        let params = Parameters::new(threshold, share_count).unwrap();
        let sid = SessionContext::random_session_id();
        let engines = params
            .parties()
            .map(|i| DkgEngine::new(SessionContext::new(sid, params, i).unwrap()).unwrap())
            .collect();
        LocalNetwork::new(engines).run().unwrap()
    }

    #[test]
    fn threshold_subsets_reconstruct_group_key() {
        for (t, n) in [(1u16, 1u16), (2, 2), (2, 3), (3, 5)] {
            let shares = run_dkg(t, n);
            let public_key = shares[0].public_key.clone();
            for share in &shares {
                assert_eq!(share.public_key, public_key);
                assert_eq!(share.public_shares, shares[0].public_shares);
                assert_eq!(share.chain_code, shares[0].chain_code);
                share.validate().unwrap();
            }

            let (t, n) = (usize::from(t), usize::from(n));
            for subset in [&shares[..t], &shares[n - t..]] {
                let points: Vec<_> = subset
                    .iter()
                    .map(|s| (s.party_index, s.secret_share))
                    .collect();
                let secret = interpolate_at_zero(&points).unwrap();
                assert_eq!(point_to_bytes(&(ProjectivePoint::GENERATOR * secret)), public_key);
            }
        }
    }

    #[test]
    fn pairwise_zero_seeds_agree() {
        let shares = run_dkg(2, 3);
        for a in &shares {
            for b in &shares {
                if a.party_index != b.party_index {
                    assert_eq!(a.zero_seeds[&b.party_index], b.zero_seeds[&a.party_index]);
                }
            }
            assert_eq!(a.ot_public_keys.len(), 3);
        }
    }

    #[test]
    fn consistency_mismatch_names_the_party() {
        let public_key = ProjectivePoint::GENERATOR;
        let shares: BTreeMap<PartyIndex, ProjectivePoint> = [(1, public_key), (2, public_key.double())].into();
        let mut reports = BTreeMap::new();
        reports.insert(
            2,
            ConsistencyRound {
                public_key: point_to_bytes(&public_key),
                public_share: point_to_bytes(&public_key),
                chain_code: [0u8; 32],
            },
        );
        let err = check_consistency(&reports, &public_key, &shares, &[0u8; 32]).unwrap_err();
        assert_eq!(err.culprit(), Some(2));
        assert!(err.is_fatal());
    }

    #[test]
    fn cancel_wipes_and_closes() {
        let params = Parameters::new(2, 2).unwrap();
        let ctx = SessionContext::new(SessionContext::random_session_id(), params, 1).unwrap();
        let mut engine = DkgEngine::new(ctx).unwrap();
        engine.start().unwrap();
        engine.cancel();
        assert_eq!(engine.state(), EngineState::Aborted);
        assert!(engine.secrets.is_none());
        assert!(matches!(engine.advance(vec![]), Err(Error::SessionClosed(_))));
    }
}
