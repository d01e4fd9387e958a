//! Key refresh protocol
//!
//! Refreshes the shares without changing the public key, limiting the
//! window in which a leaked share is useful.

use super::resharing::{Mode, Resharing};
use crate::key_share::KeyShare;
use crate::session::{EngineState, PhaseEngine, RoundMessage, SessionContext, Step};
use crate::types::PartyIndex;
use crate::{Error, Result};

/// Proactive refresh for one holder of a key.
///
/// Every holder of the key runs the engine; `dealers` (at least the
/// threshold of them) deal zero-constant polynomials.
pub struct ReKeyEngine {
    inner: Resharing,
}

impl ReKeyEngine {
    pub fn new(context: SessionContext, share: KeyShare, dealers: &[PartyIndex]) -> Result<Self> {
        let threshold = share.parameters.threshold;
        if threshold < 2 {
            return Err(Error::InvalidParameters(
                "a threshold-1 sharing cannot be refreshed".into(),
            ));
        }
        if dealers.len() < usize::from(threshold) {
            return Err(Error::InsufficientParticipants {
                required: usize::from(threshold),
                actual: dealers.len(),
            });
        }
        let inner = Resharing::new(context, share, dealers.to_vec(), Mode::Refresh, "Key refresh")?;
        Ok(Self { inner })
    }

    /// Parties dealing zero-constant polynomials
    pub fn dealers(&self) -> &[PartyIndex] {
        self.inner.dealers()
    }
}

impl PhaseEngine for ReKeyEngine {
    type Output = KeyShare;

    fn context(&self) -> &SessionContext {
        self.inner.context()
    }

    fn state(&self) -> EngineState {
        self.inner.state()
    }

    fn expected_senders(&self) -> Vec<PartyIndex> {
        self.inner.expected_senders()
    }

    fn start(&mut self) -> Result<Vec<RoundMessage>> {
        self.inner.start()
    }

    fn advance(&mut self, incoming: Vec<RoundMessage>) -> Result<Step<KeyShare>> {
        self.inner.advance(incoming)
    }

    fn cancel(&mut self) {
        self.inner.cancel()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keygen::mock_keygen;
    use crate::mpc::LocalNetwork;
    use crate::primitives::polynomial::interpolate_at_zero;
    use crate::types::Parameters;
    use k256::ProjectivePoint;
    use rand::rngs::OsRng;

    fn refresh(shares: Vec<KeyShare>, dealers: &[PartyIndex]) -> Vec<KeyShare> {
        let sid = SessionContext::random_session_id();
        let engines = shares
            .into_iter()
            .map(|share| {
                let ctx = SessionContext::new(sid, share.parameters, share.party_index).unwrap();
                ReKeyEngine::new(ctx, share, dealers).unwrap()
            })
            .collect();
        LocalNetwork::new(engines).run().unwrap()
    }

    #[test]
    fn refresh_keeps_secret_and_changes_shares() {
        let params = Parameters::new(2, 3).unwrap();
        let before = mock_keygen(&mut OsRng, params).unwrap();
        let secret = interpolate_at_zero(&[
            (1, before[0].secret_share),
            (2, before[1].secret_share),
        ])
        .unwrap();

        let after = refresh(before.clone(), &[1, 3]);
        for (old, new) in before.iter().zip(&after) {
            assert_eq!(old.public_key, new.public_key);
            assert_ne!(old.secret_share, new.secret_share);
            assert_ne!(old.public_shares[&old.party_index], new.public_shares[&new.party_index]);
            new.validate().unwrap();
        }
        let refreshed = interpolate_at_zero(&[(2, after[1].secret_share), (3, after[2].secret_share)]).unwrap();
        assert_eq!(refreshed, secret);
    }

    #[test]
    fn refresh_rotates_ot_keys_and_zero_seeds() {
        let params = Parameters::new(2, 3).unwrap();
        let before = mock_keygen(&mut OsRng, params).unwrap();
        let after = refresh(before.clone(), &[1, 2]);

        for (old, new) in before.iter().zip(&after) {
            let me = new.party_index;
            assert_ne!(old.ot_secret, new.ot_secret);
            assert_eq!(new.ot_public_key(me).unwrap(), ProjectivePoint::GENERATOR * new.ot_secret);
            // the pre-refresh OT secret no longer opens this party's transfers
            assert_ne!(new.ot_public_key(me).unwrap(), ProjectivePoint::GENERATOR * old.ot_secret);
            assert_eq!(new.zero_seeds.len(), 2);
            for (peer, seed) in &new.zero_seeds {
                assert_ne!(&old.zero_seeds[peer], seed);
            }
        }
        for a in &after {
            for b in after.iter().filter(|b| b.party_index != a.party_index) {
                assert_eq!(a.zero_seeds[&b.party_index], b.zero_seeds[&a.party_index]);
                assert_eq!(a.ot_public_keys[&b.party_index], b.ot_public_keys[&b.party_index]);
            }
        }
    }

    #[test]
    fn dealer_set_is_checked() {
        let params = Parameters::new(2, 3).unwrap();
        let shares = mock_keygen(&mut OsRng, params).unwrap();
        let ctx = SessionContext::new([5u8; 32], params, 1).unwrap();
        assert!(matches!(
            ReKeyEngine::new(ctx.clone(), shares[0].clone(), &[1]),
            Err(Error::InsufficientParticipants { required: 2, actual: 1 })
        ));
        assert!(matches!(
            ReKeyEngine::new(ctx.clone(), shares[0].clone(), &[1, 1]),
            Err(Error::InvalidParameters(_))
        ));
        assert!(matches!(
            ReKeyEngine::new(ctx, shares[0].clone(), &[1, 4]),
            Err(Error::InvalidParameters(_))
        ));
    }

    #[test]
    fn threshold_one_is_refused() {
        let params = Parameters::new(1, 2).unwrap();
        let shares = mock_keygen(&mut OsRng, params).unwrap();
        let ctx = SessionContext::new([5u8; 32], params, 1).unwrap();
        assert!(matches!(
            ReKeyEngine::new(ctx, shares[0].clone(), &[1, 2]),
            Err(Error::InvalidParameters(_))
        ));
    }
}
