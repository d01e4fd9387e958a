//! Interactive hardened derivation
//!
//! Every holder deals a fresh random polynomial to the others, like in
//! key generation. The child secret is the parent secret plus the sum of
//! the constant terms, and the child chain code is
//! `HMAC-SHA512(chain_code, 0x00 ‖ ser_P(Δ) ‖ ser32(index))` (right half)
//! where `Δ` is the sum of the constant-term commitments.

use super::ChildNumber;
use crate::key_share::KeyShare;
use crate::keygen::resharing::{Mode, Resharing};
use crate::session::{EngineState, PhaseEngine, RoundMessage, SessionContext, Step};
use crate::types::PartyIndex;
use crate::{Error, Result};

/// Hardened derivation for one holder of a key
pub struct HardenedDerivationEngine {
    inner: Resharing,
    child: ChildNumber,
}

impl HardenedDerivationEngine {
    /// `participants` must be every holder of the key
    pub fn new(
        context: SessionContext,
        share: KeyShare,
        child: ChildNumber,
        participants: &[PartyIndex],
    ) -> Result<Self> {
        if !child.is_hardened() {
            return Err(Error::Derivation(format!(
                "child {child} is not hardened"
            )));
        }
        let parameters = share.parameters;
        let required = usize::from(parameters.share_count);
        let complete = participants.len() == required
            && parameters.parties().all(|p| participants.contains(&p));
        if !complete {
            return Err(Error::IncompleteDerivationQuorum {
                required,
                actual: participants.len(),
            });
        }
        let inner = Resharing::new(
            context,
            share,
            participants.to_vec(),
            Mode::Hardened { index: child.raw() },
            "Hardened derivation",
        )?;
        Ok(Self { inner, child })
    }

    pub fn child(&self) -> ChildNumber {
        self.child
    }
}

impl PhaseEngine for HardenedDerivationEngine {
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
    use crate::types::{point_to_bytes, Parameters};
    use k256::ProjectivePoint;
    use rand::rngs::OsRng;

    #[test]
    fn all_holders_derive_the_same_child() {
        let params = Parameters::new(2, 3).unwrap();
        let parents = mock_keygen(&mut OsRng, params).unwrap();
        let child_number = ChildNumber::hardened(3).unwrap();
        let sid = SessionContext::random_session_id();
        let engines = parents
            .iter()
            .map(|share| {
                let ctx = SessionContext::new(sid, params, share.party_index).unwrap();
                HardenedDerivationEngine::new(ctx, share.clone(), child_number, &[1, 2, 3]).unwrap()
            })
            .collect();
        let children = LocalNetwork::new(engines).run().unwrap();

        assert_ne!(children[0].public_key, parents[0].public_key);
        for child in &children {
            child.validate().unwrap();
            assert_eq!(child.public_key, children[0].public_key);
            assert_eq!(child.chain_code, children[0].chain_code);
            assert_eq!(child.depth, 1);
            assert_eq!(child.child_number, 0x8000_0003);
            assert_eq!(child.parent_fingerprint, parents[0].fingerprint());
            assert_ne!(child.ot_public_keys, parents[0].ot_public_keys);
        }
        let secret = interpolate_at_zero(&[(2, children[1].secret_share), (3, children[2].secret_share)]).unwrap();
        assert_eq!(point_to_bytes(&(ProjectivePoint::GENERATOR * secret)), children[0].public_key);
    }

    #[test]
    fn quorum_and_index_are_checked() {
        let params = Parameters::new(2, 3).unwrap();
        let shares = mock_keygen(&mut OsRng, params).unwrap();
        let ctx = SessionContext::new([9u8; 32], params, 1).unwrap();
        assert!(matches!(
            HardenedDerivationEngine::new(ctx.clone(), shares[0].clone(), ChildNumber::hardened(0).unwrap(), &[1, 2]),
            Err(Error::IncompleteDerivationQuorum { required: 3, actual: 2 })
        ));
        assert!(matches!(
            HardenedDerivationEngine::new(ctx, shares[0].clone(), ChildNumber::normal(0).unwrap(), &[1, 2, 3]),
            Err(Error::Derivation(_))
        ));
    }
}
