//! Immutable session identity

use serde::{Deserialize, Serialize};

use crate::types::{Curve, Parameters, PartyIndex, SessionId};
use crate::{Error, Result};

/// Session id, parameters and the index of the local party
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    session_id: SessionId,
    parameters: Parameters,
    party_index: PartyIndex,
    curve: Curve,
}

impl SessionContext {
    /// Create a validated context
    pub fn new(session_id: SessionId, parameters: Parameters, party_index: PartyIndex) -> Result<Self> {
        parameters.validate()?;
        if !parameters.contains(party_index) {
            return Err(Error::InvalidParameters(format!(
                "party index {party_index} outside 1..={}",
                parameters.share_count
            )));
        }
        Ok(Self {
            session_id,
            parameters,
            party_index,
            curve: Curve::Secp256k1,
        })
    }

    /// Fresh random session id
    pub fn random_session_id() -> SessionId {
        rand::random()
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn parameters(&self) -> Parameters {
        self.parameters
    }

    pub fn party_index(&self) -> PartyIndex {
        self.party_index
    }

    pub fn curve(&self) -> Curve {
        self.curve
    }

    /// Hex session id for logs
    pub fn session_hex(&self) -> String {
        hex::encode(self.session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_validates_index() {
        let params = Parameters::new(2, 3).unwrap();
        assert!(SessionContext::new([0u8; 32], params, 3).is_ok());
        assert!(matches!(
            SessionContext::new([0u8; 32], params, 0),
            Err(Error::InvalidParameters(_))
        ));
        assert!(SessionContext::new([0u8; 32], params, 4).is_err());
    }

    #[test]
    fn context_rejects_bad_parameters() {
        let params = Parameters {
            threshold: 4,
            share_count: 3,
        };
        assert!(SessionContext::new([0u8; 32], params, 1).is_err());
    }

    #[test]
    fn random_session_ids_differ() {
        assert_ne!(
            SessionContext::random_session_id(),
            SessionContext::random_session_id()
        );
    }
}
