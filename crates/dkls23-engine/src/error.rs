//! Error types for DKLs23 engine operations

use crate::types::PartyIndex;
use thiserror::Error;

/// Result type alias for DKLs23 engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving a DKLs23 session
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Malformed session setup
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// A message tagged for a phase other than the one the engine is in,
    /// or a second message from the same sender for the same phase
    #[error("Unexpected phase from party {from}: expected {expected}, received {received}")]
    UnexpectedPhase {
        expected: u8,
        received: u8,
        from: PartyIndex,
    },

    /// The incoming set is missing messages from some expected senders
    #[error("Incomplete round {phase}: missing messages from {missing:?}")]
    IncompleteRound { phase: u8, missing: Vec<PartyIndex> },

    /// Envelope does not belong to this session or this party
    #[error("Misrouted message from party {from}: {reason}")]
    Misrouted { from: PartyIndex, reason: String },

    /// Payload of a well-routed message could not be decoded
    #[error("Malformed payload from party {party}: {reason}")]
    MalformedPayload { party: PartyIndex, reason: String },

    /// A commitment opening, proof or share check failed
    #[error("Proof verification failed for party {party}: {reason}")]
    ProofVerificationFailed { party: PartyIndex, reason: String },

    /// Parties disagree on derived public values
    #[error("Consistency check failed{}: {reason}", .party.map(|p| format!(" (party {p})")).unwrap_or_default())]
    ConsistencyCheckFailed {
        party: Option<PartyIndex>,
        reason: String,
    },

    /// Not enough parties take part in the operation
    #[error("Insufficient participants: required {required}, got {actual}")]
    InsufficientParticipants { required: usize, actual: usize },

    /// Hardened derivation needs every holder of the key
    #[error("Incomplete derivation quorum: required {required}, got {actual}")]
    IncompleteDerivationQuorum { required: usize, actual: usize },

    /// A cryptographic primitive rejected its input
    #[error("Primitive failure in {operation}")]
    PrimitiveFailure { operation: String },

    /// Session identifier was already used by this party
    #[error("Session id already used: {0}")]
    SessionReused(String),

    /// Session not found
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// The engine reached a terminal state and accepts no more input
    #[error("Session closed: {0}")]
    SessionClosed(String),

    /// Key derivation error
    #[error("Key derivation error: {0}")]
    Derivation(String),

    /// No key share stored under the requested id
    #[error("Key share not found: {0}")]
    KeyShareNotFound(String),

    /// Another writer holds the key share
    #[error("Key share {0} is locked by another writer")]
    StoreBusy(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Timeout waiting for messages
    #[error("Timeout waiting for {0}")]
    Timeout(String),

    /// Transport failure
    #[error("Transport error: {0}")]
    Transport(String),
}

impl Error {
    pub(crate) fn primitive(operation: impl Into<String>) -> Self {
        Error::PrimitiveFailure {
            operation: operation.into(),
        }
    }

    pub(crate) fn proof(party: PartyIndex, reason: impl Into<String>) -> Self {
        Error::ProofVerificationFailed {
            party,
            reason: reason.into(),
        }
    }

    pub(crate) fn consistency(party: Option<PartyIndex>, reason: impl Into<String>) -> Self {
        Error::ConsistencyCheckFailed {
            party,
            reason: reason.into(),
        }
    }

    /// Whether the error aborts the session it occurred in.
    ///
    /// Routing and completeness errors leave the engine untouched so the
    /// transport can retry with a corrected message set.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::MalformedPayload { .. }
                | Error::ProofVerificationFailed { .. }
                | Error::ConsistencyCheckFailed { .. }
                | Error::PrimitiveFailure { .. }
        )
    }

    /// The party a failure can be attributed to, if any
    pub fn culprit(&self) -> Option<PartyIndex> {
        match self {
            Error::MalformedPayload { party, .. } | Error::ProofVerificationFailed { party, .. } => {
                Some(*party)
            }
            Error::ConsistencyCheckFailed { party, .. } => *party,
            Error::UnexpectedPhase { from, .. } | Error::Misrouted { from, .. } => Some(*from),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors_are_cryptographic() {
        assert!(Error::proof(2, "bad proof").is_fatal());
        assert!(Error::consistency(None, "mismatch").is_fatal());
        assert!(Error::primitive("ot").is_fatal());
        assert!(!Error::UnexpectedPhase {
            expected: 2,
            received: 1,
            from: 3
        }
        .is_fatal());
        assert!(!Error::IncompleteRound {
            phase: 1,
            missing: vec![2]
        }
        .is_fatal());
    }

    #[test]
    fn culprit_is_reported() {
        assert_eq!(Error::proof(4, "x").culprit(), Some(4));
        assert_eq!(Error::consistency(None, "x").culprit(), None);
        assert_eq!(
            Error::InsufficientParticipants {
                required: 2,
                actual: 1
            }
            .culprit(),
            None
        );
    }

    #[test]
    fn consistency_message_mentions_party() {
        let e = Error::consistency(Some(3), "public share mismatch");
        assert_eq!(
            e.to_string(),
            "Consistency check failed (party 3): public share mismatch"
        );
    }
}
