//! Schnorr proof of knowledge of a discrete logarithm
//!
//! Non-interactive through a Merlin transcript that binds the session id
//! and the prover's index, so a proof cannot be replayed by another party
//! or in another session.

use k256::{elliptic_curve::Field, ProjectivePoint, Scalar};
use merlin::Transcript;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::types::{
    nonzero_point_from_bytes, point_to_bytes, reduce_bytes, scalar_from_bytes, scalar_to_bytes,
    PartyIndex, SessionId,
};

/// Proof that the prover knows `x` with `X = x·G`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DLogProof {
    /// `K = k·G`
    pub commitment: Vec<u8>,
    /// `z = k + c·x`
    pub response: [u8; 32],
}

fn challenge(
    label: &'static [u8],
    session_id: &SessionId,
    prover: PartyIndex,
    statement: &ProjectivePoint,
    commitment: &[u8],
) -> Scalar {
    let mut transcript = Transcript::new(b"dkls23-engine/dlog");
    transcript.append_message(b"label", label);
    transcript.append_message(b"session", session_id);
    transcript.append_message(b"prover", &prover.to_be_bytes());
    transcript.append_message(b"statement", &point_to_bytes(statement));
    transcript.append_message(b"commitment", commitment);
    let mut bytes = [0u8; 32];
    transcript.challenge_bytes(b"challenge", &mut bytes);
    reduce_bytes(&bytes)
}

impl DLogProof {
    /// Prove knowledge of `secret` for `secret·G`
    pub fn prove(
        label: &'static [u8],
        session_id: &SessionId,
        prover: PartyIndex,
        secret: &Scalar,
    ) -> Self {
        let statement = ProjectivePoint::GENERATOR * secret;
        let k = Scalar::random(&mut OsRng);
        let commitment = point_to_bytes(&(ProjectivePoint::GENERATOR * k));
        let c = challenge(label, session_id, prover, &statement, &commitment);
        let response = k + c * secret;
        Self {
            commitment,
            response: scalar_to_bytes(&response),
        }
    }

    /// Verify against `statement`; malformed proofs are simply invalid
    pub fn verify(
        &self,
        label: &'static [u8],
        session_id: &SessionId,
        prover: PartyIndex,
        statement: &ProjectivePoint,
    ) -> bool {
        let (Some(k_point), Some(z)) = (
            nonzero_point_from_bytes(&self.commitment),
            scalar_from_bytes(&self.response),
        ) else {
            return false;
        };
        let c = challenge(label, session_id, prover, statement, &self.commitment);
        ProjectivePoint::GENERATOR * z == k_point + *statement * c
    }
}
