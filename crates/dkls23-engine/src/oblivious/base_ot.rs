//! Base OT
//!
//! Simplest OT from https://eprint.iacr.org/2015/267.pdf over secp256k1.
//! The sender key `A = a·G` is generated once during key generation and
//! published with a proof of knowledge; every batch is separated by its
//! session id and every OT by its position in the batch.

use k256::{elliptic_curve::Field, ProjectivePoint, Scalar};
use rand::rngs::OsRng;
use zeroize::Zeroize;

use crate::primitives::hash::hash_parts;
use crate::types::point_to_bytes;

/// Computational security parameter, in bits
pub const KAPPA: usize = 256;

/// Statistical security parameter, in bits
pub const STATISTICAL_SECURITY: usize = 80;

/// Number of OTs in a batch, one per bit of the encoded multiplication input
pub const OT_BATCH: usize = KAPPA + 2 * STATISTICAL_SECURITY;

/// Long-lived OT sender key
#[derive(Clone)]
pub struct OtSenderKey {
    secret: Scalar,
    public: ProjectivePoint,
    // a·A, reused for every key-pair derivation
    shift: ProjectivePoint,
}

impl OtSenderKey {
    pub fn generate() -> Self {
        Self::from_secret(Scalar::random(&mut OsRng))
    }

    pub fn from_secret(secret: Scalar) -> Self {
        let public = ProjectivePoint::GENERATOR * secret;
        Self {
            secret,
            public,
            shift: public * secret,
        }
    }

    pub fn secret(&self) -> &Scalar {
        &self.secret
    }

    pub fn public(&self) -> ProjectivePoint {
        self.public
    }

    /// Both transfer keys for every receiver point
    pub fn transfer_keys(
        &self,
        session: &[u8],
        receiver_points: &[ProjectivePoint],
    ) -> Vec<([u8; 32], [u8; 32])> {
        receiver_points
            .iter()
            .enumerate()
            .map(|(k, point)| {
                let zero = *point * self.secret;
                let one = zero - self.shift;
                (ot_key(session, k, &zero), ot_key(session, k, &one))
            })
            .collect()
    }
}

impl Drop for OtSenderKey {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

/// Receiver side of a batch: blinding scalars for each choice
pub struct ReceiverChoices {
    blinds: Vec<Scalar>,
    choices: Vec<bool>,
}

impl ReceiverChoices {
    /// Choose one message of each pair; returns the points sent to the sender
    pub fn choose(sender_public: &ProjectivePoint, choices: &[bool]) -> (Self, Vec<ProjectivePoint>) {
        let mut blinds = Vec::with_capacity(choices.len());
        let mut points = Vec::with_capacity(choices.len());
        for &choice in choices {
            let blind = Scalar::random(&mut OsRng);
            let mut point = ProjectivePoint::GENERATOR * blind;
            if choice {
                point += sender_public;
            }
            blinds.push(blind);
            points.push(point);
        }
        (
            Self {
                blinds,
                choices: choices.to_vec(),
            },
            points,
        )
    }

    pub fn choices(&self) -> &[bool] {
        &self.choices
    }

    /// Keys of the chosen messages
    pub fn chosen_keys(&self, session: &[u8], sender_public: &ProjectivePoint) -> Vec<[u8; 32]> {
        self.blinds
            .iter()
            .enumerate()
            .map(|(k, blind)| ot_key(session, k, &(*sender_public * blind)))
            .collect()
    }
}

impl Drop for ReceiverChoices {
    fn drop(&mut self) {
        self.blinds.zeroize();
        self.choices.zeroize();
    }
}

fn ot_key(session: &[u8], position: usize, point: &ProjectivePoint) -> [u8; 32] {
    hash_parts(
        b"dkls23-engine/base-ot",
        &[session, &(position as u32).to_be_bytes(), &point_to_bytes(point)],
    )
}
