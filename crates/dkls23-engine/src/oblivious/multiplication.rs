//! Two-party multiplication (multiplicative-to-additive)
//!
//! Gilboa's multiplication over base OT with the randomized input encoding
//! of DKLs19 (section 5). Both sides derive a public gadget vector `g`
//! from the session; the receiver samples `OT_BATCH` random choice bits
//! `β` and its input is `χ = Σ β_k·g_k`. With `KAPPA + 2·STATISTICAL_SECURITY`
//! bits, `χ` is statistically independent of any single choice bit, so a
//! sender that corrupts one of its messages and watches whether the
//! product comes out right learns nothing about `χ`.
//!
//! The sender prepares two masked messages per choice bit and input
//! `α_m`. Afterwards the sender holds `c_m` and the receiver `d_m` with
//! `c_m + d_m = α_m·χ`.
//!
//! Flow:
//! 1. receiver: [`MulReceiverKeep::start`] → [`MulReceiverMessage`]
//! 2. sender: [`respond`] → its shares and a [`MulSenderMessage`]
//! 3. receiver: [`MulReceiverKeep::finish`] → its shares

use k256::{elliptic_curve::Field, ProjectivePoint, Scalar};
use rand::{rngs::OsRng, Rng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroize;

use super::base_ot::{OtSenderKey, ReceiverChoices, OT_BATCH};
use crate::primitives::hash::hash_parts;
use crate::types::{
    point_from_bytes, point_to_bytes, reduce_bytes, scalar_from_bytes, scalar_to_bytes,
};

/// Rejected multiplication message
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("two-party multiplication failed: {0}")]
pub struct MulError(pub &'static str);

/// Receiver's OT choice points, one per bit of the encoding of `χ`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MulReceiverMessage {
    pub points: Vec<Vec<u8>>,
}

/// Sender's masked messages, `OT_BATCH × inputs` pairs in bit-major order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MulSenderMessage {
    pub zero: Vec<[u8; 32]>,
    pub one: Vec<[u8; 32]>,
}

/// What the receiver keeps between its two steps
pub struct MulReceiverKeep {
    chi: Scalar,
    choices: ReceiverChoices,
}

impl MulReceiverKeep {
    /// Sample the choice bits; `χ` is their inner product with the gadget
    pub fn start(session: &[u8], sender_public: &ProjectivePoint) -> (Self, MulReceiverMessage) {
        let mut bits: Vec<bool> = (0..OT_BATCH).map(|_| OsRng.gen()).collect();
        let chi = gadget(session)
            .iter()
            .zip(&bits)
            .filter(|(_, bit)| **bit)
            .fold(Scalar::ZERO, |acc, (g, _)| acc + g);
        let (choices, points) = ReceiverChoices::choose(sender_public, &bits);
        bits.zeroize();
        let message = MulReceiverMessage {
            points: points.iter().map(point_to_bytes).collect(),
        };
        (Self { chi, choices }, message)
    }

    pub fn chi(&self) -> &Scalar {
        &self.chi
    }

    /// Unmask the chosen messages; one share per sender input
    pub fn finish(
        &self,
        session: &[u8],
        sender_public: &ProjectivePoint,
        inputs: usize,
        message: &MulSenderMessage,
    ) -> Result<Vec<Scalar>, MulError> {
        if message.zero.len() != OT_BATCH * inputs || message.one.len() != OT_BATCH * inputs {
            return Err(MulError("wrong number of masked messages"));
        }
        let keys = self.choices.chosen_keys(session, sender_public);
        let mut shares = vec![Scalar::ZERO; inputs];
        for (k, (key, choice)) in keys.iter().zip(self.choices.choices()).enumerate() {
            for (m, share) in shares.iter_mut().enumerate() {
                let masked = if *choice {
                    &message.one[k * inputs + m]
                } else {
                    &message.zero[k * inputs + m]
                };
                let masked =
                    scalar_from_bytes(masked).ok_or(MulError("non-canonical masked scalar"))?;
                *share += masked - pad(key, m);
            }
        }
        Ok(shares)
    }
}

impl Drop for MulReceiverKeep {
    fn drop(&mut self) {
        self.chi.zeroize();
    }
}

/// Sender step: mask every input for every choice bit of the receiver.
///
/// Returns the sender's additive shares, one per input.
pub fn respond(
    sender: &OtSenderKey,
    session: &[u8],
    inputs: &[Scalar],
    message: &MulReceiverMessage,
) -> Result<(Vec<Scalar>, MulSenderMessage), MulError> {
    if message.points.len() != OT_BATCH {
        return Err(MulError("wrong number of OT points"));
    }
    let points = message
        .points
        .iter()
        .map(|bytes| point_from_bytes(bytes))
        .collect::<Option<Vec<_>>>()
        .ok_or(MulError("invalid OT point"))?;

    let keys = sender.transfer_keys(session, &points);
    let mut shares = vec![Scalar::ZERO; inputs.len()];
    let mut zero = Vec::with_capacity(OT_BATCH * inputs.len());
    let mut one = Vec::with_capacity(OT_BATCH * inputs.len());
    for ((key0, key1), g) in keys.iter().zip(gadget(session)) {
        for (m, input) in inputs.iter().enumerate() {
            let mut t = Scalar::random(&mut OsRng);
            zero.push(scalar_to_bytes(&(t + pad(key0, m))));
            one.push(scalar_to_bytes(&(t + *input * g + pad(key1, m))));
            shares[m] -= t;
            t.zeroize();
        }
    }
    Ok((shares, MulSenderMessage { zero, one }))
}

fn pad(key: &[u8; 32], input: usize) -> Scalar {
    reduce_bytes(&hash_parts(
        b"dkls23-engine/mul-pad",
        &[key, &(input as u32).to_be_bytes()],
    ))
}

/// Public gadget vector of a multiplication session
fn gadget(session: &[u8]) -> Vec<Scalar> {
    (0..OT_BATCH)
        .map(|k| {
            reduce_bytes(&hash_parts(
                b"dkls23-engine/mul-gadget",
                &[session, &(k as u32).to_be_bytes()],
            ))
        })
        .collect()
}
