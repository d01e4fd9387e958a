//! Confidential point-to-point payloads
//!
//! Secret shares travel through the (untrusted) transport sealed with
//! ChaCha20-Poly1305 under a key agreed with X25519. Each party publishes
//! its channel public key in the first broadcast round of a session; the
//! symmetric key is bound to the session and to the ordered pair of
//! parties, so every direction of every pair uses its own key.

use aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey, ReusableSecret};
use zeroize::Zeroize;

use super::hash::hash_parts;
use crate::types::{PartyIndex, SessionId};

/// Per-session X25519 key
pub struct ChannelKey {
    secret: ReusableSecret,
    public: PublicKey,
}

/// Encrypted payload with its nonce
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedBox {
    pub nonce: [u8; 12],
    pub ciphertext: Vec<u8>,
}

impl ChannelKey {
    pub fn generate() -> Self {
        let secret = ReusableSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn public_bytes(&self) -> [u8; 32] {
        *self.public.as_bytes()
    }

    fn symmetric_key(
        &self,
        peer: &[u8; 32],
        session_id: &SessionId,
        sender: PartyIndex,
        receiver: PartyIndex,
    ) -> [u8; 32] {
        let shared = self.secret.diffie_hellman(&PublicKey::from(*peer));
        hash_parts(
            b"dkls23-engine/channel",
            &[
                shared.as_bytes(),
                session_id,
                &sender.to_be_bytes(),
                &receiver.to_be_bytes(),
            ],
        )
    }

    /// Encrypt `plaintext` from `sender` (us) to `receiver`
    pub fn seal(
        &self,
        peer: &[u8; 32],
        session_id: &SessionId,
        sender: PartyIndex,
        receiver: PartyIndex,
        plaintext: &[u8],
    ) -> Option<SealedBox> {
        let mut key = self.symmetric_key(peer, session_id, sender, receiver);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        key.zeroize();

        let mut nonce = [0u8; 12];
        OsRng.fill_bytes(&mut nonce);
        let aad = associated_data(session_id, sender, receiver);
        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: &aad,
                },
            )
            .ok()?;
        Some(SealedBox { nonce, ciphertext })
    }

    /// Decrypt a box sent by `sender` to `receiver` (us)
    pub fn open(
        &self,
        peer: &[u8; 32],
        session_id: &SessionId,
        sender: PartyIndex,
        receiver: PartyIndex,
        sealed: &SealedBox,
    ) -> Option<Vec<u8>> {
        let mut key = self.symmetric_key(peer, session_id, sender, receiver);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        key.zeroize();

        let aad = associated_data(session_id, sender, receiver);
        cipher
            .decrypt(
                Nonce::from_slice(&sealed.nonce),
                Payload {
                    msg: &sealed.ciphertext,
                    aad: &aad,
                },
            )
            .ok()
    }
}

fn associated_data(session_id: &SessionId, sender: PartyIndex, receiver: PartyIndex) -> Vec<u8> {
    let mut aad = session_id.to_vec();
    aad.extend_from_slice(&sender.to_be_bytes());
    aad.extend_from_slice(&receiver.to_be_bytes());
    aad
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sealed_box_round_trip() {
        let alice = ChannelKey::generate();
        let bob = ChannelKey::generate();
        let sid = [3u8; 32];

        let sealed = alice
            .seal(&bob.public_bytes(), &sid, 1, 2, b"fragment")
            .unwrap();
        let opened = bob.open(&alice.public_bytes(), &sid, 1, 2, &sealed).unwrap();
        assert_eq!(opened, b"fragment");
    }

    #[test]
    fn box_is_bound_to_direction_and_session() {
        let alice = ChannelKey::generate();
        let bob = ChannelKey::generate();
        let sid = [3u8; 32];
        let sealed = alice
            .seal(&bob.public_bytes(), &sid, 1, 2, b"fragment")
            .unwrap();

        assert!(bob.open(&alice.public_bytes(), &sid, 2, 1, &sealed).is_none());
        assert!(bob
            .open(&alice.public_bytes(), &[4u8; 32], 1, 2, &sealed)
            .is_none());
    }

    #[test]
    fn tampered_box_is_rejected() {
        let alice = ChannelKey::generate();
        let bob = ChannelKey::generate();
        let sid = [3u8; 32];
        let mut sealed = alice
            .seal(&bob.public_bytes(), &sid, 1, 2, b"fragment")
            .unwrap();
        sealed.ciphertext[0] ^= 0x80;
        assert!(bob.open(&alice.public_bytes(), &sid, 1, 2, &sealed).is_none());
    }
}
