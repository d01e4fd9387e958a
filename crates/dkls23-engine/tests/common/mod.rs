#![allow(dead_code)]

use dkls23_engine::{
    mpc::LocalNetwork, DkgEngine, KeyShare, Parameters, PartyIndex, PhaseEngine, RoundMessage,
    SessionContext, SignEngine, Signature, Step,
};
use k256::ecdsa::{signature::hazmat::PrehashVerifier, VerifyingKey};
use sha2::{Digest, Sha256};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn sha256(message: &[u8]) -> [u8; 32] {
    Sha256::digest(message).into()
}

pub fn dkg_engines(params: Parameters) -> Vec<DkgEngine> {
    let sid = SessionContext::random_session_id();
    params
        .parties()
        .map(|i| DkgEngine::new(SessionContext::new(sid, params, i).unwrap()).unwrap())
        .collect()
}

pub fn run_dkg(threshold: u16, share_count: u16) -> Vec<KeyShare> {
    let params = Parameters::new(threshold, share_count).unwrap();
    LocalNetwork::new(dkg_engines(params)).run().unwrap()
}

pub fn share_of(shares: &[KeyShare], party: PartyIndex) -> KeyShare {
    shares
        .iter()
        .find(|s| s.party_index == party)
        .cloned()
        .unwrap()
}

pub fn sign_engines(shares: &[KeyShare], signers: &[PartyIndex], digest: [u8; 32]) -> Vec<SignEngine> {
    let sid = SessionContext::random_session_id();
    signers
        .iter()
        .map(|&i| {
            let share = share_of(shares, i);
            let ctx = SessionContext::new(sid, share.parameters, i).unwrap();
            SignEngine::new(ctx, share, signers, digest).unwrap()
        })
        .collect()
}

pub fn sign(shares: &[KeyShare], signers: &[PartyIndex], digest: [u8; 32]) -> Signature {
    let signatures = LocalNetwork::new(sign_engines(shares, signers, digest)).run().unwrap();
    for signature in &signatures[1..] {
        assert_eq!(signature, &signatures[0]);
    }
    signatures[0].clone()
}

/// Verify with the k256 ECDSA implementation
pub fn assert_valid(public_key: &[u8], digest: &[u8; 32], signature: &Signature) {
    let key = VerifyingKey::from_sec1_bytes(public_key).unwrap();
    let sig = k256::ecdsa::Signature::from_der(&signature.to_der().unwrap()).unwrap();
    key.verify_prehash(digest, &sig).unwrap();
    assert!(dkls23_engine::verify(public_key, digest, signature));
}

pub fn continued<T>(step: Step<T>) -> Vec<RoundMessage> {
    match step {
        Step::Continue(messages) => messages,
        Step::Complete(_) => panic!("session completed early"),
    }
}

/// Messages of `pool` that `engine` should receive
pub fn inbox<E: PhaseEngine>(engine: &E, pool: &[RoundMessage]) -> Vec<RoundMessage> {
    let me = engine.context().party_index();
    pool.iter().filter(|m| m.is_for(me)).cloned().collect()
}
