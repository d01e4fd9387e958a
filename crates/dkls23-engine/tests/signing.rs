mod common;

use common::*;
use dkls23_engine::{
    derivation::DerivationPath, mpc::LocalNetwork, recover_public_key, ChildNumber, Error,
    HardenedDerivationEngine, SessionContext, SignEngine,
};

#[test]
fn two_of_two_signs_sha256_hello() {
    init_tracing();
    let shares = run_dkg(2, 2);
    let digest = sha256(b"hello");
    let signature = sign(&shares, &[1, 2], digest);
    assert_valid(&shares[0].public_key, &digest, &signature);
    if signature.recovery_id & 2 == 0 {
        assert_eq!(recover_public_key(&digest, &signature).unwrap(), shares[0].public_key);
    }

    // fresh session, fresh nonce
    let again = sign(&shares, &[1, 2], digest);
    assert_valid(&shares[0].public_key, &digest, &again);
    assert_ne!(signature.r, again.r);
}

#[test]
fn every_threshold_subset_signs() {
    let shares = run_dkg(2, 3);
    let digest = sha256(b"subset");
    for signers in [[1u16, 2], [1, 3], [2, 3], [3, 1]] {
        let signature = sign(&shares, &signers, digest);
        assert_valid(&shares[0].public_key, &digest, &signature);
    }
}

#[test]
fn three_of_five_signs() {
    let shares = run_dkg(3, 5);
    let digest = sha256(b"three of five");
    let signature = sign(&shares, &[2, 4, 5], digest);
    assert_valid(&shares[0].public_key, &digest, &signature);
}

#[test]
fn signing_with_dkg_session_id_is_refused() {
    let shares = run_dkg(2, 2);
    let ctx = SessionContext::new(shares[0].dkg_session_id, shares[0].parameters, 1).unwrap();
    assert!(matches!(
        SignEngine::new(ctx, shares[0].clone(), &[1, 2], [0u8; 32]),
        Err(Error::SessionReused(_))
    ));
}

#[test]
fn nonhardened_child_signs_for_public_child_key() {
    init_tracing();
    let shares = run_dkg(2, 3);
    let path: DerivationPath = "m/0/5/1".parse().unwrap();
    let children: Vec<_> = shares.iter().map(|s| s.derive_child("m/0/5/1").unwrap()).collect();
    let xpub = shares[0].extended_public_key().derive(&path).unwrap();
    assert_eq!(children[2].public_key, xpub.public_key);
    assert_eq!(children[0].extended_public_key().to_xpub(), xpub.to_xpub());

    let digest = sha256(b"child key");
    let signature = sign(&children, &[1, 3], digest);
    assert_valid(&xpub.public_key, &digest, &signature);
}

#[test]
fn hardened_child_needs_every_holder_and_signs() {
    let shares = run_dkg(2, 3);
    let child = ChildNumber::hardened(44).unwrap();
    let sid = SessionContext::random_session_id();

    let ctx = SessionContext::new(sid, shares[0].parameters, 1).unwrap();
    assert!(matches!(
        HardenedDerivationEngine::new(ctx, shares[0].clone(), child, &[1, 3]),
        Err(Error::IncompleteDerivationQuorum { required: 3, actual: 2 })
    ));

    let engines = shares
        .iter()
        .map(|share| {
            let ctx = SessionContext::new(sid, share.parameters, share.party_index).unwrap();
            HardenedDerivationEngine::new(ctx, share.clone(), child, &[1, 2, 3]).unwrap()
        })
        .collect();
    let children = LocalNetwork::new(engines).run().unwrap();
    assert_ne!(children[0].public_key, shares[0].public_key);
    assert_eq!(children[1].child_number, child.raw());

    // hardened then normal
    let grandchildren: Vec<_> = children.iter().map(|c| c.derive_child("m/7").unwrap()).collect();
    let digest = sha256(b"m/44'/7");
    let signature = sign(&grandchildren, &[2, 3], digest);
    assert_valid(&grandchildren[0].public_key, &digest, &signature);
    assert_eq!(grandchildren[0].depth, 2);
}
