mod common;

use common::*;
use dkls23_engine::{
    mpc::LocalNetwork, primitives::lagrange_coefficient, Error, KeyShareStore, MemoryKeyShareStore,
    Parameters, PartyIndex, ReKeyEngine, SessionContext,
};
use k256::{elliptic_curve::sec1::ToEncodedPoint, ProjectivePoint, PublicKey};

fn point(bytes: &[u8]) -> ProjectivePoint {
    PublicKey::from_sec1_bytes(bytes).unwrap().to_projective()
}

fn interpolate(shares: &[dkls23_engine::KeyShare], subset: &[PartyIndex]) -> Vec<u8> {
    let public_shares = &shares[0].public_shares;
    let key = subset.iter().fold(ProjectivePoint::IDENTITY, |acc, j| {
        acc + point(&public_shares[j]) * lagrange_coefficient(*j, subset).unwrap()
    });
    key.to_affine().to_encoded_point(true).as_bytes().to_vec()
}

#[test]
fn dkg_agrees_on_key_for_several_thresholds() {
    init_tracing();
    for (t, n) in [(1u16, 3u16), (2, 3), (3, 3), (3, 5)] {
        let shares = run_dkg(t, n);
        assert_eq!(shares.len(), usize::from(n));
        for share in &shares {
            share.validate().unwrap();
            assert_eq!(share.public_key, shares[0].public_key);
            assert_eq!(share.public_shares, shares[0].public_shares);
            assert_eq!(share.key_id(), shares[0].key_id());
        }
        // every threshold subset of public shares opens to the group key
        let parties: Vec<PartyIndex> = (1..=n).collect();
        for window in parties.windows(usize::from(t)) {
            assert_eq!(interpolate(&shares, window), shares[0].public_key);
        }
    }
}

#[test]
fn dkg_sessions_give_independent_keys() {
    let a = run_dkg(2, 2);
    let b = run_dkg(2, 2);
    assert_ne!(a[0].public_key, b[0].public_key);
    assert_ne!(a[0].chain_code, b[0].chain_code);
}

#[test]
fn refresh_keeps_key_and_replaces_shares() {
    init_tracing();
    let shares = run_dkg(2, 3);
    let sid = SessionContext::random_session_id();
    let engines = shares
        .iter()
        .map(|share| {
            let ctx = SessionContext::new(sid, share.parameters, share.party_index).unwrap();
            ReKeyEngine::new(ctx, share.clone(), &[1, 2, 3]).unwrap()
        })
        .collect();
    let refreshed = LocalNetwork::new(engines).run().unwrap();

    for (old, new) in shares.iter().zip(&refreshed) {
        new.validate().unwrap();
        assert_eq!(new.public_key, old.public_key);
        assert_eq!(new.chain_code, old.chain_code);
        for j in 1..=3 {
            assert_ne!(new.public_shares[&j], old.public_shares[&j]);
        }
    }

    // mixing old and new shares no longer opens the key
    let mut mixed = refreshed[0].public_shares.clone();
    mixed.insert(2, shares[1].public_shares[&2].clone());
    let key = [1u16, 2].iter().fold(ProjectivePoint::IDENTITY, |acc, j| {
        acc + point(&mixed[j]) * lagrange_coefficient(*j, &[1, 2]).unwrap()
    });
    assert_ne!(key, point(&shares[0].public_key));

    let digest = sha256(b"after refresh");
    let signature = sign(&refreshed, &[2, 3], digest);
    assert_valid(&shares[0].public_key, &digest, &signature);
}

#[test]
fn refresh_of_threshold_one_is_refused() {
    let shares = run_dkg(1, 2);
    let ctx = SessionContext::new(SessionContext::random_session_id(), shares[0].parameters, 1).unwrap();
    assert!(matches!(
        ReKeyEngine::new(ctx, shares[0].clone(), &[1, 2]),
        Err(Error::InvalidParameters(_))
    ));
}

#[test]
fn refreshed_share_replaces_stored_share() {
    let store = MemoryKeyShareStore::new();
    let shares = run_dkg(2, 2);
    let key_id = shares[0].key_id();
    let lease = store.lease(1, &key_id).unwrap();
    store.save(&lease, shares[0].clone()).unwrap();

    // a concurrent refresh cannot take the write lease
    assert!(matches!(store.lease(1, &key_id), Err(Error::StoreBusy(_))));
    store.release(lease);

    let params = Parameters::new(2, 2).unwrap();
    let sid = SessionContext::random_session_id();
    let engines = shares
        .iter()
        .map(|share| {
            let ctx = SessionContext::new(sid, params, share.party_index).unwrap();
            ReKeyEngine::new(ctx, share.clone(), &[1, 2]).unwrap()
        })
        .collect();
    let refreshed = LocalNetwork::new(engines).run().unwrap();

    let lease = store.lease(1, &key_id).unwrap();
    store.save(&lease, refreshed[0].clone()).unwrap();
    store.release(lease);
    let loaded = store.load(1, &key_id).unwrap();
    assert_eq!(loaded.public_shares, refreshed[0].public_shares);
}
