mod common;

use std::time::Duration;

use common::*;
use dkls23_engine::{
    mpc::{run_all, run_to_completion, MemoryTransport},
    Error, Parameters, PhaseEngine,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dkg_and_signing_over_memory_transport() {
    init_tracing();
    let transport = MemoryTransport::new();

    let mut engines = dkg_engines(Parameters::new(2, 3).unwrap());
    let handles: Vec<_> = engines
        .drain(..)
        .map(|mut engine| {
            let transport = transport.clone();
            tokio::spawn(async move { run_to_completion(&mut engine, &transport).await })
        })
        .collect();
    let mut shares = Vec::new();
    for handle in handles {
        shares.push(handle.await.unwrap().unwrap());
    }
    assert!(shares.iter().all(|s| s.public_key == shares[0].public_key));

    let digest = sha256(b"async");
    let mut signers = sign_engines(&shares, &[1, 3], digest);
    let signatures = run_all(&mut signers, &transport).await.unwrap();
    assert_eq!(signatures[0], signatures[1]);
    assert_valid(&shares[0].public_key, &digest, &signatures[0]);

    // direct messages are gone once read; broadcasts go with their session
    transport.forget(&shares[0].dkg_session_id);
    transport.forget(signers[0].context().session_id());
    assert!(transport.is_empty());
}

#[tokio::test]
async fn concurrent_sessions_share_one_transport() {
    let transport = MemoryTransport::new();
    let params = Parameters::new(2, 2).unwrap();
    let mut first = dkg_engines(params);
    let mut second = dkg_engines(params);
    let (a, b) = tokio::join!(run_all(&mut first, &transport), run_all(&mut second, &transport));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a[0].public_key, b[0].public_key);
}

#[tokio::test]
async fn missing_party_times_out() {
    let transport = MemoryTransport::with_timeout(Duration::from_millis(200));
    let mut engines = dkg_engines(Parameters::new(2, 2).unwrap());
    let err = run_to_completion(&mut engines[0], &transport).await.unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));
    // the engine waits in its phase and can be driven again
    assert!(!engines[0].state().is_terminal());
}
