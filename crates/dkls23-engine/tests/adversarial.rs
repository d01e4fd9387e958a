mod common;

use common::*;
use dkls23_engine::{
    keygen::{DkgRound2, DkgRound3},
    mpc::LocalNetwork,
    session::Recipient,
    EngineState, Error, Parameters, PhaseEngine,
};

#[test]
fn stale_and_duplicate_messages_leave_engine_untouched() {
    init_tracing();
    let mut engines = dkg_engines(Parameters::new(2, 2).unwrap());
    let mut bob = engines.pop().unwrap();
    let mut alice = engines.pop().unwrap();

    let alice_1 = alice.start().unwrap();
    let bob_1 = bob.start().unwrap();
    let alice_2 = continued(alice.advance(bob_1.clone()).unwrap());
    let bob_2 = continued(bob.advance(alice_1.clone()).unwrap());
    assert_eq!(alice.state(), EngineState::Round(2));
    let received = alice.transcript().received_count();

    // replay of phase 1 while waiting for phase 2
    assert!(matches!(
        alice.advance(bob_1.clone()),
        Err(Error::UnexpectedPhase { expected: 2, received: 1, from: 2 })
    ));
    // the same phase 2 message twice
    let doubled = [bob_2.clone(), bob_2.clone()].concat();
    assert!(matches!(
        alice.advance(doubled),
        Err(Error::UnexpectedPhase { expected: 2, received: 2, from: 2 })
    ));
    // nothing at all
    assert!(matches!(
        alice.advance(vec![]),
        Err(Error::IncompleteRound { phase: 2, .. })
    ));
    assert_eq!(alice.state(), EngineState::Round(2));
    assert_eq!(alice.transcript().received_count(), received);

    // the genuine round still goes through
    let alice_3 = continued(alice.advance(bob_2).unwrap());
    let bob_3 = continued(bob.advance(alice_2.clone()).unwrap());
    assert_eq!(alice.state(), EngineState::Round(3));

    // and an already accepted phase cannot be replayed
    assert!(matches!(
        bob.advance(alice_2),
        Err(Error::UnexpectedPhase { expected: 3, .. })
    ));

    let alice_4 = continued(alice.advance(bob_3).unwrap());
    let bob_4 = continued(bob.advance(alice_3).unwrap());
    assert!(alice.advance(bob_4).is_ok());
    assert!(bob.advance(alice_4).is_ok());
    assert_eq!(alice.state(), EngineState::Complete);
    assert!(matches!(alice.advance(vec![]), Err(Error::SessionClosed(_))));
}

#[test]
fn messages_from_other_sessions_are_misrouted() {
    let params = Parameters::new(2, 2).unwrap();
    let mut first = dkg_engines(params);
    let mut second = dkg_engines(params);
    first[0].start().unwrap();
    let foreign = second[1].start().unwrap();
    assert!(matches!(
        first[0].advance(foreign),
        Err(Error::Misrouted { from: 2, .. })
    ));
    assert_eq!(first[0].state(), EngineState::Round(1));
}

#[test]
fn tampered_coefficient_proof_blames_dealer() {
    init_tracing();
    let mut network = LocalNetwork::new(dkg_engines(Parameters::new(2, 3).unwrap()));
    let results = network.run_with(|messages| {
        for message in messages.iter_mut().filter(|m| m.phase == 2 && m.from == 3) {
            let mut payload: DkgRound2 = serde_json::from_slice(&message.payload).unwrap();
            payload.proofs[1].response[31] ^= 1;
            message.payload = serde_json::to_vec(&payload).unwrap();
        }
    });
    for (engine, result) in network.engines().iter().zip(&results).take(2) {
        assert!(matches!(
            result,
            Err(Error::ProofVerificationFailed { party: 3, .. })
        ));
        assert_eq!(engine.state(), EngineState::Aborted);
    }
    assert!(results[2].is_err());
}

#[test]
fn tampered_fragment_blames_dealer() {
    let mut network = LocalNetwork::new(dkg_engines(Parameters::new(2, 3).unwrap()));
    let results = network.run_with(|messages| {
        for message in messages
            .iter_mut()
            .filter(|m| m.phase == 3 && m.from == 1 && m.to == Recipient::Party(2))
        {
            let mut payload: DkgRound3 = serde_json::from_slice(&message.payload).unwrap();
            payload.sealed.ciphertext[0] ^= 1;
            message.payload = serde_json::to_vec(&payload).unwrap();
        }
    });
    let err = results[1].as_ref().unwrap_err();
    assert_eq!(err.culprit(), Some(1));
    assert!(err.is_fatal());
}

#[test]
fn undecodable_payload_is_malformed() {
    let shares = run_dkg(2, 2);
    let mut network = LocalNetwork::new(sign_engines(&shares, &[1, 2], sha256(b"x")));
    let results = network.run_with(|messages| {
        for message in messages.iter_mut().filter(|m| m.phase == 1 && m.from == 1) {
            message.payload = b"{}".to_vec();
        }
    });
    assert!(matches!(
        results[1],
        Err(Error::MalformedPayload { party: 1, .. })
    ));
}
