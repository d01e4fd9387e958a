//! Synchronous in-process network for running every party of a session

use crate::session::{EngineState, PhaseEngine, RoundMessage, Step};
use crate::{Error, Result};

/// Runs a set of engines, one per party, in lock step.
///
/// Every round, each live engine receives the messages of its current
/// phase addressed to it. An engine that fails is dropped from the run
/// and its error is reported in its slot.
pub struct LocalNetwork<E: PhaseEngine> {
    engines: Vec<E>,
}

impl<E: PhaseEngine> LocalNetwork<E> {
    pub fn new(engines: Vec<E>) -> Self {
        Self { engines }
    }

    pub fn engines(&self) -> &[E] {
        &self.engines
    }

    pub fn into_engines(self) -> Vec<E> {
        self.engines
    }

    /// Run to completion, returning the outputs in engine order or the
    /// first error any party hit
    pub fn run(&mut self) -> Result<Vec<E::Output>> {
        self.run_with(|_| {}).into_iter().collect()
    }

    /// Run to completion, passing each round's traffic through `intercept`
    /// before delivery
    pub fn run_with<F>(&mut self, mut intercept: F) -> Vec<Result<E::Output>>
    where
        F: FnMut(&mut Vec<RoundMessage>),
    {
        let mut results: Vec<Option<Result<E::Output>>> =
            self.engines.iter().map(|_| None).collect();

        let mut pool = Vec::new();
        for (engine, slot) in self.engines.iter_mut().zip(results.iter_mut()) {
            match engine.start() {
                Ok(messages) => pool.extend(messages),
                Err(e) => *slot = Some(Err(e)),
            }
        }

        while results.iter().any(Option::is_none) {
            intercept(&mut pool);
            let mut next = Vec::new();
            for (engine, slot) in self.engines.iter_mut().zip(results.iter_mut()) {
                if slot.is_some() {
                    continue;
                }
                let EngineState::Round(phase) = engine.state() else {
                    *slot = Some(Err(Error::SessionClosed(format!(
                        "session {} is {:?}",
                        engine.context().session_hex(),
                        engine.state()
                    ))));
                    continue;
                };
                let me = engine.context().party_index();
                let incoming: Vec<RoundMessage> = pool
                    .iter()
                    .filter(|m| m.phase == phase && m.is_for(me))
                    .cloned()
                    .collect();
                match engine.advance(incoming) {
                    Ok(Step::Continue(messages)) => next.extend(messages),
                    Ok(Step::Complete(output)) => *slot = Some(Ok(output)),
                    Err(e) => *slot = Some(Err(e)),
                }
            }
            pool = next;
        }

        results.into_iter().flatten().collect()
    }
}
