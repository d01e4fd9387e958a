//! Concurrent sessions of one party, keyed by session id

use dashmap::{DashMap, DashSet};
use tracing::info;

use super::engine::{EngineState, PhaseEngine, Step};
use super::message::RoundMessage;
use crate::types::SessionId;
use crate::{Error, Result};

/// Map of in-progress sessions.
///
/// A session id is accepted once per registry: reusing it, even after the
/// session finished, fails with [`Error::SessionReused`]. Finished and
/// aborted sessions are removed.
pub struct SessionRegistry<E: PhaseEngine> {
    sessions: DashMap<SessionId, E>,
    used: DashSet<SessionId>,
}

impl<E: PhaseEngine> Default for SessionRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: PhaseEngine> SessionRegistry<E> {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            used: DashSet::new(),
        }
    }

    /// Register an engine under its session id
    pub fn insert(&self, engine: E) -> Result<()> {
        let session_id = *engine.context().session_id();
        if !self.used.insert(session_id) {
            return Err(Error::SessionReused(hex::encode(session_id)));
        }
        self.sessions.insert(session_id, engine);
        Ok(())
    }

    /// Register and start an engine
    pub fn open(&self, engine: E) -> Result<Vec<RoundMessage>> {
        let session_id = *engine.context().session_id();
        self.insert(engine)?;
        self.start(&session_id)
    }

    pub fn start(&self, session_id: &SessionId) -> Result<Vec<RoundMessage>> {
        let result = {
            let mut engine = self.get_mut(session_id)?;
            engine.start()
        };
        if result.is_err() {
            self.sessions.remove(session_id);
        }
        result
    }

    /// Feed a round to the session; completed or aborted sessions are dropped
    pub fn advance(&self, session_id: &SessionId, incoming: Vec<RoundMessage>) -> Result<Step<E::Output>> {
        let (result, terminal) = {
            let mut engine = self.get_mut(session_id)?;
            let result = engine.advance(incoming);
            (result, engine.state().is_terminal())
        };
        if terminal {
            self.sessions.remove(session_id);
        }
        result
    }

    /// Cancel a session at a phase boundary and wipe it
    pub fn cancel(&self, session_id: &SessionId) -> Result<()> {
        let (_, mut engine) = self
            .sessions
            .remove(session_id)
            .ok_or_else(|| Error::SessionNotFound(hex::encode(session_id)))?;
        engine.cancel();
        info!(session_id = %hex::encode(session_id), "Session cancelled");
        Ok(())
    }

    pub fn state(&self, session_id: &SessionId) -> Option<EngineState> {
        self.sessions.get(session_id).map(|e| e.state())
    }

    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn get_mut(
        &self,
        session_id: &SessionId,
    ) -> Result<dashmap::mapref::one::RefMut<'_, SessionId, E>> {
        self.sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::SessionNotFound(hex::encode(session_id)))
    }
}
