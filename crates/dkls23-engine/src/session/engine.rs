//! Common surface of the interactive engines

use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::context::SessionContext;
use super::message::RoundMessage;
use super::transcript::{Delivery, PartyTranscript, RoundSpec};
use crate::types::PartyIndex;
use crate::{Error, Result};

/// Lifecycle of an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Created, nothing sent yet
    Init,
    /// Own messages of this phase were emitted; waiting for the peers'
    Round(u8),
    /// Output produced
    Complete,
    /// A fatal error or a cancel ended the session
    Aborted,
}

impl EngineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EngineState::Complete | EngineState::Aborted)
    }
}

/// Result of feeding one complete round to an engine
#[derive(Debug)]
pub enum Step<T> {
    /// Messages of the next phase, to be delivered by the transport
    Continue(Vec<RoundMessage>),
    /// The session finished
    Complete(T),
}

/// A per-party protocol state machine driven round by round.
///
/// `advance` takes the complete set of peer messages for the current
/// phase. Routing and completeness problems are reported without touching
/// the engine; any failure after the batch is accepted aborts the session.
pub trait PhaseEngine: Send {
    type Output;

    fn context(&self) -> &SessionContext;

    fn state(&self) -> EngineState;

    /// Parties whose messages the engine waits for in its current phase
    fn expected_senders(&self) -> Vec<PartyIndex>;

    /// Emit the first round
    fn start(&mut self) -> Result<Vec<RoundMessage>>;

    /// Consume the current phase's messages
    fn advance(&mut self, incoming: Vec<RoundMessage>) -> Result<Step<Self::Output>>;

    /// Abort the session and wipe its secrets
    fn cancel(&mut self);
}

/// State, transcript and routing checks shared by the engines
#[derive(Debug)]
pub(crate) struct EngineCore {
    pub(crate) context: SessionContext,
    pub(crate) state: EngineState,
    pub(crate) transcript: PartyTranscript,
    /// All parties taking part in the session
    pub(crate) participants: Vec<PartyIndex>,
    name: &'static str,
}

impl EngineCore {
    pub(crate) fn new(context: SessionContext, participants: Vec<PartyIndex>, name: &'static str) -> Self {
        Self {
            context,
            state: EngineState::Init,
            transcript: PartyTranscript::new(),
            participants,
            name,
        }
    }

    pub(crate) fn me(&self) -> PartyIndex {
        self.context.party_index()
    }

    /// Everyone but the local party
    pub(crate) fn peers(&self) -> Vec<PartyIndex> {
        let me = self.me();
        self.participants.iter().copied().filter(|p| *p != me).collect()
    }

    pub(crate) fn ensure_init(&self) -> Result<()> {
        match self.state {
            EngineState::Init => Ok(()),
            _ => Err(Error::SessionClosed(format!(
                "{} session {} already started",
                self.name,
                self.context.session_hex()
            ))),
        }
    }

    /// Phase the engine is waiting for
    pub(crate) fn waiting_phase(&self) -> Result<u8> {
        match self.state {
            EngineState::Round(phase) => Ok(phase),
            EngineState::Init => Err(Error::SessionClosed(format!(
                "{} session {} not started",
                self.name,
                self.context.session_hex()
            ))),
            EngineState::Complete | EngineState::Aborted => Err(Error::SessionClosed(format!(
                "{} session {} is {:?}",
                self.name,
                self.context.session_hex(),
                self.state
            ))),
        }
    }

    /// Validate and record a batch for `phase`
    pub(crate) fn accept(
        &mut self,
        phase: u8,
        senders: &[PartyIndex],
        delivery: Delivery,
        incoming: Vec<RoundMessage>,
    ) -> Result<BTreeMap<PartyIndex, RoundMessage>> {
        let round = RoundSpec {
            phase,
            senders,
            delivery,
        };
        self.transcript.check(
            self.context.session_id(),
            self.me(),
            &self.participants,
            &round,
            &incoming,
        )?;
        debug!(
            party_index = self.me(),
            session_id = %self.context.session_hex(),
            phase,
            messages = incoming.len(),
            "{} round accepted",
            self.name
        );
        Ok(self.transcript.record(incoming))
    }

    /// Record own messages of `phase` and wait for the peers'
    pub(crate) fn emit(&mut self, phase: u8, messages: Vec<RoundMessage>) -> Vec<RoundMessage> {
        self.transcript.record_sent(&messages);
        self.state = EngineState::Round(phase);
        messages
    }

    pub(crate) fn complete(&mut self) {
        self.state = EngineState::Complete;
    }

    pub(crate) fn abort(&mut self, error: &Error) {
        warn!(
            party_index = self.me(),
            session_id = %self.context.session_hex(),
            culprit = ?error.culprit(),
            %error,
            "{} session aborted",
            self.name
        );
        self.state = EngineState::Aborted;
    }

    pub(crate) fn cancel(&mut self) {
        if !self.state.is_terminal() {
            debug!(
                party_index = self.me(),
                session_id = %self.context.session_hex(),
                "{} session cancelled",
                self.name
            );
            self.state = EngineState::Aborted;
        }
    }
}
