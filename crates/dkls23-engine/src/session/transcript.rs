//! Per-party record of a session's traffic

use std::collections::{BTreeMap, BTreeSet};

use super::message::{Recipient, RoundMessage};
use crate::types::{PartyIndex, SessionId};
use crate::{Error, Result};

/// How the messages of a phase are delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Broadcast,
    Direct,
}

/// Shape of an incoming round: which phase, from whom, how delivered
#[derive(Debug, Clone)]
pub struct RoundSpec<'a> {
    pub phase: u8,
    pub senders: &'a [PartyIndex],
    pub delivery: Delivery,
}

/// Messages received, keyed by `(phase, sender)`, and messages sent
#[derive(Debug, Clone, Default)]
pub struct PartyTranscript {
    received: BTreeMap<(u8, PartyIndex), RoundMessage>,
    sent: Vec<RoundMessage>,
}

impl PartyTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a batch without touching the transcript.
    ///
    /// `participants` are the parties of the session; `round.senders` the
    /// subset expected to speak in this phase.
    pub(crate) fn check(
        &self,
        session_id: &SessionId,
        me: PartyIndex,
        participants: &[PartyIndex],
        round: &RoundSpec<'_>,
        incoming: &[RoundMessage],
    ) -> Result<()> {
        let mut seen = BTreeSet::new();
        for message in incoming {
            let from = message.from;
            if &message.session_id != session_id {
                return Err(Error::Misrouted {
                    from,
                    reason: "message belongs to another session".into(),
                });
            }
            if from == me || !participants.contains(&from) {
                return Err(Error::Misrouted {
                    from,
                    reason: "sender is not a participant of this session".into(),
                });
            }
            match (message.to, round.delivery) {
                (Recipient::Party(to), _) if to != me => {
                    return Err(Error::Misrouted {
                        from,
                        reason: format!("message addressed to party {to}"),
                    });
                }
                (Recipient::Broadcast, Delivery::Direct) | (Recipient::Party(_), Delivery::Broadcast)
                    if message.phase == round.phase =>
                {
                    return Err(Error::Misrouted {
                        from,
                        reason: "wrong delivery mode for this phase".into(),
                    });
                }
                _ => {}
            }
            if message.phase != round.phase
                || !seen.insert(from)
                || self.received.contains_key(&(round.phase, from))
            {
                return Err(Error::UnexpectedPhase {
                    expected: round.phase,
                    received: message.phase,
                    from,
                });
            }
            if !round.senders.contains(&from) {
                return Err(Error::Misrouted {
                    from,
                    reason: format!("party does not send in phase {}", round.phase),
                });
            }
        }

        let missing: Vec<PartyIndex> = round
            .senders
            .iter()
            .copied()
            .filter(|p| *p != me && !seen.contains(p))
            .collect();
        if !missing.is_empty() {
            return Err(Error::IncompleteRound {
                phase: round.phase,
                missing,
            });
        }
        Ok(())
    }

    /// Store a validated batch; returns it keyed by sender
    pub(crate) fn record(&mut self, incoming: Vec<RoundMessage>) -> BTreeMap<PartyIndex, RoundMessage> {
        let mut batch = BTreeMap::new();
        for message in incoming {
            self.received.insert((message.phase, message.from), message.clone());
            batch.insert(message.from, message);
        }
        batch
    }

    pub(crate) fn record_sent(&mut self, messages: &[RoundMessage]) {
        self.sent.extend_from_slice(messages);
    }

    /// Message received from `from` in `phase`
    pub fn received(&self, phase: u8, from: PartyIndex) -> Option<&RoundMessage> {
        self.received.get(&(phase, from))
    }

    /// Number of messages received so far
    pub fn received_count(&self) -> usize {
        self.received.len()
    }

    pub fn sent(&self) -> &[RoundMessage] {
        &self.sent
    }
}
