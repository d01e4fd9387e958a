//! In-memory transport implementation for testing

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::broadcast;

use super::{async_trait, Transport};
use crate::session::{Recipient, RoundMessage};
use crate::types::{PartyIndex, SessionId};
use crate::{Error, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// In-memory message transport shared by all parties of a test.
///
/// Messages are buffered per `(session, phase)`, so messages that arrive
/// before the recipient reaches their phase wait until it asks for them.
/// Direct messages are dropped once their recipient has collected them.
/// Broadcasts stay until [`MemoryTransport::forget`] is called for their
/// session, since the transport cannot tell when the last recipient read them.
#[derive(Clone)]
pub struct MemoryTransport {
    /// Broadcast messages: (session_id, phase) -> messages
    broadcasts: Arc<DashMap<(SessionId, u8), Vec<RoundMessage>>>,
    /// Direct messages: (session_id, phase, to) -> messages
    directs: Arc<DashMap<(SessionId, u8, PartyIndex), Vec<RoundMessage>>>,
    /// Notification channel
    notify: broadcast::Sender<()>,
    timeout: Duration,
}

impl MemoryTransport {
    /// Create a new in-memory transport
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Transport whose `collect` gives up after `timeout`
    pub fn with_timeout(timeout: Duration) -> Self {
        let (notify, _) = broadcast::channel(100);
        Self {
            broadcasts: Arc::new(DashMap::new()),
            directs: Arc::new(DashMap::new()),
            notify,
            timeout,
        }
    }

    /// Drop everything buffered for a finished session
    pub fn forget(&self, session_id: &SessionId) {
        self.broadcasts.retain(|(sid, _), _| sid != session_id);
        self.directs.retain(|(sid, _, _), _| sid != session_id);
    }

    /// Whether no message of any session is buffered
    pub fn is_empty(&self) -> bool {
        self.broadcasts.is_empty() && self.directs.is_empty()
    }

    /// Messages for `recipient` from `senders`, if all are present
    fn ready(
        &self,
        session_id: &SessionId,
        phase: u8,
        recipient: PartyIndex,
        senders: &[PartyIndex],
    ) -> Option<Vec<RoundMessage>> {
        let mut found: BTreeMap<PartyIndex, RoundMessage> = BTreeMap::new();
        if let Some(messages) = self.broadcasts.get(&(*session_id, phase)) {
            for message in messages.iter().filter(|m| m.from != recipient) {
                found.entry(message.from).or_insert_with(|| message.clone());
            }
        }
        if let Some(messages) = self.directs.get(&(*session_id, phase, recipient)) {
            for message in messages.iter() {
                found.entry(message.from).or_insert_with(|| message.clone());
            }
        }
        let expected: Vec<PartyIndex> = senders
            .iter()
            .copied()
            .filter(|s| *s != recipient)
            .collect();
        if expected.iter().all(|s| found.contains_key(s)) {
            Some(
                expected
                    .iter()
                    .filter_map(|s| found.remove(s))
                    .collect(),
            )
        } else {
            None
        }
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn deliver(&self, messages: Vec<RoundMessage>) -> Result<()> {
        for message in messages {
            match message.to {
                Recipient::Broadcast => self
                    .broadcasts
                    .entry((message.session_id, message.phase))
                    .or_default()
                    .push(message),
                Recipient::Party(to) => self
                    .directs
                    .entry((message.session_id, message.phase, to))
                    .or_default()
                    .push(message),
            }
        }
        let _ = self.notify.send(());
        Ok(())
    }

    async fn collect(
        &self,
        session_id: &SessionId,
        phase: u8,
        recipient: PartyIndex,
        senders: &[PartyIndex],
    ) -> Result<Vec<RoundMessage>> {
        let mut rx = self.notify.subscribe();
        let wait = async {
            loop {
                if let Some(messages) = self.ready(session_id, phase, recipient, senders) {
                    return messages;
                }

                // Wait for notification, polling as a fallback
                tokio::select! {
                    _ = rx.recv() => continue,
                    _ = tokio::time::sleep(Duration::from_millis(100)) => continue,
                }
            }
        };
        let messages = tokio::time::timeout(self.timeout, wait).await.map_err(|_| {
            Error::Timeout(format!(
                "phase {phase} messages for party {recipient} in session {}",
                hex::encode(session_id)
            ))
        })?;
        self.directs.remove(&(*session_id, phase, recipient));
        Ok(messages)
    }
}
