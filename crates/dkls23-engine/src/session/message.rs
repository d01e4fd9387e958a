//! Round messages exchanged between parties

use std::collections::BTreeMap;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::types::{PartyIndex, SessionId};
use crate::{Error, Result};

/// Destination of a round message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Recipient {
    /// Every other participant of the session
    Broadcast,
    /// A single party
    Party(PartyIndex),
}

/// One message of one phase, produced by a phase step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundMessage {
    pub session_id: SessionId,
    pub from: PartyIndex,
    pub to: Recipient,
    pub phase: u8,
    /// JSON encoding of the typed round payload
    pub payload: Vec<u8>,
}

impl RoundMessage {
    pub(crate) fn broadcast<T: Serialize>(
        session_id: SessionId,
        from: PartyIndex,
        phase: u8,
        payload: &T,
    ) -> Result<Self> {
        Ok(Self {
            session_id,
            from,
            to: Recipient::Broadcast,
            phase,
            payload: serde_json::to_vec(payload)?,
        })
    }

    pub(crate) fn direct<T: Serialize>(
        session_id: SessionId,
        from: PartyIndex,
        to: PartyIndex,
        phase: u8,
        payload: &T,
    ) -> Result<Self> {
        Ok(Self {
            session_id,
            from,
            to: Recipient::Party(to),
            phase,
            payload: serde_json::to_vec(payload)?,
        })
    }

    /// Decode the payload; failures are attributed to the sender
    pub(crate) fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.payload).map_err(|e| Error::MalformedPayload {
            party: self.from,
            reason: e.to_string(),
        })
    }

    /// Whether `party` should receive this message
    pub fn is_for(&self, party: PartyIndex) -> bool {
        match self.to {
            Recipient::Broadcast => party != self.from,
            Recipient::Party(to) => to == party,
        }
    }
}

/// Decode every payload of a validated batch
pub(crate) fn decode_batch<T: DeserializeOwned>(
    batch: &BTreeMap<PartyIndex, RoundMessage>,
) -> Result<BTreeMap<PartyIndex, T>> {
    batch
        .iter()
        .map(|(party, message)| message.decode().map(|payload| (*party, payload)))
        .collect()
}
