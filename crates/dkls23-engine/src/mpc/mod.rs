//! MPC coordination utilities
//!
//! The engines are transport-agnostic: a [`Transport`] moves
//! [`RoundMessage`]s between parties and the [`driver`] steps an engine
//! over it until the session completes.

use crate::session::RoundMessage;
use crate::types::{PartyIndex, SessionId};
use crate::Result;

pub use ::async_trait::async_trait;

/// Message transport between the parties of a session
#[async_trait]
pub trait Transport: Send + Sync {
    /// Hand outgoing messages to the transport
    async fn deliver(&self, messages: Vec<RoundMessage>) -> Result<()>;

    /// Wait for the `phase` messages addressed to `recipient`, one from
    /// each of `senders`
    async fn collect(
        &self,
        session_id: &SessionId,
        phase: u8,
        recipient: PartyIndex,
        senders: &[PartyIndex],
    ) -> Result<Vec<RoundMessage>>;
}

pub mod driver;
pub mod local;
/// In-memory transport for testing
pub mod memory;

pub use driver::{run_all, run_to_completion};
pub use local::LocalNetwork;
pub use memory::MemoryTransport;
