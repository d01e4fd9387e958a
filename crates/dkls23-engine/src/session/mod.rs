//! Session plumbing shared by every interactive engine
//!
//! A session is identified by a 32-byte id and runs as a sequence of
//! phases. In each phase a party consumes the complete set of round
//! messages its peers produced for that phase and emits its own.

pub mod context;
pub mod engine;
pub mod message;
pub mod registry;
pub mod transcript;

pub use context::SessionContext;
pub use engine::{EngineState, PhaseEngine, Step};
pub use message::{Recipient, RoundMessage};
pub use registry::SessionRegistry;
pub use transcript::PartyTranscript;
