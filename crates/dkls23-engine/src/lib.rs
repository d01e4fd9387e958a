//! # DKLs23 Engine
//!
//! Phase engines for the DKLs23 threshold ECDSA protocol on secp256k1.
//!
//! This crate provides per-party state machines for:
//! - Distributed Key Generation (DKG)
//! - Key Refresh (re-key)
//! - Distributed Signature Generation (DSG)
//! - BIP32 derivation of key shares, non-hardened locally and hardened
//!   interactively
//!
//! ## Protocol Overview
//!
//! Every engine implements [`PhaseEngine`]: `start` emits the first round,
//! `advance` consumes the complete set of peer messages for the current
//! phase and either emits the next round or yields the output. Engines do
//! no I/O; a [`mpc::Transport`] moves their messages and
//! [`mpc::run_to_completion`] drives one over it.
//!
//! Signing is three rounds with no zero-knowledge proofs, built on pairwise
//! two-party multiplication from base oblivious transfer.
//!
//! ## Example
//!
//! ```rust,ignore
//! use dkls23_engine::{mpc::LocalNetwork, DkgEngine, Parameters, SessionContext};
//!
//! let params = Parameters::new(2, 3)?;
//! let sid = SessionContext::random_session_id();
//! let engines = params
//!     .parties()
//!     .map(|i| DkgEngine::new(SessionContext::new(sid, params, i)?))
//!     .collect::<Result<Vec<_>, _>>()?;
//! let shares = LocalNetwork::new(engines).run()?;
//! ```

pub mod derivation;
pub mod error;
pub mod key_share;
pub mod keygen;
pub mod mpc;
pub mod oblivious;
pub mod primitives;
pub mod session;
pub mod sign;
pub mod store;
pub mod types;
pub mod verify;

pub use derivation::{
    derive_nonhardened, ChildNumber, DerivationPath, ExtendedPublicKey, HardenedDerivationEngine,
};
pub use error::{Error, Result};
pub use key_share::{KeyId, KeyShare};
pub use keygen::{mock_keygen, split_secret, DkgEngine, ReKeyEngine};
pub use session::{EngineState, PhaseEngine, RoundMessage, SessionContext, SessionRegistry, Step};
pub use sign::{SignEngine, SignOptions};
pub use store::{KeyShareStore, MemoryKeyShareStore, WriteLease};
pub use types::{Curve, Parameters, PartyIndex, SessionId, Signature};
pub use verify::{recover_public_key, verify};

/// Protocol version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
