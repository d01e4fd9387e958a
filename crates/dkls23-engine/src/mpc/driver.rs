//! Async driver stepping an engine over a [`Transport`]

use futures_util::future::try_join_all;
use tracing::{debug, instrument};

use super::Transport;
use crate::session::{EngineState, PhaseEngine, Step};
use crate::{Error, Result};

/// Run `engine` from its first round to its output.
///
/// Non-fatal errors from `advance` are returned as-is; the engine is left
/// in its current phase and may be driven again.
#[instrument(skip_all, fields(party_index = engine.context().party_index()))]
pub async fn run_to_completion<E, T>(engine: &mut E, transport: &T) -> Result<E::Output>
where
    E: PhaseEngine,
    T: Transport + ?Sized,
{
    if engine.state() == EngineState::Init {
        let outgoing = engine.start()?;
        transport.deliver(outgoing).await?;
    }

    loop {
        let phase = match engine.state() {
            EngineState::Round(phase) => phase,
            state => {
                return Err(Error::SessionClosed(format!(
                    "session {} is {state:?}",
                    engine.context().session_hex()
                )))
            }
        };
        let session_id = *engine.context().session_id();
        let me = engine.context().party_index();
        let senders = engine.expected_senders();
        let incoming = transport.collect(&session_id, phase, me, &senders).await?;
        debug!(phase, received = incoming.len(), "Collected round");

        match engine.advance(incoming)? {
            Step::Continue(outgoing) => transport.deliver(outgoing).await?,
            Step::Complete(output) => return Ok(output),
        }
    }
}

/// Drive several engines of the same session concurrently over one
/// transport, returning their outputs in order
pub async fn run_all<E, T>(engines: &mut [E], transport: &T) -> Result<Vec<E::Output>>
where
    E: PhaseEngine,
    T: Transport + ?Sized,
{
    try_join_all(
        engines
            .iter_mut()
            .map(|engine| run_to_completion(engine, transport)),
    )
    .await
}
