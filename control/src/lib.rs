//! An async adapter over the Tor control port: authenticate, configure,
//! build and tear down circuits, attach application streams to them, and
//! subscribe to the stream-lifecycle events Tor reports.
//!
//! [`Controller`] is a trait so `ting-circuit` and `ting-driver` can be
//! tested against [`mock::MockController`] instead of a running `tor`
//! process. [`TorController`] is the real implementation.

mod event;
mod monitor;
mod real;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

pub use event::{StreamEvent, StreamStatus};
pub use real::TorController;

use async_trait::async_trait;
use tokio::sync::broadcast;

use ting_error::TingError;
use ting_types::{CircuitId, Fingerprint, StreamId};

use event::RawEvent;

/// The operations ting needs from a Tor control connection.
#[async_trait]
pub trait Controller: Send + Sync {
    /// Authenticate to the control port. ting only supports the null
    /// authentication method (`CookieAuthentication 0` / no password),
    /// matching a locally-run measurement instance of Tor.
    async fn authenticate(&self) -> Result<(), TingError>;

    async fn set_conf(&self, key: &str, value: &str) -> Result<(), TingError>;

    /// Build a circuit through exactly `relays`, in order. When
    /// `await_build` is true, blocks until Tor reports the circuit as
    /// `BUILT` (or fails the call if it reports `FAILED`/`CLOSED` first).
    async fn new_circuit(
        &self,
        relays: &[Fingerprint],
        await_build: bool,
    ) -> Result<CircuitId, TingError>;

    /// Idempotent, best-effort: a circuit that is already gone is not an error.
    async fn close_circuit(&self, id: CircuitId) -> Result<(), TingError>;

    async fn attach_stream(&self, stream_id: StreamId, circuit_id: CircuitId) -> Result<(), TingError>;

    /// Idempotent, best-effort, same as `close_circuit`.
    async fn close_stream(&self, stream_id: StreamId) -> Result<(), TingError>;

    /// Subscribe to `STREAM` events. Each call returns an independent
    /// receiver; a slow subscriber only loses its own backlog.
    fn subscribe_stream_events(&self) -> StreamEventReceiver;
}

/// A filtered view over the control connection's event broadcast: yields
/// only `STREAM` events, silently skipping everything else (including a
/// lagged receiver, which just means some events were missed).
pub struct StreamEventReceiver {
    inner: broadcast::Receiver<RawEvent>,
}

impl StreamEventReceiver {
    pub(crate) fn new(inner: broadcast::Receiver<RawEvent>) -> Self {
        Self { inner }
    }

    /// Wait for the next `STREAM` event. Returns `None` once the
    /// controller's event channel has been closed (the connection is gone).
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        loop {
            match self.inner.recv().await {
                Ok(RawEvent::Stream(e)) => return Some(e),
                Ok(RawEvent::Circ(_)) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    log::warn!("stream event subscriber lagged by {n} events");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
