//! An in-memory [`Controller`] for exercising `ting-circuit` and
//! `ting-driver` without a running `tor` process.

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};

use ting_error::TingError;
use ting_types::{CircuitId, Fingerprint, StreamId};

use crate::event::{RawEvent, StreamEvent};
use crate::{Controller, StreamEventReceiver};

struct Inner {
    next_circuit_id: u64,
    open_circuits: HashSet<CircuitId>,
    closed_circuits: Vec<CircuitId>,
    attach_calls: Vec<(StreamId, CircuitId)>,
    build_failures_remaining: u32,
    fail_permanently: bool,
}

/// A fake control connection whose circuit builds always succeed, unless
/// configured otherwise with [`MockController::with_build_failures`] or
/// [`MockController::always_fails_build`].
pub struct MockController {
    inner: Mutex<Inner>,
    events: broadcast::Sender<RawEvent>,
}

impl MockController {
    pub fn new() -> Self {
        let (events, _unused) = broadcast::channel(256);
        Self {
            inner: Mutex::new(Inner {
                next_circuit_id: 0,
                open_circuits: HashSet::new(),
                closed_circuits: Vec::new(),
                attach_calls: Vec::new(),
                build_failures_remaining: 0,
                fail_permanently: false,
            }),
            events,
        }
    }

    /// `new_circuit` fails the first `n` times it is called, then succeeds.
    pub fn with_build_failures(n: u32) -> Self {
        let c = Self::new();
        c.inner.blocking_lock().build_failures_remaining = n;
        c
    }

    /// `new_circuit` always fails.
    pub fn always_fails_build() -> Self {
        let c = Self::new();
        c.inner.blocking_lock().fail_permanently = true;
        c
    }

    /// Inject a synthetic `STREAM` event, as if Tor had reported one.
    pub fn emit_stream_event(&self, event: StreamEvent) {
        let _ = self.events.send(RawEvent::Stream(event));
    }

    pub async fn attach_calls(&self) -> Vec<(StreamId, CircuitId)> {
        self.inner.lock().await.attach_calls.clone()
    }

    pub async fn closed_circuits(&self) -> Vec<CircuitId> {
        self.inner.lock().await.closed_circuits.clone()
    }

    pub async fn open_circuit_count(&self) -> usize {
        self.inner.lock().await.open_circuits.len()
    }
}

impl Default for MockController {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Controller for MockController {
    async fn authenticate(&self) -> Result<(), TingError> {
        Ok(())
    }

    async fn set_conf(&self, _key: &str, _value: &str) -> Result<(), TingError> {
        Ok(())
    }

    async fn new_circuit(
        &self,
        _relays: &[Fingerprint],
        _await_build: bool,
    ) -> Result<CircuitId, TingError> {
        let mut inner = self.inner.lock().await;
        if inner.fail_permanently {
            return Err(TingError::CircuitBuildFailed {
                attempts: 1,
                cause: "mock controller is configured to always fail circuit builds".into(),
            });
        }
        if inner.build_failures_remaining > 0 {
            inner.build_failures_remaining -= 1;
            return Err(TingError::CircuitBuildFailed {
                attempts: 1,
                cause: "mock controller: scripted build failure".into(),
            });
        }
        inner.next_circuit_id += 1;
        let id = CircuitId(inner.next_circuit_id);
        inner.open_circuits.insert(id);
        Ok(id)
    }

    async fn close_circuit(&self, id: CircuitId) -> Result<(), TingError> {
        let mut inner = self.inner.lock().await;
        inner.open_circuits.remove(&id);
        inner.closed_circuits.push(id);
        Ok(())
    }

    async fn attach_stream(&self, stream_id: StreamId, circuit_id: CircuitId) -> Result<(), TingError> {
        self.inner.lock().await.attach_calls.push((stream_id, circuit_id));
        Ok(())
    }

    async fn close_stream(&self, _stream_id: StreamId) -> Result<(), TingError> {
        Ok(())
    }

    fn subscribe_stream_events(&self) -> StreamEventReceiver {
        StreamEventReceiver::new(self.events.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::StreamStatus;

    #[tokio::test]
    async fn new_circuit_assigns_increasing_ids() {
        let ctl = MockController::new();
        let a = ctl.new_circuit(&[], false).await.unwrap();
        let b = ctl.new_circuit(&[], false).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(ctl.open_circuit_count().await, 2);
    }

    #[tokio::test]
    async fn scripted_failures_are_exhausted_then_succeed() {
        let ctl = MockController::with_build_failures(2);
        assert!(ctl.new_circuit(&[], false).await.is_err());
        assert!(ctl.new_circuit(&[], false).await.is_err());
        assert!(ctl.new_circuit(&[], false).await.is_ok());
    }

    #[tokio::test]
    async fn close_circuit_moves_id_to_closed_list() {
        let ctl = MockController::new();
        let id = ctl.new_circuit(&[], false).await.unwrap();
        ctl.close_circuit(id).await.unwrap();
        assert_eq!(ctl.open_circuit_count().await, 0);
        assert_eq!(ctl.closed_circuits().await, vec![id]);
    }

    #[tokio::test]
    async fn subscribers_receive_injected_stream_events() {
        let ctl = MockController::new();
        let mut rx = ctl.subscribe_stream_events();
        ctl.emit_stream_event(StreamEvent {
            stream_id: StreamId(1),
            status: StreamStatus::New,
            circ_id: None,
            target_port: Some(16667),
            purpose: Some("USER".into()),
        });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.stream_id, StreamId(1));
        assert_eq!(event.target_port, Some(16667));
    }
}
