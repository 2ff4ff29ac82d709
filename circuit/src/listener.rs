//! The stream-attach state machine (spec section 4.5.1): drives exactly
//! one Tor stream — the one our tunnel opens — onto our circuit.
//!
//! Runs as a spawned task holding its own filtered event subscription. The
//! `(cid, dest_port)` pair is captured at spawn time rather than read from
//! any shared mutable state, so two circuits building concurrently can
//! never have their listeners cross-attach a stream to the wrong id.

use std::sync::Arc;

use tokio::task::JoinHandle;

use ting_control::{Controller, StreamStatus};
use ting_types::CircuitId;

/// A handle to the spawned listener task. Dropping it does not stop the
/// task; call [`ListenerHandle::stop`] to unregister it deterministically.
pub struct ListenerHandle {
    task: JoinHandle<()>,
}

impl ListenerHandle {
    /// Stop the listener and wait for it to finish. Best-effort: any error
    /// here is not this circuit's to propagate.
    pub async fn stop(self) {
        self.task.abort();
        let _ = self.task.await;
    }

    /// Synchronous best-effort stop, for use from `Drop` where `.await` isn't
    /// available.
    pub fn abort(&self) {
        self.task.abort();
    }
}

/// Install the listener for circuit `cid`, filtering to streams whose
/// target port matches `dest_port`.
pub fn install(
    controller: Arc<dyn Controller>,
    cid: CircuitId,
    dest_port: u16,
) -> ListenerHandle {
    let mut events = controller.subscribe_stream_events();
    let task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if event.target_port != Some(dest_port) {
                continue;
            }
            match event.status {
                StreamStatus::New if event.purpose.as_deref() == Some("USER") => {
                    if let Err(e) = controller.attach_stream(event.stream_id, cid).await {
                        log::warn!(
                            "attach_stream({}, {cid}) failed, closing stream: {e}",
                            event.stream_id
                        );
                        let _ = controller.close_stream(event.stream_id).await;
                    }
                }
                StreamStatus::Detached if event.circ_id == Some(cid) => {
                    log::warn!(
                        "stream {} on circuit {cid} detached unexpectedly; not retrying",
                        event.stream_id
                    );
                }
                _ => {}
            }
        }
    });
    ListenerHandle { task }
}
