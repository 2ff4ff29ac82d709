//! The Circuit object, its stream-attach listener, the SOCKS5 tunnel
//! factory, and the template generator — together, the heart of a ting
//! measurement run (spec sections 4.4-4.6).

mod circuit;
mod client;
mod listener;
mod tunnel;

pub use circuit::{Circuit, CircuitConfig};
pub use client::Client;

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use ting_control::mock::MockController;
    use ting_control::{Controller, StreamStatus};
    use ting_types::{Endpoint, Fingerprint, StreamId};

    use super::*;

    fn fp(byte: char) -> Fingerprint {
        Fingerprint::new(byte.to_string().repeat(40)).unwrap()
    }

    fn config(socks_port: u16) -> CircuitConfig {
        CircuitConfig {
            max_build_attempts: 3,
            socks_port,
            socks_timeout: Duration::from_secs(2),
        }
    }

    #[tokio::test]
    async fn build_tears_down_partial_state_on_every_failed_attempt() {
        // No real SOCKS proxy listens in this test, so the tunnel-connect
        // step always fails after new_circuit succeeds. With
        // max_build_attempts exhausted, build() must fail, and by then
        // every circuit it opened along the way must have been closed
        // again -- nothing left dangling on the mock controller.
        let controller = Arc::new(MockController::new());
        let mut circuit = Circuit::new(
            controller.clone(),
            vec![fp('1'), fp('2'), fp('3')],
            ting_types::TingLeg::X,
            Endpoint::new("127.0.0.1", 1),
            config(1),
        );
        let result = circuit.build().await;
        assert!(result.is_err());
        assert_eq!(controller.open_circuit_count().await, 0);
        assert_eq!(controller.closed_circuits().await.len(), 3);
    }

    #[tokio::test]
    async fn listener_attaches_new_user_streams_to_the_right_circuit() {
        let controller = Arc::new(MockController::new());
        let cid = controller.new_circuit(&[], false).await.unwrap();
        let handle = listener::install(controller.clone(), cid, 16667);

        controller.emit_stream_event(ting_control::StreamEvent {
            stream_id: StreamId(7),
            status: StreamStatus::New,
            circ_id: None,
            target_port: Some(16667),
            purpose: Some("USER".into()),
        });

        // Give the spawned listener task a chance to run.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let calls = controller.attach_calls().await;
        assert_eq!(calls, vec![(StreamId(7), cid)]);

        handle.stop().await;
    }

    #[tokio::test]
    async fn listener_ignores_streams_on_a_different_port() {
        let controller = Arc::new(MockController::new());
        let cid = controller.new_circuit(&[], false).await.unwrap();
        let handle = listener::install(controller.clone(), cid, 16667);

        controller.emit_stream_event(ting_control::StreamEvent {
            stream_id: StreamId(7),
            status: StreamStatus::New,
            circ_id: None,
            target_port: Some(9999),
            purpose: Some("USER".into()),
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(controller.attach_calls().await.is_empty());

        handle.stop().await;
    }
}
