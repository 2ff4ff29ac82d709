//! The measurement driver (spec sections 4.7-4.9): wires the echo
//! responder, the Tor controller, the job queue, and the result sink
//! into the top-level run loop a `ting` invocation executes.

mod notify;
mod queue;
mod sink;
mod types;

pub use queue::{seed_pairs, JobQueue};
pub use sink::ResultSink;
pub use types::{LegSamples, PairOutcome};

use std::sync::Arc;
use std::time::SystemTime;

use tokio_util::sync::CancellationToken;

use ting_circuit::{Circuit, CircuitConfig, Client};
use ting_config::TingConfig;
use ting_control::{Controller, TorController};
use ting_error::TingError;
use ting_responder::EchoResponder;
use ting_types::{Endpoint, RelayPair, TingLeg};

/// Consecutive-failure threshold (spec section 4.9) before an operator
/// notification fires.
const CONSECUTIVE_FAILURE_THRESHOLD_PAIRS: u32 = 5;

/// Run one full ting session to completion: resolve the relay directory,
/// bind the responder, connect the controller, then drain the job queue
/// until it runs dry or `shutdown` is cancelled.
pub async fn run(config: TingConfig) -> Result<(), TingError> {
    let relays = ting_config::relays::resolve(
        &config.relay_source,
        std::path::Path::new(".ting-cache"),
        config.relay_cache_time,
    )
    .await?;

    let mut queue = JobQueue::seed(queue::seed_pairs(&config, &relays)?);

    let responder = EchoResponder::bind(Endpoint::new(
        config.source_addr.clone().unwrap_or_else(|| "0.0.0.0".into()),
        config.destination_port,
    ))
    .await?;
    let dest = Endpoint::new(config.destination_addr.clone(), responder.endpoint().port);

    let controller: Arc<dyn Controller> = Arc::new(TorController::connect(config.controller_port).await?);
    controller.authenticate().await?;
    // Session-start invariants (spec.md §3/§4.3): Tor must not build circuits
    // of its own, and must not auto-attach streams to whatever circuit is
    // current — every stream is attached explicitly by the listener.
    controller.set_conf("__DisablePredictedCircuits", "1").await?;
    controller.set_conf("__LeaveStreamsUnattached", "1").await?;

    let circuit_config = CircuitConfig {
        max_build_attempts: config.max_circuit_build_attempts,
        socks_port: config.socks_port,
        socks_timeout: config.socks_timeout,
    };
    let client = Client::new(
        controller.clone(),
        config.w.clone(),
        config.z.clone(),
        dest,
        circuit_config,
    );

    let mut sink = ResultSink::open(&config.results_directory, SystemTime::now())?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("SIGINT received, finishing the in-flight pair then exiting");
            signal_token.cancel();
        }
    });

    let mut consecutive_failures = 0u32;

    loop {
        if shutdown.is_cancelled() {
            log::info!("shutdown requested, not drawing another pair from the queue");
            break;
        }

        let pair = tokio::select! {
            pair = queue.next() => pair,
            _ = shutdown.cancelled() => None,
        };
        let Some(pair) = pair else {
            break;
        };

        log::info!("measuring pair {}->{}", pair.0, pair.1);
        match measure_pair(&client, &pair, config.num_samples, config.num_repeats, &shutdown).await {
            Ok(samples) => {
                consecutive_failures = 0;
                let outcome = PairOutcome::Completed {
                    r1: pair.0.clone(),
                    r2: pair.1.clone(),
                    rtt_estimate_s: samples.rtt_estimate_s(),
                    samples,
                };
                if let Err(e) = sink.write(&outcome) {
                    log::error!("failed to write result for {}->{}: {e}", pair.0, pair.1);
                }
            }
            Err(e) => {
                consecutive_failures += 1;
                log::warn!("pair {}->{} failed: {e}", pair.0, pair.1);
                let outcome = PairOutcome::Error {
                    r1: pair.0.clone(),
                    r2: pair.1.clone(),
                    message: e.to_string(),
                };
                if let Err(e) = sink.write(&outcome) {
                    log::error!("failed to write error record for {}->{}: {e}", pair.0, pair.1);
                }
                if consecutive_failures >= CONSECUTIVE_FAILURE_THRESHOLD_PAIRS {
                    notify::consecutive_pair_failures(consecutive_failures, &pair);
                    consecutive_failures = 0;
                }
            }
        }
    }

    responder.shutdown().await;
    Ok(())
}

/// Run all `num_repeats` iterations for one pair, accumulating every
/// circuit's samples. A circuit build failure aborts the whole pair; a
/// sampling failure just ends that circuit's sampling early (spec section
/// 4.9) and moves on to the next circuit.
async fn measure_pair(
    client: &Client,
    pair: &RelayPair,
    num_samples: u32,
    num_repeats: u32,
    shutdown: &CancellationToken,
) -> Result<LegSamples, TingError> {
    let mut legs = LegSamples::default();

    for repeat in 0..num_repeats.max(1) {
        if shutdown.is_cancelled() {
            break;
        }
        log::debug!("pair {}->{}: iteration {}/{}", pair.0, pair.1, repeat + 1, num_repeats.max(1));

        for mut circuit in client.template_gen(pair) {
            let leg = circuit.leg();
            circuit.build().await?;
            let samples = sample_circuit(&mut circuit, num_samples, shutdown).await;
            circuit.close().await;

            match leg {
                TingLeg::X => legs.x.extend(samples),
                TingLeg::Y => legs.y.extend(samples),
                TingLeg::Xy => legs.xy.extend(samples),
            }
        }
    }

    Ok(legs)
}

/// Sample a built circuit up to `num_samples` times. The first socket or
/// decode error ends sampling on this circuit without failing the pair.
async fn sample_circuit(
    circuit: &mut Circuit,
    num_samples: u32,
    shutdown: &CancellationToken,
) -> Vec<ting_types::Sample> {
    let mut samples = Vec::new();
    for _ in 0..num_samples.max(1) {
        if shutdown.is_cancelled() {
            break;
        }
        match circuit.sample().await {
            Ok(sample) => samples.push(sample),
            Err(e) => {
                log::warn!("sample on leg {} failed, ending this circuit's sampling: {e}", circuit.leg());
                break;
            }
        }
    }
    samples
}

#[cfg(test)]
mod tests {
    use super::*;
    use ting_control::mock::MockController;
    use ting_types::Fingerprint;

    fn fp(byte: char) -> Fingerprint {
        Fingerprint::new(byte.to_string().repeat(40)).unwrap()
    }

    /// Spec §8 scenario 4: a controller whose circuit builds always fail
    /// must surface a `CircuitBuildFailed`-derived error for that pair
    /// without stopping the queue from draining the next one.
    #[tokio::test]
    async fn a_pair_that_never_builds_records_an_error_and_the_queue_keeps_draining() {
        let controller: Arc<dyn Controller> = Arc::new(MockController::always_fails_build());
        let circuit_config = CircuitConfig {
            max_build_attempts: 1,
            socks_port: 1,
            socks_timeout: std::time::Duration::from_millis(50),
        };
        let client = Client::new(
            controller,
            fp('a'),
            fp('b'),
            Endpoint::new("127.0.0.1", 1),
            circuit_config,
        );

        let mut queue = JobQueue::seed(vec![(fp('1'), fp('2')), (fp('3'), fp('4'))]);
        let shutdown = CancellationToken::new();
        let mut outcomes = Vec::new();

        while let Some(pair) = queue.next().await {
            let outcome = match measure_pair(&client, &pair, 1, 1, &shutdown).await {
                Ok(samples) => PairOutcome::Completed {
                    r1: pair.0.clone(),
                    r2: pair.1.clone(),
                    rtt_estimate_s: samples.rtt_estimate_s(),
                    samples,
                },
                Err(e) => PairOutcome::Error {
                    r1: pair.0.clone(),
                    r2: pair.1.clone(),
                    message: e.to_string(),
                },
            };
            outcomes.push(outcome);
        }

        assert_eq!(outcomes.len(), 2, "the queue must keep draining after a pair-level failure");
        assert!(outcomes.iter().all(|o| matches!(o, PairOutcome::Error { .. })));
    }
}
