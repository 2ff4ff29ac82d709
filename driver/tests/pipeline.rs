//! Integration test covering the job queue and result sink together, the
//! way one full `ting` invocation chains them: pairs go in one end,
//! JSON-lines results come out the other.

use ting_config::{RelaySource, TingConfig};
use ting_driver::{seed_pairs, JobQueue, LegSamples, PairOutcome, ResultSink};
use ting_types::{Fingerprint, Sample};

fn fp(byte: char) -> Fingerprint {
    Fingerprint::new(byte.to_string().repeat(40)).unwrap()
}

fn base_config(results_directory: std::path::PathBuf) -> TingConfig {
    TingConfig {
        w: fp('a'),
        z: fp('b'),
        source_addr: None,
        destination_addr: "127.0.0.1".into(),
        destination_port: 16667,
        controller_port: 8008,
        socks_port: 9008,
        socks_timeout: std::time::Duration::from_secs(60),
        max_circuit_build_attempts: 5,
        num_samples: 1,
        num_repeats: 1,
        relay_source: RelaySource::Test,
        relay_cache_time: std::time::Duration::from_secs(3600),
        results_directory,
        input_file: None,
        pair: Some(("1".repeat(40), "2".repeat(40))),
        log_level: ting_config::LogLevel::Info,
    }
}

#[tokio::test]
async fn seeded_pair_drains_through_the_queue_and_lands_in_the_sink() {
    let dir = tempfile::tempdir().unwrap();
    let config = base_config(dir.path().join("results"));
    let relays = ting_config::relays::resolve(
        &config.relay_source,
        dir.path(),
        config.relay_cache_time,
    )
    .await
    .unwrap();

    let pairs = seed_pairs(&config, &relays).unwrap();
    assert_eq!(pairs.len(), 1);

    let mut queue = JobQueue::seed(pairs);
    let mut sink = ResultSink::open(&config.results_directory, std::time::SystemTime::now()).unwrap();

    let mut written = 0;
    while let Some((r1, r2)) = queue.next().await {
        let mut legs = LegSamples::default();
        legs.x.push(Sample::new(0.01, 0.01));
        legs.y.push(Sample::new(0.02, 0.02));
        legs.xy.push(Sample::new(0.03, 0.03));
        let outcome = PairOutcome::Completed {
            rtt_estimate_s: legs.rtt_estimate_s(),
            r1,
            r2,
            samples: legs,
        };
        sink.write(&outcome).unwrap();
        written += 1;
    }
    assert_eq!(written, 1);

    let entries: Vec<_> = std::fs::read_dir(&config.results_directory).unwrap().collect();
    assert_eq!(entries.len(), 1);
    let contents = std::fs::read_to_string(entries[0].as_ref().unwrap().path()).unwrap();
    assert_eq!(contents.lines().count(), 1);
    let parsed: serde_json::Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
    assert_eq!(parsed["status"], "completed");
    assert!(parsed["rtt_estimate_s"].is_number());
}

#[tokio::test]
async fn random_mode_without_a_relay_pair_errors_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = base_config(dir.path().join("results"));
    config.pair = None;
    config.input_file = Some("random".into());

    let relays = ting_config::RelayDirectory::default();
    assert!(seed_pairs(&config, &relays).is_err());
}
