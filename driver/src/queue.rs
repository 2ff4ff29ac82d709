//! The job queue (spec section 4.8): a FIFO of pending relay pairs, seeded
//! once at startup from the CLI pair, an input file, or "random" mode, and
//! drained with a 5s blocking read — mirroring `queue.Queue().get(True, 5)`
//! in the original implementation.

use std::time::Duration;

use ting_config::{RelayDirectory, TingConfig};
use ting_error::TingError;
use ting_types::{Fingerprint, RelayPair};
use tokio::sync::mpsc;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// The in-memory FIFO of pairs still to be measured.
pub struct JobQueue {
    rx: mpsc::UnboundedReceiver<RelayPair>,
}

impl JobQueue {
    /// Build a queue already containing `pairs`, in order.
    pub fn seed(pairs: Vec<RelayPair>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        for pair in pairs {
            // The receiver always outlives this loop, so send cannot fail.
            let _ = tx.send(pair);
        }
        Self { rx }
    }

    /// Block up to 5s for the next pair. `None` means the queue has been
    /// empty for that long, which ends the run.
    pub async fn next(&mut self) -> Option<RelayPair> {
        match tokio::time::timeout(READ_TIMEOUT, self.rx.recv()).await {
            Ok(Some(pair)) => Some(pair),
            Ok(None) | Err(_) => None,
        }
    }
}

/// Resolve the initial set of pairs from `config`, in priority order: a
/// single CLI pair, then an input file (or the literal `random` mode
/// sampling from `relays`).
pub fn seed_pairs(config: &TingConfig, relays: &RelayDirectory) -> Result<Vec<RelayPair>, TingError> {
    if let Some((r1, r2)) = &config.pair {
        let r1 = Fingerprint::new(r1.clone())
            .map_err(|e| TingError::Config(format!("relay1 {e}")))?;
        let r2 = Fingerprint::new(r2.clone())
            .map_err(|e| TingError::Config(format!("relay2 {e}")))?;
        return Ok(vec![(r1, r2)]);
    }

    match config.input_file.as_deref() {
        Some("random") => {
            let pair = relays.sample_pair().ok_or_else(|| {
                TingError::Config(
                    "random mode needs at least two relays in the resolved directory".into(),
                )
            })?;
            Ok(vec![pair])
        }
        Some(path) => parse_pair_file(path),
        None => Err(TingError::Config(
            "no relay pair given: pass relay1/relay2 on the command line, \
             --input-file, or set InputFile in tingrc"
                .into(),
        )),
    }
}

fn parse_pair_file(path: &str) -> Result<Vec<RelayPair>, TingError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| TingError::Config(format!("couldn't read input file {path}: {e}")))?;
    let mut pairs = Vec::new();
    for line in contents.lines() {
        let mut tokens = line.split_whitespace();
        let (Some(a), Some(b)) = (tokens.next(), tokens.next()) else {
            continue;
        };
        let r1 = Fingerprint::new(a)
            .map_err(|e| TingError::Config(format!("input file entry {a:?}: {e}")))?;
        let r2 = Fingerprint::new(b)
            .map_err(|e| TingError::Config(format!("input file entry {b:?}: {e}")))?;
        pairs.push((r1, r2));
    }
    Ok(pairs)
}
