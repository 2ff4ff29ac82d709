//! The result sink (spec section 4.8): append-only JSON-lines into
//! `results/YYYY-MM-DD.json`, flushed after every write so a crash loses
//! at most the in-flight pair.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::SystemTime;

use ting_error::TingError;

use crate::types::PairOutcome;

pub struct ResultSink {
    file: File,
}

impl ResultSink {
    /// Open (creating if needed) today's results file under
    /// `results_directory`.
    pub fn open(results_directory: &Path, now: SystemTime) -> Result<Self, TingError> {
        std::fs::create_dir_all(results_directory)?;
        let path = results_directory.join(format!("{}.json", day_stamp(now)));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(TingError::Io)?;
        Ok(Self { file })
    }

    /// Append one outcome as a single JSON line, flushing immediately.
    pub fn write(&mut self, outcome: &PairOutcome) -> Result<(), TingError> {
        let mut line = serde_json::to_string(outcome)
            .map_err(|e| TingError::Config(format!("couldn't serialize result: {e}")))?;
        line.push('\n');
        self.file.write_all(line.as_bytes())?;
        self.file.flush()?;
        Ok(())
    }
}

/// `YYYY-MM-DD`, computed the same way as `ting_config::relays`'s cache
/// stamp but without truncating the year or including an hour.
fn day_stamp(now: SystemTime) -> String {
    let secs = now
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let days = (secs / 86400) as i64;
    let z = days + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = (z - era * 146097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let y = if m <= 2 { y + 1 } else { y };
    format!("{y:04}-{m:02}-{d:02}")
}
