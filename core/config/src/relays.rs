//! Resolution of the relay fingerprint ↔ IP directory ting needs for
//! "random" job-queue mode and for resolving bare IPs passed on the CLI.
//!
//! Ports `TingClient.__parse_relay_list` / `__load_consensus` /
//! `__download_dummy_consensus`. The `internet` source fetches onionoo's
//! `details` endpoint directly over HTTPS (not through Tor — this is
//! public relay metadata, not measurement traffic) and caches the result;
//! `test` returns a small synthetic directory for local development
//! without network access; anything else is treated as a path to a
//! locally cached onionoo-shaped JSON file.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use rand::seq::IteratorRandom;
use serde::Deserialize;

use ting_error::TingError;
use ting_types::{Fingerprint, RelayPair};

const ONIONOO_URL: &str =
    "https://onionoo.torproject.org/details?type=relay&running=true&fields=nickname,fingerprint,or_addresses";

/// Where to obtain the relay directory from.
#[derive(Debug, Clone)]
pub enum RelaySource {
    Internet,
    Test,
    Path(PathBuf),
}

impl RelaySource {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "internet" => RelaySource::Internet,
            "test" => RelaySource::Test,
            _ => RelaySource::Path(PathBuf::from(s)),
        }
    }
}

/// A resolved fingerprint ↔ IP directory for one measurement session.
#[derive(Debug, Clone, Default)]
pub struct RelayDirectory {
    ip_to_fp: HashMap<String, Fingerprint>,
    fp_to_ip: HashMap<Fingerprint, String>,
}

impl RelayDirectory {
    pub fn len(&self) -> usize {
        self.fp_to_ip.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fp_to_ip.is_empty()
    }

    pub fn ip_for(&self, fp: &Fingerprint) -> Option<&str> {
        self.fp_to_ip.get(fp).map(String::as_str)
    }

    pub fn fingerprint_for_ip(&self, ip: &str) -> Option<&Fingerprint> {
        self.ip_to_fp.get(ip)
    }

    /// Draw a random pair of distinct relays, for the job queue's "random" mode.
    pub fn sample_pair(&self) -> Option<RelayPair> {
        let mut rng = rand::thread_rng();
        let mut it = self.fp_to_ip.keys();
        let first = it.clone().choose(&mut rng)?.clone();
        let second = it
            .filter(|fp| **fp != first)
            .choose(&mut rng)
            .cloned()
            .unwrap_or_else(|| first.clone());
        Some((first, second))
    }

    fn from_onionoo(data: OnionooResponse) -> Self {
        let mut dir = Self::default();
        for relay in data.relays {
            let Ok(fp) = Fingerprint::new(relay.fingerprint) else {
                continue;
            };
            if let Some(addr) = relay.or_addresses.first() {
                if let Some(ip) = addr.rsplit_once(':').map(|(ip, _)| ip.to_string()) {
                    dir.ip_to_fp.insert(ip.clone(), fp.clone());
                    dir.fp_to_ip.insert(fp, ip);
                }
            }
        }
        dir
    }

    fn synthetic_test_directory() -> Self {
        let mut dir = Self::default();
        let fp = Fingerprint::new("0".repeat(40)).expect("all-zero fingerprint is valid hex");
        dir.ip_to_fp.insert("127.0.0.1".to_string(), fp.clone());
        dir.fp_to_ip.insert(fp, "127.0.0.1".to_string());
        dir
    }
}

#[derive(Debug, Deserialize)]
struct OnionooResponse {
    relays: Vec<OnionooRelay>,
}

#[derive(Debug, Deserialize)]
struct OnionooRelay {
    fingerprint: String,
    #[serde(default)]
    or_addresses: Vec<String>,
}

/// Resolve the relay directory named by `source`, using `cache_dir` and
/// `cache_time` for the `Internet` source.
pub async fn resolve(
    source: &RelaySource,
    cache_dir: &Path,
    cache_time: Duration,
) -> Result<RelayDirectory, TingError> {
    match source {
        RelaySource::Test => Ok(RelayDirectory::synthetic_test_directory()),
        RelaySource::Path(path) => {
            let contents = std::fs::read_to_string(path).map_err(|e| {
                TingError::Config(format!("couldn't read relay list {}: {e}", path.display()))
            })?;
            let data: OnionooResponse = serde_json::from_str(&contents)
                .map_err(|e| TingError::Config(format!("malformed relay list: {e}")))?;
            Ok(RelayDirectory::from_onionoo(data))
        }
        RelaySource::Internet => resolve_internet(cache_dir, cache_time).await,
    }
}

async fn resolve_internet(
    cache_dir: &Path,
    cache_time: Duration,
) -> Result<RelayDirectory, TingError> {
    if let Some(cached) = freshest_cache_entry(cache_dir, cache_time)? {
        log::info!("using cached relay list {}", cached.display());
        let contents = std::fs::read_to_string(&cached)?;
        let data: OnionooResponse = serde_json::from_str(&contents)
            .map_err(|e| TingError::Config(format!("malformed cached relay list: {e}")))?;
        return Ok(RelayDirectory::from_onionoo(data));
    }

    log::info!("downloading current relay list (this may take a few seconds)");
    let body = reqwest::get(ONIONOO_URL)
        .await
        .map_err(|e| TingError::Config(format!("couldn't reach onionoo: {e}")))?
        .text()
        .await
        .map_err(|e| TingError::Config(format!("couldn't read onionoo response: {e}")))?;
    let data: OnionooResponse = serde_json::from_str(&body)
        .map_err(|e| TingError::Config(format!("malformed onionoo response: {e}")))?;

    write_cache_atomically(cache_dir, &body)?;

    Ok(RelayDirectory::from_onionoo(data))
}

fn freshest_cache_entry(cache_dir: &Path, cache_time: Duration) -> Result<Option<PathBuf>, TingError> {
    let Ok(read_dir) = std::fs::read_dir(cache_dir) else {
        return Ok(None);
    };
    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in read_dir.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Ok(meta) = entry.metadata() else { continue };
        let Ok(modified) = meta.modified() else { continue };
        let is_newer = match &newest {
            Some((t, _)) => modified > *t,
            None => true,
        };
        if is_newer {
            newest = Some((modified, path));
        }
    }
    match newest {
        Some((modified, path)) if modified.elapsed().unwrap_or(Duration::MAX) <= cache_time => {
            Ok(Some(path))
        }
        _ => Ok(None),
    }
}

fn write_cache_atomically(cache_dir: &Path, body: &str) -> Result<(), TingError> {
    std::fs::create_dir_all(cache_dir)?;
    let name = format!(
        "relays-{}.json",
        chrono_like_hour_stamp(SystemTime::now())
    );
    let final_path = cache_dir.join(name);
    let tmp_path = final_path.with_extension("json.tmp");

    let mut tmp = std::fs::File::create(&tmp_path)?;
    tmp.write_all(body.as_bytes())?;
    tmp.sync_all()?;
    std::fs::rename(&tmp_path, &final_path)?;
    Ok(())
}

/// `YY-MM-DD-HH`, computed from `SystemTime` without pulling in a datetime
/// crate: days since the epoch plus a civil-calendar conversion.
fn chrono_like_hour_stamp(now: SystemTime) -> String {
    let secs = now
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let (y, m, d, h) = civil_from_unix_secs(secs);
    format!("{:02}-{:02}-{:02}-{:02}", y % 100, m, d, h)
}

/// Howard Hinnant's days-from-civil algorithm, inverted, to turn a Unix
/// timestamp into a (year, month, day, hour) tuple without a timezone
/// database.
fn civil_from_unix_secs(secs: u64) -> (i64, u32, u32, u32) {
    let days = (secs / 86400) as i64;
    let rem_secs = secs % 86400;
    let hour = (rem_secs / 3600) as u32;

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

    (y, m, d, hour)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_relay_source_keywords() {
        assert!(matches!(RelaySource::parse("internet"), RelaySource::Internet));
        assert!(matches!(RelaySource::parse("Test"), RelaySource::Test));
        assert!(matches!(RelaySource::parse("./relays.json"), RelaySource::Path(_)));
    }

    #[test]
    fn synthetic_test_directory_has_one_entry() {
        let dir = RelayDirectory::synthetic_test_directory();
        assert_eq!(dir.len(), 1);
        assert!(dir.sample_pair().is_some());
    }

    #[test]
    fn from_onionoo_parses_ip_and_fingerprint() {
        let data = OnionooResponse {
            relays: vec![OnionooRelay {
                fingerprint: "A".repeat(40),
                or_addresses: vec!["203.0.113.5:443".to_string()],
            }],
        };
        let dir = RelayDirectory::from_onionoo(data);
        let fp = Fingerprint::new("A".repeat(40)).unwrap();
        assert_eq!(dir.ip_for(&fp), Some("203.0.113.5"));
        assert_eq!(dir.fingerprint_for_ip("203.0.113.5"), Some(&fp));
    }

    #[test]
    fn civil_date_matches_a_known_timestamp() {
        // 2024-01-15 08:00:00 UTC
        let (y, m, d, h) = civil_from_unix_secs(1_705_305_600);
        assert_eq!((y, m, d, h), (2024, 1, 15, 8));
    }

    #[tokio::test]
    async fn resolve_path_loads_a_local_onionoo_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relays.json");
        std::fs::write(
            &path,
            serde_json::json!({
                "relays": [{"fingerprint": "B".repeat(40), "or_addresses": ["198.51.100.9:9001"]}]
            })
            .to_string(),
        )
        .unwrap();

        let resolved = resolve(&RelaySource::Path(path), dir.path(), Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(resolved.len(), 1);
    }
}
