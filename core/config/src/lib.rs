//! Configuration surface for ting: the `tingrc` file format, the CLI
//! argument struct, and relay-directory resolution.
//!
//! Ports `ting/cli.py`'s config-file read + CLI override table.

pub mod cli;
pub mod relays;
mod tingrc;

use std::path::PathBuf;
use std::time::Duration;

pub use cli::{CliArgs, LogLevel};
pub use relays::{RelayDirectory, RelaySource};

use ting_error::TingError;
use ting_types::Fingerprint;

const DEFAULT_CONTROLLER_PORT: u16 = 8008;
const DEFAULT_SOCKS_PORT: u16 = 9008;
const DEFAULT_SOCKS_TIMEOUT_S: u64 = 60;
const DEFAULT_DEST_PORT: u16 = 16667;
const DEFAULT_MAX_BUILD_ATTEMPTS: u32 = 5;
const DEFAULT_RELAY_CACHE_HOURS: u64 = 24;

/// The fully resolved configuration for one run: `tingrc` merged with CLI
/// overrides.
#[derive(Debug, Clone)]
pub struct TingConfig {
    pub w: Fingerprint,
    pub z: Fingerprint,
    pub source_addr: Option<String>,
    pub destination_addr: String,
    pub destination_port: u16,
    pub controller_port: u16,
    pub socks_port: u16,
    pub socks_timeout: Duration,
    pub max_circuit_build_attempts: u32,
    pub num_samples: u32,
    pub num_repeats: u32,
    pub relay_source: RelaySource,
    pub relay_cache_time: Duration,
    pub results_directory: PathBuf,
    pub input_file: Option<String>,
    pub pair: Option<(String, String)>,
    pub log_level: LogLevel,
}

impl TingConfig {
    /// Read the `tingrc` named by `args.config_file`, then apply CLI
    /// overrides, matching `ting/cli.py`'s `arg_overrides` table.
    pub fn load(args: &CliArgs) -> Result<Self, TingError> {
        let raw = tingrc::parse_file(&args.config_file)?;

        let get = |key: &str| raw.get(key).cloned();
        let get_u16 = |key: &str| get(key).and_then(|v| v.parse().ok());
        let get_u32 = |key: &str| get(key).and_then(|v| v.parse().ok());
        let get_u64 = |key: &str| get(key).and_then(|v| v.parse().ok());

        let w = get("W").ok_or_else(|| {
            TingError::Config("tingrc is missing the mandatory 'W' anchor fingerprint".into())
        })?;
        let z = get("Z").ok_or_else(|| {
            TingError::Config("tingrc is missing the mandatory 'Z' anchor fingerprint".into())
        })?;
        let w = Fingerprint::new(w)
            .map_err(|e| TingError::Config(format!("tingrc 'W' is invalid: {e}")))?;
        let z = Fingerprint::new(z)
            .map_err(|e| TingError::Config(format!("tingrc 'Z' is invalid: {e}")))?;

        let num_samples = args
            .num_samples
            .or_else(|| get_u32("NumSamples"))
            .unwrap_or(1);
        let num_repeats = args
            .num_repeats
            .or_else(|| get_u32("NumRepeats"))
            .unwrap_or(1);
        let destination_port = args
            .dest_port
            .or_else(|| get_u16("DestinationPort"))
            .unwrap_or(DEFAULT_DEST_PORT);
        let results_directory = args
            .output_file
            .clone()
            .or_else(|| get("ResultsDirectory").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("results"));
        let input_file = args.input_file.clone().or_else(|| get("InputFile"));

        let pair = match (&args.relay1, &args.relay2) {
            (Some(r1), Some(r2)) => Some((r1.clone(), r2.clone())),
            _ => None,
        };

        Ok(Self {
            w,
            z,
            source_addr: get("SourceAddr"),
            destination_addr: get("DestinationAddr").unwrap_or_else(|| "127.0.0.1".to_string()),
            destination_port,
            controller_port: get_u16("ControllerPort").unwrap_or(DEFAULT_CONTROLLER_PORT),
            socks_port: get_u16("SocksPort").unwrap_or(DEFAULT_SOCKS_PORT),
            socks_timeout: Duration::from_secs(
                get_u64("SocksTimeout").unwrap_or(DEFAULT_SOCKS_TIMEOUT_S),
            ),
            max_circuit_build_attempts: get_u32("MaxCircuitBuildAttempts")
                .unwrap_or(DEFAULT_MAX_BUILD_ATTEMPTS),
            num_samples,
            num_repeats,
            relay_source: RelaySource::parse(&get("RelayList").unwrap_or_else(|| "test".into())),
            relay_cache_time: Duration::from_secs(
                3600 * get_u64("RelayCacheTime").unwrap_or(DEFAULT_RELAY_CACHE_HOURS),
            ),
            results_directory,
            input_file,
            pair,
            log_level: args.log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn write_rc(dir: &std::path::Path, contents: &str) -> PathBuf {
        let path = dir.join("tingrc");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn missing_w_or_z_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_rc(dir.path(), "Z 1111111111111111111111111111111111111111\n");
        let args = CliArgs::parse_from(["ting", "--config-file", path.to_str().unwrap()]);
        assert!(TingConfig::load(&args).is_err());
    }

    #[test]
    fn cli_overrides_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_rc(
            dir.path(),
            "W 1111111111111111111111111111111111111111\nZ 2222222222222222222222222222222222222222\nNumSamples 5\n",
        );
        let args = CliArgs::parse_from([
            "ting",
            "--config-file",
            path.to_str().unwrap(),
            "--num-samples",
            "9",
        ]);
        let cfg = TingConfig::load(&args).unwrap();
        assert_eq!(cfg.num_samples, 9);
    }

    #[test]
    fn defaults_match_spec() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_rc(
            dir.path(),
            "W 1111111111111111111111111111111111111111\nZ 2222222222222222222222222222222222222222\n",
        );
        let args = CliArgs::parse_from(["ting", "--config-file", path.to_str().unwrap()]);
        let cfg = TingConfig::load(&args).unwrap();
        assert_eq!(cfg.destination_port, 16667);
        assert_eq!(cfg.controller_port, 8008);
        assert_eq!(cfg.socks_port, 9008);
        assert_eq!(cfg.max_circuit_build_attempts, 5);
    }
}
