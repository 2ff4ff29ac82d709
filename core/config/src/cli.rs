//! Command-line surface, mirroring `ting/cli.py`'s argument set.

use std::path::PathBuf;

use clap::Parser;

/// Measure the round-trip latency between two Tor relays.
#[derive(Debug, Parser)]
#[command(name = "ting", version, about)]
pub struct CliArgs {
    /// Fingerprint of the first relay to measure.
    pub relay1: Option<String>,

    /// Fingerprint of the second relay to measure.
    pub relay2: Option<String>,

    /// Directory to write JSON-lines results into.
    #[arg(long = "output-file")]
    pub output_file: Option<PathBuf>,

    /// Port the local echo responder listens on.
    #[arg(long = "dest-port")]
    pub dest_port: Option<u16>,

    /// Samples to take per circuit.
    #[arg(long = "num-samples")]
    pub num_samples: Option<u32>,

    /// Times to repeat the measurement of each pair.
    #[arg(long = "num-repeats")]
    pub num_repeats: Option<u32>,

    /// Path to the tingrc config file.
    #[arg(long = "config-file", default_value = "./tingrc")]
    pub config_file: PathBuf,

    /// Path to a file of whitespace-separated relay pairs, one per line,
    /// or the literal value `random`.
    #[arg(long = "input-file")]
    pub input_file: Option<String>,

    /// Log verbosity.
    #[arg(long = "log-level", default_value = "info")]
    pub log_level: LogLevel,
}

/// Mirrors Python's `logging` level names used by `--log-level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[value(rename_all = "UPPER")]
pub enum LogLevel {
    Critical,
    Error,
    Warning,
    Info,
    Debug,
}

impl LogLevel {
    /// The equivalent `log::LevelFilter`. `Critical` has no direct
    /// counterpart in the `log` crate, so it maps to `Error`.
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Critical | LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warning => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
        }
    }
}
