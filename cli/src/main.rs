//! `ting`: measure the round-trip latency between two Tor relays.
//!
//! Parses CLI arguments and `tingrc`, configures logging, then hands off
//! to [`ting_driver::run`]. Exits 0 on success or SIGINT (the driver
//! itself absorbs SIGINT into a graceful shutdown); non-zero on fatal
//! controller or configuration errors.

use clap::Parser;

use ting_config::{CliArgs, TingConfig};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level.to_level_filter())
        .parse_default_env()
        .init();

    let config = match TingConfig::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ting: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = ting_driver::run(config).await {
        log::error!("{e}");
        std::process::exit(1);
    }
}
