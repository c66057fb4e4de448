//! Startup gate for the mesh.
//!
//! Waits until every configured infrastructure component accepts TCP
//! connections and, with `--services`, every mesh service accepts a gRPC
//! connection on each of its ports. Exits non-zero if that does not happen
//! within `--max-rounds` rounds.
//!
//! # Usage
//!
//! ```bash
//! # Check components from ./meshlink.toml, retrying for up to five minutes
//! meshlink-check
//!
//! # Explicit config, mesh services too, ten rounds two seconds apart
//! meshlink-check --config /etc/meshlink/config.toml --services --max-rounds 10 --interval 2s
//!
//! # Environment overrides config file values
//! MESHLINK__RPC__LISTEN_IP=10.0.0.4 meshlink-check --services
//! ```

mod checks;
mod settings;

use std::{io::IsTerminal, path::PathBuf, process::ExitCode, time::Duration};

use clap::{Parser, ValueEnum};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::checks::Checker;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
enum LogFormat {
    /// JSON when stdout is not a terminal, text otherwise.
    #[default]
    Auto,
    /// Human-readable text.
    Text,
    /// One JSON object per line.
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "meshlink-check", version, about)]
struct Cli {
    /// Configuration file (TOML).
    #[arg(short, long, env = "MESHLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Rounds to attempt before giving up (at least 1).
    #[arg(
        long,
        default_value_t = 300,
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
    )]
    max_rounds: usize,

    /// Pause between rounds, e.g. `1s` or `500ms`.
    #[arg(long, default_value = "1s", value_parser = humantime::parse_duration)]
    interval: Duration,

    /// Also check every mesh service in the topology.
    #[arg(long)]
    services: bool,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Auto)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    let config = match settings::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        },
    };

    let checker = match Checker::from_config(&config, cli.services) {
        Ok(checker) => checker,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        },
    };

    tracing::info!(
        checks = checker.checks().len(),
        max_rounds = cli.max_rounds,
        interval = %humantime::format_duration(cli.interval),
        "waiting for components"
    );

    match checker.run(cli.max_rounds, cli.interval).await {
        Ok(()) => {
            tracing::info!("all components started successfully");
            ExitCode::SUCCESS
        },
        Err(e) => {
            tracing::error!(error = %e, "components did not become ready");
            ExitCode::FAILURE
        },
    }
}

/// Initializes the tracing subscriber.
///
/// `RUST_LOG` overrides the default `info` filter.
fn init_logging(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = match format {
        LogFormat::Json => true,
        LogFormat::Text => false,
        LogFormat::Auto => !std::io::stdout().is_terminal(),
    };

    if use_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().flatten_event(true).with_current_span(false))
            .init();
    } else {
        tracing_subscriber::registry().with(env_filter).with(fmt::layer()).init();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_match_documented_values() {
        let cli = Cli::try_parse_from(["meshlink-check"]).unwrap();
        assert_eq!(cli.max_rounds, 300);
        assert_eq!(cli.interval, Duration::from_secs(1));
        assert!(!cli.services);
        assert_eq!(cli.log_format, LogFormat::Auto);
    }

    #[test]
    fn zero_max_rounds_is_rejected() {
        assert!(Cli::try_parse_from(["meshlink-check", "--max-rounds", "0"]).is_err());
        let cli = Cli::try_parse_from(["meshlink-check", "--max-rounds", "1"]).unwrap();
        assert_eq!(cli.max_rounds, 1);
    }

    #[test]
    fn interval_accepts_humantime() {
        let cli = Cli::try_parse_from(["meshlink-check", "--interval", "250ms", "--services"]).unwrap();
        assert_eq!(cli.interval, Duration::from_millis(250));
        assert!(cli.services);
    }
}
