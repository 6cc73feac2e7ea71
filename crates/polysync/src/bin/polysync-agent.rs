//! Polysync agent entry point.
//!
//! Discovers applications behind every configured integration on a fixed
//! cadence until interrupted.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use polysync::config::{ConfigLoader, DEFAULT_ENV_PREFIX};
use polysync::telemetry::{init_logging, init_metrics};
use polysync::Agent;

const DEFAULT_CONFIG_PATH: &str = "polysync.toml";
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Command-line arguments.
struct Args {
    /// Explicit configuration file.
    config: Option<PathBuf>,
}

impl Args {
    fn parse() -> Self {
        let mut config = None;

        for arg in std::env::args().skip(1) {
            match arg.as_str() {
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-V" => {
                    println!("polysync-agent {}", polysync::VERSION);
                    std::process::exit(0);
                }
                flag if flag.starts_with('-') => {
                    eprintln!("Unknown argument: {flag}");
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
                path => config = Some(PathBuf::from(path)),
            }
        }

        Self { config }
    }
}

fn print_help() {
    println!(
        r"Polysync agent - policy discovery across authorization backends

USAGE:
    polysync-agent [CONFIG]

ARGS:
    <CONFIG>    Configuration file, TOML or JSON (default: ./polysync.toml if present)

OPTIONS:
    -h, --help       Print help information
    -V, --version    Print version information

ENVIRONMENT VARIABLES:
    POLYSYNC__SCHEDULER__DELAY_MS            Discovery interval in milliseconds
    POLYSYNC__SCHEDULER__MAX_IN_FLIGHT       Concurrent discovery cap
    POLYSYNC__FANOUT__MAX_IN_FLIGHT          Concurrent lookups per fan-out
    POLYSYNC__TELEMETRY__LOGGING__LEVEL      Log filter, e.g. info or polysync=debug
    POLYSYNC__TELEMETRY__LOGGING__FORMAT     json or pretty
    POLYSYNC__TELEMETRY__METRICS__ENABLED    Serve Prometheus metrics
    POLYSYNC__TELEMETRY__METRICS__ADDR       Metrics listen address
"
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let loader = ConfigLoader::new().with_dotenv();
    let loader = match &args.config {
        Some(path) => loader
            .with_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => loader.with_optional_file(DEFAULT_CONFIG_PATH)?,
    };
    let config = loader
        .with_env_prefix(DEFAULT_ENV_PREFIX)
        .load()
        .context("invalid configuration")?;

    init_logging(&config.telemetry.logging).context("initializing logging")?;
    init_metrics(&config.telemetry.metrics).context("initializing metrics")?;

    info!(version = polysync::VERSION, "starting polysync agent");
    let agent = Agent::new(config).context("assembling agent")?;
    agent.start().context("starting discovery")?;

    wait_for_shutdown().await?;

    if !agent.shutdown(DRAIN_TIMEOUT).await {
        warn!(timeout_secs = DRAIN_TIMEOUT.as_secs(), "in-flight discovery abandoned");
    }
    Ok(())
}

async fn wait_for_shutdown() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate()).context("registering SIGTERM handler")?;
        let mut sigint = signal(SignalKind::interrupt()).context("registering SIGINT handler")?;

        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
            _ = sigint.recv() => info!("received SIGINT, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("waiting for Ctrl+C")?;
        info!("received Ctrl+C, shutting down");
    }

    Ok(())
}
