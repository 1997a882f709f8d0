use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use telemhub_relay::config::default_config_path;
use telemhub_relay::{Overrides, Relay, RelayConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "telemhub")]
#[command(about = "Live telemetry relay: aggregate, fan out and forward drone telemetry")]
#[command(version)]
struct Args {
    /// Path to a TOML config file (default: ./telemhub.toml if present)
    #[arg(short, long, env = "TELEMHUB_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log filter {:?}", level))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let path = args.config.or_else(default_config_path);
    let mut config = RelayConfig::load(path.as_deref())?;
    config.apply(&args.overrides);

    init_logging(&config.log_level)?;
    if let Some(path) = &path {
        info!(path = %path.display(), "loaded configuration");
    }

    let relay = Relay::start(&config).await?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for ctrl-c")?;
            info!("interrupt received, shutting down");
        }
        _ = relay.finished() => {
            info!("event source finished, shutting down");
        }
    }

    relay.shutdown().await;
    Ok(())
}
