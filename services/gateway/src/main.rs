// gateway: long-running process hosting the industrial protocol gateway's
// northbound contract. No REST/WebSocket surface of its own (out of scope);
// an external transport layer embeds `gateway::bootstrap::build`.

use gateway::{bootstrap, config};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const CONFIG_PATH: &str = "/etc/industrial-gateway/gateway.toml";

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "gateway starting");

    let cfg = match config::load_config() {
        Ok(cfg) => {
            info!(devices = cfg.devices.len(), "config loaded from {CONFIG_PATH}");
            cfg
        }
        Err(e) => {
            eprintln!("FATAL: failed to load config from {CONFIG_PATH}: {e}");
            std::process::exit(1);
        }
    };

    let sweep_interval = Duration::from_secs(cfg.pool.sweep_interval_secs);
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run(cfg, sweep_interval))
}

async fn run(cfg: config::GatewayConfig, sweep_interval: Duration) -> anyhow::Result<()> {
    let gateway = Arc::new(bootstrap::build(&cfg));
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let sweeper = tokio::spawn(bootstrap::run_sweeper(
        Arc::clone(&gateway),
        sweep_interval,
        shutdown_rx,
    ));

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, draining background tasks");
    shutdown_tx.send(true).ok();
    sweeper.await?;

    info!("gateway stopped");
    Ok(())
}
