// ------------------------------------------------------------
// Module declarations
// ------------------------------------------------------------
//
// Each module represents a well-defined responsibility:
//
// - config:    Configuration structs loaded from JSON
// - error:     Typed error taxonomy of the runtime
// - schema:    Strongly typed normalized events
// - util:      Shared helpers (time, symbol handling)
// - exchanges: Exchange adapters and adapter registry
// - session:   Signed REST session tokens (listen keys)
// - sink:      Event sinks (console, redis)
// - collector: Listener runtime (connection state machine)
// - metrics:   Process-wide counters
//
mod config;
mod error;
mod schema;
mod util;
mod exchanges;
mod session;
mod sink;
mod collector;
mod metrics;
// ------------------------------------------------------------
// External dependencies
// ------------------------------------------------------------

use anyhow::{Context, anyhow};
use log::{info, warn};
use rustls::crypto::{CryptoProvider, ring};
use tokio::sync::watch;
use tokio::time::sleep;

use collector::runner::{Listener, ListenerSettings};
use collector::transport::TungsteniteConnector;
use config::Config;
use exchanges::get_adapter;
use metrics::METRICS;
use session::build_provisioner;
use sink::build_sink;

use std::fs;
use std::sync::Arc;
use std::time::Duration;

// ------------------------------------------------------------
// Application entry point
// ------------------------------------------------------------
//
// Responsibilities:
// - Initialize cryptography backend (rustls)
// - Load .env + configuration
// - Build the sink and one listener per enabled config entry
// - Run until SIGINT / SIGTERM, then drain every listener
//
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --------------------------------------------------------
    // rustls >= 0.23 requires an explicit CryptoProvider
    // installation, once, before any TLS connection.
    // --------------------------------------------------------
    CryptoProvider::install_default(ring::default_provider())
        .map_err(|_| anyhow!("failed to install rustls CryptoProvider"))?;

    // Credentials may come from a local .env file
    dotenv::dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // --------------------------------------------------------
    // Load configuration from disk
    //
    // NOTE:
    // - Path is the first CLI argument (default: config.json)
    // - API secrets never live in the file, only env var names
    // --------------------------------------------------------
    let path = std::env::args().nth(1).unwrap_or_else(|| "config.json".to_string());
    let config = load_config(&path)?;

    let sink = build_sink(&config.sink)
        .await
        .context("failed to initialize sink")?;

    // --------------------------------------------------------
    // Start metrics reporter (periodic, low-noise)
    // --------------------------------------------------------
    if config.metrics_interval_secs > 0 {
        let every = Duration::from_secs(config.metrics_interval_secs);
        tokio::spawn(async move {
            loop {
                sleep(every).await;
                info!("[METRICS] {}", METRICS.summary());
            }
        });
    }

    // --------------------------------------------------------
    // Start all enabled listeners
    // --------------------------------------------------------
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let connector = Arc::new(TungsteniteConnector);
    let mut handles = Vec::new();

    for listener_cfg in config.listeners.iter().filter(|l| l.enabled) {
        let adapter = get_adapter(&listener_cfg.name)
            .ok_or_else(|| anyhow!("exchange '{}' is not supported", listener_cfg.name))?;

        let provisioner = build_provisioner(adapter.as_ref(), listener_cfg)
            .with_context(|| format!("failed to set up session for '{}'", listener_cfg.name))?;

        let settings = ListenerSettings::from_config(listener_cfg, adapter.as_ref(), config.raw_logging());

        info!("Starting {} listener", listener_cfg.name);

        let listener = Listener::new(adapter, provisioner, connector.clone(), sink.clone(), settings);
        handles.push(tokio::spawn(listener.run(shutdown_rx.clone())));
    }

    wait_for_signal().await?;
    info!("shutdown requested, closing {} listener(s)", handles.len());

    shutdown_tx.send_replace(true);
    for handle in handles {
        if let Err(e) = handle.await {
            warn!("listener task failed: {}", e);
        }
    }

    info!("[METRICS] {}", METRICS.summary());
    Ok(())
}

// ------------------------------------------------------------
// Configuration loader
// ------------------------------------------------------------
//
// Reads a JSON configuration file from disk, deserializes it into
// the strongly typed `Config` structure and checks its semantics.
//
fn load_config(path: &str) -> anyhow::Result<Config> {
    let data = fs::read_to_string(path).with_context(|| format!("cannot read {}", path))?;
    let cfg: Config = serde_json::from_str(&data).with_context(|| format!("invalid config {}", path))?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(unix)]
async fn wait_for_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => info!("SIGINT received"),
        _ = sigterm.recv() => info!("SIGTERM received"),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received");
    Ok(())
}
