use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::Notify;
use tracing::info;

use bankpulse::api;
use bankpulse::config::MonitorConfig;
use bankpulse::engine::Monitor;

const CONFIG_PATH: &str = "config.json";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_ansi(true)
        .init();

    let config = match std::fs::read_to_string(CONFIG_PATH) {
        Ok(raw) => serde_json::from_str::<MonitorConfig>(&raw)
            .with_context(|| format!("Failed to parse {}", CONFIG_PATH))?,
        Err(_) => {
            info!("No {} found, using built-in service defaults", CONFIG_PATH);
            MonitorConfig::default()
        }
    };
    config.validate().context("Invalid configuration")?;

    let monitor = Arc::new(Monitor::new(config));
    let api_port = monitor.config.api_port;

    let api_monitor = Arc::clone(&monitor);
    tokio::spawn(async move {
        api::start_server(api_port, api_monitor).await;
    });

    let shutdown = Arc::new(Notify::new());
    tokio::spawn(Arc::clone(&monitor).run(Arc::clone(&shutdown)));

    signal::ctrl_c().await?;
    shutdown.notify_waiters();
    info!("Shutdown signal received. Closing connectivity monitor...");

    Ok(())
}
