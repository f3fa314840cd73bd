//! Backhaul monitor daemon.
//!
//! - Loads settings (TOML file, CLI flags, environment)
//! - Resolves the near/far reflectors and starts the monitor threads
//! - Serves the control API until Ctrl-C, then stops the monitor

use std::sync::Arc;

use anyhow::Context;
use backhaul_monitor::MonitorRuntime;
use backhauld::control;
use backhauld::http_client::HttpReflectorClient;
use backhauld::settings::{Cli, Settings};
use clap::Parser;
use tracing_subscriber::EnvFilter;

// The reflector client is blocking, so the monitor is built before the
// async runtime exists and only the control API runs inside it.
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(&cli)?;
    tracing::info!(
        listen = %settings.listen,
        bootstrap = ?settings.monitor.reflectors.bootstrap_url,
        "backhauld starting"
    );

    let client = HttpReflectorClient::new(&settings.monitor.transport)
        .context("failed to build reflector HTTP client")?;
    let mut monitor = MonitorRuntime::start(settings.monitor.clone(), Arc::new(client))
        .context("failed to start backhaul monitor")?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    let served = rt.block_on(control::serve(
        settings.listen,
        monitor.store().clone(),
        async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for ctrl-c: {e}");
                return;
            }
            tracing::info!("received SIGINT, shutting down");
        },
    ));

    monitor.shutdown();
    tracing::info!("backhauld stopped");
    served
}
