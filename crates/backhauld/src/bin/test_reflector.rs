//! Stand-alone reflector for exercising `backhauld` without real
//! infrastructure.

use std::net::SocketAddr;

use backhauld::reflector::{self, Faults, ReflectorState, DEFAULT_MAX_TRANSFER_BYTES};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "backhaul-reflector", about = "Fault-injecting test reflector")]
struct Cli {
    #[arg(long, default_value = "0.0.0.0:8088")]
    listen: SocketAddr,

    /// Origin advertised by the bootstrap endpoint. Defaults to
    /// `http://<listen>`.
    #[arg(long)]
    public_url: Option<String>,

    /// Added delay before every answer.
    #[arg(long)]
    latency_ms: Option<u64>,

    /// Uniform random extra delay, 0..=jitter.
    #[arg(long)]
    jitter_ms: Option<u64>,

    /// Percentage of requests answered with 503.
    #[arg(long)]
    loss_pct: Option<f64>,

    #[arg(long, default_value_t = DEFAULT_MAX_TRANSFER_BYTES)]
    max_download_bytes: u64,

    #[arg(long, default_value_t = DEFAULT_MAX_TRANSFER_BYTES as usize)]
    max_upload_bytes: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let public = cli
        .public_url
        .clone()
        .unwrap_or_else(|| format!("http://{}", cli.listen));
    let state = ReflectorState {
        faults: Faults {
            latency_ms: cli.latency_ms,
            jitter_ms: cli.jitter_ms,
            loss_pct: cli.loss_pct,
        },
        max_download_bytes: cli.max_download_bytes,
        max_upload_bytes: cli.max_upload_bytes,
        ..ReflectorState::new(public)
    };

    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    tracing::info!(
        bootstrap = %format!("{}/reflector", state.public_base),
        faults = ?state.faults,
        "reflector listening on http://{}",
        listener.local_addr()?
    );
    axum::serve(listener, reflector::router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
