//! Backhaul link-quality monitor core.
//!
//! Probes a near and a far reflector on independent cadences, keeps the
//! results in fixed-capacity ring buffers, and classifies the backhaul's
//! health (GOOD / DEGRADED / DOWN / CAPPED) and likely medium
//! (terrestrial, LEO, GEO, cellular).
//!
//! Data flow:
//!
//! ```text
//! Scheduler (tick) ──enqueue──▶ JobQueue ──▶ Worker ──▶ probe / classifier
//!                                                        │
//!                                     MetricsStore ◀─────┘
//! ```
//!
//! The HTTP transport to reflectors is supplied by the embedding process
//! through the [`client::ReflectorClient`] trait.

pub mod classifier;
pub mod client;
pub mod config;
pub mod diag;
pub mod error;
pub mod metrics;
pub mod probe;
pub mod ring;
pub mod runtime;
pub mod sample;
pub mod scheduler;
pub mod stats;
pub mod store;
pub mod worker;

pub use client::{PingResult, ReflectorClient, TransferResult};
pub use config::MonitorConfig;
pub use diag::DiagKind;
pub use error::{ConfigError, MonitorError, ProbeError, UnknownDiagKind};
pub use metrics::{BackhaulMetrics, BackhaulState, LinkGuess};
pub use runtime::{MonitorContext, MonitorRuntime};
pub use store::{BackhaulAggregates, MetricsStore, ReflectorSet};
