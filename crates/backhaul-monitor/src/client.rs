//! Contract for the transport that reaches reflectors.
//!
//! The core never speaks HTTP itself; the embedding process supplies an
//! implementation (see the `backhauld` crate). Timeouts are the
//! implementation's responsibility.

use tracing::info;

use crate::config::ReflectorConfig;
use crate::error::ProbeError;
use crate::store::ReflectorSet;

/// Result of one ping.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PingResult {
    pub ok: bool,
    pub ttfb_ms: f64,
    pub total_ms: f64,
    pub http_code: u16,
    pub stalled: bool,
}

impl PingResult {
    /// A completed ping; stalled when the first byte took at least
    /// `stall_threshold_ms`.
    pub fn success(ttfb_ms: f64, total_ms: f64, http_code: u16, stall_threshold_ms: f64) -> Self {
        Self {
            ok: true,
            ttfb_ms,
            total_ms,
            http_code,
            stalled: ttfb_ms >= stall_threshold_ms,
        }
    }

    /// `http_code` is 0 when no response arrived.
    pub fn failed(http_code: u16) -> Self {
        Self {
            http_code,
            ..Self::default()
        }
    }
}

/// Result of one download or upload.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TransferResult {
    pub ok: bool,
    pub mbps: f64,
    pub seconds: f64,
    pub http_code: u16,
}

impl TransferResult {
    pub fn failed(http_code: u16) -> Self {
        Self {
            http_code,
            ..Self::default()
        }
    }
}

pub trait ReflectorClient: Send + Sync {
    /// Asks the bootstrap service for the current near/far pair.
    fn fetch_reflectors(&self, bootstrap_url: &str) -> Result<ReflectorSet, ProbeError>;

    fn ping(&self, base_url: &str) -> PingResult;

    fn download(&self, base_url: &str, bytes: u64) -> TransferResult;

    fn upload(&self, base_url: &str, bytes: u64) -> TransferResult;
}

/// Static near/far URLs win when both are configured; otherwise the
/// bootstrap service is asked. A set missing either URL is an error.
pub fn resolve_reflectors(
    cfg: &ReflectorConfig,
    client: &dyn ReflectorClient,
) -> Result<ReflectorSet, ProbeError> {
    if let Some((near, far)) = cfg.static_pair() {
        info!(near, far, "using static reflector URLs");
        return Ok(ReflectorSet::new(near, far));
    }
    let bootstrap = cfg
        .bootstrap_url
        .as_deref()
        .ok_or_else(|| ProbeError::Bootstrap("no bootstrap URL configured".into()))?;
    let set = client.fetch_reflectors(bootstrap)?;
    if let Some(side) = set.missing_side() {
        return Err(ProbeError::MissingReflector(side));
    }
    info!(near = %set.near_url, far = %set.far_url, "fetched reflectors from bootstrap");
    Ok(set)
}
