//! Raw probe observations stored in the metrics rings.

use serde::Serialize;

/// Seconds since the Unix epoch, as stamped on every sample.
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// One ping against a reflector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MicroSample {
    pub ts: i64,
    pub ok: bool,
    pub ttfb_ms: f64,
    pub stalled: bool,
}

impl MicroSample {
    pub fn new(ok: bool, ttfb_ms: f64, stalled: bool) -> Self {
        Self {
            ts: unix_now(),
            ok,
            ttfb_ms,
            stalled,
        }
    }
}

/// One throughput measurement (CHG or parallel diagnostic).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChgSample {
    pub ts: i64,
    pub ok: bool,
    pub dl_mbps: f64,
    pub ul_mbps: f64,
    pub dl_seconds: f64,
    pub ul_seconds: f64,
}

impl ChgSample {
    /// A sample where neither direction produced a figure.
    pub fn failed() -> Self {
        Self {
            ts: unix_now(),
            ..Self::default()
        }
    }
}
