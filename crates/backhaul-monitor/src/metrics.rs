//! The published health record.

use serde::Serialize;

/// Health state reported to the control plane.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackhaulState {
    #[default]
    Unknown,
    Good,
    Degraded,
    Down,
    Capped,
}

impl BackhaulState {
    pub fn as_str(self) -> &'static str {
        match self {
            BackhaulState::Unknown => "UNKNOWN",
            BackhaulState::Good => "GOOD",
            BackhaulState::Degraded => "DEGRADED",
            BackhaulState::Down => "DOWN",
            BackhaulState::Capped => "CAPPED",
        }
    }
}

/// Best-effort guess at the physical medium behind the backhaul.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkGuess {
    #[default]
    Unknown,
    TerrestrialLike,
    SatLeoLike,
    SatGeoLike,
    CellularLike,
}

impl LinkGuess {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkGuess::Unknown => "UNKNOWN",
            LinkGuess::TerrestrialLike => "TERRESTRIAL_LIKE",
            LinkGuess::SatLeoLike => "SAT_LEO_LIKE",
            LinkGuess::SatGeoLike => "SAT_GEO_LIKE",
            LinkGuess::CellularLike => "CELLULAR_LIKE",
        }
    }
}

/// Authoritative health snapshot. Zero-valued at start-up and replaced
/// wholesale by each classifier run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackhaulMetrics {
    pub backhaul_state: BackhaulState,
    pub link_guess: LinkGuess,
    pub confidence: f64,

    pub consec_fails: u32,
    pub consec_ok: u32,
    /// Multi-reflector runs already fed into the hysteresis counters.
    #[serde(skip)]
    pub multi_runs_classified: u64,

    pub dl_goodput_mbps: f64,
    pub ul_goodput_mbps: f64,
    pub bufferbloat_inflation_factor: f64,
    pub cap_detected_mbps: f64,

    pub near_ttfb_median_ms: f64,
    pub near_ttfb_p95_ms: f64,
    pub near_ttfb_p99_ms: f64,
    pub far_ttfb_median_ms: f64,
    pub far_ttfb_p95_ms: f64,
    pub far_ttfb_p99_ms: f64,

    pub probe_success_rate_pct: f64,
    pub stall_rate_pct: f64,

    pub last_micro_ts: i64,
    pub last_multi_ts: i64,
    pub last_chg_ts: i64,
    pub last_classify_ts: i64,
    pub last_diag_ts: i64,
    pub last_diag_name: String,
}
