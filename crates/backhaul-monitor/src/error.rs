use thiserror::Error;

// ── Errors ──────────────────────────────────────────────────────────

/// Invalid monitor configuration. Always fatal at start-up.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("buffer capacity `{0}` must be greater than zero")]
    ZeroCapacity(&'static str),
    #[error("period `{0}` must be greater than zero")]
    ZeroPeriod(&'static str),
    #[error("threshold `{0}` must be greater than zero")]
    ZeroThreshold(&'static str),
    #[error("chg byte bounds inverted: min {min} > max {max}")]
    InvertedBounds { min: u64, max: u64 },
    #[error("percentage `{name}` out of range (0, 100]: {value}")]
    PercentOutOfRange { name: &'static str, value: f64 },
    #[error("no reflector source: set both near/far URLs or a bootstrap URL")]
    NoReflectorSource,
}

/// Failure of a single probe or reflector lookup.
///
/// Probe errors are transient: the worker logs them and the scheduler's
/// cadence retries on the next period.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("{0} reflector URL is empty")]
    MissingReflector(&'static str),
    #[error("ping to {url} failed (http {http_code})")]
    PingFailed { url: String, http_code: u16 },
    #[error("all {attempts} transfers failed")]
    AllTransfersFailed { attempts: usize },
    #[error("bootstrap request failed: {0}")]
    Bootstrap(String),
}

/// Errors that prevent the monitor from starting.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not resolve reflectors at start-up: {0}")]
    Reflectors(#[source] ProbeError),
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Control-plane name that matches no [`DiagKind`](crate::DiagKind).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown diagnostic `{0}` (expected chg, parallel or bufferbloat)")]
pub struct UnknownDiagKind(pub String);
