use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Upper bound on CHG trials per direction.
pub const MAX_CHG_SAMPLES: usize = 16;
/// Bounds on concurrent streams for the parallel diagnostic.
pub const MIN_PARALLEL_STREAMS: usize = 2;
pub const MAX_PARALLEL_STREAMS: usize = 16;

// ── Raw (deserialized) input ────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MonitorConfigInput {
    pub schedule: ScheduleConfigInput,
    pub transport: TransportConfigInput,
    pub chg: ChgConfigInput,
    pub diagnostics: DiagnosticsConfigInput,
    pub classifier: ClassifierConfigInput,
    pub buffers: BufferConfigInput,
    pub reflectors: ReflectorConfigInput,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScheduleConfigInput {
    pub micro_period_ms: Option<u64>,
    pub multi_period_ms: Option<u64>,
    pub classify_period_ms: Option<u64>,
    pub chg_period_sec: Option<u64>,
    /// 0 disables periodic refresh.
    pub reflector_refresh_sec: Option<u64>,
    pub tick_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TransportConfigInput {
    pub connect_timeout_ms: Option<u64>,
    pub total_timeout_ms: Option<u64>,
    pub stall_threshold_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChgConfigInput {
    pub target_seconds: Option<f64>,
    /// 0 disables the warm-up download.
    pub warmup_bytes: Option<u64>,
    pub min_bytes: Option<u64>,
    pub max_bytes: Option<u64>,
    pub samples: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfigInput {
    pub parallel_streams: Option<usize>,
    pub parallel_max_bytes_total: Option<u64>,
    pub bufferbloat_pulse_bytes: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClassifierConfigInput {
    pub down_consec_fails: Option<u32>,
    pub recover_consec_ok: Option<u32>,
    pub cap_stability_pct: Option<f64>,
    pub cap_band_pct: Option<f64>,
    pub cap_min_samples: Option<usize>,
    pub cap_ceiling_mbps: Option<f64>,
    pub degraded_stall_pct: Option<f64>,
    pub link_guess: LinkGuessConfigInput,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LinkGuessConfigInput {
    pub terrestrial_max_ttfb_ms: Option<f64>,
    pub terrestrial_max_spread_ms: Option<f64>,
    pub terrestrial_min_mbps: Option<f64>,
    pub leo_max_ttfb_ms: Option<f64>,
    pub leo_min_spread_ms: Option<f64>,
    pub geo_min_ttfb_ms: Option<f64>,
    pub cellular_min_loss_pct: Option<f64>,
    pub min_samples: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BufferConfigInput {
    pub micro_capacity: Option<usize>,
    pub multi_capacity: Option<usize>,
    pub chg_capacity: Option<usize>,
    pub queue_capacity: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReflectorConfigInput {
    pub bootstrap_url: Option<String>,
    pub near_url: Option<String>,
    pub far_url: Option<String>,
}

// ── Resolved configuration ──────────────────────────────────────────

/// Job cadences. Every period is strictly positive.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleConfig {
    pub micro_period: Duration,
    pub multi_period: Duration,
    pub classify_period: Duration,
    pub chg_period: Duration,
    pub reflector_refresh: Option<Duration>,
    pub tick: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            micro_period: Duration::from_secs(10),
            multi_period: Duration::from_secs(30),
            classify_period: Duration::from_secs(60),
            chg_period: Duration::from_secs(30 * 60),
            reflector_refresh: Some(Duration::from_secs(600)),
            tick: Duration::from_millis(200),
        }
    }
}

/// Settings handed to the reflector client implementation.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    pub connect_timeout: Duration,
    pub total_timeout: Duration,
    pub stall_threshold_ms: f64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            total_timeout: Duration::from_secs(15),
            stall_threshold_ms: 1000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChgConfig {
    pub target_seconds: f64,
    pub warmup_bytes: u64,
    pub min_bytes: u64,
    pub max_bytes: u64,
    /// Trials per direction, in `1..=MAX_CHG_SAMPLES`.
    pub samples: usize,
}

impl Default for ChgConfig {
    fn default() -> Self {
        Self {
            target_seconds: 2.0,
            warmup_bytes: 256 * 1024,
            min_bytes: 256 * 1024,
            max_bytes: 32 * 1024 * 1024,
            samples: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticsConfig {
    /// Concurrent downloads, in `MIN_PARALLEL_STREAMS..=MAX_PARALLEL_STREAMS`.
    pub parallel_streams: usize,
    pub parallel_max_bytes_total: u64,
    pub bufferbloat_pulse_bytes: u64,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            parallel_streams: 4,
            parallel_max_bytes_total: 32 * 1024 * 1024,
            bufferbloat_pulse_bytes: 2 * 1024 * 1024,
        }
    }
}

/// Tunable thresholds for the medium guess. TTFB values are HTTP
/// time-to-first-byte, which is larger than a raw ICMP RTT.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkGuessConfig {
    pub terrestrial_max_ttfb_ms: f64,
    pub terrestrial_max_spread_ms: f64,
    pub terrestrial_min_mbps: f64,
    pub leo_max_ttfb_ms: f64,
    pub leo_min_spread_ms: f64,
    pub geo_min_ttfb_ms: f64,
    pub cellular_min_loss_pct: f64,
    pub min_samples: usize,
}

impl Default for LinkGuessConfig {
    fn default() -> Self {
        Self {
            terrestrial_max_ttfb_ms: 60.0,
            terrestrial_max_spread_ms: 25.0,
            terrestrial_min_mbps: 50.0,
            leo_max_ttfb_ms: 200.0,
            leo_min_spread_ms: 20.0,
            geo_min_ttfb_ms: 450.0,
            cellular_min_loss_pct: 2.0,
            min_samples: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierConfig {
    pub down_consec_fails: u32,
    pub recover_consec_ok: u32,
    pub cap_stability_pct: f64,
    pub cap_band_pct: f64,
    pub cap_min_samples: usize,
    pub cap_ceiling_mbps: f64,
    pub degraded_stall_pct: f64,
    pub link_guess: LinkGuessConfig,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            down_consec_fails: 3,
            recover_consec_ok: 3,
            cap_stability_pct: 80.0,
            cap_band_pct: 10.0,
            cap_min_samples: 3,
            cap_ceiling_mbps: 1000.0,
            degraded_stall_pct: 20.0,
            link_guess: LinkGuessConfig::default(),
        }
    }
}

/// Ring-buffer and job-queue capacities. Fixed for the process lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferConfig {
    pub micro_capacity: usize,
    /// Shared by the near and far buffers.
    pub multi_capacity: usize,
    pub chg_capacity: usize,
    pub queue_capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            micro_capacity: 120,
            multi_capacity: 60,
            chg_capacity: 16,
            queue_capacity: 32,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReflectorConfig {
    pub bootstrap_url: Option<String>,
    pub near_url: Option<String>,
    pub far_url: Option<String>,
}

impl ReflectorConfig {
    /// Both static URLs are set; they take precedence over the bootstrap.
    pub fn static_pair(&self) -> Option<(&str, &str)> {
        match (self.near_url.as_deref(), self.far_url.as_deref()) {
            (Some(near), Some(far)) => Some((near, far)),
            _ => None,
        }
    }
}

/// Read-only configuration shared by every monitor component.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitorConfig {
    pub schedule: ScheduleConfig,
    pub transport: TransportConfig,
    pub chg: ChgConfig,
    pub diagnostics: DiagnosticsConfig,
    pub classifier: ClassifierConfig,
    pub buffers: BufferConfig,
    pub reflectors: ReflectorConfig,
}

impl MonitorConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let parsed: MonitorConfigInput = toml::from_str(input)?;
        parsed.resolve()
    }
}

// ── Resolution ──────────────────────────────────────────────────────

fn period_ms(value: Option<u64>, default: Duration, name: &'static str) -> Result<Duration, ConfigError> {
    match value {
        Some(0) => Err(ConfigError::ZeroPeriod(name)),
        Some(ms) => Ok(Duration::from_millis(ms)),
        None => Ok(default),
    }
}

fn capacity(value: Option<usize>, default: usize, name: &'static str) -> Result<usize, ConfigError> {
    match value.unwrap_or(default) {
        0 => Err(ConfigError::ZeroCapacity(name)),
        n => Ok(n),
    }
}

fn percent(value: Option<f64>, default: f64, name: &'static str) -> Result<f64, ConfigError> {
    let value = value.unwrap_or(default);
    if value.is_nan() || value <= 0.0 || value > 100.0 {
        return Err(ConfigError::PercentOutOfRange { name, value });
    }
    Ok(value)
}

fn non_empty(url: Option<String>) -> Option<String> {
    url.and_then(|u| {
        let trimmed = u.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

impl MonitorConfigInput {
    pub fn resolve(self) -> Result<MonitorConfig, ConfigError> {
        Ok(MonitorConfig {
            schedule: self.schedule.resolve()?,
            transport: self.transport.resolve()?,
            chg: self.chg.resolve()?,
            diagnostics: self.diagnostics.resolve(),
            classifier: self.classifier.resolve()?,
            buffers: self.buffers.resolve()?,
            reflectors: self.reflectors.resolve()?,
        })
    }
}

impl ScheduleConfigInput {
    fn resolve(self) -> Result<ScheduleConfig, ConfigError> {
        let d = ScheduleConfig::default();
        let chg_period = match self.chg_period_sec {
            Some(0) => return Err(ConfigError::ZeroPeriod("chg_period_sec")),
            Some(secs) => Duration::from_secs(secs),
            None => d.chg_period,
        };
        let reflector_refresh = match self.reflector_refresh_sec {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => d.reflector_refresh,
        };
        Ok(ScheduleConfig {
            micro_period: period_ms(self.micro_period_ms, d.micro_period, "micro_period_ms")?,
            multi_period: period_ms(self.multi_period_ms, d.multi_period, "multi_period_ms")?,
            classify_period: period_ms(
                self.classify_period_ms,
                d.classify_period,
                "classify_period_ms",
            )?,
            chg_period,
            reflector_refresh,
            tick: period_ms(self.tick_ms, d.tick, "tick_ms")?,
        })
    }
}

impl TransportConfigInput {
    fn resolve(self) -> Result<TransportConfig, ConfigError> {
        let d = TransportConfig::default();
        Ok(TransportConfig {
            connect_timeout: period_ms(self.connect_timeout_ms, d.connect_timeout, "connect_timeout_ms")?,
            total_timeout: period_ms(self.total_timeout_ms, d.total_timeout, "total_timeout_ms")?,
            stall_threshold_ms: self
                .stall_threshold_ms
                .map(|ms| ms as f64)
                .unwrap_or(d.stall_threshold_ms),
        })
    }
}

impl ChgConfigInput {
    fn resolve(self) -> Result<ChgConfig, ConfigError> {
        let d = ChgConfig::default();
        let min_bytes = self.min_bytes.unwrap_or(d.min_bytes).max(1);
        let max_bytes = self.max_bytes.unwrap_or(d.max_bytes);
        if min_bytes > max_bytes {
            return Err(ConfigError::InvertedBounds {
                min: min_bytes,
                max: max_bytes,
            });
        }
        let target_seconds = self.target_seconds.unwrap_or(d.target_seconds);
        if !(target_seconds > 0.0) {
            return Err(ConfigError::ZeroThreshold("chg.target_seconds"));
        }
        Ok(ChgConfig {
            target_seconds,
            warmup_bytes: self.warmup_bytes.unwrap_or(d.warmup_bytes),
            min_bytes,
            max_bytes,
            samples: self.samples.unwrap_or(d.samples).clamp(1, MAX_CHG_SAMPLES),
        })
    }
}

impl DiagnosticsConfigInput {
    fn resolve(self) -> DiagnosticsConfig {
        let d = DiagnosticsConfig::default();
        DiagnosticsConfig {
            parallel_streams: self
                .parallel_streams
                .unwrap_or(d.parallel_streams)
                .clamp(MIN_PARALLEL_STREAMS, MAX_PARALLEL_STREAMS),
            parallel_max_bytes_total: self
                .parallel_max_bytes_total
                .unwrap_or(d.parallel_max_bytes_total),
            bufferbloat_pulse_bytes: self
                .bufferbloat_pulse_bytes
                .unwrap_or(d.bufferbloat_pulse_bytes)
                .max(1),
        }
    }
}

impl ClassifierConfigInput {
    fn resolve(self) -> Result<ClassifierConfig, ConfigError> {
        let d = ClassifierConfig::default();
        let down_consec_fails = self.down_consec_fails.unwrap_or(d.down_consec_fails);
        if down_consec_fails == 0 {
            return Err(ConfigError::ZeroThreshold("down_consec_fails"));
        }
        let recover_consec_ok = self.recover_consec_ok.unwrap_or(d.recover_consec_ok);
        if recover_consec_ok == 0 {
            return Err(ConfigError::ZeroThreshold("recover_consec_ok"));
        }
        Ok(ClassifierConfig {
            down_consec_fails,
            recover_consec_ok,
            cap_stability_pct: percent(self.cap_stability_pct, d.cap_stability_pct, "cap_stability_pct")?,
            cap_band_pct: percent(self.cap_band_pct, d.cap_band_pct, "cap_band_pct")?,
            cap_min_samples: self.cap_min_samples.unwrap_or(d.cap_min_samples).max(1),
            cap_ceiling_mbps: self.cap_ceiling_mbps.unwrap_or(d.cap_ceiling_mbps),
            degraded_stall_pct: percent(
                self.degraded_stall_pct,
                d.degraded_stall_pct,
                "degraded_stall_pct",
            )?,
            link_guess: self.link_guess.resolve(),
        })
    }
}

impl LinkGuessConfigInput {
    fn resolve(self) -> LinkGuessConfig {
        let d = LinkGuessConfig::default();
        LinkGuessConfig {
            terrestrial_max_ttfb_ms: self.terrestrial_max_ttfb_ms.unwrap_or(d.terrestrial_max_ttfb_ms),
            terrestrial_max_spread_ms: self
                .terrestrial_max_spread_ms
                .unwrap_or(d.terrestrial_max_spread_ms),
            terrestrial_min_mbps: self.terrestrial_min_mbps.unwrap_or(d.terrestrial_min_mbps),
            leo_max_ttfb_ms: self.leo_max_ttfb_ms.unwrap_or(d.leo_max_ttfb_ms),
            leo_min_spread_ms: self.leo_min_spread_ms.unwrap_or(d.leo_min_spread_ms),
            geo_min_ttfb_ms: self.geo_min_ttfb_ms.unwrap_or(d.geo_min_ttfb_ms),
            cellular_min_loss_pct: self.cellular_min_loss_pct.unwrap_or(d.cellular_min_loss_pct),
            min_samples: self.min_samples.unwrap_or(d.min_samples).max(1),
        }
    }
}

impl BufferConfigInput {
    fn resolve(self) -> Result<BufferConfig, ConfigError> {
        let d = BufferConfig::default();
        Ok(BufferConfig {
            micro_capacity: capacity(self.micro_capacity, d.micro_capacity, "micro_capacity")?,
            multi_capacity: capacity(self.multi_capacity, d.multi_capacity, "multi_capacity")?,
            chg_capacity: capacity(self.chg_capacity, d.chg_capacity, "chg_capacity")?,
            queue_capacity: capacity(self.queue_capacity, d.queue_capacity, "queue_capacity")?,
        })
    }
}

impl ReflectorConfigInput {
    fn resolve(self) -> Result<ReflectorConfig, ConfigError> {
        let cfg = ReflectorConfig {
            bootstrap_url: non_empty(self.bootstrap_url),
            near_url: non_empty(self.near_url),
            far_url: non_empty(self.far_url),
        };
        if cfg.static_pair().is_none() && cfg.bootstrap_url.is_none() {
            return Err(ConfigError::NoReflectorSource);
        }
        Ok(cfg)
    }
}
