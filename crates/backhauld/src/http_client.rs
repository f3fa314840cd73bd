//! Blocking HTTP implementation of the reflector client.
//!
//! Reflector protocol, relative to a base URL:
//! `GET {base}/v1/ping`, `GET {base}/v1/download/{bytes}`,
//! `POST {base}/v1/upload`. The bootstrap endpoint answers
//! `{"reflectorNearUrl": .., "reflectorFarUrl": ..}`.

use std::io;
use std::time::Instant;

use backhaul_monitor::config::TransportConfig;
use backhaul_monitor::{PingResult, ProbeError, ReflectorClient, ReflectorSet, TransferResult};
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BootstrapResponse {
    reflector_near_url: String,
    reflector_far_url: String,
}

/// Must be created outside of an async runtime; it is used from the
/// monitor's worker and scheduler threads.
pub struct HttpReflectorClient {
    http: Client,
    stall_threshold_ms: f64,
}

fn endpoint(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path)
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

fn mbps(bytes: u64, seconds: f64) -> f64 {
    if seconds > 0.0 {
        bytes as f64 * 8.0 / 1e6 / seconds
    } else {
        0.0
    }
}

fn error_code(e: &reqwest::Error) -> u16 {
    e.status().map(|s| s.as_u16()).unwrap_or(0)
}

impl HttpReflectorClient {
    pub fn new(transport: &TransportConfig) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .connect_timeout(transport.connect_timeout)
            .timeout(transport.total_timeout)
            .user_agent(concat!("backhauld/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            stall_threshold_ms: transport.stall_threshold_ms,
        })
    }

    fn transfer_failed(&self, op: &str, url: &str, code: u16, started: Instant, detail: &str) -> TransferResult {
        warn!(
            op,
            url,
            http_code = code,
            elapsed_ms = elapsed_ms(started),
            detail,
            "reflector transfer failed"
        );
        TransferResult::failed(code)
    }
}

impl ReflectorClient for HttpReflectorClient {
    fn fetch_reflectors(&self, bootstrap_url: &str) -> Result<ReflectorSet, ProbeError> {
        let resp = self
            .http
            .get(bootstrap_url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| ProbeError::Bootstrap(format!("{bootstrap_url}: {e}")))?;
        let body: BootstrapResponse = resp
            .json()
            .map_err(|e| ProbeError::Bootstrap(format!("{bootstrap_url}: invalid body: {e}")))?;
        if body.reflector_near_url.is_empty() || body.reflector_far_url.is_empty() {
            return Err(ProbeError::Bootstrap(format!(
                "{bootstrap_url}: missing near or far URL"
            )));
        }
        Ok(ReflectorSet::new(body.reflector_near_url, body.reflector_far_url))
    }

    fn ping(&self, base_url: &str) -> PingResult {
        let url = endpoint(base_url, "v1/ping");
        let started = Instant::now();
        let resp = match self.http.get(&url).send() {
            Ok(resp) => resp,
            Err(e) => {
                warn!(url = %url, elapsed_ms = elapsed_ms(started), error = %e, "ping failed");
                return PingResult::failed(error_code(&e));
            }
        };
        // Headers are in: first byte has arrived.
        let ttfb_ms = elapsed_ms(started);
        let status = resp.status();
        let body = resp.bytes();
        let total_ms = elapsed_ms(started);

        match body {
            Ok(_) if status.is_success() => {
                PingResult::success(ttfb_ms, total_ms, status.as_u16(), self.stall_threshold_ms)
            }
            Ok(_) => {
                warn!(url = %url, http_code = status.as_u16(), ttfb_ms, "ping rejected");
                PingResult::failed(status.as_u16())
            }
            Err(e) => {
                warn!(url = %url, http_code = status.as_u16(), total_ms, error = %e, "ping body failed");
                PingResult::failed(status.as_u16())
            }
        }
    }

    fn download(&self, base_url: &str, bytes: u64) -> TransferResult {
        let url = endpoint(base_url, &format!("v1/download/{bytes}"));
        let started = Instant::now();
        let mut resp = match self.http.get(&url).send() {
            Ok(resp) => resp,
            Err(e) => return self.transfer_failed("download", &url, error_code(&e), started, &e.to_string()),
        };
        let status = resp.status();
        if !status.is_success() {
            return self.transfer_failed("download", &url, status.as_u16(), started, "non-2xx status");
        }
        match resp.copy_to(&mut io::sink()) {
            Ok(received) if received > 0 => {
                let seconds = started.elapsed().as_secs_f64();
                TransferResult {
                    ok: true,
                    mbps: mbps(received, seconds),
                    seconds,
                    http_code: status.as_u16(),
                }
            }
            Ok(_) => self.transfer_failed("download", &url, status.as_u16(), started, "empty body"),
            Err(e) => self.transfer_failed("download", &url, status.as_u16(), started, &e.to_string()),
        }
    }

    fn upload(&self, base_url: &str, bytes: u64) -> TransferResult {
        let url = endpoint(base_url, "v1/upload");
        let Ok(len) = usize::try_from(bytes) else {
            return TransferResult::failed(0);
        };
        let payload = vec![0u8; len];
        let started = Instant::now();
        let resp = match self
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(payload)
            .send()
        {
            Ok(resp) => resp,
            Err(e) => return self.transfer_failed("upload", &url, error_code(&e), started, &e.to_string()),
        };
        let status = resp.status();
        // Drain the acknowledgement so the timing covers the whole exchange.
        let ack = resp.bytes();
        let seconds = started.elapsed().as_secs_f64();
        match ack {
            Ok(_) if status.is_success() => TransferResult {
                ok: true,
                mbps: mbps(bytes, seconds),
                seconds,
                http_code: status.as_u16(),
            },
            Ok(_) => self.transfer_failed("upload", &url, status.as_u16(), started, "non-2xx status"),
            Err(e) => self.transfer_failed("upload", &url, status.as_u16(), started, &e.to_string()),
        }
    }
}
