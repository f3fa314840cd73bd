//! Daemon settings: a TOML file whose top level is the monitor
//! configuration plus a `[control]` section, overridden by CLI flags and
//! environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use backhaul_monitor::config::{MonitorConfigInput, ReflectorConfigInput};
use backhaul_monitor::MonitorConfig;
use clap::Parser;
use serde::Deserialize;

pub const DEFAULT_LISTEN: &str = "0.0.0.0:18090";

/// Backhaul link-quality monitor daemon.
#[derive(Parser, Debug, Default)]
#[command(name = "backhauld", about = "Backhaul link-quality monitor daemon")]
pub struct Cli {
    /// TOML settings file.
    #[arg(long, env = "BACKHAULD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Control API listen address (overrides `[control] listen`).
    #[arg(long, env = "BACKHAULD_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Bootstrap service returning the near/far reflector pair.
    #[arg(long, env = "REFLECTOR_BOOTSTRAP_URL")]
    pub bootstrap_url: Option<String>,

    /// Static near reflector; used together with `--far-url`.
    #[arg(long, env = "REFLECTOR_NEAR_URL")]
    pub near_url: Option<String>,

    /// Static far reflector; used together with `--near-url`.
    #[arg(long, env = "REFLECTOR_FAR_URL")]
    pub far_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SettingsFile {
    #[serde(flatten)]
    monitor: MonitorConfigInput,
    control: ControlInput,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ControlInput {
    listen: Option<String>,
}

/// Fully resolved daemon settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub monitor: MonitorConfig,
    pub listen: SocketAddr,
}

impl Settings {
    /// Reads `--config` when given, then applies CLI/env overrides.
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let text = match &cli.config {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("failed to read settings file {}", path.display()))?,
            None => String::new(),
        };
        Self::from_toml_str(&text, cli)
    }

    pub fn from_toml_str(text: &str, cli: &Cli) -> anyhow::Result<Self> {
        let mut file: SettingsFile = toml::from_str(text).context("invalid settings TOML")?;
        apply_reflector_overrides(&mut file.monitor.reflectors, cli);

        let listen = match (cli.listen, file.control.listen.as_deref()) {
            (Some(addr), _) => addr,
            (None, Some(raw)) => raw
                .parse()
                .with_context(|| format!("invalid control listen address `{raw}`"))?,
            (None, None) => DEFAULT_LISTEN.parse()?,
        };
        let monitor = file
            .monitor
            .resolve()
            .context("invalid monitor configuration")?;

        Ok(Self { monitor, listen })
    }
}

fn apply_reflector_overrides(reflectors: &mut ReflectorConfigInput, cli: &Cli) {
    if let Some(url) = &cli.bootstrap_url {
        reflectors.bootstrap_url = Some(url.clone());
    }
    if let Some(url) = &cli.near_url {
        reflectors.near_url = Some(url.clone());
    }
    if let Some(url) = &cli.far_url {
        reflectors.far_url = Some(url.clone());
    }
}
