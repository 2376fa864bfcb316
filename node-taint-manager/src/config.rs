use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use node_taint_manager_controller::ControllerConfig;
use serde::Deserialize;

use crate::Result;

const DEFAULT_METRICS_ADDRESS: SocketAddr = SocketAddr::new(
    std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED),
    9090,
);

/// Removes a startup taint from nodes once their daemonset pods are ready.
///
/// Durations are parsed with <https://docs.rs/humantime/latest/humantime/fn.parse_duration.html>.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// YAML settings file. Flags and environment variables take precedence
    #[arg(long, env = "TAINT_MANAGER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Taint key removed once daemonset pods are ready
    #[arg(long, env = "TAINT_KEY")]
    pub taint_key: Option<String>,

    /// Interval between full reconciliation passes [default: 5s]
    #[arg(long, env = "RECONCILE_INTERVAL", value_parser = humantime::parse_duration)]
    pub reconcile_interval: Option<Duration>,

    /// Interval at which every gated node is queued again [default: 10m]
    #[arg(long, env = "RESYNC_INTERVAL", value_parser = humantime::parse_duration)]
    pub resync_interval: Option<Duration>,

    /// Upper bound on the initial cache sync [default: 2m]
    #[arg(long, env = "CACHE_SYNC_TIMEOUT", value_parser = humantime::parse_duration)]
    pub cache_sync_timeout: Option<Duration>,

    /// Patch attempts per node and pass [default: 3]
    #[arg(long, env = "PATCH_ATTEMPTS")]
    pub patch_attempts: Option<usize>,

    /// Delay step between patch attempts [default: 200ms]
    #[arg(long, env = "PATCH_BACKOFF", value_parser = humantime::parse_duration)]
    pub patch_backoff: Option<Duration>,

    /// React to node and pod updates between passes [default: true]
    #[arg(long, env = "WATCH_EVENTS")]
    pub watch_events: Option<bool>,

    /// Metrics listener [default: 0.0.0.0:9090]
    #[arg(long, env = "METRICS_ADDRESS")]
    pub metrics_address: Option<SocketAddr>,

    /// Kubeconfig context, in-cluster config or the default kubeconfig when unset
    #[arg(long, env = "KUBE_CONTEXT")]
    pub context: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    #[serde(flatten)]
    pub controller: ControllerConfig,

    pub metrics_address: SocketAddr,

    pub context: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            controller: ControllerConfig::default(),
            metrics_address: DEFAULT_METRICS_ADDRESS,
            context: None,
        }
    }
}

impl Cli {
    /// Resolves settings from the optional file, then applies flags and
    /// environment on top.
    pub async fn load_settings(self) -> Result<Settings> {
        let mut settings = match self.config.as_ref() {
            Some(path) => {
                let raw = tokio::fs::read_to_string(path).await?;
                serde_yaml::from_str(&raw)?
            }
            None => Settings::default(),
        };

        let controller = &mut settings.controller;
        if let Some(taint_key) = self.taint_key {
            controller.taint_key = taint_key;
        }
        if let Some(interval) = self.reconcile_interval {
            controller.reconcile_interval = interval;
        }
        if let Some(interval) = self.resync_interval {
            controller.resync_interval = interval;
        }
        if let Some(timeout) = self.cache_sync_timeout {
            controller.cache_sync_timeout = timeout;
        }
        if let Some(attempts) = self.patch_attempts {
            controller.patch_attempts = attempts;
        }
        if let Some(backoff) = self.patch_backoff {
            controller.patch_backoff = backoff;
        }
        if let Some(watch_events) = self.watch_events {
            controller.watch_events = watch_events;
        }
        if let Some(addr) = self.metrics_address {
            settings.metrics_address = addr;
        }
        if self.context.is_some() {
            settings.context = self.context;
        }

        settings.controller.validate()?;
        Ok(settings)
    }
}
