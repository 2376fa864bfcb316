use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::{DEFAULT_TAINT_KEY, Error, Result, applier::RetryPolicy};

pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(600);
pub const DEFAULT_CACHE_SYNC_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_PATCH_ATTEMPTS: usize = 3;
pub const DEFAULT_PATCH_BACKOFF: Duration = Duration::from_millis(200);

/// Tunables for the taint controller. Durations in files are humantime strings
/// such as `5s` or `10m`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ControllerConfig {
    pub taint_key: String,

    #[serde(deserialize_with = "deserialize_duration")]
    pub reconcile_interval: Duration,

    #[serde(deserialize_with = "deserialize_duration")]
    pub resync_interval: Duration,

    #[serde(deserialize_with = "deserialize_duration")]
    pub cache_sync_timeout: Duration,

    pub patch_attempts: usize,

    #[serde(deserialize_with = "deserialize_duration")]
    pub patch_backoff: Duration,

    /// React to node and pod updates between reconciliation ticks.
    pub watch_events: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            taint_key: DEFAULT_TAINT_KEY.into(),
            reconcile_interval: DEFAULT_RECONCILE_INTERVAL,
            resync_interval: DEFAULT_RESYNC_INTERVAL,
            cache_sync_timeout: DEFAULT_CACHE_SYNC_TIMEOUT,
            patch_attempts: DEFAULT_PATCH_ATTEMPTS,
            patch_backoff: DEFAULT_PATCH_BACKOFF,
            watch_events: true,
        }
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.taint_key.trim().is_empty() {
            return Err(Error::InvalidConfig("taint key must not be empty".into()));
        }
        for (name, value) in [
            ("reconcile interval", self.reconcile_interval),
            ("resync interval", self.resync_interval),
            ("cache sync timeout", self.cache_sync_timeout),
        ] {
            if value.is_zero() {
                return Err(Error::InvalidConfig(format!("{name} must be non-zero")));
            }
        }
        if self.patch_attempts == 0 {
            return Err(Error::InvalidConfig(
                "patch attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.patch_attempts,
            backoff: self.patch_backoff,
        }
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let buf = String::deserialize(deserializer)?;
    humantime::parse_duration(&buf).map_err(|e| serde::de::Error::custom(e.to_string()))
}
