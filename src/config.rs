use std::path::PathBuf;
use std::time::Duration;

use crate::error::{PortalError, Result};
use crate::materials::panel::{PanelSettings, DEFAULT_LIST_TIMEOUT};
use crate::materials::reload_queue::{LockedPolicy, QueuePolicy, DEFAULT_DEBOUNCE};

/// Default portal URL.
/// Override at build time: MATSLOT_API_URL=https://portal.example cargo build
pub const DEFAULT_API_URL: &str = match option_env!("MATSLOT_API_URL") {
    Some(url) => url,
    None => "http://localhost:3000",
};

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    /// Hosted table API used when the list endpoint fails. Both must be set.
    pub baas_url: Option<String>,
    pub baas_key: Option<String>,
    pub log_dir: Option<PathBuf>,
    pub list_timeout: Duration,
    pub debounce: Duration,
    pub locked_policy: LockedPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let millis = |key: &str, default: Duration| -> Result<Duration> {
            match non_empty(key) {
                Some(v) => v.trim().parse::<u64>().map(Duration::from_millis).map_err(|_| {
                    PortalError::Config(format!("{} must be milliseconds, got '{}'", key, v))
                }),
                None => Ok(default),
            }
        };

        let locked_policy = match non_empty("MATSLOT_LOCKED_POLICY") {
            Some(v) => v
                .parse()
                .map_err(|e| PortalError::Config(format!("MATSLOT_LOCKED_POLICY: {}", e)))?,
            None => LockedPolicy::default(),
        };

        Ok(Self {
            api_url: non_empty("MATSLOT_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            baas_url: non_empty("MATSLOT_BAAS_URL"),
            baas_key: non_empty("MATSLOT_BAAS_KEY"),
            log_dir: non_empty("MATSLOT_LOG_DIR").map(PathBuf::from),
            list_timeout: millis("MATSLOT_LIST_TIMEOUT_MS", DEFAULT_LIST_TIMEOUT)?,
            debounce: millis("MATSLOT_DEBOUNCE_MS", DEFAULT_DEBOUNCE)?,
            locked_policy,
        })
    }

    /// `(url, key)` when the table fallback is configured.
    pub fn fallback(&self) -> Option<(&str, &str)> {
        match (&self.baas_url, &self.baas_key) {
            (Some(url), Some(key)) => Some((url.as_str(), key.as_str())),
            _ => None,
        }
    }

    pub fn panel_settings(&self) -> PanelSettings {
        PanelSettings {
            queue: QueuePolicy {
                debounce: self.debounce,
                locked: self.locked_policy,
            },
            list_timeout: self.list_timeout,
            ..PanelSettings::default()
        }
    }
}
