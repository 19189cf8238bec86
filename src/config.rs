use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::core::projector::ProjectionOptions;
use crate::stream::ReconnectPolicy;

pub const CONFIG_FILE: &str = "debease.toml";
pub const CONFIG_PATH_VAR: &str = "DEBEASE_CONFIG";
const ENV_PREFIX: &str = "DEBEASE_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server_url: String,
    pub request_timeout_secs: u64,
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
    pub max_log_lines_per_job: usize,
    pub log_tail: usize,
    pub verbose: bool,
    pub json_logs: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".to_string(),
            request_timeout_secs: 10,
            reconnect_initial_ms: 500,
            reconnect_max_ms: 10_000,
            max_log_lines_per_job: 5000,
            log_tail: 200,
            verbose: false,
            json_logs: false,
            log_file: None,
        }
    }
}

impl AppConfig {
    /// Resolve configuration: defaults, then the config file, then
    /// `DEBEASE_*` variables, then whatever `overrides` serializes.
    ///
    /// The file is `$DEBEASE_CONFIG` if set, otherwise `./debease.toml`.
    /// A missing file is not an error.
    pub fn new<T: Serialize>(overrides: Option<&T>) -> Result<Self> {
        let path = std::env::var_os(CONFIG_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));

        let figment = Self::file_layer(&path).merge(Env::prefixed(ENV_PREFIX));
        Self::with_overrides(figment, overrides)
            .extract()
            .with_context(|| format!("Failed to load configuration ({})", path.display()))
    }

    /// Defaults and file layer only, with `overrides` on top. No environment.
    pub fn from_file<T: Serialize>(path: &Path, overrides: Option<&T>) -> Result<Self> {
        Self::with_overrides(Self::file_layer(path), overrides)
            .extract()
            .with_context(|| format!("Failed to load configuration ({})", path.display()))
    }

    fn file_layer(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default())).merge(Toml::file(path))
    }

    fn with_overrides<T: Serialize>(figment: Figment, overrides: Option<&T>) -> Figment {
        match overrides {
            Some(args) => figment.merge(Serialized::defaults(args)),
            None => figment,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        let initial = Duration::from_millis(self.reconnect_initial_ms.max(1));
        ReconnectPolicy {
            initial,
            max: Duration::from_millis(self.reconnect_max_ms).max(initial),
        }
    }

    pub fn projection(&self) -> ProjectionOptions {
        ProjectionOptions {
            log_tail: self.log_tail,
        }
    }

    /// Zero means unbounded.
    pub fn log_capacity(&self) -> Option<usize> {
        (self.max_log_lines_per_job > 0).then_some(self.max_log_lines_per_job)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}
