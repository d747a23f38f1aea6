//! Runtime configuration
//!
//! Loaded from a YAML file, then overridden from the environment:
//!
//! ```yaml
//! log_level: debug
//! diagnose:
//!   max_hops: 16
//!   resolve_timeout_secs: 5
//! ```
//!
//! `SKOOP_MAX_HOPS`, `SKOOP_RESOLVE_TIMEOUT_SECS` and `SKOOP_LOG_LEVEL`
//! take precedence over the file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::{Result, SkoopError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkoopConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub diagnose: DiagnoseConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnoseConfig {
    /// Hops walked before giving up on a path
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,
    #[serde(default = "default_resolve_timeout_secs")]
    pub resolve_timeout_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_hops() -> usize {
    32
}

fn default_resolve_timeout_secs() -> u64 {
    10
}

impl Default for SkoopConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            diagnose: DiagnoseConfig::default(),
        }
    }
}

impl Default for DiagnoseConfig {
    fn default() -> Self {
        Self {
            max_hops: default_max_hops(),
            resolve_timeout_secs: default_resolve_timeout_secs(),
        }
    }
}

impl DiagnoseConfig {
    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }
}

impl SkoopConfig {
    /// Read `path`, apply environment overrides and validate.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SkoopError::ConfigError(format!("config file not found: {}", path.display()))
            } else {
                SkoopError::IoError(e)
            }
        })?;
        let mut config = Self::parse(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, for runs without a config file.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| SkoopError::ConfigError(format!("invalid config: {}", e)))
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(level) = lookup("SKOOP_LOG_LEVEL") {
            self.log_level = level;
        }
        override_parsed(&mut self.diagnose.max_hops, "SKOOP_MAX_HOPS", &lookup);
        override_parsed(
            &mut self.diagnose.resolve_timeout_secs,
            "SKOOP_RESOLVE_TIMEOUT_SECS",
            &lookup,
        );
    }

    pub fn validate(&self) -> Result<()> {
        if self.diagnose.max_hops == 0 {
            return Err(SkoopError::ConfigError(
                "diagnose.max_hops must be greater than 0".to_string(),
            ));
        }
        if self.diagnose.resolve_timeout_secs == 0 {
            return Err(SkoopError::ConfigError(
                "diagnose.resolve_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if tracing_subscriber::EnvFilter::try_new(&self.log_level).is_err() {
            return Err(SkoopError::ConfigError(format!(
                "invalid log_level: {}",
                self.log_level
            )));
        }
        Ok(())
    }
}

fn override_parsed<T: std::str::FromStr>(
    field: &mut T,
    key: &str,
    lookup: &impl Fn(&str) -> Option<String>,
) {
    if let Some(raw) = lookup(key) {
        match raw.parse() {
            Ok(value) => *field = value,
            Err(_) => warn!("Ignoring {}={:?}: not a valid number", key, raw),
        }
    }
}
