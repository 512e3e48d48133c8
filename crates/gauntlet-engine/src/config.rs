//! Engine configuration.
//!
//! A small TOML surface: the wall-clock budget and the deny-sets. Every
//! field has a default equal to the engine's fixed behavior, so an absent
//! file, an empty file, and no configuration at all are equivalent. The
//! worker layers CLI flags on top (flags > file > defaults).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::policy::DenyPolicy;

/// Default wall-clock budget per interpreter stage. A product tuning
/// choice, not engine logic; override via config or `--timeout-ms`.
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid TOML syntax: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// Everything the engine can be told about how to behave.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Wall-clock budget for each interpreter stage, in milliseconds.
    pub timeout_ms: u64,

    /// Deny-sets enforced by the security analyzer.
    pub policy: DenyPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            policy: DenyPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Load and validate a configuration file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// The budget as a duration.
    pub fn budget(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
