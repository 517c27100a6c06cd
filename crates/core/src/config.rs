// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock coordinator configuration

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Settings for a [`LockCoordinator`](crate::coordinator::LockCoordinator)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoordinatorConfig {
    /// Name recorded on the coordinator's tracing span
    pub name: String,
    /// Capacity of the request queue feeding the decision task
    pub queue_depth: usize,
    /// Serve callers through the fallback lock once the coordinator is closed.
    /// When disabled, late callers get `LockError::Closed`.
    pub fallback_after_shutdown: bool,
    /// How long `shutdown()` waits for the decision task to exit
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            queue_depth: 64,
            fallback_after_shutdown: true,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl CoordinatorConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    pub fn with_fallback_after_shutdown(mut self, enabled: bool) -> Self {
        self.fallback_after_shutdown = enabled;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("name must not be empty".into()));
        }
        if self.queue_depth == 0 {
            return Err(ConfigError::Invalid("queue_depth must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
