//! Engine tuning knobs and their TOML loader.
//!
//! Every setting has a default, so a missing or partial `questline.toml` is
//! never fatal: problems are logged and the defaults are used instead.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Timing and distance settings shared by factories and tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Pause before the very first step, giving an incidental dialogue prompt time to appear.
    pub wait_at_start_ms: u64,
    /// Back-off between retries of a rejected side effect.
    pub retry_delay_ms: u64,
    /// How many rejected interaction attempts a task tolerates before failing.
    pub interaction_attempts: u32,
    pub mount_timeout_ms: u64,
    pub teleport_timeout_ms: u64,
    pub duty_timeout_ms: u64,
    /// How long an interaction target may stay missing before the step fails.
    pub entity_timeout_ms: u64,
    /// Stop distance used when a step does not declare one.
    pub default_stop_distance: f32,
    /// Maximum distance at which an entity can be interacted with.
    pub interaction_distance: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            wait_at_start_ms: 1_000,
            retry_delay_ms: 500,
            interaction_attempts: 5,
            mount_timeout_ms: 5_000,
            teleport_timeout_ms: 30_000,
            duty_timeout_ms: 120_000,
            entity_timeout_ms: 10_000,
            default_stop_distance: 3.0,
            interaction_distance: 5.0,
        }
    }
}

impl EngineConfig {
    pub fn wait_at_start(&self) -> Duration {
        Duration::from_millis(self.wait_at_start_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn mount_timeout(&self) -> Duration {
        Duration::from_millis(self.mount_timeout_ms)
    }

    pub fn teleport_timeout(&self) -> Duration {
        Duration::from_millis(self.teleport_timeout_ms)
    }

    pub fn duty_timeout(&self) -> Duration {
        Duration::from_millis(self.duty_timeout_ms)
    }

    pub fn entity_timeout(&self) -> Duration {
        Duration::from_millis(self.entity_timeout_ms)
    }
}

/// Parse an `EngineConfig` from TOML text.
///
/// # Errors
/// - if the text is not valid TOML or a field has the wrong type
pub fn parse_config(text: &str) -> Result<EngineConfig> {
    toml::from_str(text).context("parsing engine config TOML")
}

/// Load engine configuration, falling back to defaults on any problem.
pub fn load_config(path: &Path) -> EngineConfig {
    match try_load_config(path) {
        Ok(config) => {
            info!("engine config loaded from '{}'", path.display());
            config
        },
        Err(e) => {
            warn!("using default engine config: {e:#}");
            EngineConfig::default()
        },
    }
}

fn try_load_config(path: &Path) -> Result<EngineConfig> {
    let text = fs::read_to_string(path).with_context(|| format!("reading config from '{}'", path.display()))?;
    parse_config(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_other_defaults() {
        let config = parse_config("retry_delay_ms = 250\ninteraction_distance = 7.5\n").expect("parse");
        assert_eq!(config.retry_delay(), Duration::from_millis(250));
        assert!((config.interaction_distance - 7.5).abs() < f32::EPSILON);
        assert_eq!(config.interaction_attempts, EngineConfig::default().interaction_attempts);
    }

    #[test]
    fn wrong_type_is_an_error() {
        assert!(parse_config("retry_delay_ms = \"soon\"").is_err());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load_config(Path::new("definitely/not/here/questline.toml"));
        assert_eq!(config, EngineConfig::default());
    }
}
