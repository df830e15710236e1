use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use thiserror::Error;

use crate::breaker::BreakerConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config yaml: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// Absent runs the process against the in-memory store
    pub postgres_url: Option<String>,
    pub escrow: EscrowConfig,
    pub pin: PinConfig,
    pub sweeper: SweeperConfig,
    /// Keyed by dependency name
    pub breakers: HashMap<String, BreakerConfig>,
    pub feature_service: FeatureServiceConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: "./logs".to_string(),
            log_file: "escrow.log".to_string(),
            use_json: false,
            rotation: "daily".to_string(),
            postgres_url: None,
            escrow: EscrowConfig::default(),
            pin: PinConfig::default(),
            sweeper: SweeperConfig::default(),
            breakers: HashMap::new(),
            feature_service: FeatureServiceConfig::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct EscrowConfig {
    /// Permitted hold periods
    pub hold_tiers_days: Vec<u32>,
    pub mutual_resolution_hours: i64,
    pub evidence_hours: i64,
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            hold_tiers_days: vec![7, 30],
            mutual_resolution_hours: 24,
            evidence_hours: 48,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PinConfig {
    pub length: usize,
    pub max_attempts: u32,
    pub lock_hours: i64,
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
    pub argon2_parallelism: u32,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            length: 6,
            max_attempts: 4,
            lock_hours: 4,
            argon2_memory_kib: 19 * 1024,
            argon2_iterations: 2,
            argon2_parallelism: 1,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SweeperConfig {
    pub interval_secs: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct FeatureServiceConfig {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for FeatureServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8081".to_string(),
            timeout_ms: 12_000,
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
            path: config_path.clone(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Breaker settings for `name`, falling back to defaults
    pub fn breaker(&self, name: &str) -> BreakerConfig {
        self.breakers.get(name).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let cfg = AppConfig::from_yaml_str(
            r#"
log_level: debug
escrow:
  evidence_hours: 72
breakers:
  feature-service:
    max_failures: 3
"#,
        )
        .unwrap();

        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.escrow.hold_tiers_days, vec![7, 30]);
        assert_eq!(cfg.escrow.evidence_hours, 72);
        assert_eq!(cfg.pin.length, 6);
        assert!(cfg.postgres_url.is_none());

        let b = cfg.breaker("feature-service");
        assert_eq!(b.max_failures, 3);
        assert_eq!(b.half_open_max, 1);
        assert_eq!(cfg.breaker("other").max_failures, 5);
    }

    #[test]
    fn test_bad_yaml() {
        assert!(matches!(
            AppConfig::from_yaml_str("escrow: [1, 2"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            AppConfig::load("does-not-exist"),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_dev_config_parses() {
        let cfg = AppConfig::from_yaml_str(include_str!("../config/dev.yaml")).unwrap();
        assert_eq!(cfg.sweeper.interval_secs, 60);
    }
}
