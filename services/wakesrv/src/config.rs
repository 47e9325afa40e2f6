//! Wake service configuration
//!
//! Layering follows the usual service pattern: compiled defaults, then an
//! optional YAML file, then `WAKESRV_`-prefixed environment variables.

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, WakeError};

/// Wake service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WakeConfig {
    /// Service identity
    #[serde(default)]
    pub service: ServiceConfig,
    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Delivery policy
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

/// Service identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name used in logs
    pub name: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path
    pub db_path: String,
    /// Retention period for stopped/expired alarms (in days)
    pub retention_days: u32,
    /// Run the retention sweep at boot
    pub purge_on_boot: bool,
}

/// Delivery policy
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeliveryConfig {
    /// Stop ringing alarms automatically after this many milliseconds;
    /// `None` means the alarm rings until the user stops it
    pub auto_stop_after_millis: Option<i64>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "wakesrv".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: "data/wakesrv.db".to_string(),
            retention_days: 30,
            purge_on_boot: true,
        }
    }
}

impl WakeConfig {
    /// Load configuration: defaults < YAML file < environment
    pub fn load() -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(WakeConfig::default()));

        let config_paths = ["config/wakesrv.yaml", "wakesrv.yaml"];
        for path in config_paths {
            if Path::new(path).exists() {
                figment = figment.merge(Yaml::file(path));
                break;
            }
        }

        figment
            .merge(Env::prefixed("WAKESRV_").split("__"))
            .extract()
            .map_err(|e| WakeError::Config(e.to_string()))
    }
}
