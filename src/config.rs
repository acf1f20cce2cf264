//! Configuration using Figment.
//!
//! Configuration is loaded from:
//! 1. A TOML file (base configuration)
//! 2. Environment variables prefixed with `LIRC_`, nested keys separated by
//!    `__` (e.g. `LIRC_STM__RX_UHF_MODE=true`)
//!
//! Every field has a default, so an empty or missing file yields a usable
//! configuration.
//!
//! # Example
//! ```no_run
//! use lirc::config::LircConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = LircConfig::load_from("lirc.toml")?;
//! config.validate()?;
//! println!("{} minor slots", config.core.max_devices);
//! # Ok(())
//! # }
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use lirc_core::{RegistryConfig, DEFAULT_HZ, MAX_IRCTL_DEVICES};
use lirc_driver_stm::StmPlatformData;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "LIRC_";

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File or environment could not be parsed
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// A value is out of range
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    /// Configuration could not be rendered as TOML
    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl ConfigError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LircConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Registry settings
    #[serde(default)]
    pub core: CoreConfig,
    /// STM IR block board settings
    #[serde(default)]
    pub stm: StmPlatformData,
}

/// Application-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Registry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Scheduler tick rate in Hz
    #[serde(default = "default_hz")]
    pub hz: u32,
    /// Number of minor slots
    #[serde(default = "default_max_devices")]
    pub max_devices: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            hz: default_hz(),
            max_devices: default_max_devices(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_hz() -> u32 {
    DEFAULT_HZ
}

fn default_max_devices() -> usize {
    MAX_IRCTL_DEVICES
}

const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl LircConfig {
    /// Load configuration from a TOML file and `LIRC_` environment variables.
    ///
    /// A missing file is not an error; defaults and the environment apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::figment(Some(path.as_ref()))
            .extract()
            .map_err(|e| ConfigError::Load(Box::new(e)))
    }

    /// Load from defaults and the environment only.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::figment(None)
            .extract()
            .map_err(|e| ConfigError::Load(Box::new(e)))
    }

    fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::new();
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let level = self.application.log_level.to_lowercase();
        if !VALID_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::invalid(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                VALID_LEVELS.join(", ")
            )));
        }

        if self.core.hz == 0 {
            return Err(ConfigError::invalid("core.hz must be greater than 0"));
        }
        if self.core.max_devices == 0 {
            return Err(ConfigError::invalid(
                "core.max_devices must be greater than 0",
            ));
        }

        if self.stm.sys_clock_div == 0 {
            return Err(ConfigError::invalid("stm.sys_clock_div must be non-zero"));
        }
        if self.stm.sys_clock_hz == 0 {
            return Err(ConfigError::invalid("stm.sys_clock_hz must be non-zero"));
        }

        Ok(())
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Registry settings for [`lirc_core::Registry::new`].
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            max_devices: self.core.max_devices,
            hz: self.core.hz,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = LircConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.core.hz, 100);
        assert_eq!(config.core.max_devices, 4);
        assert_eq!(config.stm, StmPlatformData::default());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = LircConfig::default();
        config.application.log_level = "loud".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_zero_values_rejected() {
        let mut config = LircConfig::default();
        config.core.hz = 0;
        assert!(config.validate().is_err());

        let mut config = LircConfig::default();
        config.core.max_devices = 0;
        assert!(config.validate().is_err());

        let mut config = LircConfig::default();
        config.stm.sys_clock_div = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_to_toml_round_trip() {
        let mut config = LircConfig::default();
        config.stm.rx_uhf_mode = true;
        let text = config.to_toml().expect("serialize failed");
        assert!(text.contains("rx_uhf_mode = true"));

        let parsed: LircConfig = toml::from_str(&text).expect("parse failed");
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_registry_config() {
        let mut config = LircConfig::default();
        config.core.max_devices = 2;
        config.core.hz = 250;
        let registry = config.registry_config();
        assert_eq!(registry.max_devices, 2);
        assert_eq!(registry.hz, 250);
    }
}
