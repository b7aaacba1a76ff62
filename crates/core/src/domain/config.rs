//! Configuration management for loopme
//!
//! This module provides:
//! - Configuration structs for the client, routing rules and property keys
//! - TOML load/save with validation
//! - A manager that falls back to factory defaults on a missing or corrupt file
//!
//! The hardware identifiers of the real devices are not part of the file;
//! they are always given on the command line.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, error, info, instrument};

use crate::domain::stream::UnresolvedPolicy;

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Longest poll interval the PulseAudio mainloop accepts (`i32::MAX` microseconds)
pub const MAX_POLL_INTERVAL_MS: u64 = i32::MAX as u64 / 1000;

/// Errors that can occur during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Client-level settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Name announced to the audio server
    pub client_name: String,

    /// Longest time one connection poll may wait, in milliseconds
    pub poll_interval_ms: u64,
}

impl AppConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            client_name: "loopme".to_string(),
            poll_interval_ms: 250,
        }
    }
}

/// Routing rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Application name of the recorder
    pub recorder_app: String,

    /// Driver attribute identifying the loopback pair
    pub loopback_driver: String,

    /// Behaviour when a stream's destination was never discovered
    pub unresolved_policy: UnresolvedPolicy,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            recorder_app: "OBS".to_string(),
            loopback_driver: "snd_aloop".to_string(),
            unresolved_policy: UnresolvedPolicy::Skip,
        }
    }
}

/// Property list keys read from server objects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyKeys {
    pub driver: String,
    pub class: String,
    pub hardware_id: String,
    pub application: String,
}

impl Default for PropertyKeys {
    fn default() -> Self {
        Self {
            driver: "alsa.driver_name".to_string(),
            class: "device.class".to_string(),
            hardware_id: "alsa.id".to_string(),
            application: "application.name".to_string(),
        }
    }
}

/// Complete loopme configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopmeConfig {
    pub app: AppConfig,
    pub routing: RoutingConfig,
    pub properties: PropertyKeys,
}

impl LoopmeConfig {
    /// Load configuration from TOML file
    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;

        debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Save configuration to TOML file
    #[instrument(skip(self, path))]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "Saving configuration");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        fs::write(path, toml_str).await?;

        debug!("Configuration saved successfully");
        Ok(())
    }

    /// Reject values the daemon cannot work with
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("app.client_name", &self.app.client_name),
            ("routing.recorder_app", &self.routing.recorder_app),
            ("routing.loopback_driver", &self.routing.loopback_driver),
            ("properties.driver", &self.properties.driver),
            ("properties.class", &self.properties.class),
            ("properties.hardware_id", &self.properties.hardware_id),
            ("properties.application", &self.properties.application),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{} must not be empty", name)));
            }
        }

        if self.app.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "app.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.app.poll_interval_ms > MAX_POLL_INTERVAL_MS {
            return Err(ConfigError::Invalid(format!(
                "app.poll_interval_ms must be at most {}",
                MAX_POLL_INTERVAL_MS
            )));
        }

        Ok(())
    }
}

/// Manages the configuration file, by default `~/.config/loopme/config.toml`
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// Manager for the file in the platform config directory
    pub fn with_default_path() -> Result<Self> {
        Ok(Self::new(Self::default_config_dir()?.join("config.toml")))
    }

    /// Returns `~/.config/loopme` on Linux
    pub fn default_config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("loopme"))
            .ok_or_else(|| ConfigError::Invalid("Could not determine config directory".to_string()))
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load configuration from file
    ///
    /// If the config file doesn't exist, writes and returns the factory default.
    /// If the config file is corrupt, logs an error, keeps a `.corrupt` copy and
    /// returns the factory default.
    #[instrument(skip(self))]
    pub async fn load(&self) -> LoopmeConfig {
        if !self.config_path.exists() {
            info!(
                path = %self.config_path.display(),
                "Config file not found, creating factory default"
            );

            let config = LoopmeConfig::default();
            if let Err(e) = config.save_to_file(&self.config_path).await {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to save factory default config"
                );
            }

            return config;
        }

        match LoopmeConfig::load_from_file(&self.config_path).await {
            Ok(config) => config,
            Err(e) => {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to load config, using factory default"
                );

                let backup_path = self.config_path.with_extension("toml.corrupt");
                if let Err(copy_err) = fs::copy(&self.config_path, &backup_path).await {
                    error!(
                        path = %backup_path.display(),
                        error = %copy_err,
                        "Failed to backup corrupt config"
                    );
                }

                LoopmeConfig::default()
            }
        }
    }
}
