// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/homesim

//! Configuration module

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application name
    pub app_name: String,

    /// Application version
    pub version: String,

    /// Data directory (projects, exports)
    pub data_dir: PathBuf,

    /// Log level
    pub log_level: String,

    /// Start with the built-in demo household
    pub demo_mode: bool,

    /// Simulation engine configuration
    pub simulation: SimulationConfig,

    /// Project file configuration
    pub project: ProjectConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "HomeSim".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            data_dir: PathBuf::from("./data"),
            log_level: "info".to_string(),
            demo_mode: true,
            simulation: SimulationConfig::default(),
            project: ProjectConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {:?}", path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("parsing config {:?}", path))?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("homesim"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Where projects are written when no explicit path is given
    pub fn default_project_path(&self) -> PathBuf {
        self.data_dir.join(&self.project.default_file)
    }

    /// Log filter directive: `trace` and `debug` flags win over `log_level`
    pub fn log_filter(&self, debug: bool, trace: bool) -> String {
        if trace {
            "trace".to_string()
        } else if debug {
            "debug".to_string()
        } else if self.log_level.trim().is_empty() {
            "info".to_string()
        } else {
            self.log_level.trim().to_string()
        }
    }
}

/// Simulation engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Virtual seconds per real second, clamped to [0.1, 10]
    pub speed_multiplier: f64,

    /// Update loop cadence in seconds, clamped to [0.1, 10]
    pub tick_interval_secs: f64,

    /// Battery percentage drained per tick from every active sensor
    pub battery_drain_rate: f64,

    /// Re-check period while paused, in milliseconds
    pub pause_poll_ms: u64,

    /// How long `stop` waits for the worker to exit, in milliseconds
    pub stop_timeout_ms: u64,

    /// Capacity of the broadcast channel handed to async consumers
    pub event_channel_capacity: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            speed_multiplier: 1.0,
            tick_interval_secs: 1.0,
            battery_drain_rate: 0.001,
            pause_poll_ms: 100,
            stop_timeout_ms: 2000,
            event_channel_capacity: 1024,
        }
    }
}

impl SimulationConfig {
    pub fn pause_poll(&self) -> Duration {
        Duration::from_millis(self.pause_poll_ms.max(1))
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

/// Project file configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Save the project on shutdown
    pub autosave: bool,

    /// File name under `data_dir` used for autosave
    pub default_file: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            autosave: false,
            default_file: "project.json".to_string(),
        }
    }
}
