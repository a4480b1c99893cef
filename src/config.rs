//! Application configuration, one TOML file
//!
//! Missing sections and keys fall back to their defaults, so a config
//! written by an older version still loads.

use crate::controller::event_monitor::MonitorSettings;
use crate::mapping::engine::EngineSettings;
use crate::protocol::AxisId;
use crate::trim::TrimSettings;
use color_eyre::eyre::{ensure, eyre, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const APP_DIR: &str = "yoketrim";
const CONFIG_FILE: &str = "config.toml";
const BINDINGS_FILE: &str = "bindings.toml";

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct TrimConfig {
    pub remote: SocketAddr,
    pub read_timeout_ms: u64,
    pub multicast_ttl: u32,
    /// Axis the trim functions act on
    pub axis: AxisId,
    /// Offset change per left/right press
    pub step: f32,
}

impl Default for TrimConfig {
    fn default() -> Self {
        Self {
            remote: SocketAddr::from((Ipv4Addr::LOCALHOST, 15090)),
            read_timeout_ms: 8000,
            multicast_ttl: 5,
            axis: AxisId::Rudder,
            step: 0.05,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct InputConfig {
    pub poll_interval_us: u64,
    pub stats_interval_s: u64,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            poll_interval_us: 1000,
            stats_interval_s: 10,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    pub bindings_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bindings_file: app_dir().join(BINDINGS_FILE),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub trim: TrimConfig,
    pub input: InputConfig,
    pub storage: StorageConfig,
}

fn app_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

impl AppConfig {
    pub fn default_path() -> PathBuf {
        app_dir().join(CONFIG_FILE)
    }

    /// Reads the config at `path`, writing the defaults there first if the
    /// file does not exist yet.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No config at {}, writing defaults", path.display());
            let config = Self::default();
            config.save(path)?;
            return Ok(config);
        }

        let content = fs::read_to_string(path)
            .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;
        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;
        config.validate()?;
        debug!("Loaded config from {}: {:?}", path.display(), config);
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| eyre!("Failed to create config directory: {}", e))?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| eyre!("Failed to serialize config: {}", e))?;
        fs::write(path, content)
            .map_err(|e| eyre!("Failed to write config file {}: {}", path.display(), e))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.trim.read_timeout_ms > 0,
            "trim.read_timeout_ms must be greater than zero"
        );
        ensure!(
            self.trim.step.is_finite() && self.trim.step > 0.0,
            "trim.step must be a positive number, got {}",
            self.trim.step
        );
        ensure!(
            self.input.poll_interval_us > 0,
            "input.poll_interval_us must be greater than zero"
        );
        ensure!(
            self.input.stats_interval_s > 0,
            "input.stats_interval_s must be greater than zero"
        );
        Ok(())
    }

    pub fn trim_settings(&self) -> TrimSettings {
        TrimSettings {
            remote: self.trim.remote,
            read_timeout: Duration::from_millis(self.trim.read_timeout_ms),
            multicast_ttl: self.trim.multicast_ttl,
        }
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            poll_interval: Duration::from_micros(self.input.poll_interval_us),
            stats_interval: Duration::from_secs(self.input.stats_interval_s),
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            axis: self.trim.axis,
            step: self.trim.step,
        }
    }
}
