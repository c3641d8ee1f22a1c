//! Configuration file handling.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest reply timeout a tty can express (VTIME is 255 deciseconds).
pub const MAX_TIMEOUT_SECS: f64 = 25.5;

/// Errors loading or saving the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Main configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub application: ApplicationConfig,
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Log per-frame decisions and would-be commands.
    pub debug_mode: bool,
}

/// Serial link settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path, or "auto" to scan for the board.
    pub port: String,
    pub baud_rate: u32,
    /// Seconds to wait for READY / OK.
    pub timeout_secs: f64,
}

/// Landmark processing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Hands considered per frame. Only the first is classified.
    pub max_hands: usize,
    /// Majority-vote window, in frames.
    pub smoothing_frames: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Seconds between status log lines.
    pub status_interval_secs: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "auto".to_string(),
            baud_rate: 115200,
            timeout_secs: 2.0,
        }
    }
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            max_hands: 1,
            smoothing_frames: 3,
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            status_interval_secs: 60,
        }
    }
}

impl SerialConfig {
    /// Explicit port path, or `None` when the port should be discovered.
    pub fn port_path(&self) -> Option<PathBuf> {
        let port = self.port.trim();
        if port.is_empty() || port.eq_ignore_ascii_case("auto") {
            None
        } else {
            Some(PathBuf::from(port))
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs)
    }
}

impl Config {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::Invalid("baud_rate must be > 0".to_string()));
        }
        let timeout = self.serial.timeout_secs;
        if !(timeout > 0.0 && timeout <= MAX_TIMEOUT_SECS) {
            return Err(ConfigError::Invalid(format!(
                "timeout_secs must be in (0, {}], got {}",
                MAX_TIMEOUT_SECS, timeout
            )));
        }
        if self.vision.max_hands == 0 {
            return Err(ConfigError::Invalid("max_hands must be >= 1".to_string()));
        }
        if !(1..=30).contains(&self.vision.smoothing_frames) {
            return Err(ConfigError::Invalid(format!(
                "smoothing_frames must be in [1, 30], got {}",
                self.vision.smoothing_frames
            )));
        }
        if self.controller.status_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "status_interval_secs must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file, writing the defaults there first if it does
    /// not exist yet.
    pub fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            return Self::load(path);
        }
        let config = Self::default();
        config.save(path)?;
        Ok(config)
    }

    /// Save config to file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_toml()?;
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(path, content).map_err(io_err)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
