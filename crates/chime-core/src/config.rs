//! Sound system configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{Error, Result};

/// File name of the configuration inside the project config directory.
const CONFIG_FILE_NAME: &str = "chime.json";

/// Configuration for a sound system and its output backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SoundConfig {
    /// Whether newly created channels accept `play` calls.
    pub channels_enabled: bool,
    /// Root directory resource paths are resolved against.
    pub resource_root: PathBuf,
    /// How many times backend initialization is attempted before giving up.
    pub init_attempts: u32,
    /// Delay between initialization attempts, in milliseconds.
    pub init_retry_delay_ms: u64,
    /// Convert loaded assets to the output format once, at load time.
    pub optimize_on_load: bool,
    /// Output device settings.
    pub output: OutputConfig,
}

impl Default for SoundConfig {
    fn default() -> Self {
        Self {
            channels_enabled: true,
            resource_root: PathBuf::from("."),
            init_attempts: 3,
            init_retry_delay_ms: 250,
            optimize_on_load: true,
            output: OutputConfig::default(),
        }
    }
}

/// Audio output device settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Output device name. `None` selects the host default.
    pub device: Option<String>,
    /// Fixed buffer size in frames. `None` lets the host decide.
    pub buffer_size: Option<u32>,
}

impl SoundConfig {
    /// Default location of the configuration file, if the platform has one.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "chime").map(|d| d.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load the configuration from `path`, or from the default location.
    ///
    /// A missing file yields the defaults; a present but invalid file is an error.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) => path,
                None => {
                    warn!("No configuration directory available, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        if !path.exists() {
            info!("No configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        Self::load(&path)
    }

    /// Check the values serde cannot check on its own.
    pub fn validate(&self) -> Result<()> {
        if self.init_attempts == 0 {
            return Err(Error::Config("init_attempts must be at least 1".into()));
        }
        if self.output.buffer_size == Some(0) {
            return Err(Error::Config("output.buffer_size must be non-zero".into()));
        }
        Ok(())
    }

    /// Delay between initialization attempts.
    pub const fn init_retry_delay(&self) -> Duration {
        Duration::from_millis(self.init_retry_delay_ms)
    }
}
