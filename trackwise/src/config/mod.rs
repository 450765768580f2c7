//! Engine configuration.
//!
//! All thresholds are injectable. [`EngineConfig`] groups the per-component
//! settings and can be loaded from or saved to an INI file:
//!
//! ```ini
//! [motion]
//! window_size = 20
//! driving_confirmation_secs = 30
//!
//! [sync]
//! max_retries = 3
//! allow_metered = false
//! ```
//!
//! Missing keys keep their defaults. Durations are given in seconds.

mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::driving::DrivingConfig;
use crate::error::ConfigError;
use crate::motion::MotionConfig;
use crate::policy::PolicyConfig;
use crate::sync::SyncConfig;

/// File name inside the configuration directory.
pub const CONFIG_FILE_NAME: &str = "config.ini";

/// Longest duration any setting accepts (one week).
pub const MAX_DURATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Reject zero and anything longer than [`MAX_DURATION`].
pub(crate) fn check_duration(field: &'static str, value: Duration) -> Result<(), ConfigError> {
    if value.is_zero() {
        return Err(ConfigError::invalid(field, "must be non-zero"));
    }
    if value > MAX_DURATION {
        return Err(ConfigError::invalid(
            field,
            format!("must be at most {} seconds", MAX_DURATION.as_secs()),
        ));
    }
    Ok(())
}

/// Configuration for every engine component.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
    pub motion: MotionConfig,
    pub policy: PolicyConfig,
    pub sync: SyncConfig,
    pub driving: DrivingConfig,
}

impl EngineConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.motion.validate()?;
        self.policy.validate()?;
        self.sync.validate()?;
        self.driving.validate()
    }

    /// Load from an INI file and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_ini_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Load from the default location, or defaults if no file exists.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        match config_file_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Parse INI text and validate.
    pub fn from_ini_str(content: &str) -> Result<Self, ConfigError> {
        let config = file::parse(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Render as INI text with every key present.
    pub fn to_ini_string(&self) -> String {
        file::render(self)
    }

    /// Write to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_ini_string())?;
        Ok(())
    }
}

/// Configuration directory (`~/.config/trackwise` on Linux).
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("trackwise"))
}

/// Default configuration file path.
pub fn config_file_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join(CONFIG_FILE_NAME))
}
