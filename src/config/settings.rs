//! Declaration-time settings
//!
//! Settings are loaded from `~/.dbvalidations/config.toml` when present and
//! can be overridden from the process environment. They are passed
//! explicitly to every model definition; nothing here is read implicitly
//! while a rule is being declared.

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable that disables the backing index/foreign key checks.
pub const SKIP_INDEX_CHECK_ENV: &str = "SKIP_DB_UNIQUENESS_VALIDATOR_INDEX_CHECK";

/// Declaration settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Skip asserting that declared rules are backed by the schema.
    ///
    /// Registration still happens. Meant for running migrations against a
    /// schema that does not have the target indexes yet.
    #[serde(default)]
    pub skip_index_check: bool,
}

impl Settings {
    /// Settings with the existence checks disabled
    pub fn skipping_index_check() -> Self {
        Self {
            skip_index_check: true,
        }
    }

    /// Settings taken from the process environment only
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply environment overrides on top of these settings
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(value) = std::env::var(SKIP_INDEX_CHECK_ENV) {
            self.skip_index_check = is_truthy(&value);
        }
        self
    }

    /// Get the config directory path (~/.dbvalidations/)
    pub fn config_dir() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".dbvalidations"))
    }

    /// Load settings from a specific TOML file, defaulting when it is absent
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }
}

/// Load settings from the config file, then apply environment overrides
pub fn load_settings() -> ConfigResult<Settings> {
    let path = Settings::config_dir()?.join("config.toml");
    Ok(Settings::load_from(&path)?.with_env_overrides())
}

/// Interpret an environment flag value.
fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty()
        && !matches!(
            value.to_ascii_lowercase().as_str(),
            "0" | "false" | "no" | "off"
        )
}
