//! Session configuration

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_FETCH_LIMIT: usize = 50;
const DEFAULT_TYPING_INDICATOR_SHOW_MS: u64 = 5000;
const DEFAULT_OFFSET_Y_TO_LOAD_MORE: f64 = 400.0;

/// Tunables for a conversation session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Page size for history fetches (observer override takes precedence)
    pub messages_fetch_limit: usize,
    /// How long the typing indicator stays up without a further event
    pub typing_indicator_show_ms: u64,
    /// Scroll offset (from the top) below which older history is requested
    pub offset_y_to_load_more: f64,
    /// Local user id, used when the CLI builds a session
    pub local_user_id: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            messages_fetch_limit: DEFAULT_FETCH_LIMIT,
            typing_indicator_show_ms: DEFAULT_TYPING_INDICATOR_SHOW_MS,
            offset_y_to_load_more: DEFAULT_OFFSET_Y_TO_LOAD_MORE,
            local_user_id: None,
        }
    }
}

impl SessionConfig {
    /// Get config directory path
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "chat-timeline", "chat-timeline")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Get config file path
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, falling back to defaults when absent
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).context("Failed to read config file")?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    pub fn typing_indicator_show_duration(&self) -> Duration {
        Duration::from_millis(self.typing_indicator_show_ms)
    }
}
