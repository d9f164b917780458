//! Configuration for the umbra window manager
//!
//! Loads configuration from TOML file at `~/.config/umbra/config.toml`.
//! Auto-generates default config file on first run if missing.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub session: SessionConfig,
    pub keybindings: KeybindingsConfig,
    /// Preference-store overrides, keyed like `window.focusColor`
    pub style: HashMap<String, String>,
}

impl Config {
    /// Load configuration from file, or use defaults if it is missing or malformed
    pub fn load() -> Self {
        let config_path = match Self::config_path() {
            Ok(path) => path,
            Err(e) => {
                warn!("{}, using default configuration", e);
                return Self::default();
            }
        };

        if !config_path.exists() {
            info!("Config file not found at {:?}, using defaults", config_path);
            if let Err(e) = Self::save_default(&config_path) {
                warn!("Failed to create default config file: {}", e);
            }
            return Self::default();
        }

        match Self::read(&config_path) {
            Ok(config) => {
                info!("Configuration loaded from {:?}", config_path);
                debug!("Config: {:?}", config);
                config
            }
            Err(e) => {
                warn!("{:#}, using default configuration", e);
                Self::default()
            }
        }
    }

    fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        Self::parse(&content)
    }

    fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Get the path to the config file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("umbra");
        Ok(config_dir.join("config.toml"))
    }

    /// Save default configuration to file
    fn save_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_string = toml::to_string_pretty(&Self::default())
            .context("Failed to serialize default config")?;
        fs::write(path, toml_string).context("Failed to write default config file")?;

        info!("Created default config file at {:?}", path);
        Ok(())
    }
}

/// Main loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long the loop waits for input before running the idle tick
    pub idle_timeout_ms: u64,
    /// Display to manage; `$DISPLAY` when unset
    pub display: Option<String>,
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms.max(1))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: 250,
            display: None,
        }
    }
}

/// Modifiers of the global key bindings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeybindingsConfig {
    /// Held with Tab to cycle focus
    pub cycle_modifier: String,
    /// Held with Left/Right to switch workspaces
    pub workspace_modifier: String,
}

impl Default for KeybindingsConfig {
    fn default() -> Self {
        Self {
            cycle_modifier: "Mod1".to_string(),
            workspace_modifier: "Control".to_string(),
        }
    }
}
