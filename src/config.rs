//! Runtime configuration
//!
//! Read from `config.json` in the platform config directory
//! (e.g. `~/.config/neurokaraoke-presence/config.json`), or from the path in
//! `NEUROKARAOKE_CONFIG`. Every field is optional.

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "NEUROKARAOKE_CONFIG";

const APP_DIR: &str = "neurokaraoke-presence";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Delay after startup before the page is observed at all
    pub settle_delay_ms: u64,

    /// Debounce window for mutation bursts
    pub debounce_ms: u64,

    /// Interval of the unconditional safety-net pass
    pub fallback_interval_ms: u64,

    /// Minimum gap between "no progress source" diagnostics
    pub diagnostic_interval_secs: u64,

    /// Seconds moved by seek backward/forward
    pub seek_offset_secs: f64,

    /// Discord application id; the Discord now-playing session is off without it
    pub discord_app_id: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            settle_delay_ms: 2000,
            debounce_ms: 300,
            fallback_interval_ms: 5000,
            diagnostic_interval_secs: 30,
            seek_offset_secs: 10.0,
            discord_app_id: None,
        }
    }
}

impl Config {
    /// Load from `$NEUROKARAOKE_CONFIG` or the default location; defaults if
    /// neither exists.
    pub fn load() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path)),
            None => match default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => {
                    debug!("No config file, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {path:?}"))?;
        let config = serde_json::from_str(&text)
            .with_context(|| format!("Invalid config file {path:?}"))?;
        info!("Loaded config from {path:?}");
        Ok(config)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn fallback_interval(&self) -> Duration {
        Duration::from_millis(self.fallback_interval_ms.max(1))
    }

    pub fn diagnostic_interval(&self) -> Duration {
        Duration::from_secs(self.diagnostic_interval_secs)
    }
}

/// `<config_dir>/neurokaraoke-presence/config.json`
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
}
