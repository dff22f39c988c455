//! Engine configuration loading.
//!
//! Optional `config.toml` in the installer state directory. Every field has a
//! default, so a missing file (or a file with only some sections) is fine.
//!
//! ```toml
//! [lock]
//! stale_after_ms = 30000
//! retries = 20
//! retry_delay_ms = 100
//!
//! [settings]
//! file_name = "settings.json"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{CkError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub lock: LockConfig,
    pub settings: SettingsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// A lock older than this is presumed abandoned by a crashed process.
    pub stale_after_ms: u64,
    pub retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            stale_after_ms: 30_000,
            retries: 20,
            retry_delay_ms: 100,
        }
    }
}

impl LockConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    pub file_name: String,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            file_name: "settings.json".to_string(),
        }
    }
}

/// Loads the engine config, defaulting when the file doesn't exist.
pub fn load_engine_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        return Ok(EngineConfig::default());
    }

    let content = fs_err::read_to_string(path).map_err(|e| CkError::io("reading engine config", e))?;
    toml::from_str::<EngineConfig>(&content).map_err(|e| CkError::ConfigMalformed {
        path: path.to_path_buf(),
        details: e.to_string(),
    })
}
