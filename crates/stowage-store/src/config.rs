//! Store configuration
//!
//! ```toml
//! path = "data/app.db"   # or ":memory:"
//! debug = false
//! upgrade = true
//! ```
//!
//! `STOWAGE_DEBUG` and `STOWAGE_UPGRADE` override the flags of a loaded file.

use std::path::Path;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use stowage_core::StaticConfig;

use crate::db;
use crate::errors::{config_error, io_error, Result};

pub const IN_MEMORY: &str = ":memory:";
pub const ENV_DEBUG: &str = "STOWAGE_DEBUG";
pub const ENV_UPGRADE: &str = "STOWAGE_UPGRADE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Database file, or `:memory:`
    pub path: String,
    pub debug: bool,
    pub upgrade: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self {
            path: IN_MEMORY.to_string(),
            debug: false,
            upgrade: false,
        }
    }

    pub fn at<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_string_lossy().into_owned(),
            ..Self::in_memory()
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| config_error("<string>", &e.to_string()))
    }

    /// Read a TOML file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| io_error("config_load", e))?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| config_error(&path.display().to_string(), &e.to_string()))?;
        Ok(config.with_env_overrides())
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Some(debug) = env_flag(ENV_DEBUG) {
            self.debug = debug;
        }
        if let Some(upgrade) = env_flag(ENV_UPGRADE) {
            self.upgrade = upgrade;
        }
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.path == IN_MEMORY
    }

    /// Bootstrap flags for an opened database
    ///
    /// A database without any table is a first run. This covers new files,
    /// empty files and files left behind by a first run that rolled back.
    pub fn resolve(&self, conn: &Connection) -> Result<StaticConfig> {
        Ok(StaticConfig {
            first_run: db::is_empty(conn)?,
            in_debug: self.debug,
            upgrade_requested: self.upgrade,
        })
    }
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name).ok().and_then(|v| parse_flag(&v))
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
