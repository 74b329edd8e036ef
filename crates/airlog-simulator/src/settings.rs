//! Simulator settings
//!
//! Layered lowest to highest: [`NodeConfig`] defaults, then a JSON file named
//! by `AIRLOG_CONFIG`, then `AIRLOG_*` environment variables (a `.env` file in
//! the working directory is loaded first).

use std::path::PathBuf;

use airlog_core::NodeConfig;
use log::info;
use thiserror_no_std::Error;

pub const CONFIG_VAR: &str = "AIRLOG_CONFIG";
pub const DATA_DIR_VAR: &str = "AIRLOG_DATA_DIR";
pub const SPEEDUP_VAR: &str = "AIRLOG_SPEEDUP";
pub const DURATION_VAR: &str = "AIRLOG_DURATION_SECS";

/// Simulated seconds per real second unless overridden.
const DEFAULT_SPEEDUP: u32 = 600;

/// Two simulated hours: enough for two hourly averages.
const DEFAULT_DURATION_SECS: u64 = 2 * 3600;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Cannot read config file {path}: {details}")]
    Read { path: String, details: String },
    #[error("Invalid config file {path}: {details}")]
    Parse { path: String, details: String },
    #[error("{var} must be a non-negative integer, got {value:?}")]
    BadNumber { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimSettings {
    pub node: NodeConfig,
    /// Host directory standing in for the card root. `None` keeps everything
    /// in memory.
    pub data_dir: Option<PathBuf>,
    /// Simulated seconds per real second; 0 runs as fast as possible.
    pub speedup: u32,
    /// Simulated run length.
    pub duration_secs: u64,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            data_dir: None,
            speedup: DEFAULT_SPEEDUP,
            duration_secs: DEFAULT_DURATION_SECS,
        }
    }
}

impl SimSettings {
    /// Load settings from `.env`, the optional JSON file and the environment.
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = dotenvy::dotenv() {
            info!("Loaded environment from {}", path.display());
        }
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Resolve settings through `lookup` instead of the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(path) = lookup(CONFIG_VAR) {
            settings.node = read_node_config(&path)?;
            info!("Loaded node config from {}", path);
        }
        if let Some(dir) = lookup(DATA_DIR_VAR).filter(|d| !d.is_empty()) {
            settings.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(value) = lookup(SPEEDUP_VAR) {
            settings.speedup = parse_number(SPEEDUP_VAR, &value)?;
        }
        if let Some(value) = lookup(DURATION_VAR) {
            settings.duration_secs = parse_number(DURATION_VAR, &value)?;
        }
        Ok(settings)
    }
}

fn read_node_config(path: &str) -> Result<NodeConfig, SettingsError> {
    let text = std::fs::read_to_string(path).map_err(|e| SettingsError::Read {
        path: path.to_owned(),
        details: e.to_string(),
    })?;
    parse_node_config(&text).map_err(|details| SettingsError::Parse {
        path: path.to_owned(),
        details,
    })
}

/// Parse a JSON node config; missing fields keep their defaults.
pub fn parse_node_config(text: &str) -> Result<NodeConfig, String> {
    serde_json::from_str(text).map_err(|e| e.to_string())
}

fn parse_number<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, SettingsError> {
    value.trim().parse().map_err(|_| SettingsError::BadNumber {
        var,
        value: value.to_owned(),
    })
}
