//! Node configuration
//!
//! Defaults reproduce the deployed cadence: sample every 5 s, log every
//! 5 min, aggregate every hour.

use embassy_time::Duration;
use serde::{Deserialize, Serialize};

/// Advertised device name.
pub const DEVICE_NAME: &str = "PM2.5 Sensor";

/// How each history line refers to the time of its record.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum HistoryTimeFormat {
    /// `HH:MM` (UTC) of the record's stamp
    #[default]
    ClockTime,
    /// Whole minutes elapsed between the record's stamp and now
    MinutesAgo,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct NodeConfig {
    pub device_name: heapless::String<32>,
    pub sample_interval_secs: u32,
    pub log_interval_secs: u32,
    pub aggregate_interval_secs: u32,
    /// Accept epoch writes on the time-sync characteristic
    pub time_sync_enabled: bool,
    pub history_time: HistoryTimeFormat,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let mut device_name = heapless::String::new();
        let _ = device_name.push_str(DEVICE_NAME);
        Self {
            device_name,
            sample_interval_secs: 5,
            log_interval_secs: 300,
            aggregate_interval_secs: 3600,
            time_sync_enabled: true,
            history_time: HistoryTimeFormat::ClockTime,
        }
    }
}

impl NodeConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.sample_interval_secs))
    }

    pub fn log_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.log_interval_secs))
    }

    pub fn aggregate_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.aggregate_interval_secs))
    }
}
