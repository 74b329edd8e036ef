//! Wireless telemetry for a single subscriber
//!
//! One GATT-style service carries:
//!
//! | Characteristic | Properties   | Value                                  |
//! |----------------|--------------|----------------------------------------|
//! | PM1.0          | read, notify | atmospheric PM1.0, `u16` little-endian |
//! | PM2.5          | read, notify | atmospheric PM2.5, `u16` little-endian |
//! | PM10           | read, notify | atmospheric PM10, `u16` little-endian  |
//! | History        | read         | hourly history text, see [`history`]   |
//! | Time sync      | write        | epoch seconds, 4 or 8 bytes LE         |
//!
//! Live values are pushed only while a subscriber is attached; nothing is
//! buffered for a subscriber that was away. History is updated in place and
//! never notified.

pub mod events;
pub mod history;

pub use events::{LinkEvent, LinkEvents};
pub use history::{NO_HISTORY, serialize_history};

use alloc::string::String;

use log::{debug, info, warn};
use thiserror_no_std::Error;

use crate::config::{HistoryTimeFormat, NodeConfig};
use crate::sensors::Reading;
use crate::storage::AggregationBuffer;

/// UUID of the telemetry service.
pub const SERVICE_UUID: &str = "91bad492-b950-4226-aa2b-4ede9fa42f59";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Characteristic {
    Pm1_0,
    Pm2_5,
    Pm10,
    History,
    TimeSync,
}

/// Access a characteristic grants to the subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Properties {
    pub read: bool,
    pub notify: bool,
    pub write: bool,
}

impl Characteristic {
    /// Every characteristic except time sync, which is optional.
    pub const CORE: [Self; 4] = [Self::Pm1_0, Self::Pm2_5, Self::Pm10, Self::History];

    pub const fn uuid(self) -> &'static str {
        match self {
            Self::Pm1_0 => "91bad493-b950-4226-aa2b-4ede9fa42f59",
            Self::Pm2_5 => "91bad494-b950-4226-aa2b-4ede9fa42f59",
            Self::Pm10 => "91bad495-b950-4226-aa2b-4ede9fa42f59",
            Self::History => "91bad496-b950-4226-aa2b-4ede9fa42f59",
            Self::TimeSync => "91bad497-b950-4226-aa2b-4ede9fa42f59",
        }
    }

    pub const fn properties(self) -> Properties {
        match self {
            Self::Pm1_0 | Self::Pm2_5 | Self::Pm10 => Properties {
                read: true,
                notify: true,
                write: false,
            },
            Self::History => Properties {
                read: true,
                notify: false,
                write: false,
            },
            Self::TimeSync => Properties {
                read: false,
                notify: false,
                write: true,
            },
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Pm1_0 => "PM1.0",
            Self::Pm2_5 => "PM2.5",
            Self::Pm10 => "PM10",
            Self::History => "History",
            Self::TimeSync => "Time sync",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("Failed to {operation} on {characteristic}")]
    Characteristic {
        characteristic: &'static str,
        operation: &'static str,
    },
    #[error("Failed to start advertising")]
    Advertising,
}

/// Wireless peripheral stack as seen by the publisher.
pub trait TelemetryLink {
    /// Declare one characteristic of `service` before advertising starts.
    fn register(
        &mut self,
        service: &'static str,
        characteristic: Characteristic,
        uuid: &'static str,
        properties: Properties,
    ) -> Result<(), LinkError>;

    /// Replace the stored value of a characteristic.
    fn set_value(
        &mut self,
        characteristic: Characteristic,
        value: &[u8],
    ) -> Result<(), LinkError>;

    /// Push the stored value of a characteristic to the subscriber.
    fn notify(&mut self, characteristic: Characteristic) -> Result<(), LinkError>;

    /// Make the node discoverable again.
    fn start_advertising(&mut self) -> Result<(), LinkError>;
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSyncError {
    #[error("Time sync is not enabled on this node")]
    Disabled,
    #[error("Time sync payload must be 4 or 8 bytes, got {len}")]
    BadLength { len: usize },
    #[error("Time sync value {value} does not fit a 32-bit epoch")]
    OutOfRange { value: u64 },
}

/// Decode a little-endian epoch written to the time-sync characteristic.
pub fn decode_time_sync(payload: &[u8]) -> Result<u32, TimeSyncError> {
    match *payload {
        [b0, b1, b2, b3] => Ok(u32::from_le_bytes([b0, b1, b2, b3])),
        [b0, b1, b2, b3, b4, b5, b6, b7] => {
            let value = u64::from_le_bytes([b0, b1, b2, b3, b4, b5, b6, b7]);
            u32::try_from(value).map_err(|_| TimeSyncError::OutOfRange { value })
        }
        _ => Err(TimeSyncError::BadLength { len: payload.len() }),
    }
}

/// Pushes live readings and maintains the history value for one subscriber.
pub struct TelemetryPublisher<L> {
    link: L,
    subscribed: bool,
    time_sync_enabled: bool,
    history_time: HistoryTimeFormat,
    history: String,
}

impl<L: TelemetryLink> TelemetryPublisher<L> {
    pub fn new(link: L, config: &NodeConfig) -> Self {
        Self {
            link,
            subscribed: false,
            time_sync_enabled: config.time_sync_enabled,
            history_time: config.history_time,
            history: String::new(),
        }
    }

    /// Register the service, publish the initial history value and start
    /// advertising.
    pub fn start(&mut self, buffer: &AggregationBuffer, now: u32) {
        let characteristics: heapless::Vec<Characteristic, 5> = self.characteristics().collect();
        for characteristic in characteristics {
            let uuid = characteristic.uuid();
            let properties = characteristic.properties();
            match self
                .link
                .register(SERVICE_UUID, characteristic, uuid, properties)
            {
                Ok(()) => debug!("Registered {} ({})", characteristic.label(), uuid),
                Err(e) => warn!("{}", e),
            }
        }

        self.publish_history(buffer, now);
        match self.link.start_advertising() {
            Ok(()) => info!("Telemetry advertising started"),
            Err(e) => warn!("{}", e),
        }
    }

    /// Characteristics this node exposes.
    pub fn characteristics(&self) -> impl Iterator<Item = Characteristic> + '_ {
        Characteristic::CORE
            .into_iter()
            .chain(self.time_sync_enabled.then_some(Characteristic::TimeSync))
    }

    /// Push the atmospheric values if a subscriber is attached.
    pub fn on_reading_updated(&mut self, reading: &Reading) {
        if !self.subscribed {
            return;
        }

        let values = [
            (Characteristic::Pm1_0, reading.pm1_0_atm),
            (Characteristic::Pm2_5, reading.pm2_5_atm),
            (Characteristic::Pm10, reading.pm10_atm),
        ];
        for (characteristic, value) in values {
            let result = self
                .link
                .set_value(characteristic, &value.to_le_bytes())
                .and_then(|()| self.link.notify(characteristic));
            if let Err(e) = result {
                warn!("{}", e);
            }
        }
    }

    /// Re-serialize the history and store it for the next read.
    pub fn publish_history(&mut self, buffer: &AggregationBuffer, now: u32) {
        self.history = serialize_history(buffer, self.history_time, now);
        match self.link.set_value(Characteristic::History, self.history.as_bytes()) {
            Ok(()) => debug!("Historical data length: {}", self.history.len()),
            Err(e) => warn!("{}", e),
        }
    }

    pub fn on_attach(&mut self) {
        self.subscribed = true;
        info!("BLE Client Connected");
    }

    /// Forget the subscriber and become discoverable again.
    pub fn on_detach(&mut self) {
        self.subscribed = false;
        info!("BLE Client Disconnected");
        if let Err(e) = self.link.start_advertising() {
            warn!("{}", e);
        }
    }

    /// Handle a subscriber write, returning an epoch to apply to the clock.
    pub fn on_write(&mut self, characteristic: Characteristic, payload: &[u8]) -> Option<u32> {
        if characteristic != Characteristic::TimeSync {
            warn!("Ignoring write to read-only {}", characteristic.label());
            return None;
        }

        let decoded = if self.time_sync_enabled {
            decode_time_sync(payload)
        } else {
            Err(TimeSyncError::Disabled)
        };
        match decoded {
            Ok(epoch) => Some(epoch),
            Err(e) => {
                warn!("Ignoring time sync write: {}", e);
                None
            }
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    /// Current value of the history characteristic.
    pub fn history(&self) -> &str {
        &self.history
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }
}
