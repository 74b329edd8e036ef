//! Simulated hardware: sensor bus, wireless link, display and a subscriber

use std::time::{SystemTime, UNIX_EPOCH};

use airlog_core::Reading;
use airlog_core::display::StatusDisplay;
use airlog_core::sensors::{FRAME_LEN, HM3301_ADDRESS, offsets};
use airlog_core::telemetry::{Characteristic, LinkError, LinkEvents, Properties, TelemetryLink};
use airlog_core::time::DateTime;
use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};
use log::{debug, info};

// ---------------------------------------------------------------------------
// Sensor bus
// ---------------------------------------------------------------------------

/// I2C bus with a synthetic HM3301 attached.
///
/// Concentrations drift sinusoidally; every `corrupt_every`-th frame carries a
/// bad checksum so the skip path gets exercised.
pub struct SimulatedBus {
    frames_read: u64,
    corrupt_every: u64,
}

impl SimulatedBus {
    pub fn new(corrupt_every: u64) -> Self {
        Self {
            frames_read: 0,
            corrupt_every,
        }
    }

    fn next_frame(&mut self) -> [u8; FRAME_LEN] {
        self.frames_read += 1;
        let t = self.frames_read as f64;

        // PM2.5: 8-28 µg/m³ with a slow swing and some jitter
        let pm2_5 = 18.0 + 10.0 * (t / 240.0).sin() + 2.0 * (t / 7.0).cos();
        let pm1_0 = pm2_5 * 0.7;
        let pm10 = pm2_5 * 1.4 + 3.0 * (t / 53.0).sin();

        let mut frame = [0u8; FRAME_LEN];
        let channels = [
            (offsets::PM1_0_STD, pm1_0 * 1.1),
            (offsets::PM2_5_STD, pm2_5 * 1.1),
            (offsets::PM10_STD, pm10 * 1.1),
            (offsets::PM1_0_ATM, pm1_0),
            (offsets::PM2_5_ATM, pm2_5),
            (offsets::PM10_ATM, pm10),
        ];
        for (offset, value) in channels {
            let value = value.max(0.0) as u16;
            frame[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
        }

        let sum = frame[..FRAME_LEN - 1]
            .iter()
            .fold(0u8, |acc, b| acc.wrapping_add(*b));
        frame[FRAME_LEN - 1] = sum;
        if self.corrupt_every != 0 && self.frames_read % self.corrupt_every == 0 {
            frame[FRAME_LEN - 1] = sum.wrapping_add(1);
        }
        frame
    }
}

impl ErrorType for SimulatedBus {
    type Error = ErrorKind;
}

impl I2c for SimulatedBus {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if address != HM3301_ADDRESS {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }
        for op in operations.iter_mut() {
            match op {
                Operation::Read(buf) => {
                    let frame = self.next_frame();
                    let n = buf.len().min(FRAME_LEN);
                    buf[..n].copy_from_slice(&frame[..n]);
                }
                Operation::Write(bytes) => debug!("HM3301 <- {:02x?}", bytes),
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Wireless link
// ---------------------------------------------------------------------------

/// Link that logs every characteristic update.
#[derive(Default)]
pub struct MockLink {
    /// Characteristics declared at startup, in order
    pub registered: Vec<(Characteristic, &'static str, Properties)>,
    pub notifications: u64,
    pub advertising_starts: u64,
}

impl TelemetryLink for MockLink {
    fn register(
        &mut self,
        service: &'static str,
        characteristic: Characteristic,
        uuid: &'static str,
        properties: Properties,
    ) -> Result<(), LinkError> {
        let mut access = Vec::new();
        if properties.read {
            access.push("read");
        }
        if properties.notify {
            access.push("notify");
        }
        if properties.write {
            access.push("write");
        }
        info!(
            "Service {}: {} {} [{}]",
            service,
            characteristic.label(),
            uuid,
            access.join(", ")
        );
        self.registered.push((characteristic, uuid, properties));
        Ok(())
    }

    fn set_value(&mut self, characteristic: Characteristic, value: &[u8]) -> Result<(), LinkError> {
        match characteristic {
            Characteristic::History => match std::str::from_utf8(value) {
                Ok(text) => info!("History value:\n{}", text),
                Err(_) => info!("History value: {} bytes", value.len()),
            },
            _ => debug!("{} <- {:02x?}", characteristic.label(), value),
        }
        Ok(())
    }

    fn notify(&mut self, characteristic: Characteristic) -> Result<(), LinkError> {
        self.notifications += 1;
        debug!("Notified {}", characteristic.label());
        Ok(())
    }

    fn start_advertising(&mut self) -> Result<(), LinkError> {
        self.advertising_starts += 1;
        info!("Advertising");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

/// Display that writes each screen update to the log.
#[derive(Default)]
pub struct LogDisplay {
    pub frames: u64,
}

impl StatusDisplay for LogDisplay {
    fn show_reading(&mut self, reading: &Reading, subscribed: bool, now: u32) {
        self.frames += 1;
        info!(
            "[{}] PM1.0 {:>3}  PM2.5 {:>3}  PM10 {:>3}  BLE: {}",
            DateTime::from_epoch(now),
            reading.pm1_0_atm,
            reading.pm2_5_atm,
            reading.pm10_atm,
            if subscribed { "Connected" } else { "Waiting" }
        );
    }
}

// ---------------------------------------------------------------------------
// Subscriber
// ---------------------------------------------------------------------------

/// What the scripted subscriber does at a given uptime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberAction {
    Attach,
    /// Write the host's current epoch to the time-sync characteristic
    SyncTime,
    Detach,
}

/// A phone that connects, syncs the clock, stays a while and leaves.
pub struct SubscriberScript {
    steps: Vec<(u64, SubscriberAction)>,
    next: usize,
}

impl SubscriberScript {
    pub fn new(steps: Vec<(u64, SubscriberAction)>) -> Self {
        Self { steps, next: 0 }
    }

    /// Attach at 30 s, sync at 31 s, detach after `stay_secs`.
    pub fn phone(stay_secs: u64) -> Self {
        Self::new(vec![
            (30, SubscriberAction::Attach),
            (31, SubscriberAction::SyncTime),
            (30 + stay_secs, SubscriberAction::Detach),
        ])
    }

    /// Fire every step due at `uptime_secs` into `events`.
    pub fn run(&mut self, uptime_secs: u64, events: &LinkEvents) -> Vec<SubscriberAction> {
        let mut fired = Vec::new();
        while let Some(&(at, action)) = self.steps.get(self.next) {
            if at > uptime_secs {
                break;
            }
            match action {
                SubscriberAction::Attach => events.attached(),
                SubscriberAction::Detach => events.detached(),
                SubscriberAction::SyncTime => {
                    let epoch = SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .unwrap_or_default()
                        .as_secs();
                    let epoch = u32::try_from(epoch).unwrap_or(u32::MAX);
                    events.written(Characteristic::TimeSync, &epoch.to_le_bytes());
                }
            }
            fired.push(action);
            self.next += 1;
        }
        fired
    }
}
