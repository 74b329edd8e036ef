//! Particulate sensor readings and the driver boundary
//!
//! The driver hands back a raw 29-byte frame. Six big-endian `u16` channels sit
//! at fixed offsets: three standard-particle bins followed by three
//! atmospheric bins. Only the atmospheric bins are logged and published.

mod hm3301;

pub use hm3301::{HM3301_ADDRESS, Hm3301};

use thiserror_no_std::Error;

/// Length of a raw sensor frame in bytes.
pub const FRAME_LEN: usize = 29;

/// A raw frame as delivered by the sensor driver.
pub type Frame = [u8; FRAME_LEN];

/// Byte offsets of the six channels inside a [`Frame`].
pub mod offsets {
    pub const PM1_0_STD: usize = 4;
    pub const PM2_5_STD: usize = 6;
    pub const PM10_STD: usize = 8;
    pub const PM1_0_ATM: usize = 10;
    pub const PM2_5_ATM: usize = 12;
    pub const PM10_ATM: usize = 14;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SensorError {
    #[error("Sensor {sensor} failed to initialize: {details}")]
    InitializationFailed {
        sensor: &'static str,
        details: &'static str,
    },
    #[error("Sensor {sensor} failed to {operation}: {details}")]
    ReadFailed {
        sensor: &'static str,
        operation: &'static str,
        details: &'static str,
    },
    #[error("Sensor {sensor} frame checksum mismatch (expected {expected:#04x}, got {actual:#04x})")]
    ChecksumMismatch {
        sensor: &'static str,
        expected: u8,
        actual: u8,
    },
}

/// Driver for a particulate-matter sensor that produces raw frames.
pub trait ParticulateSensor {
    /// Bring the sensor up. Failure here is fatal at boot.
    fn init(&mut self) -> Result<(), SensorError>;

    /// Read and validate one raw frame.
    fn read_frame(&mut self) -> Result<Frame, SensorError>;
}

/// Mass concentration channels in µg/m³ plus the epoch second they were taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Reading {
    pub pm1_0_std: u16,
    pub pm2_5_std: u16,
    pub pm10_std: u16,
    pub pm1_0_atm: u16,
    pub pm2_5_atm: u16,
    pub pm10_atm: u16,
    pub timestamp: u32,
}

impl Reading {
    /// The atmospheric channels as `[pm1.0, pm2.5, pm10]`.
    pub const fn atmospheric(&self) -> [u16; 3] {
        [self.pm1_0_atm, self.pm2_5_atm, self.pm10_atm]
    }
}

#[inline]
fn be_u16(frame: &Frame, offset: usize) -> u16 {
    u16::from_be_bytes([frame[offset], frame[offset + 1]])
}

/// Decode the six channels of a validated frame.
pub fn decode_frame(frame: &Frame, timestamp: u32) -> Reading {
    Reading {
        pm1_0_std: be_u16(frame, offsets::PM1_0_STD),
        pm2_5_std: be_u16(frame, offsets::PM2_5_STD),
        pm10_std: be_u16(frame, offsets::PM10_STD),
        pm1_0_atm: be_u16(frame, offsets::PM1_0_ATM),
        pm2_5_atm: be_u16(frame, offsets::PM2_5_ATM),
        pm10_atm: be_u16(frame, offsets::PM10_ATM),
        timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_frame_offsets() {
        let mut frame = [0u8; FRAME_LEN];
        frame[4..16].copy_from_slice(&[
            0x00, 0x01, // pm1.0 std
            0x01, 0x02, // pm2.5 std
            0x02, 0x03, // pm10 std
            0x00, 0x0A, // pm1.0 atm
            0x00, 0x14, // pm2.5 atm
            0xFF, 0xFE, // pm10 atm
        ]);
        // Bytes outside the channel window must not leak into the reading
        frame[3] = 0xAA;
        frame[16] = 0xBB;

        let reading = decode_frame(&frame, 1234);

        assert_eq!(reading.pm1_0_std, 1);
        assert_eq!(reading.pm2_5_std, 0x0102);
        assert_eq!(reading.pm10_std, 0x0203);
        assert_eq!(reading.pm1_0_atm, 10);
        assert_eq!(reading.pm2_5_atm, 20);
        assert_eq!(reading.pm10_atm, 0xFFFE);
        assert_eq!(reading.timestamp, 1234);
        assert_eq!(reading.atmospheric(), [10, 20, 0xFFFE]);
    }
}
