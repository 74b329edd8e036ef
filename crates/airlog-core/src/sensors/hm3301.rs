use embedded_hal::i2c::I2c;
use log::error;

use super::{FRAME_LEN, Frame, ParticulateSensor, SensorError};

/// Default 7-bit I2C address of the HM3301 laser dust sensor.
pub const HM3301_ADDRESS: u8 = 0x40;

/// Switches the sensor's output from UART to I2C.
const SELECT_I2C_COMMAND: u8 = 0x88;

/// Index of the trailing checksum byte.
const CHECKSUM_INDEX: usize = FRAME_LEN - 1;

/// HM3301 / HM330X particulate sensor on a blocking I2C bus.
///
/// The sensor streams a fixed 29-byte frame; the last byte is the low byte
/// of the sum of the preceding 28.
pub struct Hm3301<I> {
    i2c: I,
    address: u8,
}

impl<I: I2c> Hm3301<I> {
    pub fn new(i2c: I) -> Self {
        Self {
            i2c,
            address: HM3301_ADDRESS,
        }
    }

    pub fn with_address(i2c: I, address: u8) -> Self {
        Self { i2c, address }
    }

    /// Give the bus back.
    pub fn release(self) -> I {
        self.i2c
    }
}

fn checksum(frame: &Frame) -> u8 {
    frame[..CHECKSUM_INDEX]
        .iter()
        .fold(0u8, |acc, b| acc.wrapping_add(*b))
}

impl<I: I2c> ParticulateSensor for Hm3301<I> {
    fn init(&mut self) -> Result<(), SensorError> {
        self.i2c
            .write(self.address, &[SELECT_I2C_COMMAND])
            .map_err(|e| {
                error!("HM3301 select command failed: {:?}", e);
                SensorError::InitializationFailed {
                    sensor: "HM3301",
                    details: "Failed to switch sensor to I2C output",
                }
            })
    }

    fn read_frame(&mut self) -> Result<Frame, SensorError> {
        let mut frame = [0u8; FRAME_LEN];
        self.i2c.read(self.address, &mut frame).map_err(|e| {
            error!("HM3301 frame read failed: {:?}", e);
            SensorError::ReadFailed {
                sensor: "HM3301",
                operation: "read measurement frame",
                details: "I2C communication error",
            }
        })?;

        let expected = checksum(&frame);
        let actual = frame[CHECKSUM_INDEX];
        if expected != actual {
            return Err(SensorError::ChecksumMismatch {
                sensor: "HM3301",
                expected,
                actual,
            });
        }

        Ok(frame)
    }
}
