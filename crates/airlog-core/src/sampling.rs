//! Fixed-cadence sensor sampling
//!
//! Each cycle pulls one frame from the driver and decodes it into a
//! [`Reading`] stamped with wall-clock time. A failed or invalid frame skips
//! the cycle: no reading is produced and the caller keeps showing the previous
//! one. The cadence itself belongs to the scheduler.

use log::{debug, warn};

use crate::sensors::{ParticulateSensor, Reading, SensorError, decode_frame};
use crate::time::TimeSource;

pub struct SensorSampler<P> {
    sensor: P,
}

impl<P: ParticulateSensor> SensorSampler<P> {
    pub fn new(sensor: P) -> Self {
        Self { sensor }
    }

    /// Initialize the underlying driver.
    pub fn init(&mut self) -> Result<(), SensorError> {
        self.sensor.init()
    }

    /// Take one sample, or `None` if the driver reported a bad frame.
    pub fn sample<C: TimeSource>(&mut self, clock: &C) -> Option<Reading> {
        match self.sensor.read_frame() {
            Ok(frame) => {
                let reading = decode_frame(&frame, clock.now());
                debug!(
                    "Sampled PM1.0={} PM2.5={} PM10={}",
                    reading.pm1_0_atm, reading.pm2_5_atm, reading.pm10_atm
                );
                Some(reading)
            }
            Err(e) => {
                warn!("Skipping sample cycle: {}", e);
                None
            }
        }
    }

    pub fn sensor(&self) -> &P {
        &self.sensor
    }

    pub fn sensor_mut(&mut self) -> &mut P {
        &mut self.sensor
    }
}
