//! Wall-clock discipline
//!
//! The node keeps epoch time in a [`SoftRtc`]: an `(epoch, uptime)` anchor that
//! is advanced by the control loop's monotonic uptime. At boot the anchor is
//! the build time stamp; a subscriber can overwrite it at any point through
//! the time-sync characteristic. Corrections are applied instantly and may move
//! the clock backward.

pub mod calendar;

use embassy_time::Instant;
use log::info;
use thiserror_no_std::Error;

pub use calendar::DateTime;

/// Epoch seconds of the build, used as the default clock at boot.
pub const BUILD_EPOCH: u32 = parse_decimal(env!("AIRLOG_BUILD_EPOCH"));

const fn parse_decimal(text: &str) -> u32 {
    let bytes = text.as_bytes();
    let mut value: u32 = 0;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if !b.is_ascii_digit() {
            break;
        }
        value = value.saturating_mul(10).saturating_add((b - b'0') as u32);
        i += 1;
    }
    value
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClockError {
    #[error("Clock {clock} failed to start: {details}")]
    InitializationFailed {
        clock: &'static str,
        details: &'static str,
    },
}

/// Source of wall-clock time in epoch seconds.
pub trait TimeSource {
    /// Bring the clock up. Failure here is fatal at boot.
    fn init(&mut self) -> Result<(), ClockError> {
        Ok(())
    }

    /// Current epoch time in seconds.
    fn now(&self) -> u32;

    /// Overwrite the current time with an externally supplied epoch value.
    fn adjust(&mut self, epoch: u32);

    /// Called by the control loop with its current uptime on every iteration.
    /// Clocks with their own oscillator ignore it.
    fn advance(&mut self, _uptime: Instant) {}
}

/// Software real-time clock anchored to the monotonic uptime counter.
#[derive(Debug, Clone, Copy)]
pub struct SoftRtc {
    anchor_epoch: u32,
    anchor_uptime: Instant,
    uptime: Instant,
}

impl SoftRtc {
    /// Create a clock that reads `epoch` at `uptime`.
    pub const fn new(epoch: u32, uptime: Instant) -> Self {
        Self {
            anchor_epoch: epoch,
            anchor_uptime: uptime,
            uptime,
        }
    }

    /// Create a clock that boots from the build time stamp.
    pub const fn from_build_stamp(uptime: Instant) -> Self {
        Self::new(BUILD_EPOCH, uptime)
    }

    /// Advance the clock to the loop's current uptime.
    ///
    /// Uptime never goes backward; an older value is ignored.
    pub fn set_uptime(&mut self, uptime: Instant) {
        if uptime > self.uptime {
            self.uptime = uptime;
        }
    }

    pub fn uptime(&self) -> Instant {
        self.uptime
    }
}

impl TimeSource for SoftRtc {
    fn now(&self) -> u32 {
        let elapsed = self
            .uptime
            .saturating_duration_since(self.anchor_uptime)
            .as_secs();
        let elapsed = u32::try_from(elapsed).unwrap_or(u32::MAX);
        self.anchor_epoch.saturating_add(elapsed)
    }

    fn adjust(&mut self, epoch: u32) {
        self.anchor_epoch = epoch;
        self.anchor_uptime = self.uptime;
        info!("Time set to: {}", DateTime::from_epoch(epoch));
    }

    fn advance(&mut self, uptime: Instant) {
        self.set_uptime(uptime);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal("1704067200"), 1_704_067_200);
        assert_eq!(parse_decimal(""), 0);
        assert_eq!(parse_decimal("12x4"), 12);
    }

    #[test]
    fn test_soft_rtc_advances_with_uptime() {
        let mut rtc = SoftRtc::new(1_000, Instant::from_secs(10));
        assert_eq!(rtc.now(), 1_000);

        rtc.set_uptime(Instant::from_millis(15_900));
        assert_eq!(rtc.now(), 1_005);
    }

    #[test]
    fn test_adjust_can_move_backward() {
        let mut rtc = SoftRtc::new(1_000_000, Instant::from_secs(0));
        rtc.set_uptime(Instant::from_secs(60));
        assert_eq!(rtc.now(), 1_000_060);

        rtc.adjust(500);
        assert_eq!(rtc.now(), 500);

        rtc.set_uptime(Instant::from_secs(70));
        assert_eq!(rtc.now(), 510);
    }

    #[test]
    fn test_uptime_never_rewinds() {
        let mut rtc = SoftRtc::new(0, Instant::from_secs(100));
        rtc.set_uptime(Instant::from_secs(50));
        assert_eq!(rtc.uptime(), Instant::from_secs(100));
        assert_eq!(rtc.now(), 0);
    }
}
