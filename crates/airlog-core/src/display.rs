//! Display boundary
//!
//! The screen is pure output: it is told about each fresh reading and the
//! subscriber state, and nothing it does feeds back into the pipeline.

use crate::sensors::Reading;

pub trait StatusDisplay {
    /// Show the latest reading, whether a subscriber is attached, and the
    /// current wall-clock time.
    fn show_reading(&mut self, reading: &Reading, subscribed: bool, now: u32);
}

/// Display that draws nothing, for headless nodes.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDisplay;

impl StatusDisplay for NoDisplay {
    fn show_reading(&mut self, _reading: &Reading, _subscribed: bool, _now: u32) {}
}
