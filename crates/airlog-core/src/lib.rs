//! Hardware-independent core library for airlog
//!
//! This crate contains all platform-agnostic logic for the airlog particulate
//! telemetry node: frame decoding, the persistent CSV log, hourly aggregation,
//! wireless telemetry publishing and the wall-clock discipline they share.
//!
//! Hardware lives behind traits (sensor driver, storage, wireless link,
//! display, clock) so the pipeline runs unchanged on the device and on desktop
//! hosts (for the simulator and tests).
//!
//! It is `#![no_std]` with `extern crate alloc`.

#![no_std]

extern crate alloc;

pub mod app_state;
pub mod config;
pub mod display;
pub mod sampling;
pub mod sensors;
pub mod storage;
pub mod telemetry;
pub mod time;

pub use app_state::{Node, StartupError};
pub use config::{HistoryTimeFormat, NodeConfig};
pub use sensors::Reading;
