//! Persistent logging and hourly aggregation
//!
//! The filesystem driver sits behind [`Storage`]. On top of it:
//!
//! - [`LogStore`] appends one CSV row per log cycle to `/data/PM_<NNNN>.csv`
//!   and keeps the boot counter in `/data/power_cycle.txt`
//! - [`AggregationEngine`] re-scans the active log once an hour and pushes an
//!   [`AggregationRecord`] into the 24-slot [`AggregationBuffer`]
//!
//! ## File Structure
//!
//! ```text
//! /data
//! ├── power_cycle.txt   (single integer, overwritten every boot)
//! ├── PM_0000.csv       (one file per run, append-only)
//! └── PM_0001.csv
//! ```

pub mod aggregation;
pub mod lines;
pub mod log_store;
pub mod memory;

pub use aggregation::{AggregationBuffer, AggregationEngine, AggregationRecord, HISTORY_CAPACITY};
pub use log_store::{FileProbe, LogError, LogRecord, LogStore};
pub use memory::MemStorage;

use thiserror_no_std::Error;

/// Root directory for everything the node persists.
pub const DATA_DIR: &str = "/data";

/// Plain-text power-cycle counter.
pub const POWER_CYCLE_PATH: &str = "/data/power_cycle.txt";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage is not available")]
    Unavailable,
    #[error("File not found")]
    NotFound,
    #[error("Failed to {operation}: {details}")]
    Io {
        operation: &'static str,
        details: heapless::String<64>,
    },
}

impl StorageError {
    /// Build an [`StorageError::Io`], truncating `details` to fit.
    pub fn io(operation: &'static str, details: &str) -> Self {
        let mut text = heapless::String::new();
        for c in details.chars() {
            if text.push(c).is_err() {
                break;
            }
        }
        Self::Io {
            operation,
            details: text,
        }
    }
}

/// Minimal filesystem the node needs from its block-storage driver.
///
/// Paths are absolute, `/`-separated. Implementations must make every
/// [`Storage::append`] call durable as a single unit: once it returns `Ok`
/// the bytes are flushed, and a reader never observes part of one call's
/// bytes without the rest (short of power loss mid-write).
pub trait Storage {
    /// Whether a file or directory exists at `path`.
    fn exists(&mut self, path: &str) -> Result<bool, StorageError>;

    /// Create the directory at `path`. The parent must already exist.
    fn create_dir(&mut self, path: &str) -> Result<(), StorageError>;

    /// Read bytes starting at `offset` into `buf`, returning how many were
    /// read. Zero means end of file.
    fn read_at(&mut self, path: &str, offset: u64, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Replace the contents of `path`, creating it if needed.
    fn write(&mut self, path: &str, contents: &[u8]) -> Result<(), StorageError>;

    /// Append `contents` to `path` as one flushed unit, creating it if needed.
    fn append(&mut self, path: &str, contents: &[u8]) -> Result<(), StorageError>;
}

impl<T: Storage + ?Sized> Storage for &mut T {
    fn exists(&mut self, path: &str) -> Result<bool, StorageError> {
        (**self).exists(path)
    }

    fn create_dir(&mut self, path: &str) -> Result<(), StorageError> {
        (**self).create_dir(path)
    }

    fn read_at(&mut self, path: &str, offset: u64, buf: &mut [u8]) -> Result<usize, StorageError> {
        (**self).read_at(path, offset, buf)
    }

    fn write(&mut self, path: &str, contents: &[u8]) -> Result<(), StorageError> {
        (**self).write(path, contents)
    }

    fn append(&mut self, path: &str, contents: &[u8]) -> Result<(), StorageError> {
        (**self).append(path, contents)
    }
}
