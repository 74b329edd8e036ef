//! Append-only CSV log with a persistent power-cycle counter
//!
//! Each run writes to exactly one file: the lowest-numbered `PM_<NNNN>.csv`
//! that does not exist yet when the log is first used. A row looks like
//!
//! ```text
//! P003_20240101_120500,12,22,32,300
//! ```
//!
//! The first field fuses the power-cycle id with the wall-clock stamp, so the
//! three atmospheric values always sit at field positions 1, 2 and 3 and the
//! process uptime in seconds comes last.

use core::fmt::{self, Write};

use log::{debug, error, info, warn};
use thiserror_no_std::Error;

use super::{DATA_DIR, POWER_CYCLE_PATH, Storage, StorageError};
use crate::sensors::Reading;
use crate::time::DateTime;

/// Header row written once at the top of every log file.
pub const LOG_HEADER: &str = "Power_Cycle,Timestamp,PM1.0,PM2.5,PM10,Uptime_Sec";

/// Log file numbers are probed in `0..MAX_LOG_FILES`.
pub const MAX_LOG_FILES: u16 = 9999;

/// Capacity of a formatted log file path.
pub const PATH_LEN: usize = 24;

/// Capacity of one append (header plus a row).
const APPEND_BUF_LEN: usize = 160;

/// Outcome of probing for the active log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileProbe {
    /// The first unused sequence number.
    Found(u16),
    /// Every name in the probe range already exists.
    Exhausted,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LogError {
    #[error("No free log file name left in PM_0000..PM_{max:04}")]
    Exhausted { max: u16 },
    #[error("Log row did not fit the write buffer")]
    Format,
    #[error("Storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for LogError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

/// Path of log file number `seq`, e.g. `/data/PM_0007.csv`.
pub fn log_file_path(seq: u16) -> heapless::String<PATH_LEN> {
    let mut path = heapless::String::new();
    // 17 bytes at most, always fits
    let _ = write!(path, "{}/PM_{:04}.csv", DATA_DIR, seq);
    path
}

/// One persisted log row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRecord {
    pub power_cycle: u32,
    /// Wall-clock epoch seconds when the row was written
    pub timestamp: u32,
    pub pm1_0: u16,
    pub pm2_5: u16,
    pub pm10: u16,
    pub uptime_secs: u64,
}

impl LogRecord {
    pub fn new(power_cycle: u32, reading: &Reading, timestamp: u32, uptime_secs: u64) -> Self {
        Self {
            power_cycle,
            timestamp,
            pm1_0: reading.pm1_0_atm,
            pm2_5: reading.pm2_5_atm,
            pm10: reading.pm10_atm,
            uptime_secs,
        }
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "P{:03}_{},{},{},{},{}",
            self.power_cycle,
            DateTime::from_epoch(self.timestamp).compact(),
            self.pm1_0,
            self.pm2_5,
            self.pm10,
            self.uptime_secs
        )
    }
}

fn parse_counter(text: &[u8]) -> Option<u32> {
    let text = core::str::from_utf8(text).ok()?;
    text.trim().parse().ok()
}

/// Owner of the active log file identity and the power-cycle counter.
pub struct LogStore<S> {
    storage: S,
    active: Option<FileProbe>,
    power_cycle: Option<u32>,
}

impl<S: Storage> LogStore<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            active: None,
            power_cycle: None,
        }
    }

    /// Create the data directory if it is missing.
    pub fn ensure_storage_ready(&mut self) -> Result<(), StorageError> {
        if self.storage.exists(DATA_DIR)? {
            return Ok(());
        }
        self.storage.create_dir(DATA_DIR).map_err(|e| {
            error!("Failed to create data directory: {}", e);
            e
        })?;
        info!("Created data directory {}", DATA_DIR);
        Ok(())
    }

    /// Pick the active log file.
    ///
    /// The first successful probe fixes the file for the rest of the run.
    /// A probe interrupted by a storage error is not remembered.
    pub fn resolve_active_file(&mut self) -> Result<FileProbe, StorageError> {
        if let Some(probe) = self.active {
            return Ok(probe);
        }

        let mut probe = FileProbe::Exhausted;
        for seq in 0..MAX_LOG_FILES {
            if !self.storage.exists(&log_file_path(seq))? {
                probe = FileProbe::Found(seq);
                break;
            }
        }

        match probe {
            FileProbe::Found(seq) => info!("Logging to {}", log_file_path(seq)),
            FileProbe::Exhausted => error!(
                "All log file names up to PM_{:04}.csv are taken, logging disabled",
                MAX_LOG_FILES - 1
            ),
        }
        self.active = Some(probe);
        Ok(probe)
    }

    /// Path of the active log file, resolving it on first use.
    pub fn active_path(&mut self) -> Result<heapless::String<PATH_LEN>, LogError> {
        match self.resolve_active_file()? {
            FileProbe::Found(seq) => Ok(log_file_path(seq)),
            FileProbe::Exhausted => Err(LogError::Exhausted {
                max: MAX_LOG_FILES - 1,
            }),
        }
    }

    /// This run's power-cycle id.
    ///
    /// The first call reads the persisted counter (0 when missing or
    /// unreadable), adds one and writes it back. Later calls return the same
    /// value. Counter I/O failures are reported and otherwise tolerated.
    pub fn next_power_cycle_id(&mut self) -> u32 {
        if let Some(id) = self.power_cycle {
            return id;
        }

        let previous = self.read_counter().unwrap_or(0);
        let id = previous.wrapping_add(1);

        let mut text: heapless::String<12> = heapless::String::new();
        let _ = writeln!(text, "{}", id);
        match self.storage.write(POWER_CYCLE_PATH, text.as_bytes()) {
            Ok(()) => info!("Power cycle {}", id),
            Err(e) => error!("Failed to persist power cycle {}: {}", id, e),
        }

        self.power_cycle = Some(id);
        id
    }

    fn read_counter(&mut self) -> Option<u32> {
        match self.storage.exists(POWER_CYCLE_PATH) {
            Ok(true) => {}
            Ok(false) => return None,
            Err(e) => {
                warn!("Cannot check power cycle file: {}", e);
                return None;
            }
        }

        let mut buf = [0u8; 16];
        let n = match self.storage.read_at(POWER_CYCLE_PATH, 0, &mut buf) {
            Ok(n) => n,
            Err(e) => {
                warn!("Cannot read power cycle file: {}", e);
                return None;
            }
        };

        let parsed = parse_counter(&buf[..n]);
        if parsed.is_none() {
            warn!("Power cycle file is not a number, restarting count");
        }
        parsed
    }

    /// Append one row for `reading`, stamped with `now`.
    ///
    /// A brand new file gets the header in the same write as its first row.
    pub fn append(
        &mut self,
        reading: &Reading,
        now: u32,
        uptime_secs: u64,
    ) -> Result<LogRecord, LogError> {
        self.ensure_storage_ready()?;
        let path = self.active_path()?;
        let power_cycle = self.next_power_cycle_id();
        let record = LogRecord::new(power_cycle, reading, now, uptime_secs);

        let is_new_file = !self.storage.exists(&path)?;

        let mut buf: heapless::String<APPEND_BUF_LEN> = heapless::String::new();
        if is_new_file {
            writeln!(buf, "{}", LOG_HEADER).map_err(|_| LogError::Format)?;
        }
        writeln!(buf, "{}", record).map_err(|_| LogError::Format)?;

        self.storage.append(&path, buf.as_bytes())?;
        debug!("Data logged: {}", record);
        Ok(record)
    }

    /// Power-cycle id if already assigned this run.
    pub fn power_cycle(&self) -> Option<u32> {
        self.power_cycle
    }

    pub fn active_file(&self) -> Option<FileProbe> {
        self.active
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemStorage;

    fn reading(pm: [u16; 3]) -> Reading {
        Reading {
            pm1_0_atm: pm[0],
            pm2_5_atm: pm[1],
            pm10_atm: pm[2],
            ..Reading::default()
        }
    }

    /// 2024-01-01 12:05:00 UTC
    const NOON: u32 = 1_704_110_700;

    #[test]
    fn test_power_cycle_increments_across_boots() {
        let mut storage = MemStorage::new();
        storage.create_dir(DATA_DIR).unwrap();

        for expected in 1..=3 {
            let mut store = LogStore::new(&mut storage);
            assert_eq!(store.next_power_cycle_id(), expected);
            // Repeated calls in the same run do not advance the counter
            assert_eq!(store.next_power_cycle_id(), expected);
        }
        assert_eq!(storage.file_str(POWER_CYCLE_PATH), Some("3\n"));
    }

    #[test]
    fn test_garbled_counter_restarts_at_one() {
        let mut storage = MemStorage::new();
        storage.insert_file(POWER_CYCLE_PATH, b"garbage");

        let mut store = LogStore::new(&mut storage);
        assert_eq!(store.next_power_cycle_id(), 1);
    }

    #[test]
    fn test_counter_write_failure_is_tolerated() {
        let mut storage = MemStorage::new();
        storage.insert_file(POWER_CYCLE_PATH, b"41\n");
        storage.set_fail_writes(true);

        let mut store = LogStore::new(&mut storage);
        assert_eq!(store.next_power_cycle_id(), 42);
        assert_eq!(storage.file_str(POWER_CYCLE_PATH), Some("41\n"));
    }

    #[test]
    fn test_resolve_picks_lowest_free_name_once() {
        let mut storage = MemStorage::new();
        storage.insert_file("/data/PM_0000.csv", b"");
        storage.insert_file("/data/PM_0001.csv", b"");
        storage.insert_file("/data/PM_0003.csv", b"");

        let mut store = LogStore::new(&mut storage);
        assert_eq!(store.resolve_active_file(), Ok(FileProbe::Found(2)));

        // Creating the file mid-run does not move the log elsewhere
        store.storage_mut().insert_file("/data/PM_0002.csv", b"");
        assert_eq!(store.resolve_active_file(), Ok(FileProbe::Found(2)));
        assert_eq!(store.active_path().unwrap().as_str(), "/data/PM_0002.csv");
    }

    #[test]
    fn test_resolve_reports_exhaustion() {
        let mut storage = MemStorage::new();
        for seq in 0..MAX_LOG_FILES {
            storage.insert_file(&log_file_path(seq), b"");
        }

        let mut store = LogStore::new(&mut storage);
        assert_eq!(store.resolve_active_file(), Ok(FileProbe::Exhausted));
        assert_eq!(
            store.append(&reading([1, 2, 3]), NOON, 0),
            Err(LogError::Exhausted { max: 9998 })
        );
    }

    #[test]
    fn test_probe_interrupted_by_storage_error_is_retried() {
        let mut storage = MemStorage::new();
        storage.set_unavailable(true);

        let mut store = LogStore::new(&mut storage);
        assert_eq!(store.resolve_active_file(), Err(StorageError::Unavailable));
        assert_eq!(store.active_file(), None);

        store.storage_mut().set_unavailable(false);
        assert_eq!(store.resolve_active_file(), Ok(FileProbe::Found(0)));
    }

    #[test]
    fn test_header_written_exactly_once() {
        let mut storage = MemStorage::new();
        let mut store = LogStore::new(&mut storage);

        store.append(&reading([10, 20, 30]), NOON, 300).unwrap();
        store.append(&reading([12, 22, 32]), NOON + 300, 600).unwrap();
        store.append(&reading([14, 18, 28]), NOON + 600, 900).unwrap();

        let text = storage.file_str("/data/PM_0000.csv").unwrap();
        assert_eq!(text.matches(LOG_HEADER).count(), 1);
        assert_eq!(
            text,
            "Power_Cycle,Timestamp,PM1.0,PM2.5,PM10,Uptime_Sec\n\
             P001_20240101_120500,10,20,30,300\n\
             P001_20240101_121000,12,22,32,600\n\
             P001_20240101_121500,14,18,28,900\n"
        );
    }

    #[test]
    fn test_append_creates_data_dir() {
        let mut storage = MemStorage::new();
        let mut store = LogStore::new(&mut storage);
        store.append(&reading([1, 2, 3]), NOON, 5).unwrap();
        assert!(storage.has_dir(DATA_DIR));
    }

    #[test]
    fn test_append_failure_drops_record() {
        let mut storage = MemStorage::new();
        storage.create_dir(DATA_DIR).unwrap();
        storage.insert_file(POWER_CYCLE_PATH, b"6\n");
        storage.set_fail_writes(true);

        let mut store = LogStore::new(&mut storage);
        assert!(matches!(
            store.append(&reading([1, 2, 3]), NOON, 5),
            Err(LogError::Storage(StorageError::Io { .. }))
        ));

        store.storage_mut().set_fail_writes(false);
        store.append(&reading([4, 5, 6]), NOON, 10).unwrap();
        assert_eq!(
            storage.file_str("/data/PM_0000.csv"),
            Some("Power_Cycle,Timestamp,PM1.0,PM2.5,PM10,Uptime_Sec\nP007_20240101_120500,4,5,6,10\n")
        );
    }

    #[test]
    fn test_record_format_pads_cycle() {
        let record = LogRecord::new(1234, &reading([0, 65535, 7]), 0, 42);
        assert_eq!(alloc::format!("{}", record), "P1234_19700101_000000,0,65535,7,42");
    }
}
