//! Hourly aggregation of the active log file
//!
//! Once an hour the engine scans the whole active log, averages the three
//! atmospheric columns over every valid row and pushes the result into a
//! rolling 24-entry history.
//!
//! A row is valid when it has at least 4 commas. Fields 1, 2 and 3 are read
//! leniently: leading decimal digits count, anything else reads as 0 and is
//! still accepted. Averages use truncating integer division.

use heapless::Deque;
use log::{debug, info, warn};

use super::lines::{ScannedLine, scan_lines};
use super::{LogStore, Storage, StorageError};
use crate::time::TimeSource;

/// Number of hourly records kept in memory.
pub const HISTORY_CAPACITY: usize = 24;

/// Minimum comma count for a row to take part in the average.
const MIN_DELIMITERS: usize = 4;

/// Averaged atmospheric channels for one aggregation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationRecord {
    /// Wall-clock epoch seconds when the average was computed
    pub timestamp: u32,
    pub pm1_0: u16,
    pub pm2_5: u16,
    pub pm10: u16,
}

/// Fixed-capacity rolling history, oldest first.
#[derive(Debug, Default)]
pub struct AggregationBuffer {
    records: Deque<AggregationRecord, HISTORY_CAPACITY>,
}

impl AggregationBuffer {
    pub const fn new() -> Self {
        Self {
            records: Deque::new(),
        }
    }

    /// Append a record, evicting and returning the oldest one when full.
    pub fn push(&mut self, record: AggregationRecord) -> Option<AggregationRecord> {
        // If buffer is full, remove oldest
        let evicted = if self.records.is_full() {
            self.records.pop_front()
        } else {
            None
        };
        let _ = self.records.push_back(record);
        evicted
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &AggregationRecord> {
        self.records.iter()
    }

    pub fn newest(&self) -> Option<&AggregationRecord> {
        self.records.back()
    }

    pub fn oldest(&self) -> Option<&AggregationRecord> {
        self.records.front()
    }
}

/// Running sums over the valid rows of a log file.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RowAccumulator {
    sums: [u64; 3],
    count: u32,
    skipped: u32,
}

/// Leading decimal digits of `field`, 0 when there are none.
fn lenient_int(field: &str) -> u64 {
    field
        .trim_start()
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0u64, |acc, d| {
            acc.saturating_mul(10).saturating_add(u64::from(d - b'0'))
        })
}

impl RowAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one data row in. Returns whether it was counted.
    pub fn add_row(&mut self, row: &str) -> bool {
        let delimiters = row.bytes().filter(|b| *b == b',').count();
        if delimiters < MIN_DELIMITERS {
            warn!("Skipping row with {} commas: {}", delimiters, row);
            self.skipped += 1;
            return false;
        }

        let mut fields = row.split(',').skip(1);
        for sum in self.sums.iter_mut() {
            let value = lenient_int(fields.next().unwrap_or(""));
            *sum = sum.saturating_add(value);
        }
        self.count += 1;
        debug!("Counted row: {}", row);
        true
    }

    /// Note a line that could not be parsed at all.
    pub fn skip(&mut self) {
        self.skipped += 1;
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn skipped(&self) -> u32 {
        self.skipped
    }

    /// Truncating mean of each channel, or `None` with no counted rows.
    pub fn average(&self, timestamp: u32) -> Option<AggregationRecord> {
        if self.count == 0 {
            return None;
        }
        let count = u64::from(self.count);
        let mean = |sum: u64| u16::try_from(sum / count).unwrap_or(u16::MAX);
        Some(AggregationRecord {
            timestamp,
            pm1_0: mean(self.sums[0]),
            pm2_5: mean(self.sums[1]),
            pm10: mean(self.sums[2]),
        })
    }
}

/// Scan `path`, skipping its header line, and accumulate every data row.
pub fn accumulate_file<S>(storage: &mut S, path: &str) -> Result<RowAccumulator, StorageError>
where
    S: Storage + ?Sized,
{
    let mut acc = RowAccumulator::new();
    let mut header_seen = false;

    scan_lines(storage, path, |line| {
        if !header_seen {
            header_seen = true;
            return;
        }
        match line {
            ScannedLine::Complete("") => {}
            ScannedLine::Complete(row) => {
                acc.add_row(row);
            }
            ScannedLine::Overlong { len } => {
                warn!("Skipping {}-byte line, too long", len);
                acc.skip();
            }
            ScannedLine::NotUtf8 => {
                warn!("Skipping line that is not valid text");
                acc.skip();
            }
            ScannedLine::Torn { len } => {
                warn!("Skipping partially written final line ({} bytes)", len);
                acc.skip();
            }
        }
    })?;

    Ok(acc)
}

/// Produces one [`AggregationRecord`] per run from the active log file.
#[derive(Debug, Default)]
pub struct AggregationEngine {
    last_row_count: u32,
}

impl AggregationEngine {
    pub const fn new() -> Self {
        Self { last_row_count: 0 }
    }

    /// Summarize the active log into `buffer`.
    ///
    /// Returns the new record, or `None` when the log could not be read or had
    /// no valid rows; the buffer is left untouched in that case.
    pub fn run<S, C>(
        &mut self,
        log: &mut LogStore<S>,
        buffer: &mut AggregationBuffer,
        clock: &C,
    ) -> Option<AggregationRecord>
    where
        S: Storage,
        C: TimeSource,
    {
        let path = match log.active_path() {
            Ok(path) => path,
            Err(e) => {
                warn!("Hourly average skipped: {}", e);
                return None;
            }
        };

        info!("Processing file: {}", path);
        let acc = match accumulate_file(log.storage_mut(), &path) {
            Ok(acc) => acc,
            Err(e) => {
                warn!("Failed to open data file {}: {}", path, e);
                return None;
            }
        };
        self.last_row_count = acc.count();

        let record = acc.average(clock.now());
        match record {
            Some(avg) => {
                buffer.push(avg);
                info!(
                    "Avg calculated: PM1.0={} PM2.5={} PM10={} Count={} Skipped={}",
                    avg.pm1_0,
                    avg.pm2_5,
                    avg.pm10,
                    acc.count(),
                    acc.skipped()
                );
            }
            None => info!("No valid rows in {}, history unchanged", path),
        }
        record
    }

    /// Rows counted by the most recent successful scan.
    pub fn last_row_count(&self) -> u32 {
        self.last_row_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::Reading;
    use crate::storage::MemStorage;
    use crate::storage::log_store::LOG_HEADER;
    use crate::time::SoftRtc;
    use embassy_time::Instant;

    fn record(timestamp: u32) -> AggregationRecord {
        AggregationRecord {
            timestamp,
            pm1_0: timestamp as u16,
            pm2_5: 0,
            pm10: 0,
        }
    }

    fn clock(epoch: u32) -> SoftRtc {
        SoftRtc::new(epoch, Instant::from_secs(0))
    }

    #[test]
    fn test_buffer_evicts_oldest_at_capacity() {
        let mut buffer = AggregationBuffer::new();
        for ts in 0..HISTORY_CAPACITY as u32 {
            assert_eq!(buffer.push(record(ts)), None);
        }
        assert_eq!(buffer.len(), HISTORY_CAPACITY);

        assert_eq!(buffer.push(record(24)), Some(record(0)));
        assert_eq!(buffer.len(), HISTORY_CAPACITY);

        let stamps: alloc::vec::Vec<u32> = buffer.iter().map(|r| r.timestamp).collect();
        let expected: alloc::vec::Vec<u32> = (1..=24).collect();
        assert_eq!(stamps, expected);
        assert_eq!(buffer.oldest().map(|r| r.timestamp), Some(1));
        assert_eq!(buffer.newest().map(|r| r.timestamp), Some(24));
    }

    #[test]
    fn test_buffer_never_exceeds_capacity() {
        let mut buffer = AggregationBuffer::new();
        for ts in 0..100 {
            buffer.push(record(ts));
            assert!(buffer.len() <= HISTORY_CAPACITY);
        }
        assert_eq!(buffer.oldest().map(|r| r.timestamp), Some(76));
    }

    #[test]
    fn test_truncating_average() {
        let mut acc = RowAccumulator::new();
        assert!(acc.add_row("P001_20240101_000000,10,1,0,5"));
        assert!(acc.add_row("P001_20240101_000500,11,2,1,10"));

        let avg = acc.average(99).unwrap();
        assert_eq!(avg.pm1_0, 10);
        assert_eq!(avg.pm2_5, 1);
        assert_eq!(avg.pm10, 0);
        assert_eq!(avg.timestamp, 99);
    }

    #[test]
    fn test_short_rows_never_counted() {
        let mut acc = RowAccumulator::new();
        assert!(!acc.add_row("P001,100,100,100"));
        assert!(!acc.add_row(""));
        assert!(acc.add_row("P001,4,4,4,1"));

        assert_eq!(acc.count(), 1);
        assert_eq!(acc.skipped(), 2);
        assert_eq!(acc.average(0).unwrap().pm1_0, 4);
    }

    #[test]
    fn test_non_numeric_fields_count_as_zero() {
        let mut acc = RowAccumulator::new();
        assert!(acc.add_row("P001,abc,12x, 7,1"));
        assert!(acc.add_row("P001,10,10,10,1"));

        let avg = acc.average(0).unwrap();
        assert_eq!((avg.pm1_0, avg.pm2_5, avg.pm10), (5, 11, 8));
    }

    #[test]
    fn test_no_rows_no_record() {
        assert_eq!(RowAccumulator::new().average(0), None);
    }

    fn log_readings<S: Storage>(log: &mut LogStore<S>, rows: &[[u16; 3]]) {
        for (i, pm) in rows.iter().enumerate() {
            let reading = Reading {
                pm1_0_atm: pm[0],
                pm2_5_atm: pm[1],
                pm10_atm: pm[2],
                ..Reading::default()
            };
            log.append(&reading, 1_704_067_200 + i as u32 * 300, (i as u64 + 1) * 300)
                .unwrap();
        }
    }

    #[test]
    fn test_five_logged_readings_average() {
        let mut storage = MemStorage::new();
        let mut log = LogStore::new(&mut storage);
        log_readings(
            &mut log,
            &[[10, 20, 30], [12, 22, 32], [14, 18, 28], [8, 24, 34], [16, 20, 22]],
        );

        let mut buffer = AggregationBuffer::new();
        let mut engine = AggregationEngine::new();

        let avg = engine.run(&mut log, &mut buffer, &clock(5_000)).unwrap();
        assert_eq!(avg.pm1_0, 12); // (10+12+14+8+16)/5
        assert_eq!(avg.pm2_5, 20); // 104/5 = 20.8 truncated
        assert_eq!(avg.pm10, 29); // 146/5 = 29.2 truncated
        assert_eq!(avg.timestamp, 5_000);
        assert_eq!(engine.last_row_count(), 5);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_torn_final_line_skipped() {
        let mut storage = MemStorage::new();
        let contents = alloc::format!(
            "{}\nP001_20240101_000000,10,20,30,300\nP001_20240101_000500,20,30,40,600\nP001_20240101_001000,99",
            LOG_HEADER
        );
        storage.insert_file("/data/PM_0000.csv", contents.as_bytes());

        let acc = accumulate_file(&mut storage, "/data/PM_0000.csv").unwrap();
        assert_eq!(acc.count(), 2);
        assert_eq!(acc.skipped(), 1);
        let avg = acc.average(0).unwrap();
        assert_eq!((avg.pm1_0, avg.pm2_5, avg.pm10), (15, 25, 35));
    }

    #[test]
    fn test_torn_line_completed_by_later_append() {
        let mut storage = MemStorage::new();
        let mut log = LogStore::new(&mut storage);
        log_readings(&mut log, &[[10, 20, 30]]);

        // A write cut short leaves half a row behind
        log.storage_mut()
            .append("/data/PM_0000.csv", b"P001_20240101_000500,50,5")
            .unwrap();

        let mut buffer = AggregationBuffer::new();
        let mut engine = AggregationEngine::new();
        let avg = engine.run(&mut log, &mut buffer, &clock(0)).unwrap();
        assert_eq!((avg.pm1_0, avg.pm2_5, avg.pm10), (10, 20, 30));
        assert_eq!(engine.last_row_count(), 1);

        // Once the row is finished it counts
        log.storage_mut()
            .append("/data/PM_0000.csv", b"0,60,600\n")
            .unwrap();
        let avg = engine.run(&mut log, &mut buffer, &clock(0)).unwrap();
        assert_eq!((avg.pm1_0, avg.pm2_5, avg.pm10), (30, 35, 45));
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_unreadable_log_leaves_buffer_unchanged() {
        let mut storage = MemStorage::new();
        let mut buffer = AggregationBuffer::new();
        buffer.push(record(7));
        let mut engine = AggregationEngine::new();

        // Nothing has been logged this run, so the active file does not exist
        let mut log = LogStore::new(&mut storage);
        assert_eq!(engine.run(&mut log, &mut buffer, &clock(0)), None);
        assert_eq!(buffer.len(), 1);

        log_readings(&mut log, &[[1, 2, 3]]);
        log.storage_mut().set_fail_reads(true);
        assert_eq!(engine.run(&mut log, &mut buffer, &clock(0)), None);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_header_only_file_yields_nothing() {
        let mut storage = MemStorage::new();
        storage.insert_file("/data/PM_0000.csv", b"");
        let mut log = LogStore::new(&mut storage);
        log.resolve_active_file().unwrap();
        log.storage_mut()
            .append("/data/PM_0001.csv", alloc::format!("{}\n", LOG_HEADER).as_bytes())
            .unwrap();

        let mut buffer = AggregationBuffer::new();
        let mut engine = AggregationEngine::new();
        assert_eq!(engine.run(&mut log, &mut buffer, &clock(0)), None);
        assert_eq!(engine.last_row_count(), 0);
        assert!(buffer.is_empty());
    }
}
