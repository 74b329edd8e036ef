//! Text serialization of the hourly history for the history characteristic
//!
//! One line per record, oldest first:
//!
//! ```text
//! 13:00,12,20,29
//! 14:00,9,15,22
//! ```
//!
//! Lines are joined with `\n` and there is no trailing newline. An empty
//! history reads as [`NO_HISTORY`].

use alloc::string::String;
use core::fmt::Write;

use crate::config::HistoryTimeFormat;
use crate::storage::{AggregationBuffer, AggregationRecord};
use crate::time::DateTime;
use crate::time::calendar::SECONDS_PER_MINUTE;

/// Sentinel value published before the first hourly average exists.
pub const NO_HISTORY: &str = "No historical data available";

fn write_time_ref(
    out: &mut String,
    record: &AggregationRecord,
    format: HistoryTimeFormat,
    now: u32,
) -> core::fmt::Result {
    match format {
        HistoryTimeFormat::ClockTime => {
            let dt = DateTime::from_epoch(record.timestamp);
            write!(out, "{:02}:{:02}", dt.hour, dt.minute)
        }
        HistoryTimeFormat::MinutesAgo => {
            // A clock corrected backward can leave records "in the future"
            let minutes = now.saturating_sub(record.timestamp) / SECONDS_PER_MINUTE;
            write!(out, "{}", minutes)
        }
    }
}

/// Render `buffer` as the history blob.
pub fn serialize_history(
    buffer: &AggregationBuffer,
    format: HistoryTimeFormat,
    now: u32,
) -> String {
    if buffer.is_empty() {
        return String::from(NO_HISTORY);
    }

    let mut out = String::with_capacity(buffer.len() * 24);
    for (i, record) in buffer.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        // Writing into a String cannot fail
        let _ = write_time_ref(&mut out, record, format, now);
        let _ = write!(out, ",{},{},{}", record.pm1_0, record.pm2_5, record.pm10);
    }
    out
}
