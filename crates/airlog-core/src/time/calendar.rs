//! UTC calendar conversion for epoch timestamps
//!
//! Uses Howard Hinnant's `civil_from_days` algorithm, which is O(1) and
//! handles leap years across the whole proleptic Gregorian calendar.
//! Reference: http://howardhinnant.github.io/date_algorithms.html

use core::fmt;

pub const SECONDS_PER_MINUTE: u32 = 60;
pub const SECONDS_PER_HOUR: u32 = 3600;
pub const SECONDS_PER_DAY: u32 = 86400;

/// Broken-down UTC date and time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl DateTime {
    /// Convert seconds since the Unix epoch to a UTC date/time.
    pub fn from_epoch(epoch: u32) -> Self {
        let days_since_epoch = (epoch / SECONDS_PER_DAY) as i32;
        let secs_today = epoch % SECONDS_PER_DAY;

        let (year, month, day) = civil_from_days(days_since_epoch);

        Self {
            year,
            month,
            day,
            hour: (secs_today / SECONDS_PER_HOUR) as u8,
            minute: ((secs_today % SECONDS_PER_HOUR) / SECONDS_PER_MINUTE) as u8,
            second: (secs_today % SECONDS_PER_MINUTE) as u8,
        }
    }

    /// Compact `YYYYMMDD_HHMMSS` form used inside log row tokens.
    pub fn compact(&self) -> Compact<'_> {
        Compact(self)
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// Display adapter returned by [`DateTime::compact`].
pub struct Compact<'a>(&'a DateTime);

impl fmt::Display for Compact<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dt = self.0;
        write!(
            f,
            "{:04}{:02}{:02}_{:02}{:02}{:02}",
            dt.year, dt.month, dt.day, dt.hour, dt.minute, dt.second
        )
    }
}

/// Convert days since Unix epoch to civil date (year, month, day)
fn civil_from_days(days_since_epoch: i32) -> (u16, u8, u8) {
    // Shift epoch from 1970-01-01 to 0000-03-01 so the leap day ends the year
    let z = days_since_epoch + 719468;

    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = (z - era * 146097) as u32; // day of era [0, 146096]
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365; // [0, 399]
    let y = (yoe as i32) + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100); // [0, 365]
    let mp = (5 * doy + 2) / 153; // 0 = March, 11 = February
    let d = (doy - (153 * mp + 2) / 5 + 1) as u8;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u8;
    let year = if m <= 2 { y + 1 } else { y };

    (year as u16, m, d)
}
