//! Seven-byte time label appended to some frames.
//!
//! `[sec][min][hour][day][month][year]` in BCD, then the timeout in minutes
//! as a plain binary byte.

use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use sl427_frame::bcd::{from_bcd, is_valid_bcd, to_bcd};

use crate::error::{MessageError, Result};

pub const TIME_LABEL_LEN: usize = 7;

/// Raw time label bytes, kept as received so re-encoding is exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeLabel {
    pub second: u8,
    pub minute: u8,
    pub hour: u8,
    pub day: u8,
    pub month: u8,
    pub year: u8,
    pub timeout_minutes: u8,
}

impl TimeLabel {
    /// Build from a calendar time. Only the last two digits of the year are
    /// kept.
    pub fn from_datetime(dt: &NaiveDateTime, timeout_minutes: u8) -> Self {
        Self {
            second: to_bcd(dt.second() as u8),
            minute: to_bcd(dt.minute() as u8),
            hour: to_bcd(dt.hour() as u8),
            day: to_bcd(dt.day() as u8),
            month: to_bcd(dt.month() as u8),
            year: to_bcd(dt.year().rem_euclid(100) as u8),
            timeout_minutes,
        }
    }

    /// Label for the current local time.
    pub fn now() -> Self {
        Self::from_datetime(&chrono::Local::now().naive_local(), 0)
    }

    /// Calendar time, reading the year as 20yy. `None` when the fields do
    /// not form a real date.
    pub fn to_datetime(&self) -> Option<NaiveDateTime> {
        if !Self::is_plausible(&self.encode()) {
            return None;
        }
        NaiveDate::from_ymd_opt(
            2000 + i32::from(from_bcd(self.year)),
            u32::from(from_bcd(self.month)),
            u32::from(from_bcd(self.day)),
        )?
        .and_hms_opt(
            u32::from(from_bcd(self.hour)),
            u32::from(from_bcd(self.minute)),
            u32::from(from_bcd(self.second)),
        )
    }

    /// Range check used to detect a trailing time label: second and minute
    /// up to 59, hour up to 23, day 1-31, month 1-12, all valid BCD. Year
    /// and timeout are not checked.
    pub fn is_plausible(bytes: &[u8]) -> bool {
        if bytes.len() != TIME_LABEL_LEN {
            return false;
        }
        let in_range = |b: u8, min: u8, max: u8| is_valid_bcd(b) && (min..=max).contains(&from_bcd(b));

        in_range(bytes[0], 0, 59)
            && in_range(bytes[1], 0, 59)
            && in_range(bytes[2], 0, 23)
            && in_range(bytes[3], 1, 31)
            && in_range(bytes[4], 1, 12)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != TIME_LABEL_LEN {
            return Err(MessageError::Data(format!(
                "time label needs {TIME_LABEL_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self {
            second: bytes[0],
            minute: bytes[1],
            hour: bytes[2],
            day: bytes[3],
            month: bytes[4],
            year: bytes[5],
            timeout_minutes: bytes[6],
        })
    }

    pub fn encode(&self) -> [u8; TIME_LABEL_LEN] {
        [
            self.second,
            self.minute,
            self.hour,
            self.day,
            self.month,
            self.year,
            self.timeout_minutes,
        ]
    }

    /// All date and time fields zero; the timeout is ignored.
    pub fn is_zero(&self) -> bool {
        self.encode()[..6].iter().all(|b| *b == 0)
    }
}

impl fmt::Display for TimeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "20{:02X}-{:02X}-{:02X} {:02X}:{:02X}:{:02X} timeout={}m",
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second,
            self.timeout_minutes
        )
    }
}
