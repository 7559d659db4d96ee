//! The 9 standard MetaTrader timeframes and their bar-boundary math.
//!
//! - One stable epoch: Unix (1970-01-01T00:00:00Z, a Thursday).
//! - Fixed-width periods (M1…D1): second-based math.
//! - W1: Monday 00:00–aligned using a week anchor of 1969-12-29.
//! - MN1: calendar months, 1st 00:00 to 1st of the next month.
//!
//! Bar timestamps are plain seconds in server (FXT) time; none of the
//! functions here apply a time zone conversion.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::Serialize;

use crate::error::FormatError;

/// Number of seconds in a minute.
pub const SECS_PER_MINUTE: i64 = 60;
/// Number of seconds in a day.
pub const SECS_PER_DAY: i64 = 24 * 60 * SECS_PER_MINUTE;
/// Number of seconds in a week.
pub const SECS_PER_WEEK: i64 = 7 * SECS_PER_DAY;

/// shift so Monday 1969-12-29 00:00 becomes week index 0
const WEEK_MONDAY_ANCHOR_OFFSET_SECS: i64 = 3 * SECS_PER_DAY; // +3d

/// One of the 9 standard MetaTrader bar periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Timeframe {
    /// 1 minute
    M1,
    /// 5 minutes
    M5,
    /// 15 minutes
    M15,
    /// 30 minutes
    M30,
    /// 1 hour
    H1,
    /// 4 hours
    H4,
    /// 1 day
    D1,
    /// 1 week, Monday 00:00–aligned
    W1,
    /// 1 calendar month
    MN1,
}

impl Timeframe {
    /// All 9 timeframes, ascending.
    pub const ALL: [Timeframe; 9] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
        Timeframe::W1,
        Timeframe::MN1,
    ];

    /// The MetaTrader period identifier (minutes-equivalent).
    ///
    /// This is the value stored in the file header and appended to the
    /// symbol in `.hst` file names (`EURUSD1.hst`, `EURUSD43200.hst`).
    pub const fn minutes(self) -> u32 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1440,
            Timeframe::W1 => 10080,
            Timeframe::MN1 => 43200,
        }
    }

    /// Map a MetaTrader period id back to a timeframe.
    pub fn from_minutes(minutes: u32) -> Result<Timeframe, FormatError> {
        Timeframe::ALL
            .into_iter()
            .find(|tf| tf.minutes() == minutes)
            .ok_or(FormatError::UnsupportedTimeframe(minutes))
    }

    /// Fixed period width in seconds, or `None` for MN1 (months vary).
    pub const fn duration_secs(self) -> Option<i64> {
        match self {
            Timeframe::MN1 => None,
            other => Some(other.minutes() as i64 * SECS_PER_MINUTE),
        }
    }

    /// Bar-open instant of the period containing `time`.
    pub fn align(self, time: i64) -> i64 {
        match self {
            Timeframe::W1 => {
                let shifted = time + WEEK_MONDAY_ANCHOR_OFFSET_SECS;
                shifted - shifted.rem_euclid(SECS_PER_WEEK) - WEEK_MONDAY_ANCHOR_OFFSET_SECS
            }
            Timeframe::MN1 => {
                let dt = to_datetime(time);
                first_of_month(dt.year(), dt.month())
            }
            fixed => {
                let width = fixed.minutes() as i64 * SECS_PER_MINUTE;
                time - time.rem_euclid(width)
            }
        }
    }

    /// Bar-close instant for a bar opened at `open_time`.
    ///
    /// `open_time` is expected to be period-aligned; for MN1 the close
    /// is the 1st of the following month at 00:00.
    pub fn close_time(self, open_time: i64) -> i64 {
        match self.duration_secs() {
            Some(width) => open_time + width,
            None => {
                let dt = to_datetime(open_time);
                let (y, m) = if dt.month() == 12 {
                    (dt.year() + 1, 1)
                } else {
                    (dt.year(), dt.month() + 1)
                };
                first_of_month(y, m)
            }
        }
    }
}

fn to_datetime(time: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(time, 0).expect("bar timestamp within chrono range")
}

fn first_of_month(year: i32, month: u32) -> i64 {
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .expect("getting first-of-month timestamp")
        .timestamp()
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Timeframe::M1 => "M1",
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::M30 => "M30",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D1 => "D1",
            Timeframe::W1 => "W1",
            Timeframe::MN1 => "MN1",
        };
        f.write_str(s)
    }
}

impl FromStr for Timeframe {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "M1" => Ok(Timeframe::M1),
            "M5" => Ok(Timeframe::M5),
            "M15" => Ok(Timeframe::M15),
            "M30" => Ok(Timeframe::M30),
            "H1" => Ok(Timeframe::H1),
            "H4" => Ok(Timeframe::H4),
            "D1" => Ok(Timeframe::D1),
            "W1" => Ok(Timeframe::W1),
            "MN1" => Ok(Timeframe::MN1),
            _ => Err(FormatError::UnsupportedTimeframe(0)),
        }
    }
}

// -------------------- tests --------------------
#[cfg(test)]
mod tests {
    use super::*;

    fn ts(y: i32, m: u32, d: u32, h: u32, min: u32) -> i64 {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0)
            .unwrap()
            .timestamp()
    }

    #[test]
    fn minute_ids_roundtrip() {
        for tf in Timeframe::ALL {
            assert_eq!(Timeframe::from_minutes(tf.minutes()).unwrap(), tf);
        }
        assert!(Timeframe::from_minutes(7).is_err());
    }

    #[test]
    fn fixed_alignment() {
        let t = ts(2024, 3, 6, 14, 37); // Wednesday
        assert_eq!(Timeframe::M1.align(t), t);
        assert_eq!(Timeframe::M5.align(t), ts(2024, 3, 6, 14, 35));
        assert_eq!(Timeframe::M15.align(t), ts(2024, 3, 6, 14, 30));
        assert_eq!(Timeframe::M30.align(t), ts(2024, 3, 6, 14, 30));
        assert_eq!(Timeframe::H1.align(t), ts(2024, 3, 6, 14, 0));
        assert_eq!(Timeframe::H4.align(t), ts(2024, 3, 6, 12, 0));
        assert_eq!(Timeframe::D1.align(t), ts(2024, 3, 6, 0, 0));
    }

    #[test]
    fn week_aligns_to_monday() {
        // Wednesday 2024-03-06 14:37 -> Monday 2024-03-04 00:00
        let t = ts(2024, 3, 6, 14, 37);
        assert_eq!(Timeframe::W1.align(t), ts(2024, 3, 4, 0, 0));
        // A Monday midnight is already aligned.
        let monday = ts(2024, 3, 4, 0, 0);
        assert_eq!(Timeframe::W1.align(monday), monday);
        // First bar of 1970: the epoch (Thursday) belongs to the week
        // of Monday 1969-12-29.
        assert_eq!(Timeframe::W1.align(0), -WEEK_MONDAY_ANCHOR_OFFSET_SECS);
    }

    #[test]
    fn month_aligns_to_first() {
        let t = ts(2024, 3, 6, 14, 37);
        assert_eq!(Timeframe::MN1.align(t), ts(2024, 3, 1, 0, 0));
        // leap February
        let leap = ts(2024, 2, 29, 23, 59);
        assert_eq!(Timeframe::MN1.align(leap), ts(2024, 2, 1, 0, 0));
    }

    #[test]
    fn close_times() {
        assert_eq!(
            Timeframe::M5.close_time(ts(2024, 3, 6, 14, 35)),
            ts(2024, 3, 6, 14, 40)
        );
        assert_eq!(
            Timeframe::W1.close_time(ts(2024, 3, 4, 0, 0)),
            ts(2024, 3, 11, 0, 0)
        );
        // month widths vary
        assert_eq!(
            Timeframe::MN1.close_time(ts(2024, 2, 1, 0, 0)),
            ts(2024, 3, 1, 0, 0)
        );
        // year wrap
        assert_eq!(
            Timeframe::MN1.close_time(ts(2023, 12, 1, 0, 0)),
            ts(2024, 1, 1, 0, 0)
        );
    }

    #[test]
    fn serializes_as_period_name() {
        assert_eq!(serde_json::to_string(&Timeframe::H4).unwrap(), "\"H4\"");
    }

    #[test]
    fn parse_display_roundtrip() {
        for tf in Timeframe::ALL {
            assert_eq!(tf.to_string().parse::<Timeframe>().unwrap(), tf);
        }
        assert!("M7".parse::<Timeframe>().is_err());
    }
}
