//! Minute-of-day arithmetic for the week grid.
//!
//! Times are carried as [`ClockTime`], a validated minute offset from
//! midnight. Text only crosses into the core through
//! [`time_to_minutes`], so malformed input fails here instead of
//! producing nonsense positions further down.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MINUTES_PER_DAY: i32 = 24 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeError {
    #[error("invalid time format: {0:?} (expected HH:MM)")]
    InvalidFormat(String),

    #[error("minute value {0} is outside of a day (0..1440)")]
    OutOfRange(i32),
}

fn clock_regex() -> Option<&'static Regex> {
    static CLOCK_RE: OnceLock<Option<Regex>> = OnceLock::new();
    CLOCK_RE
        .get_or_init(|| Regex::new(r"^(?P<hour>[01]?[0-9]|2[0-3]):(?P<minute>[0-5][0-9])$").ok())
        .as_ref()
}

/// Parses `H:MM` or `HH:MM` (hours 0-23, minutes 0-59) into minutes
/// since midnight.
pub fn time_to_minutes(raw: &str) -> Result<u16, TimeError> {
    let invalid = || TimeError::InvalidFormat(raw.to_string());
    let captures = clock_regex()
        .and_then(|re| re.captures(raw.trim()))
        .ok_or_else(invalid)?;

    let hour: u16 = captures
        .name("hour")
        .and_then(|m| m.as_str().parse().ok())
        .ok_or_else(invalid)?;
    let minute: u16 = captures
        .name("minute")
        .and_then(|m| m.as_str().parse().ok())
        .ok_or_else(invalid)?;

    Ok(hour * 60 + minute)
}

/// Formats a minute-of-day as `HH:MM`. Values outside `[0, 1440)` are
/// rejected rather than wrapped.
pub fn minutes_to_time(minutes: i32) -> Result<String, TimeError> {
    ClockTime::from_minutes(minutes).map(|time| time.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClockTime(u16);

impl ClockTime {
    pub fn from_minutes(minutes: i32) -> Result<Self, TimeError> {
        if (0..MINUTES_PER_DAY).contains(&minutes) {
            Ok(Self(minutes as u16))
        } else {
            Err(TimeError::OutOfRange(minutes))
        }
    }

    pub fn from_hm(hour: u16, minute: u16) -> Result<Self, TimeError> {
        Self::from_minutes(i32::from(hour) * 60 + i32::from(minute))
    }

    pub fn minutes(self) -> u16 {
        self.0
    }

    pub fn hour(self) -> u16 {
        self.0 / 60
    }

    pub fn minute(self) -> u16 {
        self.0 % 60
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for ClockTime {
    type Err = TimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        time_to_minutes(s).map(Self)
    }
}

impl TryFrom<String> for ClockTime {
    type Error = TimeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ClockTime> for String {
    fn from(value: ClockTime) -> Self {
        value.to_string()
    }
}

/// A half-open `[start, end)` interval within one day.
///
/// `end <= start` is a degenerate span: it has zero duration and
/// overlaps nothing, not even itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSpan {
    pub start: ClockTime,
    pub end: ClockTime,
}

impl TimeSpan {
    pub fn new(start: ClockTime, end: ClockTime) -> Self {
        Self { start, end }
    }

    pub fn is_degenerate(&self) -> bool {
        self.end <= self.start
    }

    pub fn duration(&self) -> u16 {
        duration(self.start, self.end)
    }

    pub fn overlaps(&self, other: &TimeSpan) -> bool {
        overlaps(*self, *other)
    }

    pub fn contains(&self, instant: ClockTime) -> bool {
        self.start <= instant && instant < self.end
    }
}

pub fn overlaps(a: TimeSpan, b: TimeSpan) -> bool {
    if a.is_degenerate() || b.is_degenerate() {
        return false;
    }
    a.start < b.end && b.start < a.end
}

/// Minutes from `start` to `end`, zero when the span is degenerate.
pub fn duration(start: ClockTime, end: ClockTime) -> u16 {
    end.minutes().saturating_sub(start.minutes())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub top: f64,
    pub height: f64,
}

/// Vertical placement on a grid whose first row is `base_hour` and
/// where one hour spans `hour_height` units. Times before `base_hour`
/// yield a negative `top`.
pub fn position(start: ClockTime, end: ClockTime, base_hour: u16, hour_height: f64) -> Position {
    let offset = i32::from(start.minutes()) - i32::from(base_hour) * 60;
    Position {
        top: f64::from(offset) / 60.0 * hour_height,
        height: f64::from(duration(start, end)) / 60.0 * hour_height,
    }
}

/// Hourly labels from `start_hour` through `end_hour`, both inclusive.
pub fn time_slots(start_hour: u16, end_hour: u16) -> Vec<ClockTime> {
    (start_hour..=end_hour.min(23))
        .filter_map(|hour| ClockTime::from_hm(hour, 0).ok())
        .collect()
}

pub fn format_time_range(start: ClockTime, end: ClockTime) -> String {
    format!("{start} - {end}")
}

pub fn format_duration(minutes: u32) -> String {
    let hours = minutes / 60;
    let mins = minutes % 60;
    match (hours, mins) {
        (0, m) => format!("{m} min"),
        (h, 0) => format!("{h} h"),
        (h, m) => format!("{h} h {m} min"),
    }
}

pub fn round_to_quarter(time: ClockTime) -> Result<ClockTime, TimeError> {
    let minutes = i32::from(time.minutes());
    let rounded = ((minutes as f64) / 15.0).round() as i32 * 15;
    ClockTime::from_minutes(rounded)
}

/// Maps a vertical offset on the grid back to a quarter-hour clock time.
pub fn time_from_position(y: f64, hour_height: f64, base_hour: u16) -> Result<ClockTime, TimeError> {
    if hour_height <= 0.0 || !y.is_finite() {
        return Err(TimeError::OutOfRange(i32::from(base_hour) * 60));
    }
    let minutes = f64::from(base_hour) * 60.0 + y / hour_height * 60.0;
    let rounded = (minutes / 15.0).round() as i32 * 15;
    ClockTime::from_minutes(rounded)
}

pub fn is_within_hours(time: ClockTime, start_hour: u16, end_hour: u16) -> bool {
    let minutes = time.minutes();
    minutes >= start_hour * 60 && minutes <= end_hour * 60
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(raw: &str) -> ClockTime {
        raw.parse().expect("valid clock time")
    }

    #[test]
    fn parses_and_formats_clock_times() {
        assert_eq!(time_to_minutes("09:30"), Ok(570));
        assert_eq!(time_to_minutes("7:05"), Ok(425));
        assert_eq!(time_to_minutes("23:59"), Ok(1439));
        assert_eq!(minutes_to_time(570).as_deref(), Ok("09:30"));
        assert_eq!(t("7:05").to_string(), "07:05");
    }

    #[test]
    fn rejects_malformed_times() {
        for raw in ["24:00", "12:60", "noon", "", "9", "09:5", "-1:00", "09:30:00"] {
            assert_eq!(
                time_to_minutes(raw),
                Err(TimeError::InvalidFormat(raw.to_string())),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn minutes_outside_a_day_fail() {
        assert_eq!(minutes_to_time(1440), Err(TimeError::OutOfRange(1440)));
        assert_eq!(minutes_to_time(-1), Err(TimeError::OutOfRange(-1)));
        assert_eq!(minutes_to_time(0).as_deref(), Ok("00:00"));
    }

    #[test]
    fn touching_spans_do_not_overlap() {
        let a = TimeSpan::new(t("09:00"), t("10:00"));
        let b = TimeSpan::new(t("10:00"), t("11:00"));
        let c = TimeSpan::new(t("09:30"), t("10:30"));
        assert!(!overlaps(a, b));
        assert!(overlaps(a, c));
        assert!(overlaps(c, b));
    }

    #[test]
    fn degenerate_spans_never_overlap() {
        let outer = TimeSpan::new(t("08:00"), t("12:00"));
        let empty = TimeSpan::new(t("10:00"), t("10:00"));
        let inverted = TimeSpan::new(t("11:00"), t("09:00"));
        assert!(!overlaps(outer, empty));
        assert!(!overlaps(inverted, outer));
        assert_eq!(inverted.duration(), 0);
    }

    #[test]
    fn position_scales_from_base_hour() {
        let pos = position(t("08:30"), t("10:00"), 7, 60.0);
        assert_eq!(pos.top, 90.0);
        assert_eq!(pos.height, 90.0);

        let inverted = position(t("10:00"), t("09:00"), 7, 60.0);
        assert_eq!(inverted.height, 0.0);

        let early = position(t("06:00"), t("07:00"), 7, 40.0);
        assert_eq!(early.top, -40.0);
    }

    #[test]
    fn quarter_rounding_and_grid_lookup() {
        assert_eq!(round_to_quarter(t("09:07")), Ok(t("09:00")));
        assert_eq!(round_to_quarter(t("09:08")), Ok(t("09:15")));
        assert_eq!(round_to_quarter(t("09:53")), Ok(t("10:00")));
        assert!(round_to_quarter(t("23:55")).is_err());

        assert_eq!(time_from_position(150.0, 60.0, 7), Ok(t("09:30")));
        assert_eq!(time_from_position(0.0, 60.0, 7), Ok(t("07:00")));
    }

    #[test]
    fn formats_durations_and_slots() {
        assert_eq!(format_duration(45), "45 min");
        assert_eq!(format_duration(120), "2 h");
        assert_eq!(format_duration(95), "1 h 35 min");

        let slots = time_slots(7, 9);
        assert_eq!(slots, vec![t("07:00"), t("08:00"), t("09:00")]);
        assert!(is_within_hours(t("18:00"), 7, 18));
        assert!(!is_within_hours(t("18:01"), 7, 18));
    }
}
