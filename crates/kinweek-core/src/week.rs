//! ISO-8601 week resolution.
//!
//! A [`WeekRef`] always carries the ISO week-year, which differs from the
//! calendar year for the few days around New Year that belong to the
//! neighbouring year's week.

use std::fmt;

use chrono::{Datelike, Days, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WeekError {
    #[error("week {week} does not exist in {year} (valid: 1..={max})")]
    OutOfRange { week: u32, year: i32, max: u32 },

    #[error("year {0} is outside the supported calendar range")]
    InvalidYear(i32),
}

pub fn week_number(date: NaiveDate) -> u32 {
    date.iso_week().week()
}

/// 52 or 53. Dec 28 always falls in the last ISO week of its year.
pub fn weeks_in_year(year: i32) -> u32 {
    NaiveDate::from_ymd_opt(year, 12, 28)
        .map(|d| d.iso_week().week())
        .unwrap_or(52)
}

fn monday_of_week_one(year: i32) -> Result<NaiveDate, WeekError> {
    // Jan 4 is in week 1 by definition.
    let jan4 = NaiveDate::from_ymd_opt(year, 1, 4).ok_or(WeekError::InvalidYear(year))?;
    let back = i64::from(jan4.weekday().num_days_from_monday());
    jan4.checked_sub_signed(Duration::days(back))
        .ok_or(WeekError::InvalidYear(year))
}

pub fn monday_of_week(week: u32, year: i32) -> Result<NaiveDate, WeekError> {
    let max = weeks_in_year(year);
    if week == 0 || week > max {
        return Err(WeekError::OutOfRange { week, year, max });
    }
    let first = monday_of_week_one(year)?;
    first
        .checked_add_signed(Duration::weeks(i64::from(week - 1)))
        .ok_or(WeekError::InvalidYear(year))
}

/// Monday through Friday of ISO week `week` in ISO year `year`.
pub fn dates_for_week(week: u32, year: i32) -> Result<[NaiveDate; 5], WeekError> {
    let monday = monday_of_week(week, year)?;
    let mut dates = [monday; 5];
    for (offset, slot) in (0u64..).zip(dates.iter_mut()).skip(1) {
        *slot = monday
            .checked_add_days(Days::new(offset))
            .ok_or(WeekError::InvalidYear(year))?;
    }
    Ok(dates)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WeekRef {
    pub year: i32,
    pub week: u32,
}

impl WeekRef {
    pub fn new(week: u32, year: i32) -> Result<Self, WeekError> {
        monday_of_week(week, year)?;
        Ok(Self { year, week })
    }

    pub fn containing(date: NaiveDate) -> Self {
        let iso = date.iso_week();
        Self {
            year: iso.year(),
            week: iso.week(),
        }
    }

    pub fn monday(&self) -> Result<NaiveDate, WeekError> {
        monday_of_week(self.week, self.year)
    }

    pub fn dates(&self) -> Result<[NaiveDate; 5], WeekError> {
        dates_for_week(self.week, self.year)
    }

    /// Date of `day` within this week.
    pub fn date_of(&self, day: Weekday) -> Result<NaiveDate, WeekError> {
        let monday = self.monday()?;
        Ok(monday + Duration::days(i64::from(day.num_days_from_monday())))
    }

    pub fn offset(&self, weeks: i64) -> Result<Self, WeekError> {
        let monday = self.monday()?;
        monday
            .checked_add_signed(Duration::weeks(weeks))
            .map(Self::containing)
            .ok_or(WeekError::InvalidYear(self.year))
    }

    pub fn next(&self) -> Result<Self, WeekError> {
        self.offset(1)
    }

    pub fn previous(&self) -> Result<Self, WeekError> {
        self.offset(-1)
    }

    /// Every week from `self` through `last`, inclusive. Empty when
    /// `last` precedes `self`.
    pub fn through(&self, last: WeekRef) -> Result<Vec<WeekRef>, WeekError> {
        let mut out = Vec::new();
        let mut current = *self;
        while current <= last {
            out.push(current);
            current = current.next()?;
        }
        Ok(out)
    }
}

impl fmt::Display for WeekRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-W{:02}", self.year, self.week)
    }
}

/// Weeks touched by the date range `start..=end`.
pub fn weeks_between(start: NaiveDate, end: NaiveDate) -> Result<Vec<WeekRef>, WeekError> {
    WeekRef::containing(start).through(WeekRef::containing(end))
}

/// `"1-5 January"` or `"29 January - 2 February"` for the Monday-Friday
/// span of a week.
pub fn format_week_range(week: WeekRef) -> Result<String, WeekError> {
    let dates = week.dates()?;
    let (first, last) = (dates[0], dates[4]);
    if first.month() == last.month() {
        Ok(format!("{}-{} {}", first.day(), last.day(), first.format("%B")))
    } else {
        Ok(format!(
            "{} {} - {} {}",
            first.day(),
            first.format("%B"),
            last.day(),
            last.format("%B")
        ))
    }
}
