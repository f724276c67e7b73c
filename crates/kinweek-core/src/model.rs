use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::time::{ClockTime, TimeSpan};
use crate::week::WeekRef;

pub type ActivityId = String;
pub type MemberId = String;

pub fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

/// The five columns of the week grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Day {
    #[serde(alias = "Monday")]
    Monday,
    #[serde(alias = "Tuesday")]
    Tuesday,
    #[serde(alias = "Wednesday")]
    Wednesday,
    #[serde(alias = "Thursday")]
    Thursday,
    #[serde(alias = "Friday")]
    Friday,
}

impl Day {
    pub const ALL: [Day; 5] = [
        Day::Monday,
        Day::Tuesday,
        Day::Wednesday,
        Day::Thursday,
        Day::Friday,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Day::Monday => "monday",
            Day::Tuesday => "tuesday",
            Day::Wednesday => "wednesday",
            Day::Thursday => "thursday",
            Day::Friday => "friday",
        }
    }

    pub fn to_chrono(self) -> chrono::Weekday {
        match self {
            Day::Monday => chrono::Weekday::Mon,
            Day::Tuesday => chrono::Weekday::Tue,
            Day::Wednesday => chrono::Weekday::Wed,
            Day::Thursday => chrono::Weekday::Thu,
            Day::Friday => chrono::Weekday::Fri,
        }
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Day {
    type Err = anyhow::Error;

    /// Accepts full names and unambiguous prefixes of at least two
    /// letters (`mo`, `tue`, `th`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        if lower.len() < 2 {
            return Err(anyhow!("unknown weekday: {s}"));
        }
        let mut matches = Day::ALL
            .iter()
            .copied()
            .filter(|day| day.name().starts_with(&lower));
        match (matches.next(), matches.next()) {
            (Some(day), None) => Ok(day),
            _ => Err(anyhow!("unknown weekday: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: ActivityId,

    #[serde(default)]
    pub name: String,

    #[serde(rename = "type", default)]
    pub activity_type: Option<String>,

    pub day: Day,

    pub start_time: ClockTime,

    pub end_time: ClockTime,

    #[serde(default)]
    pub participants: BTreeSet<MemberId>,

    #[serde(default)]
    pub location: Option<String>,

    #[serde(default)]
    pub notes: Option<String>,

    #[serde(default)]
    pub week: Option<u32>,

    #[serde(default)]
    pub year: Option<i32>,

    #[serde(default)]
    pub recurring: bool,

    #[serde(default)]
    pub recurring_group_id: Option<String>,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Activity {
    pub fn new(
        id: impl Into<ActivityId>,
        name: impl Into<String>,
        day: Day,
        start_time: ClockTime,
        end_time: ClockTime,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            activity_type: None,
            day,
            start_time,
            end_time,
            participants: BTreeSet::new(),
            location: None,
            notes: None,
            week: None,
            year: None,
            recurring: false,
            recurring_group_id: None,
            created_at: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_participants<I, S>(mut self, participants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<MemberId>,
    {
        self.participants = participants.into_iter().map(Into::into).collect();
        self
    }

    pub fn in_week(mut self, week: WeekRef) -> Self {
        self.week = Some(week.week);
        self.year = Some(week.year);
        self
    }

    pub fn span(&self) -> TimeSpan {
        TimeSpan::new(self.start_time, self.end_time)
    }

    pub fn duration_minutes(&self) -> u16 {
        self.span().duration()
    }

    pub fn overlaps(&self, other: &Activity) -> bool {
        self.span().overlaps(&other.span())
    }

    /// The week this instance belongs to; `None` for legacy activities
    /// that show up in every week.
    pub fn scope(&self) -> Option<WeekRef> {
        match (self.week, self.year) {
            (Some(week), Some(year)) if week > 0 => Some(WeekRef { year, week }),
            _ => None,
        }
    }

    pub fn is_visible_in(&self, week: WeekRef) -> bool {
        match (self.week, self.year) {
            (None | Some(0), _) => true,
            (Some(w), Some(y)) => w == week.week && y == week.year,
            (Some(_), None) => false,
        }
    }

    pub fn shared_participants(&self, other: &Activity) -> Vec<MemberId> {
        self.participants
            .intersection(&other.participants)
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MemberKind {
    Child,
    #[default]
    Adult,
    Group,
}

impl FromStr for MemberKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "child" => Ok(MemberKind::Child),
            "adult" => Ok(MemberKind::Adult),
            "group" => Ok(MemberKind::Group),
            other => Err(anyhow!("unknown member kind: {other}")),
        }
    }
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MemberKind::Child => "child",
            MemberKind::Adult => "adult",
            MemberKind::Group => "group",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FamilyMember {
    pub id: MemberId,
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: MemberKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityType {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub color: String,
}
