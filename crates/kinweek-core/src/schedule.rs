//! The in-memory schedule: activities, family members and activity
//! types, plus the edits the front end performs on them.
//!
//! A `Schedule` is loaded from the [`DataStore`](crate::datastore::DataStore),
//! mutated by one command and saved again. The layout and conflict
//! functions only ever see slices cloned out of it.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::model::{Activity, ActivityId, ActivityType, Day, FamilyMember, MemberId, MemberKind, new_id};
use crate::time::ClockTime;
use crate::week::{WeekError, WeekRef};

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("activity not found: {0}")]
    ActivityNotFound(ActivityId),

    #[error("family member not found: {0}")]
    MemberNotFound(MemberId),

    #[error("activity type not found: {0}")]
    TypeNotFound(String),

    #[error("end time {end} must be after start time {start}")]
    EndNotAfterStart { start: ClockTime, end: ClockTime },

    #[error("pick at least one day")]
    NoDays,

    #[error("pick at least one participant")]
    NoParticipants,

    #[error("recurrence end {until} lies before week {first}")]
    RecurrenceEndsTooEarly { until: NaiveDate, first: WeekRef },

    #[error(transparent)]
    Week(#[from] WeekError),
}

/// Input for [`Schedule::add_activities`]: one draft may expand to one
/// instance per day, and per week when it recurs.
#[derive(Debug, Clone)]
pub struct ActivityDraft {
    pub name: String,
    pub activity_type: Option<String>,
    pub days: Vec<Day>,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    pub participants: BTreeSet<MemberId>,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub week: Option<WeekRef>,
    pub recurring_until: Option<NaiveDate>,
}

impl ActivityDraft {
    pub fn new(name: impl Into<String>, start_time: ClockTime, end_time: ClockTime) -> Self {
        Self {
            name: name.into(),
            activity_type: None,
            days: Vec::new(),
            start_time,
            end_time,
            participants: BTreeSet::new(),
            location: None,
            notes: None,
            week: None,
            recurring_until: None,
        }
    }

    fn validate(&self) -> Result<(), ScheduleError> {
        if self.days.is_empty() {
            return Err(ScheduleError::NoDays);
        }
        if self.participants.is_empty() {
            return Err(ScheduleError::NoParticipants);
        }
        check_times(self.start_time, self.end_time)
    }

    fn instantiate(&self, day: Day, week: WeekRef, now: DateTime<Utc>) -> Activity {
        let mut activity = Activity::new(
            new_id("activity"),
            self.name.clone(),
            day,
            self.start_time,
            self.end_time,
        )
        .in_week(week);
        activity.activity_type = self.activity_type.clone();
        activity.participants = self.participants.clone();
        activity.location = self.location.clone();
        activity.notes = self.notes.clone();
        activity.created_at = Some(now);
        activity
    }
}

fn check_times(start: ClockTime, end: ClockTime) -> Result<(), ScheduleError> {
    if end <= start {
        return Err(ScheduleError::EndNotAfterStart { start, end });
    }
    Ok(())
}

/// Partial update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct ActivityPatch {
    pub name: Option<String>,
    pub activity_type: Option<String>,
    pub day: Option<Day>,
    pub start_time: Option<ClockTime>,
    pub end_time: Option<ClockTime>,
    pub participants: Option<BTreeSet<MemberId>>,
    pub location: Option<String>,
    pub notes: Option<String>,
}

impl ActivityPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.activity_type.is_none()
            && self.day.is_none()
            && self.start_time.is_none()
            && self.end_time.is_none()
            && self.participants.is_none()
            && self.location.is_none()
            && self.notes.is_none()
    }

    fn apply(&self, activity: &mut Activity, keep_day: bool) {
        if let Some(name) = &self.name {
            activity.name = name.clone();
        }
        if let Some(kind) = &self.activity_type {
            activity.activity_type = Some(kind.clone());
        }
        if let Some(day) = self.day
            && !keep_day
        {
            activity.day = day;
        }
        if let Some(start) = self.start_time {
            activity.start_time = start;
        }
        if let Some(end) = self.end_time {
            activity.end_time = end;
        }
        if let Some(participants) = &self.participants {
            activity.participants = participants.clone();
        }
        if let Some(location) = &self.location {
            activity.location = Some(location.clone());
        }
        if let Some(notes) = &self.notes {
            activity.notes = Some(notes.clone());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditScope {
    /// Only the addressed instance.
    Single,
    /// Every instance sharing the addressed activity's recurring group.
    Series,
}

#[derive(Debug, Clone, Default)]
pub struct MemberPatch {
    pub name: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub kind: Option<MemberKind>,
}

#[derive(Debug, Clone, Default)]
pub struct TypePatch {
    pub name: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemberRemoval {
    pub detached: usize,
    pub dropped_activities: usize,
}

/// Collections carried by an import document. Absent collections are
/// left alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportBundle {
    #[serde(default)]
    pub activities: Option<Vec<Activity>>,
    #[serde(default)]
    pub family_members: Option<Vec<FamilyMember>>,
    #[serde(default)]
    pub activity_types: Option<Vec<ActivityType>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub activities_added: usize,
    pub activities_skipped: usize,
    pub members_added: usize,
    pub members_skipped: usize,
    pub types_added: usize,
    pub types_skipped: usize,
}

impl ImportSummary {
    pub fn added(&self) -> usize {
        self.activities_added + self.members_added + self.types_added
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub activities: Vec<Activity>,
    pub family_members: Vec<FamilyMember>,
    pub activity_types: Vec<ActivityType>,
}

impl Schedule {
    pub fn with_defaults() -> Self {
        Self {
            activities: Vec::new(),
            family_members: default_members(),
            activity_types: default_activity_types(),
        }
    }

    pub fn activity(&self, id: &str) -> Option<&Activity> {
        self.activities.iter().find(|a| a.id == id)
    }

    pub fn member(&self, id: &str) -> Option<&FamilyMember> {
        self.family_members.iter().find(|m| m.id == id)
    }

    pub fn activity_type(&self, id: &str) -> Option<&ActivityType> {
        self.activity_types.iter().find(|t| t.id == id)
    }

    /// Activities shown in `week`: instances scoped to it plus unscoped
    /// legacy entries.
    pub fn activities_for_week(&self, week: WeekRef) -> Vec<Activity> {
        self.activities
            .iter()
            .filter(|a| a.is_visible_in(week))
            .cloned()
            .collect()
    }

    pub fn activities_for_day(&self, week: WeekRef, day: Day) -> Vec<Activity> {
        self.activities
            .iter()
            .filter(|a| a.day == day && a.is_visible_in(week))
            .cloned()
            .collect()
    }

    pub fn series(&self, group_id: &str) -> Vec<&Activity> {
        self.activities
            .iter()
            .filter(|a| a.recurring_group_id.as_deref() == Some(group_id))
            .collect()
    }

    /// Creates one instance per day of the draft. A draft with
    /// `recurring_until` is repeated for every week from its start week
    /// through the week containing that date, all instances sharing one
    /// recurring group id. Drafts without a week land in the week of
    /// `today`.
    #[instrument(skip(self, draft, now), fields(name = %draft.name))]
    pub fn add_activities(
        &mut self,
        draft: &ActivityDraft,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Vec<Activity>, ScheduleError> {
        draft.validate()?;

        let first = draft.week.unwrap_or_else(|| WeekRef::containing(today));
        let days: BTreeSet<Day> = draft.days.iter().copied().collect();

        let created: Vec<Activity> = if let Some(until) = draft.recurring_until {
            let weeks = first.through(WeekRef::containing(until))?;
            if weeks.is_empty() {
                return Err(ScheduleError::RecurrenceEndsTooEarly { until, first });
            }
            let group_id = new_id("recurring");
            let mut out = Vec::with_capacity(weeks.len() * days.len());
            for week in &weeks {
                for &day in &days {
                    let mut activity = draft.instantiate(day, *week, now);
                    activity.recurring = true;
                    activity.recurring_group_id = Some(group_id.clone());
                    out.push(activity);
                }
            }
            info!(
                group = %group_id,
                weeks = weeks.len(),
                instances = out.len(),
                "created recurring series"
            );
            out
        } else {
            days.iter()
                .map(|&day| draft.instantiate(day, first, now))
                .collect()
        };

        self.activities.extend(created.iter().cloned());
        Ok(created)
    }

    /// Returns how many activities changed. With [`EditScope::Series`]
    /// every instance keeps its own id, day and week.
    #[instrument(skip(self, patch))]
    pub fn update_activity(
        &mut self,
        id: &str,
        patch: &ActivityPatch,
        scope: EditScope,
    ) -> Result<usize, ScheduleError> {
        let target = self
            .activity(id)
            .ok_or_else(|| ScheduleError::ActivityNotFound(id.to_string()))?;

        let group = match scope {
            EditScope::Series => target.recurring_group_id.clone(),
            EditScope::Single => None,
        };

        let mut updated = Vec::new();
        for (index, activity) in self.activities.iter().enumerate() {
            let keep_day = match &group {
                Some(group_id) if activity.recurring_group_id.as_ref() == Some(group_id) => true,
                None if activity.id == id => false,
                _ => continue,
            };
            let mut next = activity.clone();
            patch.apply(&mut next, keep_day);
            check_times(next.start_time, next.end_time)?;
            updated.push((index, next));
        }

        let changed = updated.len();
        for (index, next) in updated {
            self.activities[index] = next;
        }

        debug!(changed, series = group.is_some(), "updated activity");
        Ok(changed)
    }

    #[instrument(skip(self))]
    pub fn delete_activity(&mut self, id: &str, scope: EditScope) -> Result<usize, ScheduleError> {
        let target = self
            .activity(id)
            .ok_or_else(|| ScheduleError::ActivityNotFound(id.to_string()))?;

        let before = self.activities.len();
        match (scope, target.recurring_group_id.clone()) {
            (EditScope::Series, Some(group_id)) => self
                .activities
                .retain(|a| a.recurring_group_id.as_ref() != Some(&group_id)),
            _ => self.activities.retain(|a| a.id != id),
        }
        Ok(before - self.activities.len())
    }

    /// Copies the activities visible in `from` into `to` as one-off
    /// instances with fresh ids.
    #[instrument(skip(self, now))]
    pub fn copy_week(&mut self, from: WeekRef, to: WeekRef, now: DateTime<Utc>) -> Vec<Activity> {
        let copies: Vec<Activity> = self
            .activities_for_week(from)
            .into_iter()
            .map(|mut activity| {
                activity.id = new_id("activity");
                activity.week = Some(to.week);
                activity.year = Some(to.year);
                activity.recurring = false;
                activity.recurring_group_id = None;
                activity.created_at = Some(now);
                activity
            })
            .collect();

        info!(count = copies.len(), %from, %to, "copied week");
        self.activities.extend(copies.iter().cloned());
        copies
    }

    pub fn add_member(
        &mut self,
        name: impl Into<String>,
        kind: MemberKind,
        color: impl Into<String>,
        icon: Option<String>,
    ) -> FamilyMember {
        let member = FamilyMember {
            id: new_id("member"),
            name: name.into(),
            color: color.into(),
            icon,
            kind,
        };
        self.family_members.push(member.clone());
        member
    }

    pub fn update_member(&mut self, id: &str, patch: &MemberPatch) -> Result<(), ScheduleError> {
        let member = self
            .family_members
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| ScheduleError::MemberNotFound(id.to_string()))?;
        if let Some(name) = &patch.name {
            member.name = name.clone();
        }
        if let Some(color) = &patch.color {
            member.color = color.clone();
        }
        if let Some(icon) = &patch.icon {
            member.icon = Some(icon.clone());
        }
        if let Some(kind) = patch.kind {
            member.kind = kind;
        }
        Ok(())
    }

    /// Removes the member and detaches it from every activity. Activities
    /// left without participants are dropped.
    #[instrument(skip(self))]
    pub fn delete_member(&mut self, id: &str) -> Result<MemberRemoval, ScheduleError> {
        let before = self.family_members.len();
        self.family_members.retain(|m| m.id != id);
        if self.family_members.len() == before {
            return Err(ScheduleError::MemberNotFound(id.to_string()));
        }

        let mut removal = MemberRemoval::default();
        self.activities.retain_mut(|activity| {
            if !activity.participants.remove(id) {
                return true;
            }
            removal.detached += 1;
            if activity.participants.is_empty() {
                removal.dropped_activities += 1;
                false
            } else {
                true
            }
        });

        info!(
            member = id,
            detached = removal.detached,
            dropped = removal.dropped_activities,
            "deleted family member"
        );
        Ok(removal)
    }

    pub fn add_activity_type(
        &mut self,
        name: impl Into<String>,
        color: impl Into<String>,
        icon: Option<String>,
    ) -> ActivityType {
        let kind = ActivityType {
            id: new_id("type"),
            name: name.into(),
            icon,
            color: color.into(),
        };
        self.activity_types.push(kind.clone());
        kind
    }

    pub fn update_activity_type(&mut self, id: &str, patch: &TypePatch) -> Result<(), ScheduleError> {
        let kind = self
            .activity_types
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| ScheduleError::TypeNotFound(id.to_string()))?;
        if let Some(name) = &patch.name {
            kind.name = name.clone();
        }
        if let Some(color) = &patch.color {
            kind.color = color.clone();
        }
        if let Some(icon) = &patch.icon {
            kind.icon = Some(icon.clone());
        }
        Ok(())
    }

    /// Activities keep referring to a deleted type id; they render with
    /// the fallback type.
    pub fn delete_activity_type(&mut self, id: &str) -> Result<(), ScheduleError> {
        let before = self.activity_types.len();
        self.activity_types.retain(|t| t.id != id);
        if self.activity_types.len() == before {
            return Err(ScheduleError::TypeNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Appends imported records whose id is not present yet; records
    /// with a known id are skipped, never overwritten.
    #[instrument(skip(self, bundle))]
    pub fn merge_import(&mut self, bundle: ImportBundle) -> ImportSummary {
        let mut summary = ImportSummary::default();

        if let Some(incoming) = bundle.activities {
            let (added, skipped) = merge_by_id(&mut self.activities, incoming, |a| &a.id);
            summary.activities_added = added;
            summary.activities_skipped = skipped;
        }
        if let Some(incoming) = bundle.family_members {
            let (added, skipped) = merge_by_id(&mut self.family_members, incoming, |m| &m.id);
            summary.members_added = added;
            summary.members_skipped = skipped;
        }
        if let Some(incoming) = bundle.activity_types {
            let (added, skipped) = merge_by_id(&mut self.activity_types, incoming, |t| &t.id);
            summary.types_added = added;
            summary.types_skipped = skipped;
        }

        info!(?summary, "merged import");
        summary
    }
}

fn merge_by_id<T, F>(target: &mut Vec<T>, incoming: Vec<T>, id_of: F) -> (usize, usize)
where
    F: Fn(&T) -> &String,
{
    let mut known: HashSet<String> = target.iter().map(|item| id_of(item).clone()).collect();
    let mut added = 0;
    let mut skipped = 0;
    for item in incoming {
        if known.insert(id_of(&item).clone()) {
            target.push(item);
            added += 1;
        } else {
            skipped += 1;
        }
    }
    (added, skipped)
}

pub fn default_members() -> Vec<FamilyMember> {
    vec![FamilyMember {
        id: "family".to_string(),
        name: "Whole family".to_string(),
        color: "#ec4899".to_string(),
        icon: Some("👨‍👩‍👧‍👦".to_string()),
        kind: MemberKind::Group,
    }]
}

pub fn default_activity_types() -> Vec<ActivityType> {
    [
        ("school", "School", "🎒", "#3b82f6"),
        ("preschool", "Preschool", "🧸", "#8b5cf6"),
        ("afterschool", "After school", "🎨", "#f59e0b"),
        ("sport", "Sport", "⚽", "#10b981"),
        ("music", "Music", "🎵", "#ec4899"),
        ("doctor", "Doctor", "🏥", "#ef4444"),
        ("dentist", "Dentist", "🦷", "#06b6d4"),
        ("party", "Party", "🎂", "#f97316"),
        ("homework", "Homework", "📚", "#6366f1"),
        ("meal", "Meal", "🍽️", "#84cc16"),
        ("meeting", "Meeting", "💼", "#64748b"),
        ("travel", "Travel", "🚗", "#0ea5e9"),
        ("shopping", "Shopping", "🛒", "#fb923c"),
        ("cleaning", "Cleaning", "🧹", "#a855f7"),
        ("other", "Other", "📌", "#94a3b8"),
    ]
    .into_iter()
    .map(|(id, name, icon, color)| ActivityType {
        id: id.to_string(),
        name: name.to_string(),
        icon: Some(icon.to_string()),
        color: color.to_string(),
    })
    .collect()
}
