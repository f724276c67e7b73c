//! JSON export documents and import parsing.

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{Activity, ActivityType, FamilyMember};
use crate::schedule::{ImportBundle, Schedule};
use crate::week::WeekRef;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleExport {
    pub week: u32,
    pub year: i32,
    pub activities: Vec<Activity>,
    pub family_members: Vec<FamilyMember>,
    pub activity_types: Vec<ActivityType>,
    pub export_date: DateTime<Utc>,
}

impl ScheduleExport {
    /// Snapshot of one week's activities together with the full member
    /// and type lists.
    pub fn for_week(schedule: &Schedule, week: WeekRef, now: DateTime<Utc>) -> Self {
        Self {
            week: week.week,
            year: week.year,
            activities: schedule.activities_for_week(week),
            family_members: schedule.family_members.clone(),
            activity_types: schedule.activity_types.clone(),
            export_date: now,
        }
    }

    pub fn file_name(&self) -> String {
        format!("schedule-w{}-{}.json", self.week, self.year)
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize export")
    }
}

/// Parses an import document. Any of `activities`, `familyMembers` and
/// `activityTypes` may be missing; export metadata is ignored. A bare
/// JSON array is read as a list of activities.
pub fn parse_import(raw: &str) -> anyhow::Result<ImportBundle> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("import: empty input"));
    }

    let bundle = if trimmed.starts_with('[') {
        let activities: Vec<Activity> =
            serde_json::from_str(trimmed).context("failed parsing activity array")?;
        ImportBundle {
            activities: Some(activities),
            ..ImportBundle::default()
        }
    } else {
        serde_json::from_str(trimmed).context("failed parsing import document")?
    };

    debug!(
        activities = bundle.activities.as_ref().map_or(0, Vec::len),
        members = bundle.family_members.as_ref().map_or(0, Vec::len),
        types = bundle.activity_types.as_ref().map_or(0, Vec::len),
        "parsed import bundle"
    );
    Ok(bundle)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::model::Day;
    use crate::time::ClockTime;

    #[test]
    fn export_then_import_into_other_schedule_merges_by_id() {
        let t = |s: &str| s.parse::<ClockTime>().expect("valid time");
        let week = WeekRef { year: 2024, week: 10 };
        let mut source = Schedule::with_defaults();
        source.activities.push(
            Activity::new("a1", "Piano", Day::Wednesday, t("15:00"), t("15:45"))
                .with_participants(["family"])
                .in_week(week),
        );
        source.activities.push(
            Activity::new("a2", "Elsewhere", Day::Wednesday, t("15:00"), t("15:45"))
                .in_week(WeekRef { year: 2024, week: 11 }),
        );

        let now = Utc
            .with_ymd_and_hms(2024, 3, 6, 8, 0, 0)
            .single()
            .expect("valid now");
        let export = ScheduleExport::for_week(&source, week, now);
        assert_eq!(export.activities.len(), 1);
        assert_eq!(export.file_name(), "schedule-w10-2024.json");

        let json = export.to_json().expect("serialize");
        assert!(json.contains("\"familyMembers\""));
        assert!(json.contains("\"exportDate\""));

        let mut target = Schedule::with_defaults();
        let summary = target.merge_import(parse_import(&json).expect("parse"));
        assert_eq!(summary.activities_added, 1);
        assert_eq!(summary.members_added, 0);
        assert_eq!(summary.types_skipped, target.activity_types.len());
    }

    #[test]
    fn accepts_partial_documents_and_bare_arrays() {
        let partial = parse_import(r#"{"familyMembers":[{"id":"m1","name":"Siv","type":"child"}]}"#)
            .expect("parse partial");
        assert!(partial.activities.is_none());
        assert_eq!(partial.family_members.map(|m| m.len()), Some(1));

        let array = parse_import(
            r#"[{"id":"x","day":"friday","startTime":"08:00","endTime":"09:00"}]"#,
        )
        .expect("parse array");
        assert_eq!(array.activities.map(|a| a.len()), Some(1));

        assert!(parse_import("   ").is_err());
        assert!(parse_import("{\"activities\": [{\"id\": 1}]}").is_err());
    }
}
