use std::collections::BTreeMap;

use serde::Serialize;

use crate::conflict::{ConflictRecord, find_conflicts};
use crate::model::{Activity, Day, MemberId};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MemberLoad {
    pub count: usize,
    pub minutes: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekStatistics<'a> {
    pub total_activities: usize,
    pub total_minutes: u32,
    pub by_member: BTreeMap<MemberId, MemberLoad>,
    pub by_type: BTreeMap<String, usize>,
    pub by_day: BTreeMap<Day, usize>,
    pub conflicts: Vec<ConflictRecord<'a>>,
}

/// Summarises the activities of one week. Activities without a type are
/// counted under `"other"`.
pub fn week_statistics(activities: &[Activity]) -> WeekStatistics<'_> {
    let mut by_member: BTreeMap<MemberId, MemberLoad> = BTreeMap::new();
    let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_day: BTreeMap<Day, usize> = BTreeMap::new();
    let mut total_minutes = 0u32;

    for activity in activities {
        let minutes = u32::from(activity.duration_minutes());
        total_minutes += minutes;

        for member in &activity.participants {
            let load = by_member.entry(member.clone()).or_default();
            load.count += 1;
            load.minutes += minutes;
        }

        let kind = activity
            .activity_type
            .clone()
            .unwrap_or_else(|| "other".to_string());
        *by_type.entry(kind).or_default() += 1;
        *by_day.entry(activity.day).or_default() += 1;
    }

    WeekStatistics {
        total_activities: activities.len(),
        total_minutes,
        by_member,
        by_type,
        by_day,
        conflicts: find_conflicts(activities),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ClockTime;

    fn act(id: &str, day: Day, start: &str, end: &str, who: &[&str], kind: Option<&str>) -> Activity {
        let t = |s: &str| s.parse::<ClockTime>().expect("valid time");
        let mut activity =
            Activity::new(id, id, day, t(start), t(end)).with_participants(who.iter().copied());
        activity.activity_type = kind.map(str::to_string);
        activity
    }

    #[test]
    fn totals_by_member_type_and_day() {
        let week = vec![
            act("a", Day::Monday, "08:00", "15:00", &["pim", "rut"], Some("school")),
            act("b", Day::Monday, "14:30", "16:00", &["rut"], Some("sport")),
            act("c", Day::Thursday, "17:00", "17:45", &["pim"], None),
        ];
        let stats = week_statistics(&week);

        assert_eq!(stats.total_activities, 3);
        assert_eq!(stats.total_minutes, 420 + 90 + 45);
        assert_eq!(stats.by_member["pim"], MemberLoad { count: 2, minutes: 465 });
        assert_eq!(stats.by_member["rut"], MemberLoad { count: 2, minutes: 510 });
        assert_eq!(stats.by_type["other"], 1);
        assert_eq!(stats.by_day[&Day::Monday], 2);
        assert_eq!(stats.conflicts.len(), 1);
        assert_eq!(stats.conflicts[0].shared_participants, vec!["rut".to_string()]);
    }

    #[test]
    fn empty_week_is_all_zero() {
        let stats = week_statistics(&[]);
        assert_eq!(stats.total_activities, 0);
        assert_eq!(stats.total_minutes, 0);
        assert!(stats.by_member.is_empty());
        assert!(stats.conflicts.is_empty());
    }
}
