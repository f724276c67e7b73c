//! Participant double-booking detection.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::model::{Activity, Day, MemberId};

/// Two same-day activities that overlap in time and share at least one
/// participant. Each unordered pair is reported once, with `first`
/// ordered before `second` by start time.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRecord<'a> {
    pub first: &'a Activity,
    pub second: &'a Activity,
    pub day: Day,
    pub shared_participants: Vec<MemberId>,
}

pub fn find_conflicts(activities: &[Activity]) -> Vec<ConflictRecord<'_>> {
    let mut by_day: BTreeMap<Day, Vec<&Activity>> = BTreeMap::new();
    for activity in activities {
        by_day.entry(activity.day).or_default().push(activity);
    }

    let mut out = Vec::new();
    for (day, mut bucket) in by_day {
        bucket.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.end_time.cmp(&b.end_time))
                .then_with(|| a.id.cmp(&b.id))
        });

        for (i, &first) in bucket.iter().enumerate() {
            for &second in &bucket[i + 1..] {
                if first.participants.is_disjoint(&second.participants) {
                    continue;
                }
                if !first.overlaps(second) {
                    continue;
                }
                out.push(ConflictRecord {
                    first,
                    second,
                    day,
                    shared_participants: first.shared_participants(second),
                });
            }
        }
    }

    debug!(activities = activities.len(), conflicts = out.len(), "conflict scan finished");
    out
}

pub fn conflicts_on(activities: &[Activity], day: Day) -> Vec<ConflictRecord<'_>> {
    find_conflicts(activities)
        .into_iter()
        .filter(|c| c.day == day)
        .collect()
}

/// Ids of every activity that takes part in at least one conflict.
pub fn conflicting_ids<'a>(conflicts: &[ConflictRecord<'a>]) -> Vec<&'a str> {
    let mut ids: Vec<&str> = conflicts
        .iter()
        .flat_map(|c| [c.first.id.as_str(), c.second.id.as_str()])
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}
