//! Day-column layout: overlap groups, side-by-side columns and
//! pixel geometry for the week grid.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;
use tracing::trace;

use crate::model::{Activity, ActivityId};
use crate::time::{ClockTime, Position, TimeSpan, position};

/// Groups larger than this get a crowded marker in the day header.
pub const CROWDED_GROUP_SIZE: usize = 3;

/// Start ascending, longer first on equal starts, id as the final
/// tie-break so identical input always lays out identically.
fn layout_order(a: &&Activity, b: &&Activity) -> Ordering {
    a.start_time
        .cmp(&b.start_time)
        .then_with(|| b.duration_minutes().cmp(&a.duration_minutes()))
        .then_with(|| a.id.cmp(&b.id))
}

fn sorted_refs<'a, I>(activities: I) -> Vec<&'a Activity>
where
    I: IntoIterator<Item = &'a Activity>,
{
    let mut sorted: Vec<&Activity> = activities.into_iter().collect();
    sorted.sort_by(layout_order);
    sorted
}

/// Splits one day's activities into connected overlap groups.
///
/// Membership is transitive: if A overlaps B and B overlaps C, all three
/// share a group even when A and C are disjoint. Each group is returned
/// in layout order.
pub fn group_overlapping(activities: &[Activity]) -> Vec<Vec<&Activity>> {
    let sorted = sorted_refs(activities);
    let mut visited = vec![false; sorted.len()];
    let mut groups = Vec::new();

    for seed in 0..sorted.len() {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;
        let mut members = vec![seed];

        loop {
            let mut grew = false;
            for candidate in 0..sorted.len() {
                if visited[candidate] {
                    continue;
                }
                let touches = members
                    .iter()
                    .any(|&m| sorted[m].overlaps(sorted[candidate]));
                if touches {
                    visited[candidate] = true;
                    members.push(candidate);
                    grew = true;
                }
            }
            if !grew {
                break;
            }
        }

        members.sort_unstable();
        trace!(seed = %sorted[seed].id, size = members.len(), "closed overlap group");
        groups.push(members.into_iter().map(|idx| sorted[idx]).collect());
    }

    groups
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnAssignment {
    pub column_index: usize,
    pub column_count: usize,
}

/// First-fit lanes: every activity goes into the leftmost column whose
/// occupants it does not overlap.
fn first_fit_columns<'a>(group: &[&'a Activity]) -> Vec<Vec<&'a Activity>> {
    let mut columns: Vec<Vec<&Activity>> = Vec::new();
    for activity in sorted_refs(group.iter().copied()) {
        let free = columns
            .iter_mut()
            .find(|column| column.iter().all(|placed| !placed.overlaps(activity)));
        match free {
            Some(column) => column.push(activity),
            None => columns.push(vec![activity]),
        }
    }
    columns
}

pub fn assign_columns(group: &[&Activity]) -> BTreeMap<ActivityId, ColumnAssignment> {
    let columns = first_fit_columns(group);
    let column_count = columns.len();

    let mut out = BTreeMap::new();
    for (column_index, column) in columns.into_iter().enumerate() {
        for activity in column {
            out.insert(
                activity.id.clone(),
                ColumnAssignment {
                    column_index,
                    column_count,
                },
            );
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridGeometry {
    pub start_hour: u16,
    pub end_hour: u16,
    pub hour_height: f64,
}

impl Default for GridGeometry {
    fn default() -> Self {
        Self {
            start_hour: 7,
            end_hour: 18,
            hour_height: 60.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlacedActivity<'a> {
    pub activity: &'a Activity,
    pub group: usize,
    #[serde(flatten)]
    pub column: ColumnAssignment,
    #[serde(flatten)]
    pub position: Position,
    /// Horizontal offset as a fraction of the day column width.
    pub left: f64,
    pub width: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DayLayout<'a> {
    pub placed: Vec<PlacedActivity<'a>>,
    pub group_sizes: Vec<usize>,
}

impl DayLayout<'_> {
    pub fn is_crowded(&self) -> bool {
        self.group_sizes
            .iter()
            .any(|&size| size > CROWDED_GROUP_SIZE)
    }

    pub fn max_columns(&self) -> usize {
        self.placed
            .iter()
            .map(|p| p.column.column_count)
            .max()
            .unwrap_or(0)
    }
}

/// Full render layout for one day's activities.
pub fn layout_day<'a>(activities: &'a [Activity], grid: &GridGeometry) -> DayLayout<'a> {
    let mut layout = DayLayout::default();

    for (group_index, group) in group_overlapping(activities).into_iter().enumerate() {
        layout.group_sizes.push(group.len());
        let columns = assign_columns(&group);

        for activity in group {
            let Some(column) = columns.get(&activity.id).copied() else {
                continue;
            };
            let width = 1.0 / column.column_count as f64;
            layout.placed.push(PlacedActivity {
                activity,
                group: group_index,
                column,
                position: position(
                    activity.start_time,
                    activity.end_time,
                    grid.start_hour,
                    grid.hour_height,
                ),
                left: column.column_index as f64 * width,
                width,
            });
        }
    }

    layout
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FreeSlot {
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    pub duration: u16,
}

/// Gaps of at least `min_minutes` inside `window` not covered by any
/// activity. Degenerate activities block nothing.
pub fn free_slots(activities: &[Activity], window: TimeSpan, min_minutes: u16) -> Vec<FreeSlot> {
    let mut slots = Vec::new();
    if window.is_degenerate() {
        return slots;
    }

    let mut busy: Vec<TimeSpan> = activities
        .iter()
        .map(Activity::span)
        .filter(|span| !span.is_degenerate())
        .collect();
    busy.sort_by_key(|span| (span.start, span.end));

    let mut push_gap = |from: ClockTime, to: ClockTime| {
        let gap = TimeSpan::new(from, to);
        if !gap.is_degenerate() && gap.duration() >= min_minutes {
            slots.push(FreeSlot {
                start_time: from,
                end_time: to,
                duration: gap.duration(),
            });
        }
    };

    let mut cursor = window.start;
    for span in busy {
        if span.start >= window.end {
            break;
        }
        if span.start > cursor {
            push_gap(cursor, span.start);
        }
        cursor = cursor.max(span.end);
    }
    if cursor < window.end {
        push_gap(cursor, window.end);
    }

    slots
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::model::Day;

    fn t(raw: &str) -> ClockTime {
        raw.parse().expect("valid time")
    }

    fn act(id: &str, start: &str, end: &str) -> Activity {
        Activity::new(id, id, Day::Monday, t(start), t(end))
    }

    fn ids(group: &[&Activity]) -> Vec<String> {
        group.iter().map(|a| a.id.clone()).collect()
    }

    /// Deterministic activity soup for the property checks below.
    fn pseudo_random_day(seed: u64, count: usize) -> Vec<Activity> {
        let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let mut next = move |bound: u64| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (state >> 33) % bound
        };
        (0..count)
            .map(|i| {
                let start = 7 * 60 + next(10 * 4) as i32 * 15;
                let length = 15 + next(12) as i32 * 15;
                Activity::new(
                    format!("a{i}"),
                    "x",
                    Day::Monday,
                    ClockTime::from_minutes(start).expect("start"),
                    ClockTime::from_minutes(start + length).expect("end"),
                )
            })
            .collect()
    }

    #[test]
    fn empty_input_gives_empty_layout() {
        assert!(group_overlapping(&[]).is_empty());
        assert!(assign_columns(&[]).is_empty());
        let layout = layout_day(&[], &GridGeometry::default());
        assert!(layout.placed.is_empty());
        assert_eq!(layout.max_columns(), 0);
    }

    #[test]
    fn overlapping_pair_shares_a_group_in_two_columns() {
        let day = vec![act("a", "09:00", "10:00"), act("b", "09:30", "10:30")];
        let groups = group_overlapping(&day);
        assert_eq!(groups.len(), 1);
        assert_eq!(ids(&groups[0]), vec!["a", "b"]);

        let columns = assign_columns(&groups[0]);
        assert_eq!(columns["a"], ColumnAssignment { column_index: 0, column_count: 2 });
        assert_eq!(columns["b"], ColumnAssignment { column_index: 1, column_count: 2 });
    }

    #[test]
    fn touching_endpoints_stay_in_separate_groups() {
        let day = vec![act("d", "10:00", "11:00"), act("a", "09:00", "10:00")];
        let groups = group_overlapping(&day);
        assert_eq!(groups.len(), 2);
        assert_eq!(ids(&groups[0]), vec!["a"]);
        assert_eq!(ids(&groups[1]), vec!["d"]);
        for group in &groups {
            assert_eq!(assign_columns(group).values().next().map(|c| c.column_count), Some(1));
        }
    }

    #[test]
    fn grouping_is_transitive() {
        // a-b and b-c overlap, a-c do not; c is listed first on purpose.
        let day = vec![
            act("c", "10:30", "11:30"),
            act("a", "09:00", "10:00"),
            act("b", "09:45", "10:45"),
        ];
        let groups = group_overlapping(&day);
        assert_eq!(groups.len(), 1);
        assert_eq!(ids(&groups[0]), vec!["a", "b", "c"]);

        // a and c can share the first column.
        let columns = assign_columns(&groups[0]);
        assert_eq!(columns["a"].column_index, 0);
        assert_eq!(columns["b"].column_index, 1);
        assert_eq!(columns["c"].column_index, 0);
        assert_eq!(columns["c"].column_count, 2);
    }

    #[test]
    fn bridge_found_late_still_joins_groups() {
        // The bridge starts earliest but is the shortest; chaining must not
        // depend on scan order.
        let day = vec![
            act("late", "11:00", "12:00"),
            act("early", "08:00", "09:00"),
            act("bridge", "08:30", "11:30"),
        ];
        assert_eq!(group_overlapping(&day).len(), 1);
    }

    #[test]
    fn equal_starts_put_longer_activity_first() {
        let day = vec![act("short", "09:00", "09:30"), act("long", "09:00", "11:00")];
        let groups = group_overlapping(&day);
        assert_eq!(ids(&groups[0]), vec!["long", "short"]);
        let columns = assign_columns(&groups[0]);
        assert_eq!(columns["long"].column_index, 0);
    }

    #[test]
    fn degenerate_activities_become_singletons() {
        let day = vec![act("outer", "08:00", "12:00"), act("zero", "10:00", "10:00")];
        let groups = group_overlapping(&day);
        assert_eq!(groups.len(), 2);
        let layout = layout_day(&day, &GridGeometry::default());
        let zero = layout
            .placed
            .iter()
            .find(|p| p.activity.id == "zero")
            .expect("placed");
        assert_eq!(zero.position.height, 0.0);
        assert_eq!(zero.column.column_count, 1);
    }

    #[test]
    fn layout_derives_geometry_from_columns() {
        let day = vec![
            act("a", "09:00", "10:00"),
            act("b", "09:00", "10:00"),
            act("c", "09:00", "10:00"),
            act("d", "09:15", "09:45"),
        ];
        let layout = layout_day(&day, &GridGeometry::default());
        assert_eq!(layout.max_columns(), 4);
        assert!(layout.is_crowded());
        let d = layout
            .placed
            .iter()
            .find(|p| p.activity.id == "d")
            .expect("placed");
        assert_eq!(d.column.column_index, 3);
        assert_eq!(d.left, 0.75);
        assert_eq!(d.width, 0.25);
        assert_eq!(d.position.top, 135.0);
        assert_eq!(d.position.height, 30.0);
    }

    #[test]
    fn partition_no_collision_and_clique_bound_hold() {
        for seed in 0..200 {
            let day = pseudo_random_day(seed, 1 + (seed as usize % 14));
            let groups = group_overlapping(&day);

            let mut seen = BTreeSet::new();
            for group in &groups {
                assert!(!group.is_empty());
                for a in group {
                    assert!(seen.insert(a.id.clone()), "seed {seed}: {} twice", a.id);
                }
            }
            assert_eq!(seen.len(), day.len(), "seed {seed}: partition lost items");

            for (gi, group) in groups.iter().enumerate() {
                for other in &groups[gi + 1..] {
                    for a in group {
                        assert!(other.iter().all(|b| !a.overlaps(b)), "seed {seed}");
                    }
                }

                let columns = assign_columns(group);
                for a in group {
                    for b in group {
                        if a.id != b.id && a.overlaps(b) {
                            assert_ne!(
                                columns[&a.id].column_index, columns[&b.id].column_index,
                                "seed {seed}: {} and {} collide",
                                a.id, b.id
                            );
                        }
                    }
                }

                let clique = group
                    .iter()
                    .map(|probe| {
                        group
                            .iter()
                            .filter(|a| a.span().contains(probe.start_time))
                            .count()
                    })
                    .max()
                    .unwrap_or(0);
                let count = columns.values().map(|c| c.column_count).max().unwrap_or(0);
                assert!(count >= clique, "seed {seed}: {count} < {clique}");
            }
        }
    }

    #[test]
    fn free_slots_respect_window_and_minimum() {
        let day = vec![
            act("a", "08:00", "09:00"),
            act("b", "08:30", "10:00"),
            act("c", "10:20", "11:00"),
            act("late", "19:00", "20:00"),
        ];
        let window = TimeSpan::new(t("07:00"), t("18:00"));
        let slots = free_slots(&day, window, 30);
        assert_eq!(
            slots,
            vec![
                FreeSlot { start_time: t("07:00"), end_time: t("08:00"), duration: 60 },
                FreeSlot { start_time: t("11:00"), end_time: t("18:00"), duration: 420 },
            ]
        );
        assert_eq!(free_slots(&[], window, 30).len(), 1);
    }
}
