use chrono::{NaiveDate, TimeZone, Utc};
use kinweek_core::conflict::find_conflicts;
use kinweek_core::datastore::DataStore;
use kinweek_core::layout::{GridGeometry, group_overlapping, layout_day};
use kinweek_core::model::{Activity, Day};
use kinweek_core::schedule::{ActivityDraft, EditScope, Schedule};
use kinweek_core::time::ClockTime;
use kinweek_core::transfer::{ScheduleExport, parse_import};
use kinweek_core::week::WeekRef;
use tempfile::tempdir;

fn t(s: &str) -> ClockTime {
    s.parse().expect("valid time")
}

#[test]
fn recurring_series_survives_store_roundtrip() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    let now = Utc
        .with_ymd_and_hms(2024, 3, 4, 7, 0, 0)
        .single()
        .expect("valid now");
    let today = NaiveDate::from_ymd_opt(2024, 3, 4).expect("valid date");

    let mut schedule = store.load().expect("load defaults");
    let mut draft = ActivityDraft::new("Football", t("16:00"), t("17:30"));
    draft.days = vec![Day::Tuesday, Day::Thursday];
    draft.participants = ["family".to_string()].into();
    draft.activity_type = Some("sport".to_string());
    draft.recurring_until = NaiveDate::from_ymd_opt(2024, 3, 28);
    let created = schedule
        .add_activities(&draft, today, now)
        .expect("add series");
    assert_eq!(created.len(), 8);

    store.save(&schedule, now).expect("save");
    let reloaded = store.load().expect("reload");
    assert_eq!(reloaded.activities, schedule.activities);

    let week = WeekRef::new(11, 2024).expect("week");
    let visible = reloaded.activities_for_week(week);
    assert_eq!(visible.len(), 2);
    assert!(visible.iter().all(|a| a.recurring_group_id == created[0].recurring_group_id));

    let mut edited = reloaded;
    let changed = edited
        .delete_activity(&visible[0].id, EditScope::Series)
        .expect("delete series");
    assert_eq!(changed, 8);
    assert!(edited.activities.is_empty());
}

#[test]
fn layout_and_conflicts_for_one_busy_afternoon() {
    let week = WeekRef::new(10, 2024).expect("week");
    let mut schedule = Schedule::with_defaults();
    schedule.activities = vec![
        Activity::new("swim", "Swim", Day::Wednesday, t("15:00"), t("16:00"))
            .with_participants(["alice"])
            .in_week(week),
        Activity::new("piano", "Piano", Day::Wednesday, t("15:30"), t("16:30"))
            .with_participants(["alice", "bob"])
            .in_week(week),
        Activity::new("dinner", "Dinner", Day::Wednesday, t("16:30"), t("17:30"))
            .with_participants(["bob"])
            .in_week(week),
        Activity::new("elsewhere", "Other week", Day::Wednesday, t("15:00"), t("16:00"))
            .with_participants(["alice"])
            .in_week(WeekRef::new(11, 2024).expect("week")),
    ];

    let wednesday = schedule.activities_for_day(week, Day::Wednesday);
    assert_eq!(wednesday.len(), 3);

    let groups = group_overlapping(&wednesday);
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].len(), 2);
    assert_eq!(groups[1].len(), 1);

    let layout = layout_day(&wednesday, &GridGeometry::default());
    let dinner = layout
        .placed
        .iter()
        .find(|p| p.activity.id == "dinner")
        .expect("dinner placed");
    assert_eq!(dinner.column.column_count, 1);
    assert_eq!(dinner.position.top, 570.0);

    let conflicts = find_conflicts(&wednesday);
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].shared_participants, vec!["alice".to_string()]);
}

#[test]
fn exported_week_imports_into_empty_store() {
    let now = Utc
        .with_ymd_and_hms(2024, 3, 6, 9, 0, 0)
        .single()
        .expect("valid now");
    let week = WeekRef::new(10, 2024).expect("week");

    let mut source = Schedule::with_defaults();
    let member = source.add_member("Siv", Default::default(), "#10b981", None);
    source.activities.push(
        Activity::new("a1", "Ballet", Day::Monday, t("17:00"), t("18:00"))
            .with_participants([member.id.as_str()])
            .in_week(week),
    );
    let json = ScheduleExport::for_week(&source, week, now)
        .to_json()
        .expect("export");

    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    let mut target = store.load().expect("load defaults");
    let summary = target.merge_import(parse_import(&json).expect("parse"));
    assert_eq!(summary.activities_added, 1);
    assert_eq!(summary.members_added, 1);
    assert_eq!(summary.members_skipped, 1);
    store.save(&target, now).expect("save");

    let again = store.load().expect("reload");
    let second = again.clone().merge_import(parse_import(&json).expect("parse"));
    assert_eq!(second.added(), 0);
    assert!(again.member(&member.id).is_some());
}
