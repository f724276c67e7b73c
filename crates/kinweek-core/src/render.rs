use std::collections::BTreeSet;
use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::conflict::{ConflictRecord, conflicting_ids, find_conflicts};
use crate::layout::{DayLayout, FreeSlot, GridGeometry, layout_day};
use crate::model::{Activity, ActivityType, Day, FamilyMember};
use crate::schedule::Schedule;
use crate::stats::WeekStatistics;
use crate::time::{format_duration, format_time_range};
use crate::week::{WeekRef, format_week_range};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    /// Five day sections, each listing its activities in layout order
    /// with their column slot. Double-bookings are marked with `!`.
    #[tracing::instrument(skip(self, schedule, activities, grid))]
    pub fn print_week(
        &mut self,
        schedule: &Schedule,
        week: WeekRef,
        activities: &[Activity],
        grid: &GridGeometry,
    ) -> anyhow::Result<()> {
        let out = io::stdout().lock();
        self.write_week(out, schedule, week, activities, grid)
    }

    fn write_week<W: Write>(
        &self,
        mut out: W,
        schedule: &Schedule,
        week: WeekRef,
        activities: &[Activity],
        grid: &GridGeometry,
    ) -> anyhow::Result<()> {
        let dates = week.dates()?;
        writeln!(
            out,
            "{}",
            self.paint(&format!("Week {} ({})", week, format_week_range(week)?), "1")
        )?;

        let conflicts = find_conflicts(activities);
        let flagged: BTreeSet<&str> = conflicting_ids(&conflicts).into_iter().collect();

        for day in Day::ALL {
            let todays: Vec<Activity> = activities
                .iter()
                .filter(|a| a.day == day)
                .cloned()
                .collect();
            let layout = layout_day(&todays, grid);

            writeln!(out)?;
            let mut heading = format!("{} {}", capitalize(day.name()), dates[day.index()].format("%-d/%-m"));
            if layout.is_crowded() {
                heading.push_str(" (crowded)");
            }
            writeln!(out, "{}", self.paint(&heading, "36"))?;

            if layout.placed.is_empty() {
                writeln!(out, "  -")?;
                continue;
            }

            let headers = ["", "Time", "Activity", "Who", "Col"]
                .map(String::from)
                .to_vec();
            let rows = layout
                .placed
                .iter()
                .map(|placed| {
                    let activity = placed.activity;
                    let mark = if flagged.contains(activity.id.as_str()) {
                        self.paint("!", "31")
                    } else {
                        String::new()
                    };
                    vec![
                        mark,
                        format_time_range(activity.start_time, activity.end_time),
                        activity_label(schedule, activity),
                        participant_names(schedule, activity),
                        format!(
                            "{}/{}",
                            placed.column.column_index + 1,
                            placed.column.column_count
                        ),
                    ]
                })
                .collect();
            write_table(&mut out, headers, rows)?;
        }

        if !conflicts.is_empty() {
            writeln!(out)?;
            writeln!(
                out,
                "{}",
                self.paint(
                    &format!("{} double-booking(s); see `kinweek conflicts`", conflicts.len()),
                    "31"
                )
            )?;
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, schedule, layout))]
    pub fn print_day(
        &mut self,
        schedule: &Schedule,
        week: WeekRef,
        day: Day,
        layout: &DayLayout<'_>,
    ) -> anyhow::Result<()> {
        let out = io::stdout().lock();
        self.write_day(out, schedule, week, day, layout)
    }

    fn write_day<W: Write>(
        &self,
        mut out: W,
        schedule: &Schedule,
        week: WeekRef,
        day: Day,
        layout: &DayLayout<'_>,
    ) -> anyhow::Result<()> {
        let date = week.date_of(day.to_chrono())?;
        writeln!(
            out,
            "{}",
            self.paint(&format!("{} {} (week {})", capitalize(day.name()), date, week), "1")
        )?;

        if layout.placed.is_empty() {
            writeln!(out, "No activities.")?;
            return Ok(());
        }

        let headers = ["ID", "Time", "Activity", "Group", "Col", "Top", "Height", "Left", "Width"]
            .map(String::from)
            .to_vec();
        let rows = layout
            .placed
            .iter()
            .map(|placed| {
                vec![
                    self.paint(&placed.activity.id, "33"),
                    format_time_range(placed.activity.start_time, placed.activity.end_time),
                    activity_label(schedule, placed.activity),
                    placed.group.to_string(),
                    format!("{}/{}", placed.column.column_index + 1, placed.column.column_count),
                    format!("{:.0}", placed.position.top),
                    format!("{:.0}", placed.position.height),
                    format!("{:.0}%", placed.left * 100.0),
                    format!("{:.0}%", placed.width * 100.0),
                ]
            })
            .collect();
        write_table(&mut out, headers, rows)?;

        if layout.is_crowded() {
            writeln!(out, "{}", self.paint("crowded: more than three activities overlap", "33"))?;
        }
        Ok(())
    }

    pub fn print_members(&mut self, members: &[FamilyMember]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let headers = ["ID", "Name", "Kind", "Color"].map(String::from).to_vec();
        let rows = members
            .iter()
            .map(|m| {
                vec![
                    self.paint(&m.id, "33"),
                    with_icon(m.icon.as_deref(), &m.name),
                    m.kind.to_string(),
                    m.color.clone(),
                ]
            })
            .collect();
        write_table(&mut out, headers, rows)
    }

    pub fn print_types(&mut self, types: &[ActivityType]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let headers = ["ID", "Name", "Color"].map(String::from).to_vec();
        let rows = types
            .iter()
            .map(|t| {
                vec![
                    self.paint(&t.id, "33"),
                    with_icon(t.icon.as_deref(), &t.name),
                    t.color.clone(),
                ]
            })
            .collect();
        write_table(&mut out, headers, rows)
    }

    #[tracing::instrument(skip(self, schedule, stats))]
    pub fn print_stats(
        &mut self,
        schedule: &Schedule,
        week: WeekRef,
        stats: &WeekStatistics<'_>,
    ) -> anyhow::Result<()> {
        let out = io::stdout().lock();
        self.write_stats(out, schedule, week, stats)
    }

    fn write_stats<W: Write>(
        &self,
        mut out: W,
        schedule: &Schedule,
        week: WeekRef,
        stats: &WeekStatistics<'_>,
    ) -> anyhow::Result<()> {
        writeln!(out, "{}", self.paint(&format!("Week {week}"), "1"))?;
        writeln!(out, "activities  {}", stats.total_activities)?;
        writeln!(out, "scheduled   {}", format_duration(stats.total_minutes))?;
        writeln!(out, "conflicts   {}", stats.conflicts.len())?;

        writeln!(out)?;
        let rows = stats
            .by_member
            .iter()
            .map(|(id, load)| {
                vec![
                    member_name(schedule, id),
                    load.count.to_string(),
                    format_duration(load.minutes),
                ]
            })
            .collect();
        write_table(
            &mut out,
            ["Member", "Count", "Time"].map(String::from).to_vec(),
            rows,
        )?;

        writeln!(out)?;
        let rows = stats
            .by_type
            .iter()
            .map(|(id, count)| {
                let name = schedule
                    .activity_type(id)
                    .map(|t| with_icon(t.icon.as_deref(), &t.name))
                    .unwrap_or_else(|| id.clone());
                vec![name, count.to_string()]
            })
            .collect();
        write_table(&mut out, ["Type", "Count"].map(String::from).to_vec(), rows)?;

        writeln!(out)?;
        let rows = Day::ALL
            .iter()
            .map(|day| {
                vec![
                    capitalize(day.name()),
                    stats.by_day.get(day).copied().unwrap_or(0).to_string(),
                ]
            })
            .collect();
        write_table(&mut out, ["Day", "Count"].map(String::from).to_vec(), rows)
    }

    pub fn print_conflicts(
        &mut self,
        schedule: &Schedule,
        conflicts: &[ConflictRecord<'_>],
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        if conflicts.is_empty() {
            writeln!(out, "No double-bookings.")?;
            return Ok(());
        }

        let headers = ["Day", "First", "Second", "Shared"].map(String::from).to_vec();
        let rows = conflicts
            .iter()
            .map(|c| {
                vec![
                    capitalize(c.day.name()),
                    conflict_side(c.first),
                    conflict_side(c.second),
                    self.paint(
                        &c.shared_participants
                            .iter()
                            .map(|id| member_name(schedule, id))
                            .collect::<Vec<_>>()
                            .join(", "),
                        "31",
                    ),
                ]
            })
            .collect();
        write_table(&mut out, headers, rows)
    }

    pub fn print_free_slots(&mut self, day: Day, slots: &[FreeSlot]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        if slots.is_empty() {
            writeln!(out, "No free time on {day}.")?;
            return Ok(());
        }
        let rows = slots
            .iter()
            .map(|slot| {
                vec![
                    format_time_range(slot.start_time, slot.end_time),
                    format_duration(u32::from(slot.duration)),
                ]
            })
            .collect();
        write_table(&mut out, ["Free", "Length"].map(String::from).to_vec(), rows)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn activity_label(schedule: &Schedule, activity: &Activity) -> String {
    let icon = activity
        .activity_type
        .as_deref()
        .and_then(|id| schedule.activity_type(id))
        .and_then(|t| t.icon.as_deref());
    let mut label = with_icon(icon, &activity.name);
    if activity.recurring {
        label.push_str(" ↻");
    }
    if let Some(location) = activity.location.as_deref().filter(|l| !l.is_empty()) {
        label.push_str(&format!(" @ {location}"));
    }
    label
}

fn participant_names(schedule: &Schedule, activity: &Activity) -> String {
    activity
        .participants
        .iter()
        .map(|id| member_name(schedule, id))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Unknown ids are shown as-is.
fn member_name(schedule: &Schedule, id: &str) -> String {
    schedule
        .member(id)
        .map(|m| with_icon(m.icon.as_deref(), &m.name))
        .unwrap_or_else(|| id.to_string())
}

fn conflict_side(activity: &Activity) -> String {
    format!(
        "{} {} [{}]",
        format_time_range(activity.start_time, activity.end_time),
        activity.name,
        activity.id
    )
}

fn with_icon(icon: Option<&str>, name: &str) -> String {
    match icon {
        Some(icon) if !icon.is_empty() => format!("{icon} {name}"),
        _ => name.to_string(),
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for (header, width) in headers.iter().zip(&widths) {
        let padding = width.saturating_sub(UnicodeWidthStr::width(header.as_str()));
        write!(writer, "{}{} ", header, " ".repeat(padding))?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (cell, width) in row.iter().zip(&widths) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = width.saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::week_statistics;
    use crate::time::ClockTime;

    fn t(s: &str) -> ClockTime {
        s.parse().expect("valid time")
    }

    fn plain() -> Renderer {
        Renderer { color: false }
    }

    fn render<F>(f: F) -> String
    where
        F: FnOnce(&mut Vec<u8>) -> anyhow::Result<()>,
    {
        let mut buf = Vec::new();
        f(&mut buf).expect("render");
        String::from_utf8(buf).expect("utf8")
    }

    #[test]
    fn table_pads_by_display_width() {
        let text = render(|buf| {
            write_table(
                buf,
                vec!["Name".to_string(), "N".to_string()],
                vec![
                    vec!["⚽ Football".to_string(), "1".to_string()],
                    vec!["\x1b[31mPiano\x1b[0m".to_string(), "22".to_string()],
                ],
            )
        });
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Name        N  ");
        assert_eq!(lines[1], "----------- -- ");
        assert_eq!(lines[2], "⚽ Football 1  ");
        assert_eq!(strip_ansi(lines[3]), "Piano       22 ");
    }

    #[test]
    fn week_view_marks_conflicts_and_columns() {
        let week = WeekRef { year: 2024, week: 10 };
        let mut schedule = Schedule::with_defaults();
        schedule.activities = vec![
            Activity::new("a", "Swim", Day::Monday, t("15:00"), t("16:00"))
                .with_participants(["family"])
                .in_week(week),
            Activity::new("b", "Piano", Day::Monday, t("15:30"), t("16:30"))
                .with_participants(["family"])
                .in_week(week),
        ];
        let activities = schedule.activities_for_week(week);

        let text = render(|buf| {
            plain().write_week(buf, &schedule, week, &activities, &GridGeometry::default())
        });
        assert!(text.starts_with("Week 2024-W10 (4-8 March)"));
        assert!(text.contains("Monday 4/3"));
        assert!(text.contains("1/2"));
        assert!(text.contains("2/2"));
        assert!(text.contains("1 double-booking(s)"));
        assert_eq!(text.matches("\n  -\n").count(), 4);
    }

    #[test]
    fn day_view_reports_geometry() {
        let week = WeekRef { year: 2024, week: 10 };
        let schedule = Schedule::with_defaults();
        let todays = vec![
            Activity::new("a", "Swim", Day::Friday, t("08:00"), t("09:30")),
        ];
        let layout = layout_day(&todays, &GridGeometry::default());

        let text = render(|buf| plain().write_day(buf, &schedule, week, Day::Friday, &layout));
        assert!(text.contains("Friday 2024-03-08"));
        let row = text.lines().nth(3).expect("row");
        assert!(row.contains("08:00 - 09:30"));
        assert!(row.contains(" 60 "));
        assert!(row.contains(" 90 "));
        assert!(row.contains("100%"));
    }

    #[test]
    fn stats_resolve_member_and_type_names() {
        let week = WeekRef { year: 2024, week: 10 };
        let schedule = Schedule::with_defaults();
        let mut swim = Activity::new("a", "Swim", Day::Monday, t("15:00"), t("16:00"))
            .with_participants(["family", "ghost"]);
        swim.activity_type = Some("sport".to_string());
        let activities = vec![swim];
        let stats = week_statistics(&activities);

        let text = render(|buf| plain().write_stats(buf, &schedule, week, &stats));
        assert!(text.contains("Whole family"));
        assert!(text.contains("ghost"));
        assert!(text.contains("⚽ Sport"));
        assert!(text.contains("scheduled   1 h"));
    }
}
