mod modifiers;

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Datelike, Utc};
use tracing::{debug, info, instrument, warn};

use crate::cli::Invocation;
use crate::config::Config;
use crate::conflict::find_conflicts;
use crate::datastore::DataStore;
use crate::datetime::{current_week, project_today};
use crate::layout::{GridGeometry, free_slots, layout_day};
use crate::model::{Day, MemberKind};
use crate::render::Renderer;
use crate::schedule::{ActivityDraft, EditScope, MemberPatch, Schedule, TypePatch};
use crate::stats::week_statistics;
use crate::time::{ClockTime, TimeSpan};
use crate::transfer::{ScheduleExport, parse_import};
use crate::week::WeekRef;

use self::modifiers::{Mod, ParsedArgs, activity_patch, parse_args};

const MEMBER_PALETTE: [&str; 8] = [
    "#3b82f6", "#10b981", "#f59e0b", "#8b5cf6", "#ef4444", "#06b6d4", "#f97316", "#84cc16",
];
const DEFAULT_TYPE_COLOR: &str = "#94a3b8";

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "week",
        "day",
        "add",
        "modify",
        "delete",
        "copy",
        "members",
        "member",
        "types",
        "type",
        "stats",
        "conflicts",
        "free",
        "export",
        "import",
        "show",
        "help",
        "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(store, cfg, renderer, inv))]
pub fn dispatch(
    store: &DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    inv: Invocation,
) -> anyhow::Result<()> {
    let now = Utc::now();
    let command = inv.command.as_str();
    let args = parse_args(&inv.args, now)?;

    debug!(command, args = ?inv.args, "dispatching command");

    match command {
        "help" => return cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        "show" => return cmd_show(cfg),
        _ => {}
    }

    let mut schedule = store.load()?;
    let changed = match command {
        "week" => cmd_week(&schedule, cfg, renderer, &args, now)?,
        "day" => cmd_day(&schedule, cfg, renderer, &args, now)?,
        "add" => cmd_add(&mut schedule, &args, now)?,
        "modify" => cmd_modify(&mut schedule, &args)?,
        "delete" => cmd_delete(&mut schedule, &args)?,
        "copy" => cmd_copy(&mut schedule, &args, now)?,
        "members" => {
            renderer.print_members(&schedule.family_members)?;
            false
        }
        "member" => cmd_member(&mut schedule, &args)?,
        "types" => {
            renderer.print_types(&schedule.activity_types)?;
            false
        }
        "type" => cmd_type(&mut schedule, &args)?,
        "stats" => cmd_stats(&schedule, renderer, &args, now)?,
        "conflicts" => cmd_conflicts(&schedule, renderer, &args, now)?,
        "free" => cmd_free(&schedule, cfg, renderer, &args, now)?,
        "export" => cmd_export(&schedule, &args, now)?,
        "import" => cmd_import(&mut schedule, &args)?,
        other => return Err(anyhow!("unknown command: {other}")),
    };

    if changed {
        store.save(&schedule, now)?;
    }
    Ok(())
}

/// `week:N` / `year:Y` with the current week filling in what is missing.
fn selected_week(args: &ParsedArgs, now: DateTime<Utc>) -> anyhow::Result<WeekRef> {
    let current = current_week(now);
    let week = args.week().unwrap_or(current.week);
    let year = args.year().unwrap_or(current.year);
    Ok(WeekRef::new(week, year)?)
}

fn selected_day(args: &ParsedArgs, command: &str) -> anyhow::Result<Day> {
    let token = args
        .words
        .first()
        .ok_or_else(|| anyhow!("{command} requires a weekday"))?;
    token.parse()
}

fn single_id<'a>(args: &'a ParsedArgs, command: &str) -> anyhow::Result<&'a str> {
    match args.words.as_slice() {
        [id] => Ok(id.as_str()),
        [] => Err(anyhow!("{command} requires an id")),
        _ => Err(anyhow!("{command} takes exactly one id")),
    }
}

fn scope_of(args: &ParsedArgs) -> EditScope {
    if args.all {
        EditScope::Series
    } else {
        EditScope::Single
    }
}

/// The grid window as a clock span. `24:00` is not a clock time, so a
/// grid ending at midnight stops at 23:59.
fn grid_window(grid: &GridGeometry) -> anyhow::Result<TimeSpan> {
    let start = ClockTime::from_hm(grid.start_hour, 0)?;
    let end = if grid.end_hour >= 24 {
        ClockTime::from_hm(23, 59)?
    } else {
        ClockTime::from_hm(grid.end_hour, 0)?
    };
    Ok(TimeSpan::new(start, end))
}

#[instrument(skip(schedule, cfg, renderer, args, now))]
fn cmd_week(
    schedule: &Schedule,
    cfg: &Config,
    renderer: &mut Renderer,
    args: &ParsedArgs,
    now: DateTime<Utc>,
) -> anyhow::Result<bool> {
    info!("command week");
    let week = selected_week(args, now)?;
    let activities = schedule.activities_for_week(week);
    renderer.print_week(schedule, week, &activities, &cfg.grid()?)?;
    Ok(false)
}

#[instrument(skip(schedule, cfg, renderer, args, now))]
fn cmd_day(
    schedule: &Schedule,
    cfg: &Config,
    renderer: &mut Renderer,
    args: &ParsedArgs,
    now: DateTime<Utc>,
) -> anyhow::Result<bool> {
    info!("command day");
    let day = selected_day(args, "day")?;
    let week = selected_week(args, now)?;
    let activities = schedule.activities_for_day(week, day);
    let layout = layout_day(&activities, &cfg.grid()?);
    renderer.print_day(schedule, week, day, &layout)?;
    Ok(false)
}

#[instrument(skip(schedule, args, now))]
fn cmd_add(schedule: &mut Schedule, args: &ParsedArgs, now: DateTime<Utc>) -> anyhow::Result<bool> {
    info!("command add");

    let draft = build_draft(schedule, args, now)?;
    let created = schedule.add_activities(&draft, project_today(now), now)?;

    if let [only] = created.as_slice() {
        println!("Created activity {}.", only.id);
    } else if let Some(group) = created.first().and_then(|a| a.recurring_group_id.as_deref()) {
        println!("Created {} activities in series {group}.", created.len());
    } else {
        println!("Created {} activities.", created.len());
    }
    Ok(true)
}

fn build_draft(schedule: &Schedule, args: &ParsedArgs, now: DateTime<Utc>) -> anyhow::Result<ActivityDraft> {
    let name = args.text();
    if name.is_empty() {
        return Err(anyhow!("add: activity name is required"));
    }

    let mut start = None;
    let mut end = None;
    let mut days = Vec::new();
    let mut participants = Default::default();
    let mut activity_type = None;
    let mut location = None;
    let mut notes = None;
    let mut until = None;

    for one_mod in &args.mods {
        match one_mod {
            Mod::Start(time) => start = Some(*time),
            Mod::End(time) => end = Some(*time),
            Mod::Days(list) => days = list.clone(),
            Mod::With(ids) => participants = ids.clone(),
            Mod::Type(kind) => activity_type = Some(kind.clone()),
            Mod::Location(text) => location = Some(text.clone()),
            Mod::Notes(text) => notes = Some(text.clone()),
            Mod::Until(date) => until = Some(*date),
            Mod::Week(_) | Mod::Year(_) => {}
            other => warn!(modifier = ?other, "modifier does not apply to add; ignored"),
        }
    }

    let start = start.ok_or_else(|| anyhow!("add: start:HH:MM is required"))?;
    let end = end.ok_or_else(|| anyhow!("add: end:HH:MM is required"))?;

    let mut draft = ActivityDraft::new(name, start, end);
    draft.days = days;
    draft.participants = participants;
    draft.activity_type = activity_type;
    draft.location = location;
    draft.notes = notes;
    draft.recurring_until = until;
    if args.week().is_some() || args.year().is_some() {
        draft.week = Some(selected_week(args, now)?);
    }

    for id in &draft.participants {
        if schedule.member(id).is_none() {
            warn!(member = %id, "participant is not a known family member");
        }
    }
    if let Some(kind) = draft.activity_type.as_deref()
        && schedule.activity_type(kind).is_none()
    {
        warn!(activity_type = %kind, "unknown activity type");
    }

    Ok(draft)
}

#[instrument(skip(schedule, args))]
fn cmd_modify(schedule: &mut Schedule, args: &ParsedArgs) -> anyhow::Result<bool> {
    info!("command modify");

    let id = single_id(args, "modify")?;
    let patch = activity_patch(&args.mods)?;
    if patch.is_empty() {
        return Err(anyhow!("modify: nothing to change"));
    }

    let changed = schedule.update_activity(id, &patch, scope_of(args))?;
    println!("Modified {changed} activit{}.", if changed == 1 { "y" } else { "ies" });
    Ok(changed > 0)
}

#[instrument(skip(schedule, args))]
fn cmd_delete(schedule: &mut Schedule, args: &ParsedArgs) -> anyhow::Result<bool> {
    info!("command delete");

    let id = single_id(args, "delete")?;
    let removed = schedule.delete_activity(id, scope_of(args))?;
    println!("Deleted {removed} activit{}.", if removed == 1 { "y" } else { "ies" });
    Ok(removed > 0)
}

#[instrument(skip(schedule, args, now))]
fn cmd_copy(schedule: &mut Schedule, args: &ParsedArgs, now: DateTime<Utc>) -> anyhow::Result<bool> {
    info!("command copy");

    let [from, to] = args.words.as_slice() else {
        return Err(anyhow!("copy requires <from-week> <to-week>"));
    };
    let from: u32 = from
        .parse()
        .with_context(|| format!("invalid week number: {from}"))?;
    let to: u32 = to
        .parse()
        .with_context(|| format!("invalid week number: {to}"))?;

    let year = args.year().unwrap_or_else(|| current_week(now).year);
    let to_year = args.to_year().unwrap_or(year);
    let from = WeekRef::new(from, year)?;
    let to = WeekRef::new(to, to_year)?;
    if from == to {
        return Err(anyhow!("copy: source and target week are the same"));
    }

    let copies = schedule.copy_week(from, to, now);
    println!("Copied {} activities from {from} to {to}.", copies.len());
    Ok(!copies.is_empty())
}

#[instrument(skip(schedule, args))]
fn cmd_member(schedule: &mut Schedule, args: &ParsedArgs) -> anyhow::Result<bool> {
    let Some((action, rest)) = args.words.split_first() else {
        return Err(anyhow!("member requires add, modify or delete"));
    };

    let mut kind = None;
    let mut color = None;
    let mut icon = None;
    let mut name = None;
    for one_mod in &args.mods {
        match one_mod {
            Mod::Kind(value) => kind = Some(*value),
            Mod::Color(value) => color = Some(value.clone()),
            Mod::Icon(value) => icon = Some(value.clone()),
            Mod::Name(value) => name = Some(value.clone()),
            other => warn!(modifier = ?other, "modifier does not apply to members; ignored"),
        }
    }

    match action.as_str() {
        "add" => {
            let name = name.unwrap_or_else(|| rest.join(" "));
            if name.is_empty() {
                return Err(anyhow!("member add: name is required"));
            }
            let color = color.unwrap_or_else(|| {
                MEMBER_PALETTE[schedule.family_members.len() % MEMBER_PALETTE.len()].to_string()
            });
            let member = schedule.add_member(name, kind.unwrap_or(MemberKind::Child), color, icon);
            println!("Created family member {} ({}).", member.name, member.id);
        }
        "modify" => {
            let [id] = rest else {
                return Err(anyhow!("member modify requires an id"));
            };
            let patch = MemberPatch {
                name,
                color,
                icon,
                kind,
            };
            schedule.update_member(id, &patch)?;
            println!("Modified family member {id}.");
        }
        "delete" => {
            let [id] = rest else {
                return Err(anyhow!("member delete requires an id"));
            };
            let removal = schedule.delete_member(id)?;
            println!(
                "Deleted family member {id}; detached from {} activities, removed {} left without participants.",
                removal.detached, removal.dropped_activities
            );
        }
        other => return Err(anyhow!("unknown member action: {other}")),
    }
    Ok(true)
}

#[instrument(skip(schedule, args))]
fn cmd_type(schedule: &mut Schedule, args: &ParsedArgs) -> anyhow::Result<bool> {
    let Some((action, rest)) = args.words.split_first() else {
        return Err(anyhow!("type requires add, modify or delete"));
    };

    let mut color = None;
    let mut icon = None;
    let mut name = None;
    for one_mod in &args.mods {
        match one_mod {
            Mod::Color(value) => color = Some(value.clone()),
            Mod::Icon(value) => icon = Some(value.clone()),
            Mod::Name(value) => name = Some(value.clone()),
            other => warn!(modifier = ?other, "modifier does not apply to activity types; ignored"),
        }
    }

    match action.as_str() {
        "add" => {
            let name = name.unwrap_or_else(|| rest.join(" "));
            if name.is_empty() {
                return Err(anyhow!("type add: name is required"));
            }
            let kind = schedule.add_activity_type(
                name,
                color.unwrap_or_else(|| DEFAULT_TYPE_COLOR.to_string()),
                icon,
            );
            println!("Created activity type {} ({}).", kind.name, kind.id);
        }
        "modify" => {
            let [id] = rest else {
                return Err(anyhow!("type modify requires an id"));
            };
            schedule.update_activity_type(id, &TypePatch { name, color, icon })?;
            println!("Modified activity type {id}.");
        }
        "delete" => {
            let [id] = rest else {
                return Err(anyhow!("type delete requires an id"));
            };
            schedule.delete_activity_type(id)?;
            println!("Deleted activity type {id}.");
        }
        other => return Err(anyhow!("unknown type action: {other}")),
    }
    Ok(true)
}

#[instrument(skip(schedule, renderer, args, now))]
fn cmd_stats(
    schedule: &Schedule,
    renderer: &mut Renderer,
    args: &ParsedArgs,
    now: DateTime<Utc>,
) -> anyhow::Result<bool> {
    let week = selected_week(args, now)?;
    let activities = schedule.activities_for_week(week);
    let stats = week_statistics(&activities);
    renderer.print_stats(schedule, week, &stats)?;
    Ok(false)
}

#[instrument(skip(schedule, renderer, args, now))]
fn cmd_conflicts(
    schedule: &Schedule,
    renderer: &mut Renderer,
    args: &ParsedArgs,
    now: DateTime<Utc>,
) -> anyhow::Result<bool> {
    let week = selected_week(args, now)?;
    let activities = schedule.activities_for_week(week);
    let conflicts = find_conflicts(&activities);
    debug!(%week, count = conflicts.len(), "found conflicts");
    renderer.print_conflicts(schedule, &conflicts)?;
    Ok(false)
}

#[instrument(skip(schedule, cfg, renderer, args, now))]
fn cmd_free(
    schedule: &Schedule,
    cfg: &Config,
    renderer: &mut Renderer,
    args: &ParsedArgs,
    now: DateTime<Utc>,
) -> anyhow::Result<bool> {
    let day = selected_day(args, "free")?;
    let week = selected_week(args, now)?;
    let min_minutes = match args.min_minutes() {
        Some(min) => min,
        None => cfg.get_u16("free.min_minutes")?.unwrap_or(30),
    };

    let activities = schedule.activities_for_day(week, day);
    let slots = free_slots(&activities, grid_window(&cfg.grid()?)?, min_minutes);
    renderer.print_free_slots(day, &slots)?;
    Ok(false)
}

#[instrument(skip(schedule, args, now))]
fn cmd_export(schedule: &Schedule, args: &ParsedArgs, now: DateTime<Utc>) -> anyhow::Result<bool> {
    info!("command export");

    let week = selected_week(args, now)?;
    let export = ScheduleExport::for_week(schedule, week, now);
    let json = export.to_json()?;

    let Some(target) = args.file() else {
        println!("{json}");
        return Ok(false);
    };

    let path = if target.is_dir() {
        target.join(export.file_name())
    } else {
        target.clone()
    };
    fs::write(&path, format!("{json}\n"))
        .with_context(|| format!("failed writing {}", path.display()))?;
    println!(
        "Exported {} activities for week {week} to {}.",
        export.activities.len(),
        path.display()
    );
    Ok(false)
}

#[instrument(skip(schedule, args))]
fn cmd_import(schedule: &mut Schedule, args: &ParsedArgs) -> anyhow::Result<bool> {
    info!("command import");

    let raw = match args.words.as_slice() {
        [] => read_stdin()?,
        [source] if source == "-" => read_stdin()?,
        [source] => read_file(Path::new(source))?,
        _ => return Err(anyhow!("import takes one file (or - for stdin)")),
    };

    let summary = schedule.merge_import(parse_import(&raw)?);
    println!(
        "Imported {} activities, {} members, {} types ({} skipped as already present).",
        summary.activities_added,
        summary.members_added,
        summary.types_added,
        summary.activities_skipped + summary.members_skipped + summary.types_skipped
    );
    Ok(summary.added() > 0)
}

fn read_stdin() -> anyhow::Result<String> {
    let mut raw = String::new();
    io::stdin()
        .read_to_string(&mut raw)
        .context("failed reading stdin")?;
    Ok(raw)
}

fn read_file(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed reading {}", path.display()))
}

fn cmd_show(cfg: &Config) -> anyhow::Result<()> {
    let mut entries: Vec<_> = cfg.iter().collect();
    entries.sort();
    for (k, v) in entries {
        println!("{k}={v}");
    }
    for file in &cfg.loaded_files {
        println!("# loaded {}", file.display());
    }
    Ok(())
}

fn cmd_help() -> anyhow::Result<()> {
    let this_year = Utc::now().year();
    println!(
        "\
Usage: kinweek [-v|-q] [--rc KEY=VALUE] [--config PATH] [--data DIR] <command> [args]

  week [week:N] [year:Y]             week grid with columns and double-bookings
  day <weekday> [week:N] [year:Y]    one day's layout: groups, columns, positions
  add <name...> days:mon,wed start:HH:MM end:HH:MM with:ID[,ID]
      [type:ID] [week:N] [year:Y] [until:DATE] [location:..] [notes:..]
  modify <id> [name:..] [day:..] [start:..] [end:..] [with:..] [type:..] [--all]
  delete <id> [--all]                --all applies to the whole recurring series
  copy <from-week> <to-week> [year:Y] [to-year:Y]
  members | member add <name> [kind:child|adult|group] [color:..] [icon:..]
          | member modify <id> [..] | member delete <id>
  types   | type add <name> [color:..] [icon:..] | type modify <id> [..] | type delete <id>
  stats [week:N] [year:Y]
  conflicts [week:N] [year:Y]
  free <weekday> [week:N] [year:Y] [min:30]
  export [week:N] [year:Y] [file:PATH]
  import <PATH|->
  show | help | version

Dates for until: are YYYY-MM-DD, today, tomorrow, +Nd or +Nw (e.g. {this_year}-06-14).
Commands may be abbreviated to any unambiguous prefix."
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::model::Activity;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 6, 12, 0, 0)
            .single()
            .expect("valid now")
    }

    fn parsed(tokens: &[&str]) -> ParsedArgs {
        let raw: Vec<String> = tokens.iter().map(ToString::to_string).collect();
        parse_args(&raw, now()).expect("parse args")
    }

    #[test]
    fn abbreviations_resolve_only_when_unique() {
        let known = known_command_names();
        assert_eq!(expand_command_abbrev("we", &known), Some("week"));
        assert_eq!(expand_command_abbrev("type", &known), Some("type"));
        assert_eq!(expand_command_abbrev("typ", &known), None);
        assert_eq!(expand_command_abbrev("member", &known), Some("member"));
        assert_eq!(expand_command_abbrev("d", &known), None);
        assert_eq!(expand_command_abbrev("de", &known), Some("delete"));
        assert_eq!(expand_command_abbrev("zz", &known), None);
    }

    #[test]
    fn explicit_week_and_year_are_validated() {
        let week = selected_week(&parsed(&["week:53", "year:2020"]), now()).expect("week");
        assert_eq!(week, WeekRef { year: 2020, week: 53 });
        assert!(selected_week(&parsed(&["week:53", "year:2023"]), now()).is_err());
    }

    #[test]
    fn add_builds_a_recurring_draft() {
        let schedule = Schedule::with_defaults();
        let args = parsed(&[
            "Swimming",
            "days:tue,thu",
            "start:16:00",
            "end:17:00",
            "with:family",
            "type:sport",
            "week:10",
            "year:2024",
            "until:2024-03-22",
        ]);
        let draft = build_draft(&schedule, &args, now()).expect("draft");
        assert_eq!(draft.name, "Swimming");
        assert_eq!(draft.days, vec![Day::Tuesday, Day::Thursday]);
        assert_eq!(draft.week, Some(WeekRef { year: 2024, week: 10 }));

        let mut schedule = schedule;
        let created = schedule
            .add_activities(&draft, project_today(now()), now())
            .expect("add");
        // Weeks 10, 11 and 12, two days each.
        assert_eq!(created.len(), 6);
    }

    #[test]
    fn add_requires_name_and_times() {
        let schedule = Schedule::with_defaults();
        assert!(build_draft(&schedule, &parsed(&["start:08:00", "end:09:00"]), now()).is_err());
        assert!(build_draft(&schedule, &parsed(&["Gym", "end:09:00"]), now()).is_err());
    }

    #[test]
    fn member_delete_drops_orphaned_activities() {
        let mut schedule = Schedule::with_defaults();
        assert!(cmd_member(&mut schedule, &parsed(&["add", "Siv", "kind:child"])).expect("add"));
        let siv = schedule
            .family_members
            .iter()
            .find(|m| m.name == "Siv")
            .map(|m| m.id.clone())
            .expect("member");

        let t = |s: &str| s.parse::<ClockTime>().expect("time");
        schedule.activities.push(
            Activity::new("a1", "Ballet", Day::Monday, t("17:00"), t("18:00"))
                .with_participants([siv.as_str()]),
        );
        cmd_member(&mut schedule, &parsed(&["delete", siv.as_str()])).expect("delete");
        assert!(schedule.activities.is_empty());
        assert!(cmd_member(&mut schedule, &parsed(&["delete", "nobody"])).is_err());
    }

    #[test]
    fn grid_window_clamps_midnight() {
        let grid = GridGeometry {
            start_hour: 6,
            end_hour: 24,
            hour_height: 60.0,
        };
        let window = grid_window(&grid).expect("window");
        assert_eq!(window.start.to_string(), "06:00");
        assert_eq!(window.end.to_string(), "23:59");
    }
}
