use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{Context, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{instrument, warn};

use crate::datetime::parse_date_expr;
use crate::model::{Day, MemberId, MemberKind};
use crate::schedule::ActivityPatch;
use crate::time::ClockTime;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Mod {
    Name(String),
    Days(Vec<Day>),
    Start(ClockTime),
    End(ClockTime),
    With(BTreeSet<MemberId>),
    Type(String),
    Week(u32),
    Year(i32),
    ToYear(i32),
    Until(NaiveDate),
    Location(String),
    Notes(String),
    Kind(MemberKind),
    Color(String),
    Icon(String),
    MinMinutes(u16),
    File(PathBuf),
}

/// Words, `key:value` modifiers and the `--all` flag of one command line.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ParsedArgs {
    pub words: Vec<String>,
    pub mods: Vec<Mod>,
    pub all: bool,
}

impl ParsedArgs {
    pub fn text(&self) -> String {
        self.words.join(" ")
    }

    pub fn week(&self) -> Option<u32> {
        self.mods.iter().find_map(|m| match m {
            Mod::Week(week) => Some(*week),
            _ => None,
        })
    }

    pub fn year(&self) -> Option<i32> {
        self.mods.iter().find_map(|m| match m {
            Mod::Year(year) => Some(*year),
            _ => None,
        })
    }

    pub fn to_year(&self) -> Option<i32> {
        self.mods.iter().find_map(|m| match m {
            Mod::ToYear(year) => Some(*year),
            _ => None,
        })
    }

    pub fn min_minutes(&self) -> Option<u16> {
        self.mods.iter().find_map(|m| match m {
            Mod::MinMinutes(min) => Some(*min),
            _ => None,
        })
    }

    pub fn file(&self) -> Option<&PathBuf> {
        self.mods.iter().find_map(|m| match m {
            Mod::File(path) => Some(path),
            _ => None,
        })
    }
}

/// Splits arguments into plain words and recognised modifiers. Anything
/// after `--` is a word.
#[instrument(skip(args, now))]
pub(crate) fn parse_args(args: &[String], now: DateTime<Utc>) -> anyhow::Result<ParsedArgs> {
    let mut parsed = ParsedArgs::default();

    let mut literal = false;
    for arg in args {
        if !literal {
            if arg == "--" {
                literal = true;
                continue;
            }
            if arg == "--all" {
                parsed.all = true;
                continue;
            }
            if let Some(one_mod) = parse_one_mod(arg, now)? {
                parsed.mods.push(one_mod);
                continue;
            }
        }

        parsed.words.push(arg.clone());
    }

    Ok(parsed)
}

pub(crate) fn parse_one_mod(tok: &str, now: DateTime<Utc>) -> anyhow::Result<Option<Mod>> {
    let Some(split) = tok.find([':', '=']) else {
        return Ok(None);
    };
    let (key, value) = (&tok[..split], &tok[split + 1..]);

    let key = key.to_ascii_lowercase();
    let one_mod = match key.as_str() {
        "name" => Mod::Name(value.to_string()),
        "day" | "days" => Mod::Days(parse_days(value)?),
        "start" => Mod::Start(parse_clock(value, "start")?),
        "end" => Mod::End(parse_clock(value, "end")?),
        "with" | "who" => Mod::With(parse_id_list(value)),
        "type" => Mod::Type(value.to_string()),
        "week" => Mod::Week(
            value
                .parse()
                .with_context(|| format!("invalid week number: {value}"))?,
        ),
        "year" => Mod::Year(
            value
                .parse()
                .with_context(|| format!("invalid year: {value}"))?,
        ),
        "to-year" | "toyear" => Mod::ToYear(
            value
                .parse()
                .with_context(|| format!("invalid year: {value}"))?,
        ),
        "until" => Mod::Until(parse_date_expr(value, now)?),
        "location" | "at" => Mod::Location(value.to_string()),
        "notes" | "note" => Mod::Notes(value.to_string()),
        "kind" => Mod::Kind(value.parse()?),
        "color" => Mod::Color(value.to_string()),
        "icon" => Mod::Icon(value.to_string()),
        "min" => Mod::MinMinutes(
            value
                .parse()
                .with_context(|| format!("invalid minute count: {value}"))?,
        ),
        "file" => Mod::File(PathBuf::from(value)),
        _ => return Ok(None),
    };

    Ok(Some(one_mod))
}

/// `mon,wed`, `tue-thu` or `all`.
pub(crate) fn parse_days(raw: &str) -> anyhow::Result<Vec<Day>> {
    if raw.eq_ignore_ascii_case("all") || raw.eq_ignore_ascii_case("weekdays") {
        return Ok(Day::ALL.to_vec());
    }

    let mut days = BTreeSet::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if let Some((from, to)) = part.split_once('-') {
            let from: Day = from.parse()?;
            let to: Day = to.parse()?;
            if to < from {
                return Err(anyhow!("day range runs backwards: {part}"));
            }
            days.extend(Day::ALL.into_iter().filter(|d| *d >= from && *d <= to));
        } else {
            days.insert(part.parse::<Day>()?);
        }
    }

    if days.is_empty() {
        return Err(anyhow!("no days given"));
    }
    Ok(days.into_iter().collect())
}

fn parse_clock(value: &str, field: &str) -> anyhow::Result<ClockTime> {
    value
        .parse::<ClockTime>()
        .with_context(|| format!("invalid {field} time"))
}

fn parse_id_list(raw: &str) -> BTreeSet<MemberId> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Builds an activity patch from modifiers; modifiers that do not apply
/// to activities are ignored with a warning.
pub(crate) fn activity_patch(mods: &[Mod]) -> anyhow::Result<ActivityPatch> {
    let mut patch = ActivityPatch::default();
    for one_mod in mods {
        match one_mod {
            Mod::Name(name) => patch.name = Some(name.clone()),
            Mod::Days(days) => match days.as_slice() {
                [day] => patch.day = Some(*day),
                _ => return Err(anyhow!("modify takes a single day")),
            },
            Mod::Start(start) => patch.start_time = Some(*start),
            Mod::End(end) => patch.end_time = Some(*end),
            Mod::With(ids) => patch.participants = Some(ids.clone()),
            Mod::Type(kind) => patch.activity_type = Some(kind.clone()),
            Mod::Location(location) => patch.location = Some(location.clone()),
            Mod::Notes(notes) => patch.notes = Some(notes.clone()),
            other => warn!(modifier = ?other, "modifier does not apply to activities; ignored"),
        }
    }
    Ok(patch)
}
