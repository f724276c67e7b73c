use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Duration,
  NaiveDate,
  Utc
};
use chrono_tz::Tz;
use serde::Deserialize;

use crate::week::WeekRef;

const TIMEZONE_CONFIG_FILE: &str =
  "kinweek-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "KINWEEK_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "KINWEEK_TIME_CONFIG";
const DEFAULT_PROJECT_TIMEZONE: &str =
  "Europe/Stockholm";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

pub fn project_timezone() -> &'static Tz
{
  static PROJECT_TZ: OnceLock<Tz> =
    OnceLock::new();
  PROJECT_TZ.get_or_init(
    resolve_project_timezone
  )
}

/// The household's calendar date at
/// `now`.
#[must_use]
pub fn project_today(
  now: DateTime<Utc>
) -> NaiveDate {
  now.with_timezone(project_timezone())
    .date_naive()
}

#[must_use]
pub fn current_week(
  now: DateTime<Utc>
) -> WeekRef {
  WeekRef::containing(project_today(
    now
  ))
}

fn resolve_project_timezone() -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
  {
    if let Some(tz) = parse_timezone(
      &raw,
      TIMEZONE_ENV_VAR
    ) {
      return tz;
    }
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return tz;
  }

  parse_timezone(
    DEFAULT_PROJECT_TIMEZONE,
    "DEFAULT_PROJECT_TIMEZONE"
  )
  .unwrap_or_else(|| {
    tracing::error!(
      "failed to parse fallback \
       timezone; using UTC"
    );
    chrono_tz::UTC
  })
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  dirs::home_dir().map(|dir| {
    dir
      .join(".kinweek")
      .join(TIMEZONE_CONFIG_FILE)
  })
}

fn load_timezone_from_file(
  path: &PathBuf
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed =
    match parse_timezone_config(&raw) {
      | Ok(parsed) => parsed,
      | Err(err) => {
        tracing::error!(
          file = %path.display(),
          error = %err,
          "failed parsing timezone config file"
        );
        return None;
      }
    };

  let Some(timezone) = parsed else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

/// Reads `timezone = "..."` at the top
/// level or inside a `[time]` table.
fn parse_timezone_config(
  raw: &str
) -> Result<Option<String>, toml::de::Error>
{
  let parsed =
    toml::from_str::<TimezoneConfig>(
      raw
    )?;
  Ok(parsed.timezone.or_else(|| {
    parsed
      .time
      .and_then(|section| {
        section.timezone
      })
  }))
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::debug!(
        source,
        timezone = %trimmed,
        "resolved project timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::warn!(
        source,
        timezone = %trimmed,
        error = %err,
        "invalid timezone; ignoring"
      );
      None
    }
  }
}

/// Parses a calendar date for
/// recurrence ends: `YYYY-MM-DD`,
/// `today`, `tomorrow`, or `+Nd` /
/// `+Nw` relative to today.
#[tracing::instrument(skip(now), fields(input = input))]
pub fn parse_date_expr(
  input: &str,
  now: DateTime<Utc>
) -> anyhow::Result<NaiveDate> {
  let token =
    input.trim().to_ascii_lowercase();
  let today = project_today(now);

  match token.as_str() {
    | "today" => return Ok(today),
    | "tomorrow" => {
      return Ok(
        today + Duration::days(1)
      );
    }
    | _ => {}
  }

  if let Some(rest) =
    token.strip_prefix('+')
  {
    let (num, per_unit) =
      if let Some(num) =
        rest.strip_suffix('d')
      {
        (num, 1)
      } else if let Some(num) =
        rest.strip_suffix('w')
      {
        (num, 7)
      } else {
        return Err(anyhow!(
          "invalid relative date \
           unit in {input} (use d or \
           w)"
        ));
      };
    let count: i64 =
      num.parse().with_context(|| {
        format!(
          "invalid relative date: \
           {input}"
        )
      })?;
    let days = count
      .checked_mul(per_unit)
      .and_then(Duration::try_days)
      .ok_or_else(|| {
        anyhow!(
          "relative date out of \
           range: {input}"
        )
      })?;
    return today
      .checked_add_signed(days)
      .ok_or_else(|| {
        anyhow!(
          "relative date out of \
           range: {input}"
        )
      });
  }

  NaiveDate::parse_from_str(
    &token, "%Y-%m-%d"
  )
  .with_context(|| {
    format!(
      "invalid date: {input} \
       (expected YYYY-MM-DD)"
    )
  })
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    TimeZone,
    Utc
  };

  use super::{
    parse_date_expr,
    parse_timezone_config
  };

  fn noon() -> chrono::DateTime<Utc> {
    Utc
      .with_ymd_and_hms(
        2024, 3, 6, 12, 0, 0
      )
      .single()
      .expect("valid now")
  }

  #[test]
  fn parses_absolute_dates() {
    let parsed = parse_date_expr(
      "2024-06-14",
      noon()
    )
    .expect("parse date");
    assert_eq!(
      parsed,
      NaiveDate::from_ymd_opt(
        2024, 6, 14
      )
      .expect("valid date")
    );
    assert!(
      parse_date_expr(
        "14/06/2024",
        noon()
      )
      .is_err()
    );
  }

  #[test]
  fn parses_relative_dates() {
    let today = parse_date_expr(
      "today",
      noon()
    )
    .expect("today");
    let in_two_weeks = parse_date_expr(
      "+2w",
      noon()
    )
    .expect("relative weeks");
    assert_eq!(
      (in_two_weeks - today)
        .num_days(),
      14
    );
    assert!(
      parse_date_expr("+3y", noon())
        .is_err()
    );
  }

  #[test]
  fn rejects_odd_relative_suffixes() {
    for input in
      ["+5ü", "+ü", "+", "+9999999999999999w"]
    {
      assert!(
        parse_date_expr(input, noon())
          .is_err(),
        "{input} should not parse"
      );
    }
  }

  #[test]
  fn reads_timezone_from_either_toml_shape()
  {
    assert_eq!(
      parse_timezone_config(
        "timezone = \"Europe/Oslo\"\n"
      )
      .expect("toml")
      .as_deref(),
      Some("Europe/Oslo")
    );
    assert_eq!(
      parse_timezone_config(
        "[time]\ntimezone = \"UTC\"\n"
      )
      .expect("toml")
      .as_deref(),
      Some("UTC")
    );
    assert_eq!(
      parse_timezone_config("")
        .expect("toml"),
      None
    );
  }
}
