use std::fs;
use std::path::PathBuf;

use chrono::{
  DateTime,
  Datelike,
  Duration,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  TimeZone,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use serde::Deserialize;

const TIMEZONE_CONFIG_FILE: &str =
  "taskdeck-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "TASKDECK_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "TASKDECK_TIME_CONFIG";
const DEFAULT_TIMEZONE: &str = "UTC";

const COMPACT_FORMAT: &str =
  "%Y%m%dT%H%M%SZ";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

/// Resolves the display timezone that
/// defines a "local calendar day".
///
/// Order: `TASKDECK_TIMEZONE`, the rc
/// value, `taskdeck-time.toml`, then UTC.
pub fn resolve_timezone(
  rc_value: Option<&str>
) -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) = parse_timezone(
      &raw,
      TIMEZONE_ENV_VAR
    )
  {
    return tz;
  }

  if let Some(raw) = rc_value
    && let Some(tz) =
      parse_timezone(raw, "rc:timezone")
  {
    return tz;
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return tz;
  }

  parse_timezone(
    DEFAULT_TIMEZONE,
    "DEFAULT_TIMEZONE"
  )
  .unwrap_or(chrono_tz::UTC)
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

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
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

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
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

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
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
        "configured display timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

/// Parses a stored or user-supplied
/// instant. Anything unrecognised is
/// `None`, never an error.
#[must_use]
pub fn parse_instant(
  raw: &str
) -> Option<DateTime<Utc>> {
  let token = raw.trim();
  if token.is_empty() {
    return None;
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Some(dt.with_timezone(&Utc));
  }

  if let Ok(ndt) =
    NaiveDateTime::parse_from_str(
      token,
      COMPACT_FORMAT
    )
  {
    return Some(ndt.and_utc());
  }

  for fmt in [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M"
  ] {
    if let Ok(ndt) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return Some(ndt.and_utc());
    }
  }

  NaiveDate::parse_from_str(
    token, "%Y-%m-%d"
  )
  .ok()
  .and_then(|date| {
    date.and_hms_opt(0, 0, 0)
  })
  .map(|ndt| ndt.and_utc())
}

/// Calendar day of `dt` as seen from
/// `tz`.
#[must_use]
pub fn local_date(
  dt: DateTime<Utc>,
  tz: &Tz
) -> NaiveDate {
  dt.with_timezone(tz).date_naive()
}

/// Resolves a wall-clock time in `tz`,
/// picking the earlier reading when the
/// local time is ambiguous.
pub fn from_local(
  tz: &Tz,
  local_naive: NaiveDateTime,
  context: &str
) -> Option<DateTime<Tz>> {
  match tz
    .from_local_datetime(&local_naive)
  {
    | LocalResult::Single(local_dt) => {
      Some(local_dt)
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      tracing::warn!(
        context,
        first = %first,
        second = %second,
        "ambiguous local datetime; using earliest"
      );
      Some(if first <= second {
        first
      } else {
        second
      })
    }
    | LocalResult::None => {
      tracing::warn!(
        context,
        local = %local_naive,
        "local datetime does not exist in display timezone"
      );
      None
    }
  }
}

#[must_use]
pub fn first_day_of_month(
  date: NaiveDate
) -> NaiveDate {
  date.with_day(1).unwrap_or(date)
}

#[must_use]
pub fn days_in_month(
  year: i32,
  month: u32
) -> u32 {
  let (next_year, next_month) =
    if month >= 12 {
      (year.saturating_add(1), 1_u32)
    } else {
      (year, month + 1)
    };
  NaiveDate::from_ymd_opt(
    next_year, next_month, 1
  )
  .and_then(|first| first.pred_opt())
  .map(|last| last.day())
  .unwrap_or(31)
}

#[must_use]
pub fn add_days(
  date: NaiveDate,
  days: i64
) -> NaiveDate {
  date
    .checked_add_signed(Duration::days(
      days
    ))
    .unwrap_or(date)
}

/// Moves `date` by whole months, clamping
/// the day to the target month's length.
#[must_use]
pub fn shift_months(
  date: NaiveDate,
  months: i32
) -> NaiveDate {
  let mut year = date.year();
  let mut month =
    date.month() as i32 + months;

  while month < 1 {
    month += 12;
    year = year.saturating_sub(1);
  }
  while month > 12 {
    month -= 12;
    year = year.saturating_add(1);
  }

  let month = month as u32;
  let day = date
    .day()
    .min(days_in_month(year, month));
  NaiveDate::from_ymd_opt(
    year, month, day
  )
  .unwrap_or(date)
}

/// Most recent `week_start` on or before
/// `day`.
#[must_use]
pub fn start_of_week(
  day: NaiveDate,
  week_start: Weekday
) -> NaiveDate {
  let day_idx = day
    .weekday()
    .num_days_from_monday()
    as i64;
  let start_idx = week_start
    .num_days_from_monday()
    as i64;
  let diff =
    (7 + day_idx - start_idx) % 7;
  add_days(day, -diff)
}

/// Parses `YYYY-MM` (or a full date) into
/// the first day of that month.
pub fn parse_month_arg(
  token: &str
) -> Option<NaiveDate> {
  let token = token.trim();
  NaiveDate::parse_from_str(
    &format!("{token}-01"),
    "%Y-%m-%d"
  )
  .or_else(|_| {
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  })
  .ok()
  .map(first_day_of_month)
}

pub mod instant_serde {
  use chrono::{
    DateTime,
    SecondsFormat,
    Utc
  };
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  pub fn serialize<S>(
    dt: &DateTime<Utc>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &dt.to_rfc3339_opts(
        SecondsFormat::Secs,
        true
      )
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<DateTime<Utc>, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    super::parse_instant(&raw)
      .ok_or_else(|| {
        serde::de::Error::custom(
          format!(
            "invalid instant: {raw}"
          )
        )
      })
  }

  /// Lenient optional instants: malformed
  /// values and non-string payloads
  /// deserialize as `None`.
  pub mod option {
    use chrono::{
      DateTime,
      Utc
    };
    use serde::{
      Deserialize,
      Deserializer,
      Serializer
    };
    use serde_json::Value;

    pub fn serialize<S>(
      dt: &Option<DateTime<Utc>>,
      serializer: S
    ) -> Result<S::Ok, S::Error>
    where
      S: Serializer
    {
      match dt {
        | Some(value) => {
          super::serialize(
            value, serializer
          )
        }
        | None => {
          serializer.serialize_none()
        }
      }
    }

    pub fn deserialize<'de, D>(
      deserializer: D
    ) -> Result<
      Option<DateTime<Utc>>,
      D::Error
    >
    where
      D: Deserializer<'de>
    {
      let raw =
        Option::<Value>::deserialize(
          deserializer
        )?;
      let parsed = match raw {
        | Some(Value::String(text)) => {
          let parsed =
            crate::datetime::parse_instant(
              &text
            );
          if parsed.is_none() {
            tracing::debug!(
              raw = %text,
              "unparseable instant treated as absent"
            );
          }
          parsed
        }
        | _ => None
      };
      Ok(parsed)
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    TimeZone,
    Utc,
    Weekday
  };

  use super::{
    days_in_month,
    local_date,
    parse_instant,
    parse_month_arg,
    shift_months,
    start_of_week
  };

  fn day(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  #[test]
  fn parses_supported_instant_forms() {
    let expected = Utc
      .with_ymd_and_hms(
        2024, 3, 10, 7, 0, 0
      )
      .single()
      .expect("valid instant");

    for raw in [
      "2024-03-10T07:00:00Z",
      "2024-03-10T07:00:00+00:00",
      "20240310T070000Z",
      "2024-03-10T07:00",
      "2024-03-10 07:00"
    ] {
      assert_eq!(
        parse_instant(raw),
        Some(expected),
        "{raw}"
      );
    }

    assert_eq!(
      parse_instant("2024-03-10")
        .map(|dt| dt.date_naive()),
      Some(day(2024, 3, 10))
    );
  }

  #[test]
  fn malformed_instants_are_absent() {
    for raw in [
      "",
      "   ",
      "not a date",
      "2024-13-40",
      "yesterday-ish"
    ] {
      assert_eq!(
        parse_instant(raw),
        None,
        "{raw}"
      );
    }
  }

  #[test]
  fn local_date_follows_timezone() {
    let late_utc = Utc
      .with_ymd_and_hms(
        2024, 3, 10, 3, 30, 0
      )
      .single()
      .expect("valid instant");
    assert_eq!(
      local_date(
        late_utc,
        &chrono_tz::UTC
      ),
      day(2024, 3, 10)
    );
    assert_eq!(
      local_date(
        late_utc,
        &chrono_tz::America::New_York
      ),
      day(2024, 3, 9)
    );
  }

  #[test]
  fn shift_months_clamps_day() {
    assert_eq!(
      shift_months(day(2024, 1, 31), 1),
      day(2024, 2, 29)
    );
    assert_eq!(
      shift_months(day(2024, 1, 15), -1),
      day(2023, 12, 15)
    );
    assert_eq!(
      shift_months(
        day(2024, 11, 30),
        14
      ),
      day(2026, 1, 30)
    );
    assert_eq!(days_in_month(2023, 2), 28);
    assert_eq!(days_in_month(2024, 12), 31);
  }

  #[test]
  fn start_of_week_walks_back_to_sunday()
  {
    // 2024-03-01 is a Friday.
    assert_eq!(
      start_of_week(
        day(2024, 3, 1),
        Weekday::Sun
      ),
      day(2024, 2, 25)
    );
    // 2024-09-01 is a Sunday.
    assert_eq!(
      start_of_week(
        day(2024, 9, 1),
        Weekday::Sun
      ),
      day(2024, 9, 1)
    );
  }

  #[test]
  fn month_argument_forms() {
    assert_eq!(
      parse_month_arg("2024-02"),
      Some(day(2024, 2, 1))
    );
    assert_eq!(
      parse_month_arg("2024-02-17"),
      Some(day(2024, 2, 1))
    );
    assert_eq!(
      parse_month_arg("feb"),
      None
    );
  }
}
