use std::sync::OnceLock;

use chrono::{
  DateTime,
  Datelike,
  Days,
  Months,
  NaiveDate,
  Utc
};
use chrono_tz::Tz;
use regex::Regex;
use tracing::debug;

use crate::datetime::from_local;

/// Result of reading a quick-add line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuickAdd {
  pub implied_date: Option<DateTime<Utc>>,
  pub title:        String,
  /// Name of the rule that produced the
  /// date, if any.
  pub rule:         Option<&'static str>
}

#[derive(Debug, Clone, Copy)]
enum Shift {
  Now,
  Days(u64),
  Months(u32)
}

#[derive(Debug, Clone, Copy)]
enum DateRule {
  Keyword {
    phrase: &'static str,
    shift:  Shift
  },
  MonthDay {
    name:    &'static str,
    pattern: fn() -> Option<&'static Regex>
  }
}

/// Evaluated top to bottom; the first rule
/// that yields a date wins.
const RULES: &[DateRule] = &[
  DateRule::Keyword {
    phrase: "today",
    shift:  Shift::Now
  },
  DateRule::Keyword {
    phrase: "tomorrow",
    shift:  Shift::Days(1)
  },
  DateRule::Keyword {
    phrase: "next week",
    shift:  Shift::Days(7)
  },
  DateRule::Keyword {
    phrase: "next month",
    shift:  Shift::Months(1)
  },
  DateRule::MonthDay {
    name:    "month/day",
    pattern: slash_pattern
  },
  DateRule::MonthDay {
    name:    "month-day",
    pattern: dash_pattern
  },
  DateRule::MonthDay {
    name:    "month.day",
    pattern: dot_pattern
  }
];

fn compile(
  cell: &'static OnceLock<Option<Regex>>,
  pattern: &str
) -> Option<&'static Regex> {
  cell
    .get_or_init(|| {
      Regex::new(pattern)
        .map_err(|err| {
          tracing::error!(error = %err, pattern, "date pattern failed to compile");
        })
        .ok()
    })
    .as_ref()
}

fn slash_pattern()
-> Option<&'static Regex> {
  static RE: OnceLock<Option<Regex>> =
    OnceLock::new();
  compile(&RE, r"(\d{1,2})/(\d{1,2})")
}

fn dash_pattern()
-> Option<&'static Regex> {
  static RE: OnceLock<Option<Regex>> =
    OnceLock::new();
  compile(&RE, r"(\d{1,2})-(\d{1,2})")
}

fn dot_pattern()
-> Option<&'static Regex> {
  static RE: OnceLock<Option<Regex>> =
    OnceLock::new();
  compile(&RE, r"(\d{1,2})\.(\d{1,2})")
}

fn keyword_cleanup()
-> Option<&'static Regex> {
  static RE: OnceLock<Option<Regex>> =
    OnceLock::new();
  compile(
    &RE,
    r"(?i)\b(today|tomorrow|next week|next month)\b"
  )
}

fn numeric_cleanup()
-> Option<&'static Regex> {
  static RE: OnceLock<Option<Regex>> =
    OnceLock::new();
  compile(&RE, r"\d{1,2}[/\-.]\d{1,2}")
}

impl DateRule {
  fn name(&self) -> &'static str {
    match self {
      | DateRule::Keyword {
        phrase,
        ..
      } => *phrase,
      | DateRule::MonthDay {
        name,
        ..
      } => *name
    }
  }

  fn apply(
    &self,
    text: &str,
    lower: &str,
    now: &DateTime<Tz>
  ) -> Option<DateTime<Tz>> {
    match self {
      | DateRule::Keyword {
        phrase,
        shift
      } => {
        if !lower.contains(phrase) {
          return None;
        }
        match shift {
          | Shift::Now => Some(*now),
          | Shift::Days(days) => {
            now.checked_add_days(
              Days::new(*days)
            )
          }
          | Shift::Months(months) => {
            now.checked_add_months(
              Months::new(*months)
            )
          }
        }
      }
      | DateRule::MonthDay {
        pattern,
        ..
      } => {
        let caps =
          pattern()?.captures(text)?;
        let month: u32 =
          caps.get(1)?.as_str().parse().ok()?;
        let day: u32 =
          caps.get(2)?.as_str().parse().ok()?;
        if !(1..=12).contains(&month)
          || !(1..=31).contains(&day)
        {
          return None;
        }
        next_occurrence(month, day, now)
      }
    }
  }
}

/// Local midnight of `month`/`day` this
/// year, or next year when that is
/// already behind `now`. A rolled-over
/// day missing from next year (Feb 29)
/// spills into the following month.
fn next_occurrence(
  month: u32,
  day: u32,
  now: &DateTime<Tz>
) -> Option<DateTime<Tz>> {
  let tz = now.timezone();
  let midnight = |date: NaiveDate| {
    date
      .and_hms_opt(0, 0, 0)
      .and_then(|naive| {
        from_local(&tz, naive, "quick-add")
      })
  };

  let year = now.year();
  let candidate = midnight(
    NaiveDate::from_ymd_opt(
      year, month, day
    )?
  )?;
  if candidate >= *now {
    return Some(candidate);
  }

  let next_year = year.saturating_add(1);
  let rolled = NaiveDate::from_ymd_opt(
    next_year, month, day
  )
  .or_else(|| {
    NaiveDate::from_ymd_opt(
      next_year, month, 1
    )?
    .checked_add_days(Days::new(
      u64::from(day) - 1
    ))
  })?;
  midnight(rolled)
}

/// Extracts an implied due date and a
/// cleaned title from free-form text.
#[tracing::instrument(skip(now))]
pub fn parse(
  text: &str,
  now: &DateTime<Tz>
) -> QuickAdd {
  let lower = text.to_lowercase();
  let matched =
    RULES.iter().find_map(|rule| {
      rule
        .apply(text, &lower, now)
        .map(|dt| (rule.name(), dt))
    });

  let title = clean_title(text);
  let (rule, implied_date) =
    match matched {
      | Some((name, dt)) => (
        Some(name),
        Some(dt.with_timezone(&Utc))
      ),
      | None => (None, None)
    };

  debug!(?rule, ?implied_date, %title, "parsed quick add");
  QuickAdd {
    implied_date,
    title,
    rule
  }
}

fn clean_title(text: &str) -> String {
  let mut stripped = text.to_string();
  for re in [
    keyword_cleanup(),
    numeric_cleanup()
  ]
  .into_iter()
  .flatten()
  {
    stripped = re
      .replace_all(&stripped, "")
      .into_owned();
  }
  let cleaned = stripped.trim();

  if cleaned.is_empty() {
    text.to_string()
  } else {
    cleaned.to_string()
  }
}
