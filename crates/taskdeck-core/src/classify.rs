use chrono::{
  DateTime,
  Utc
};
use chrono_tz::Tz;
use serde::Serialize;

use crate::datetime::{
  local_date,
  parse_instant
};
use crate::task::Task;

/// Where a due date sits relative to the
/// reference instant.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
)]
#[serde(rename_all = "camelCase")]
pub enum Temporal {
  NoDueDate,
  Overdue,
  DueToday,
  Upcoming
}

/// Classifies `due` against `now`, whose
/// timezone defines the local calendar
/// day.
///
/// A due time earlier today is
/// `DueToday`, never `Overdue`.
#[must_use]
pub fn classify(
  due: Option<DateTime<Utc>>,
  now: &DateTime<Tz>
) -> Temporal {
  let Some(due) = due else {
    return Temporal::NoDueDate;
  };

  let tz = now.timezone();
  let same_day = local_date(due, &tz)
    == now.date_naive();
  let is_past =
    due < now.with_timezone(&Utc);

  if same_day {
    Temporal::DueToday
  } else if is_past {
    Temporal::Overdue
  } else {
    Temporal::Upcoming
  }
}

/// Same as [`classify`] for unparsed
/// input; malformed text is `NoDueDate`.
#[must_use]
pub fn classify_raw(
  due: Option<&str>,
  now: &DateTime<Tz>
) -> Temporal {
  classify(
    due.and_then(parse_instant),
    now
  )
}

/// Incomplete task whose due date falls in
/// `bucket`.
#[must_use]
pub fn is_pending_in(
  task: &Task,
  bucket: Temporal,
  now: &DateTime<Tz>
) -> bool {
  !task.completed
    && classify(task.due_date, now)
      == bucket
}
