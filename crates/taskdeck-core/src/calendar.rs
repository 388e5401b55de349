use std::collections::BTreeMap;

use chrono::{
  DateTime,
  Datelike,
  NaiveDate,
  Weekday
};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::debug;

use crate::classify::{
  Temporal,
  classify
};
use crate::datetime::{
  add_days,
  first_day_of_month,
  local_date,
  start_of_week
};
use crate::task::Task;

pub const GRID_DAYS: usize = 42;
pub const WEEK_START: Weekday =
  Weekday::Sun;
const BADGE_LIMIT: usize = 9;

/// Marker shown on a calendar cell,
/// derived from its incomplete tasks.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
)]
#[serde(rename_all = "camelCase")]
pub enum DayIndicator {
  Overdue,
  DueToday,
  Upcoming,
  Empty
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarDay<'a> {
  pub date:             NaiveDate,
  pub in_current_month: bool,
  pub is_today:         bool,
  /// Every task due on this day,
  /// completed ones included.
  pub tasks:            Vec<&'a Task>,
  pub indicator:        DayIndicator
}

impl CalendarDay<'_> {
  pub fn pending_count(&self) -> usize {
    self
      .tasks
      .iter()
      .filter(|task| !task.completed)
      .count()
  }

  /// Compact count for the cell corner;
  /// `None` when nothing is pending.
  pub fn badge_label(
    &self
  ) -> Option<String> {
    match self.pending_count() {
      | 0 => None,
      | n if n > BADGE_LIMIT => {
        Some(format!("{BADGE_LIMIT}+"))
      }
      | n => Some(n.to_string())
    }
  }
}

/// Six Sunday-anchored weeks covering a
/// month.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarGrid<'a> {
  pub month: NaiveDate,
  pub days:  Vec<CalendarDay<'a>>
}

impl<'a> CalendarGrid<'a> {
  pub fn weeks(
    &self
  ) -> impl Iterator<Item = &[CalendarDay<'a>]>
  {
    self.days.chunks(7)
  }

  pub fn day(
    &self,
    date: NaiveDate
  ) -> Option<&CalendarDay<'a>> {
    self
      .days
      .iter()
      .find(|day| day.date == date)
  }
}

/// Builds the 42-day grid for the month
/// containing `month_cursor` and buckets
/// `tasks` by local due day.
#[tracing::instrument(skip(tasks, now), fields(month = %month_cursor.format("%Y-%m")))]
pub fn build_grid<'a>(
  month_cursor: NaiveDate,
  tasks: &'a [Task],
  now: &DateTime<Tz>
) -> CalendarGrid<'a> {
  let month =
    first_day_of_month(month_cursor);
  let anchor =
    start_of_week(month, WEEK_START);
  let last = add_days(
    anchor,
    GRID_DAYS as i64 - 1
  );
  let today = now.date_naive();
  let tz = now.timezone();

  let mut buckets: BTreeMap<
    NaiveDate,
    Vec<&'a Task>
  > = BTreeMap::new();
  for task in tasks {
    let Some(due) = task.due_date else {
      continue;
    };
    let day = local_date(due, &tz);
    if day < anchor || day > last {
      continue;
    }
    buckets.entry(day).or_default().push(task);
  }

  let days: Vec<CalendarDay<'a>> = (0
    ..GRID_DAYS as i64)
    .map(|offset| {
      let date =
        add_days(anchor, offset);
      let tasks = buckets
        .remove(&date)
        .unwrap_or_default();
      let indicator =
        indicator_for(&tasks, now);
      CalendarDay {
        date,
        in_current_month: date.year()
          == month.year()
          && date.month()
            == month.month(),
        is_today: date == today,
        tasks,
        indicator
      }
    })
    .collect();

  debug!(
    anchor = %anchor,
    last = %last,
    bucketed = days.iter().map(|d| d.tasks.len()).sum::<usize>(),
    "built calendar grid"
  );

  CalendarGrid {
    month,
    days
  }
}

fn indicator_for(
  tasks: &[&Task],
  now: &DateTime<Tz>
) -> DayIndicator {
  let mut indicator =
    DayIndicator::Empty;
  for task in
    tasks.iter().filter(|t| !t.completed)
  {
    match classify(task.due_date, now) {
      | Temporal::Overdue => {
        return DayIndicator::Overdue;
      }
      | Temporal::DueToday => {
        indicator = DayIndicator::DueToday
      }
      | Temporal::Upcoming
      | Temporal::NoDueDate => {
        if indicator
          == DayIndicator::Empty
        {
          indicator =
            DayIndicator::Upcoming;
        }
      }
    }
  }
  indicator
}

/// Tasks due on `date` in `tz`, for the
/// selected-day detail view.
#[must_use]
pub fn tasks_on<'a>(
  tasks: &'a [Task],
  date: NaiveDate,
  tz: &Tz
) -> Vec<&'a Task> {
  tasks
    .iter()
    .filter(|task| {
      task
        .due_date
        .map(|due| {
          local_date(due, tz) == date
        })
        .unwrap_or(false)
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use chrono::{
    DateTime,
    Datelike,
    NaiveDate,
    TimeZone,
    Utc,
    Weekday
  };
  use chrono_tz::Tz;

  use super::{
    DayIndicator,
    GRID_DAYS,
    build_grid,
    tasks_on
  };
  use crate::datetime::add_days;
  use crate::task::Task;

  fn now() -> DateTime<Tz> {
    chrono_tz::UTC
      .with_ymd_and_hms(
        2024, 3, 10, 9, 0, 0
      )
      .unwrap()
  }

  fn day(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  fn due_task(
    id: u64,
    y: i32,
    m: u32,
    d: u32,
    h: u32
  ) -> Task {
    let mut task = Task::new(
      format!("task {id}"),
      now().with_timezone(&Utc),
      id
    );
    task.due_date = Some(
      Utc
        .with_ymd_and_hms(
          y, m, d, h, 0, 0
        )
        .unwrap()
    );
    task
  }

  #[test]
  fn grid_is_six_consecutive_weeks_from_sunday()
   {
    for cursor in [
      day(2024, 2, 14),
      day(2024, 3, 31),
      day(2024, 9, 1),
      day(2026, 2, 1),
      day(2023, 12, 25)
    ] {
      let grid =
        build_grid(cursor, &[], &now());
      assert_eq!(grid.days.len(), GRID_DAYS);
      assert_eq!(
        grid.days[0].date.weekday(),
        Weekday::Sun
      );
      assert!(
        grid.days[0].date
          <= day(
            cursor.year(),
            cursor.month(),
            1
          )
      );
      for pair in grid.days.windows(2) {
        assert_eq!(
          add_days(pair[0].date, 1),
          pair[1].date
        );
      }
      assert_eq!(grid.weeks().count(), 6);
      assert!(grid.days.iter().all(|d| {
        d.tasks.is_empty()
          && d.indicator
            == DayIndicator::Empty
      }));
    }
  }

  #[test]
  fn marks_current_month_and_today() {
    let grid = build_grid(
      day(2024, 3, 20),
      &[],
      &now()
    );
    // March 2024 starts on a Friday.
    assert_eq!(grid.days[0].date, day(2024, 2, 25));
    assert!(!grid.days[0].in_current_month);
    assert!(grid.days[5].in_current_month);
    assert_eq!(grid.days[5].date, day(2024, 3, 1));
    assert_eq!(
      grid.days[41].date,
      day(2024, 4, 6)
    );
    assert!(!grid.days[41].in_current_month);

    let today: Vec<NaiveDate> = grid
      .days
      .iter()
      .filter(|d| d.is_today)
      .map(|d| d.date)
      .collect();
    assert_eq!(today, vec![day(2024, 3, 10)]);
  }

  #[test]
  fn indicator_priority_per_day() {
    let mut done_overdue =
      due_task(1, 2024, 3, 5, 10);
    done_overdue.set_completed(
      true,
      now().with_timezone(&Utc)
    );
    let tasks = vec![
      due_task(2, 2024, 3, 4, 10),
      due_task(3, 2024, 3, 4, 18),
      done_overdue,
      due_task(4, 2024, 3, 10, 7),
      due_task(5, 2024, 3, 10, 20),
      due_task(6, 2024, 3, 21, 12),
      due_task(7, 2024, 4, 3, 9),
    ];
    let grid =
      build_grid(day(2024, 3, 1), &tasks, &now());

    let at = |date: NaiveDate| {
      grid.day(date).expect("day in grid")
    };
    assert_eq!(
      at(day(2024, 3, 4)).indicator,
      DayIndicator::Overdue
    );
    assert_eq!(
      at(day(2024, 3, 4)).tasks.len(),
      2
    );

    let completed_only = at(day(2024, 3, 5));
    assert_eq!(completed_only.tasks.len(), 1);
    assert_eq!(
      completed_only.indicator,
      DayIndicator::Empty
    );
    assert_eq!(completed_only.badge_label(), None);

    assert_eq!(
      at(day(2024, 3, 10)).indicator,
      DayIndicator::DueToday
    );
    assert_eq!(
      at(day(2024, 3, 21)).indicator,
      DayIndicator::Upcoming
    );

    let next_month = at(day(2024, 4, 3));
    assert!(!next_month.in_current_month);
    assert_eq!(next_month.tasks.len(), 1);
    assert_eq!(
      next_month.indicator,
      DayIndicator::Upcoming
    );
  }

  #[test]
  fn tasks_outside_window_are_ignored() {
    let tasks = vec![
      due_task(1, 2024, 1, 15, 9),
      due_task(2, 2024, 5, 30, 9),
    ];
    let grid =
      build_grid(day(2024, 3, 1), &tasks, &now());
    assert!(
      grid.days.iter().all(|d| d.tasks.is_empty())
    );
  }

  #[test]
  fn badge_caps_at_nine() {
    let tasks: Vec<Task> = (1..=12)
      .map(|id| due_task(id, 2024, 3, 20, 12))
      .collect();
    let grid =
      build_grid(day(2024, 3, 1), &tasks, &now());
    let cell =
      grid.day(day(2024, 3, 20)).expect("day in grid");
    assert_eq!(cell.pending_count(), 12);
    assert_eq!(
      cell.badge_label().as_deref(),
      Some("9+")
    );
  }

  #[test]
  fn selected_day_lookup() {
    let tasks = vec![
      due_task(1, 2024, 3, 20, 1),
      due_task(2, 2024, 3, 20, 23),
      due_task(3, 2024, 3, 21, 1),
    ];
    let picked =
      tasks_on(&tasks, day(2024, 3, 20), &chrono_tz::UTC);
    assert_eq!(picked.len(), 2);

    // In New York, 01:00 UTC is the prior
    // evening.
    let ny = tasks_on(
      &tasks,
      day(2024, 3, 20),
      &chrono_tz::America::New_York
    );
    let ids: Vec<u64> =
      ny.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![2, 3]);
  }
}
