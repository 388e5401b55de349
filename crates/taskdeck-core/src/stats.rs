use std::collections::BTreeMap;

use chrono::DateTime;
use chrono_tz::Tz;
use serde::Serialize;
use tracing::debug;

use crate::classify::{
  Temporal,
  classify
};
use crate::task::Task;

/// Dashboard counters over a task
/// collection.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize,
)]
#[serde(rename_all = "camelCase")]
pub struct TaskStats {
  pub total:           usize,
  pub completed:       usize,
  pub pending:         usize,
  pub overdue:         usize,
  pub today:           usize,
  /// Whole percent, 0 when empty.
  pub completion_rate: u32
}

#[must_use]
pub fn aggregate(
  tasks: &[Task],
  now: &DateTime<Tz>
) -> TaskStats {
  let mut stats = TaskStats {
    total: tasks.len(),
    ..TaskStats::default()
  };

  for task in tasks {
    if task.completed {
      stats.completed += 1;
      continue;
    }
    match classify(task.due_date, now) {
      | Temporal::Overdue => {
        stats.overdue += 1
      }
      | Temporal::DueToday => {
        stats.today += 1
      }
      | Temporal::Upcoming
      | Temporal::NoDueDate => {}
    }
  }

  stats.pending =
    stats.total - stats.completed;
  stats.completion_rate =
    completion_rate(
      stats.completed,
      stats.total
    );

  debug!(?stats, "aggregated task stats");
  stats
}

fn completion_rate(
  completed: usize,
  total: usize
) -> u32 {
  if total == 0 {
    return 0;
  }
  // Round half up in integers.
  ((completed * 200 + total)
    / (total * 2)) as u32
}

/// Incomplete tasks per project id.
/// Tasks without a project are skipped.
#[must_use]
pub fn project_active_counts(
  tasks: &[Task]
) -> BTreeMap<String, usize> {
  let mut counts = BTreeMap::new();
  for task in
    tasks.iter().filter(|t| !t.completed)
  {
    if let Some(project) =
      task.project_id.as_ref()
    {
      *counts
        .entry(project.clone())
        .or_insert(0) += 1;
    }
  }
  counts
}
