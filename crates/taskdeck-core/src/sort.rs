use std::cmp::{
  Ordering,
  Reverse
};

use tracing::debug;

use crate::task::Task;

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
)]
pub enum SortOrder {
  /// Priority ascending, then newest
  /// first.
  #[default]
  Priority,
  /// Incomplete tasks ahead of completed
  /// ones, each group in `Priority`
  /// order.
  PendingFirst
}

impl SortOrder {
  pub fn parse(
    raw: &str
  ) -> Option<Self> {
    match raw
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "priority" => {
        Some(Self::Priority)
      }
      | "pending" | "pending-first" => {
        Some(Self::PendingFirst)
      }
      | _ => None
    }
  }
}

/// Stable sort; ties keep input order.
#[must_use]
pub fn sort_tasks(
  mut tasks: Vec<Task>,
  order: SortOrder
) -> Vec<Task> {
  match order {
    | SortOrder::Priority => {
      tasks.sort_by(by_priority)
    }
    | SortOrder::PendingFirst => {
      tasks.sort_by(|a, b| {
        a.completed
          .cmp(&b.completed)
          .then_with(|| by_priority(a, b))
      })
    }
  }

  debug!(count = tasks.len(), ?order, "sorted tasks");
  tasks
}

fn by_priority(
  a: &Task,
  b: &Task
) -> Ordering {
  (a.priority, Reverse(a.created_at))
    .cmp(&(b.priority, Reverse(b.created_at)))
}

#[cfg(test)]
mod tests {
  use chrono::{
    DateTime,
    Duration,
    TimeZone,
    Utc
  };
  use pretty_assertions::assert_eq;

  use super::{
    SortOrder,
    sort_tasks
  };
  use crate::task::{
    Priority,
    Task
  };

  fn base() -> DateTime<Utc> {
    Utc
      .with_ymd_and_hms(
        2024, 3, 1, 8, 0, 0
      )
      .unwrap()
  }

  fn task(
    id: u64,
    priority: Priority,
    created_minutes: i64
  ) -> Task {
    let mut task = Task::new(
      format!("task {id}"),
      base()
        + Duration::minutes(
          created_minutes
        ),
      id
    );
    task.priority = priority;
    task
  }

  fn ids(tasks: &[Task]) -> Vec<u64> {
    tasks.iter().map(|t| t.id).collect()
  }

  #[test]
  fn priority_then_newest_first() {
    let a = task(1, Priority::High, 0);
    let b = task(2, Priority::High, 10);
    let c = task(3, Priority::Medium, 20);
    let sorted = sort_tasks(
      vec![a, c, b],
      SortOrder::Priority
    );
    assert_eq!(ids(&sorted), vec![2, 1, 3]);
  }

  #[test]
  fn ties_keep_input_order() {
    let tasks = vec![
      task(7, Priority::Low, 5),
      task(3, Priority::Low, 5),
      task(9, Priority::High, 0),
      task(1, Priority::Low, 5),
    ];
    let sorted = sort_tasks(
      tasks,
      SortOrder::Priority
    );
    assert_eq!(
      ids(&sorted),
      vec![9, 7, 3, 1]
    );
  }

  #[test]
  fn output_is_ordered_by_priority_and_recency()
   {
    let tasks: Vec<Task> = (0..30)
      .map(|i| {
        let priority = match i % 3 {
          | 0 => Priority::Low,
          | 1 => Priority::High,
          | _ => Priority::Medium
        };
        task(i, priority, (i as i64 * 7) % 11)
      })
      .collect();

    let sorted = sort_tasks(
      tasks,
      SortOrder::Priority
    );
    for pair in sorted.windows(2) {
      assert!(
        pair[0].priority
          <= pair[1].priority
      );
      if pair[0].priority
        == pair[1].priority
      {
        assert!(
          pair[0].created_at
            >= pair[1].created_at
        );
      }
    }
  }

  #[test]
  fn pending_first_moves_completed_last()
  {
    let mut done =
      task(1, Priority::High, 30);
    done.set_completed(true, base());
    let open_low =
      task(2, Priority::Low, 0);
    let open_high =
      task(3, Priority::High, 0);

    let sorted = sort_tasks(
      vec![done, open_low, open_high],
      SortOrder::PendingFirst
    );
    assert_eq!(ids(&sorted), vec![3, 2, 1]);
    assert!(sort_tasks(
      vec![],
      SortOrder::PendingFirst
    )
    .is_empty());
  }
}
