use chrono::{
  DateTime,
  NaiveDate
};
use chrono_tz::Tz;
use tracing::{
  debug,
  trace
};

use crate::classify::{
  Temporal,
  is_pending_in
};
use crate::datetime::local_date;
use crate::task::Task;

/// Independently optional task filters,
/// combined with AND.
#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub struct FilterCriteria {
  pub completed:    Option<bool>,
  pub project_id:   Option<String>,
  pub search:       Option<String>,
  pub due_on:       Option<NaiveDate>,
  pub overdue_only: bool,
  pub today_only:   bool
}

#[derive(Debug, Clone)]
enum Pred {
  CompletedEq(bool),
  ProjectEq(String),
  TextContains(String),
  DueOn(NaiveDate),
  Bucket(Temporal)
}

impl FilterCriteria {
  pub fn is_empty(&self) -> bool {
    self.predicates().is_empty()
  }

  /// Builds criteria from CLI terms such as
  /// `project:work`, `status:pending`,
  /// `due:2024-03-10`, `+OVERDUE` and
  /// `+TODAY`. Other terms join the search
  /// text.
  #[tracing::instrument(skip(terms))]
  pub fn parse(
    terms: &[String]
  ) -> anyhow::Result<Self> {
    let mut criteria = Self::default();
    let mut words: Vec<&str> = vec![];

    for term in terms {
      let term = term.as_str();
      if let Some(project) =
        term.strip_prefix("project:")
      {
        criteria.project_id =
          (!project.is_empty())
            .then(|| project.to_string());
        continue;
      }

      if let Some(status) =
        term.strip_prefix("status:")
      {
        criteria.completed = Some(
          match status
            .to_ascii_lowercase()
            .as_str()
          {
            | "completed" | "done" => {
              true
            }
            | "pending" | "open" => {
              false
            }
            | other => {
              return Err(anyhow::anyhow!(
                "unknown status filter: \
                 {other}"
              ));
            }
          }
        );
        continue;
      }

      if let Some(raw) =
        term.strip_prefix("due:")
      {
        let day =
          NaiveDate::parse_from_str(
            raw, "%Y-%m-%d"
          )
          .map_err(|err| {
            anyhow::anyhow!(
              "invalid due filter \
               {raw}: {err}"
            )
          })?;
        criteria.due_on = Some(day);
        continue;
      }

      match term {
        | "+OVERDUE" => {
          criteria.overdue_only = true
        }
        | "+TODAY" => {
          criteria.today_only = true
        }
        | _ => words.push(term)
      }
    }

    if !words.is_empty() {
      criteria.search =
        Some(words.join(" "));
    }

    debug!(?criteria, "parsed filter terms");
    Ok(criteria)
  }

  fn predicates(&self) -> Vec<Pred> {
    let mut preds = Vec::new();
    if let Some(completed) =
      self.completed
    {
      preds.push(Pred::CompletedEq(
        completed
      ));
    }
    if let Some(project) = self
      .project_id
      .as_ref()
      .filter(|p| !p.is_empty())
    {
      preds.push(Pred::ProjectEq(
        project.clone()
      ));
    }
    if let Some(search) = self
      .search
      .as_ref()
      .filter(|s| !s.is_empty())
    {
      preds.push(Pred::TextContains(
        search.to_lowercase()
      ));
    }
    if let Some(day) = self.due_on {
      preds.push(Pred::DueOn(day));
    }
    if self.overdue_only {
      preds.push(Pred::Bucket(
        Temporal::Overdue
      ));
    }
    if self.today_only {
      preds.push(Pred::Bucket(
        Temporal::DueToday
      ));
    }
    preds
  }
}

/// Tasks passing every active criterion,
/// in input order. The input is never
/// modified.
#[tracing::instrument(skip(
  tasks, criteria, now
))]
pub fn filter_tasks(
  tasks: &[Task],
  criteria: &FilterCriteria,
  now: &DateTime<Tz>
) -> Vec<Task> {
  let preds = criteria.predicates();
  let out: Vec<Task> = tasks
    .iter()
    .filter(|task| {
      preds.iter().all(|pred| {
        eval_pred(pred, task, now)
      })
    })
    .cloned()
    .collect();

  debug!(
    input = tasks.len(),
    kept = out.len(),
    predicates = preds.len(),
    "filtered tasks"
  );
  out
}

fn eval_pred(
  pred: &Pred,
  task: &Task,
  now: &DateTime<Tz>
) -> bool {
  let ok = match pred {
    | Pred::CompletedEq(completed) => {
      task.completed == *completed
    }
    | Pred::ProjectEq(project) => {
      task.project_id.as_deref()
        == Some(project.as_str())
    }
    | Pred::TextContains(needle) => {
      task
        .title
        .to_lowercase()
        .contains(needle.as_str())
    }
    | Pred::DueOn(day) => {
      task
        .due_date
        .map(|due| {
          local_date(due, &now.timezone())
            == *day
        })
        .unwrap_or(false)
    }
    | Pred::Bucket(bucket) => {
      is_pending_in(task, *bucket, now)
    }
  };

  trace!(pred = ?pred, id = task.id, uuid = %task.uuid, ok, "filter predicate evaluation");
  ok
}
