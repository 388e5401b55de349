use std::thread;
use std::time::Duration;

use anyhow::{Context, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::{debug, error, info, warn};

use crate::calendar::{CalendarGrid, build_grid};
use crate::filter::{FilterCriteria, filter_tasks};
use crate::quick_add;
use crate::repo::{ProjectRepository, TaskRepository};
use crate::sort::{SortOrder, sort_tasks};
use crate::stats::{TaskStats, aggregate, project_active_counts};
use crate::task::{Priority, Project, Task, TaskDraft};

pub const DEFAULT_RETRIES: u32 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// What a list screen shows: the filtered, sorted tasks plus counters over
/// the whole collection.
#[derive(Debug, Clone)]
pub struct TaskView {
    pub visible: Vec<Task>,
    pub stats: TaskStats,
}

/// Runs store operations and feeds their results through the engine.
#[derive(Debug)]
pub struct Tracker<S> {
    store: S,
    retries: u32,
    retry_delay: Duration,
}

impl<S> Tracker<S>
where
    S: TaskRepository + ProjectRepository,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            retries: DEFAULT_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_retries(mut self, retries: u32, delay: Duration) -> Self {
        self.retries = retries.max(1);
        self.retry_delay = delay;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Full task collection. After the last failed attempt the error is
    /// logged and an empty collection is returned.
    #[tracing::instrument(skip(self))]
    pub fn load_tasks(&self) -> Vec<Task> {
        match retry(self.retries, self.retry_delay, "load tasks", || {
            self.store.get_all_tasks()
        }) {
            Ok(tasks) => tasks,
            Err(err) => {
                error!(error = %format!("{err:#}"), "giving up loading tasks; showing empty list");
                vec![]
            }
        }
    }

    #[tracing::instrument(skip(self))]
    pub fn load_projects(&self) -> Vec<Project> {
        match retry(self.retries, self.retry_delay, "load projects", || {
            self.store.get_all_projects()
        }) {
            Ok(projects) => projects,
            Err(err) => {
                error!(error = %format!("{err:#}"), "giving up loading projects; showing empty list");
                vec![]
            }
        }
    }

    #[tracing::instrument(skip(self, criteria, now))]
    pub fn view(&self, criteria: &FilterCriteria, order: SortOrder, now: &DateTime<Tz>) -> TaskView {
        let all = self.load_tasks();
        let visible = sort_tasks(filter_tasks(&all, criteria, now), order);
        let stats = aggregate(&all, now);
        debug!(all = all.len(), visible = visible.len(), "built task view");
        TaskView { visible, stats }
    }

    /// Hands the month grid and the full collection it was built from to
    /// `render`.
    pub fn calendar<R>(
        &self,
        month: NaiveDate,
        now: &DateTime<Tz>,
        render: impl FnOnce(&CalendarGrid<'_>, &[Task]) -> R,
    ) -> R {
        let all = self.load_tasks();
        let grid = build_grid(month, &all, now);
        render(&grid, &all)
    }

    /// Parses `text` for a due date and creates the task under the cleaned
    /// title.
    #[tracing::instrument(skip(self, now))]
    pub fn quick_add(
        &mut self,
        text: &str,
        project_id: Option<String>,
        priority: Priority,
        now: &DateTime<Tz>,
    ) -> anyhow::Result<Task> {
        if text.trim().is_empty() {
            return Err(anyhow!("task text cannot be empty"));
        }
        if let Some(project) = project_id.as_deref() {
            self.store
                .get_project(project)
                .with_context(|| format!("cannot add task to project {project}"))?;
        }

        let parsed = quick_add::parse(text, now);
        let parsed_rule = parsed.rule;
        let draft = TaskDraft {
            title: parsed.title,
            project_id,
            due_date: parsed.implied_date,
            priority,
        };
        let task = self
            .store
            .create_task(draft, now.with_timezone(&Utc))
            .context("failed to create task")?;
        info!(id = task.id, due = ?task.due_date, rule = ?parsed_rule, "added task");
        Ok(task)
    }

    /// Marks each task by short id; ids that do not exist fail the call
    /// before anything is written.
    #[tracing::instrument(skip(self, now))]
    pub fn set_completed(
        &mut self,
        ids: &[u64],
        completed: bool,
        now: &DateTime<Tz>,
    ) -> anyhow::Result<Vec<Task>> {
        let targets = self.resolve_ids(ids)?;
        let stamp = now.with_timezone(&Utc);

        let mut changed = Vec::with_capacity(targets.len());
        for mut task in targets {
            if task.set_completed(completed, stamp) {
                changed.push(self.store.update_task(task)?);
            } else {
                debug!(id = task.id, completed, "task already in requested state");
            }
        }
        info!(count = changed.len(), completed, "updated completion");
        Ok(changed)
    }

    #[tracing::instrument(skip(self))]
    pub fn delete(&mut self, ids: &[u64]) -> anyhow::Result<Vec<Task>> {
        let targets = self.resolve_ids(ids)?;
        let mut removed = Vec::with_capacity(targets.len());
        for task in targets {
            removed.push(self.store.delete_task(task.uuid)?);
        }
        info!(count = removed.len(), "deleted tasks");
        Ok(removed)
    }

    #[tracing::instrument(skip(self, now))]
    pub fn create_project(
        &mut self,
        id: &str,
        name: &str,
        color: Option<String>,
        now: &DateTime<Tz>,
    ) -> anyhow::Result<Project> {
        let id = id.trim();
        if id.is_empty() || id.chars().any(char::is_whitespace) {
            return Err(anyhow!("project id must be a single non-empty word"));
        }
        let mut project = Project::new(
            id.to_string(),
            name.trim().to_string(),
            now.with_timezone(&Utc),
        );
        if let Some(color) = color {
            project.color = color;
        }
        self.store.create_project(project)
    }

    #[tracing::instrument(skip(self))]
    pub fn delete_project(&mut self, id: &str) -> anyhow::Result<Project> {
        let removed = self.store.delete_project(id)?;
        let orphaned = self
            .load_tasks()
            .iter()
            .filter(|t| t.project_id.as_deref() == Some(id))
            .count();
        if orphaned > 0 {
            warn!(project = id, orphaned, "deleted project still referenced by tasks");
        }
        Ok(removed)
    }

    /// Projects with `task_count` recomputed as their number of incomplete
    /// tasks. Counts that fail to persist are still returned.
    #[tracing::instrument(skip(self))]
    pub fn projects_with_active_counts(&mut self) -> Vec<Project> {
        let counts = project_active_counts(&self.load_tasks());
        let mut projects = self.load_projects();

        for project in &mut projects {
            let count = counts.get(&project.id).copied().unwrap_or(0);
            if project.task_count == count {
                continue;
            }
            project.task_count = count;
            if let Err(err) = self.store.update_task_count(&project.id, count) {
                warn!(project = %project.id, error = %format!("{err:#}"), "failed to persist task count");
            }
        }
        projects
    }

    fn resolve_ids(&self, ids: &[u64]) -> anyhow::Result<Vec<Task>> {
        if ids.is_empty() {
            return Err(anyhow!("no task ids given"));
        }
        let all = self.store.get_all_tasks()?;
        ids.iter()
            .map(|id| {
                all.iter()
                    .find(|t| t.id == *id)
                    .cloned()
                    .ok_or_else(|| anyhow!("no task with id {id}"))
            })
            .collect()
    }
}

/// Calls `op` up to `attempts` times, sleeping `delay * attempt` between
/// failures.
pub fn retry<T, F>(attempts: u32, delay: Duration, what: &str, mut op: F) -> anyhow::Result<T>
where
    F: FnMut() -> anyhow::Result<T>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => {
                if attempt > 1 {
                    info!(what, attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if attempt < attempts => {
                warn!(what, attempt, attempts, error = %format!("{err:#}"), "store operation failed; retrying");
                thread::sleep(delay * attempt);
                attempt += 1;
            }
            Err(err) => {
                return Err(err.context(format!("{what} failed after {attempts} attempts")));
            }
        }
    }
}
