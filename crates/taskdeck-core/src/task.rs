use std::fmt;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::datetime::instant_serde;

pub const DEFAULT_PROJECT_COLOR: &str = "#5B21B6";

/// Task urgency; 1 is the highest.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum Priority {
    High = 1,
    Medium = 2,
    #[default]
    Low = 3,
}

impl Priority {
    pub fn rank(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
        }
    }
}

impl TryFrom<u8> for Priority {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Priority::High),
            2 => Ok(Priority::Medium),
            3 => Ok(Priority::Low),
            other => Err(anyhow!("priority must be 1, 2 or 3, got {other}")),
        }
    }
}

impl From<Priority> for u8 {
    fn from(value: Priority) -> Self {
        value.rank()
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.rank())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", from = "TaskRecord")]
pub struct Task {
    pub uuid: Uuid,

    pub id: u64,

    pub title: String,

    pub completed: bool,

    pub project_id: Option<String>,

    #[serde(with = "instant_serde::option")]
    pub due_date: Option<DateTime<Utc>>,

    pub priority: Priority,

    #[serde(with = "instant_serde")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "instant_serde::option")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// On-disk shape of a task, before completion is reconciled.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskRecord {
    uuid: Uuid,
    id: u64,
    title: String,
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default, with = "instant_serde::option")]
    due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    priority: Priority,
    #[serde(with = "instant_serde")]
    created_at: DateTime<Utc>,
    #[serde(default, with = "instant_serde::option")]
    completed_at: Option<DateTime<Utc>>,
}

impl From<TaskRecord> for Task {
    /// A completed record without a usable stamp is dated at its creation;
    /// an open record drops any stray stamp.
    fn from(record: TaskRecord) -> Self {
        let completed_at = if record.completed {
            Some(record.completed_at.unwrap_or(record.created_at))
        } else {
            None
        };
        Self {
            uuid: record.uuid,
            id: record.id,
            title: record.title,
            completed: record.completed,
            project_id: record.project_id,
            due_date: record.due_date,
            priority: record.priority,
            created_at: record.created_at,
            completed_at,
        }
    }
}

impl Task {
    pub fn new(title: String, now: DateTime<Utc>, id: u64) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            id,
            title,
            completed: false,
            project_id: None,
            due_date: None,
            priority: Priority::default(),
            created_at: now,
            completed_at: None,
        }
    }

    /// Flips completion, keeping `completed_at` set exactly when `completed`
    /// is true. Returns whether anything changed.
    pub fn set_completed(&mut self, completed: bool, now: DateTime<Utc>) -> bool {
        if self.completed == completed {
            return false;
        }
        self.completed = completed;
        self.completed_at = completed.then_some(now);
        true
    }

    pub fn is_consistent(&self) -> bool {
        self.completed == self.completed_at.is_some()
    }
}

/// Fields supplied by a caller creating a task; identity and timestamps are
/// assigned by the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskDraft {
    pub title: String,
    pub project_id: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Priority,
}

impl TaskDraft {
    pub fn into_task(self, id: u64, now: DateTime<Utc>) -> Task {
        let mut task = Task::new(self.title, now, id);
        task.project_id = self.project_id;
        task.due_date = self.due_date;
        task.priority = self.priority;
        task
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,

    pub name: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default)]
    pub task_count: usize,

    #[serde(with = "instant_serde")]
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn new(id: String, name: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name,
            color: default_color(),
            task_count: 0,
            created_at: now,
        }
    }
}

fn default_color() -> String {
    DEFAULT_PROJECT_COLOR.to_string()
}
