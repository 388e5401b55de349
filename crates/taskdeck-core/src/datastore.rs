use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info};
use uuid::Uuid;

use crate::repo::{ProjectRepository, TaskRepository, ensure_consistent, next_id};
use crate::task::{Project, Task, TaskDraft};

/// JSON-lines backend: one record per line, files rewritten atomically.
#[derive(Debug)]
pub struct FileStore {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
    pub projects_path: PathBuf,
}

impl FileStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let tasks_path = data_dir.join("tasks.data");
        let projects_path = data_dir.join("projects.data");

        for path in [&tasks_path, &projects_path] {
            if !path.exists() {
                fs::write(path, "")
                    .with_context(|| format!("failed to create {}", path.display()))?;
            }
        }

        info!(
            data_dir = %data_dir.display(),
            tasks = %tasks_path.display(),
            projects = %projects_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            tasks_path,
            projects_path,
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn load_tasks(&self) -> anyhow::Result<Vec<Task>> {
        load_jsonl(&self.tasks_path).context("failed to load tasks.data")
    }

    #[tracing::instrument(skip(self, tasks))]
    pub fn save_tasks(&self, tasks: &[Task]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.tasks_path, tasks).context("failed to save tasks.data")
    }

    #[tracing::instrument(skip(self))]
    pub fn load_projects(&self) -> anyhow::Result<Vec<Project>> {
        load_jsonl(&self.projects_path).context("failed to load projects.data")
    }

    #[tracing::instrument(skip(self, projects))]
    pub fn save_projects(&self, projects: &[Project]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.projects_path, projects).context("failed to save projects.data")
    }
}

impl TaskRepository for FileStore {
    fn get_all_tasks(&self) -> anyhow::Result<Vec<Task>> {
        self.load_tasks()
    }

    fn get_task(&self, uuid: Uuid) -> anyhow::Result<Task> {
        self.load_tasks()?
            .into_iter()
            .find(|t| t.uuid == uuid)
            .ok_or_else(|| anyhow!("task not found: {uuid}"))
    }

    #[tracing::instrument(skip(self, draft), fields(title = %draft.title))]
    fn create_task(&mut self, draft: TaskDraft, now: DateTime<Utc>) -> anyhow::Result<Task> {
        let mut tasks = self.load_tasks()?;
        let task = draft.into_task(next_id(&tasks), now);
        tasks.push(task.clone());
        tasks.sort_by_key(|t| t.id);
        self.save_tasks(&tasks)?;
        debug!(id = task.id, uuid = %task.uuid, "created task");
        Ok(task)
    }

    #[tracing::instrument(skip(self, task), fields(id = task.id, uuid = %task.uuid))]
    fn update_task(&mut self, task: Task) -> anyhow::Result<Task> {
        ensure_consistent(&task)?;
        let mut tasks = self.load_tasks()?;
        let slot = tasks
            .iter_mut()
            .find(|t| t.uuid == task.uuid)
            .ok_or_else(|| anyhow!("task not found: {}", task.uuid))?;
        *slot = task.clone();
        self.save_tasks(&tasks)?;
        Ok(task)
    }

    #[tracing::instrument(skip(self), fields(uuid = %uuid))]
    fn delete_task(&mut self, uuid: Uuid) -> anyhow::Result<Task> {
        let mut tasks = self.load_tasks()?;
        let idx = tasks
            .iter()
            .position(|t| t.uuid == uuid)
            .ok_or_else(|| anyhow!("task not found: {uuid}"))?;
        let removed = tasks.remove(idx);
        self.save_tasks(&tasks)?;
        info!(id = removed.id, remaining = tasks.len(), "deleted task");
        Ok(removed)
    }
}

impl ProjectRepository for FileStore {
    fn get_all_projects(&self) -> anyhow::Result<Vec<Project>> {
        self.load_projects()
    }

    fn get_project(&self, id: &str) -> anyhow::Result<Project> {
        self.load_projects()?
            .into_iter()
            .find(|p| p.id == id)
            .ok_or_else(|| anyhow!("project not found: {id}"))
    }

    #[tracing::instrument(skip(self, project), fields(id = %project.id))]
    fn create_project(&mut self, project: Project) -> anyhow::Result<Project> {
        let mut projects = self.load_projects()?;
        if projects.iter().any(|p| p.id == project.id) {
            return Err(anyhow!("project already exists: {}", project.id));
        }
        projects.push(project.clone());
        self.save_projects(&projects)?;
        Ok(project)
    }

    #[tracing::instrument(skip(self, project), fields(id = %project.id))]
    fn update_project(&mut self, project: Project) -> anyhow::Result<Project> {
        let mut projects = self.load_projects()?;
        let slot = projects
            .iter_mut()
            .find(|p| p.id == project.id)
            .ok_or_else(|| anyhow!("project not found: {}", project.id))?;
        *slot = project.clone();
        self.save_projects(&projects)?;
        Ok(project)
    }

    #[tracing::instrument(skip(self))]
    fn delete_project(&mut self, id: &str) -> anyhow::Result<Project> {
        let mut projects = self.load_projects()?;
        let idx = projects
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| anyhow!("project not found: {id}"))?;
        let removed = projects.remove(idx);
        self.save_projects(&projects)?;
        Ok(removed)
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let record: T = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(record);
    }

    debug!(count = out.len(), "loaded records from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, records))]
fn save_jsonl_atomic<T: Serialize>(path: &Path, records: &[T]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = records.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for record in records {
        let serialized = serde_json::to_string(record)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
