use anyhow::anyhow;
use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::task::{Project, Task, TaskDraft};

/// Source of truth for task records. The engine only ever reads what
/// `get_all` returns.
pub trait TaskRepository {
    fn get_all_tasks(&self) -> anyhow::Result<Vec<Task>>;

    fn get_task(&self, uuid: Uuid) -> anyhow::Result<Task>;

    fn create_task(&mut self, draft: TaskDraft, now: DateTime<Utc>) -> anyhow::Result<Task>;

    /// Replaces the stored record with the same uuid.
    fn update_task(&mut self, task: Task) -> anyhow::Result<Task>;

    fn delete_task(&mut self, uuid: Uuid) -> anyhow::Result<Task>;
}

pub trait ProjectRepository {
    fn get_all_projects(&self) -> anyhow::Result<Vec<Project>>;

    fn get_project(&self, id: &str) -> anyhow::Result<Project>;

    fn create_project(&mut self, project: Project) -> anyhow::Result<Project>;

    fn update_project(&mut self, project: Project) -> anyhow::Result<Project>;

    fn delete_project(&mut self, id: &str) -> anyhow::Result<Project>;

    fn update_task_count(&mut self, id: &str, count: usize) -> anyhow::Result<Project> {
        let mut project = self.get_project(id)?;
        project.task_count = count;
        self.update_project(project)
    }
}

/// Rejects writes where `completed` and `completed_at` disagree.
pub fn ensure_consistent(task: &Task) -> anyhow::Result<()> {
    if task.is_consistent() {
        Ok(())
    } else {
        Err(anyhow!(
            "task {} has completed={} but completed_at={:?}",
            task.id,
            task.completed,
            task.completed_at
        ))
    }
}

pub fn next_id(tasks: &[Task]) -> u64 {
    tasks.iter().map(|t| t.id).max().unwrap_or(0) + 1
}

/// In-memory backend, typically seeded with fixture data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tasks: Vec<Task>,
    projects: Vec<Project>,
}

impl MemoryStore {
    pub fn new(tasks: Vec<Task>, projects: Vec<Project>) -> Self {
        info!(
            tasks = tasks.len(),
            projects = projects.len(),
            "seeded memory store"
        );
        Self { tasks, projects }
    }
}

impl TaskRepository for MemoryStore {
    fn get_all_tasks(&self) -> anyhow::Result<Vec<Task>> {
        Ok(self.tasks.clone())
    }

    fn get_task(&self, uuid: Uuid) -> anyhow::Result<Task> {
        self.tasks
            .iter()
            .find(|t| t.uuid == uuid)
            .cloned()
            .ok_or_else(|| anyhow!("task not found: {uuid}"))
    }

    #[tracing::instrument(skip(self, draft), fields(title = %draft.title))]
    fn create_task(&mut self, draft: TaskDraft, now: DateTime<Utc>) -> anyhow::Result<Task> {
        let task = draft.into_task(next_id(&self.tasks), now);
        debug!(id = task.id, uuid = %task.uuid, "created task");
        self.tasks.push(task.clone());
        Ok(task)
    }

    #[tracing::instrument(skip(self, task), fields(id = task.id, uuid = %task.uuid))]
    fn update_task(&mut self, task: Task) -> anyhow::Result<Task> {
        ensure_consistent(&task)?;
        let slot = self
            .tasks
            .iter_mut()
            .find(|t| t.uuid == task.uuid)
            .ok_or_else(|| anyhow!("task not found: {}", task.uuid))?;
        *slot = task.clone();
        Ok(task)
    }

    #[tracing::instrument(skip(self), fields(uuid = %uuid))]
    fn delete_task(&mut self, uuid: Uuid) -> anyhow::Result<Task> {
        let idx = self
            .tasks
            .iter()
            .position(|t| t.uuid == uuid)
            .ok_or_else(|| anyhow!("task not found: {uuid}"))?;
        Ok(self.tasks.remove(idx))
    }
}

impl ProjectRepository for MemoryStore {
    fn get_all_projects(&self) -> anyhow::Result<Vec<Project>> {
        Ok(self.projects.clone())
    }

    fn get_project(&self, id: &str) -> anyhow::Result<Project> {
        self.projects
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| anyhow!("project not found: {id}"))
    }

    #[tracing::instrument(skip(self, project), fields(id = %project.id))]
    fn create_project(&mut self, project: Project) -> anyhow::Result<Project> {
        if self.projects.iter().any(|p| p.id == project.id) {
            return Err(anyhow!("project already exists: {}", project.id));
        }
        self.projects.push(project.clone());
        Ok(project)
    }

    #[tracing::instrument(skip(self, project), fields(id = %project.id))]
    fn update_project(&mut self, project: Project) -> anyhow::Result<Project> {
        let slot = self
            .projects
            .iter_mut()
            .find(|p| p.id == project.id)
            .ok_or_else(|| anyhow!("project not found: {}", project.id))?;
        *slot = project.clone();
        Ok(project)
    }

    #[tracing::instrument(skip(self))]
    fn delete_project(&mut self, id: &str) -> anyhow::Result<Project> {
        let idx = self
            .projects
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| anyhow!("project not found: {id}"))?;
        Ok(self.projects.remove(idx))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{MemoryStore, ProjectRepository, TaskRepository};
    use crate::task::{Project, TaskDraft};

    #[test]
    fn crud_round_trip() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap();
        let mut store = MemoryStore::default();

        let first = store
            .create_task(
                TaskDraft {
                    title: "first".to_string(),
                    ..Default::default()
                },
                now,
            )
            .unwrap();
        let second = store
            .create_task(
                TaskDraft {
                    title: "second".to_string(),
                    ..Default::default()
                },
                now,
            )
            .unwrap();
        assert_eq!((first.id, second.id), (1, 2));
        assert!(!first.completed);
        assert_eq!(first.created_at, now);

        let mut edited = store.get_task(first.uuid).unwrap();
        edited.set_completed(true, now);
        store.update_task(edited).unwrap();
        assert!(store.get_task(first.uuid).unwrap().completed);

        let mut broken = store.get_task(second.uuid).unwrap();
        broken.completed = true;
        assert!(store.update_task(broken).is_err());
        assert!(!store.get_task(second.uuid).unwrap().completed);

        store.delete_task(second.uuid).unwrap();
        assert_eq!(store.get_all_tasks().unwrap().len(), 1);
        assert!(store.delete_task(second.uuid).is_err());
        assert!(store.get_task(second.uuid).is_err());
    }

    #[test]
    fn project_counts_and_duplicates() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap();
        let mut store = MemoryStore::default();
        store
            .create_project(Project::new("home".to_string(), "Home".to_string(), now))
            .unwrap();
        assert!(store
            .create_project(Project::new("home".to_string(), "Again".to_string(), now))
            .is_err());

        let updated = store.update_task_count("home", 4).unwrap();
        assert_eq!(updated.task_count, 4);
        assert_eq!(store.get_project("home").unwrap().task_count, 4);
        assert!(store.update_task_count("missing", 1).is_err());

        store.delete_project("home").unwrap();
        assert!(store.get_all_projects().unwrap().is_empty());
    }
}
