//! Backend doubles for tests.

use tokio::sync::broadcast;

use super::backend::{Backend, Deletion, TaskQuery, Window};
use super::events::ChangeEvent;
use super::sqlite::SqliteStorage;
use crate::error::{Error, Result};
use crate::model::{
    FollowUp, NewFollowUp, NewTask, Project, ProjectPatch, TaskId, TaskNumber, TaskPatch, TaskRow,
    TimeEntry,
};

/// SQLite storage whose follow-up and project-name joins always fail.
///
/// Task reads and writes go through untouched, so the failure rules of
/// hydration and auditing can be observed against real rows.
#[derive(Clone)]
pub struct BrokenJoins {
    pub inner: SqliteStorage,
}

impl BrokenJoins {
    pub fn new() -> Self {
        Self {
            inner: SqliteStorage::open_memory().unwrap(),
        }
    }
}

fn unavailable(what: &str) -> Error {
    Error::Other(format!("{what} unavailable"))
}

impl Backend for BrokenJoins {
    async fn count_tasks(&self, query: &TaskQuery) -> Result<usize> {
        self.inner.count_tasks(query).await
    }

    async fn fetch_tasks(&self, query: &TaskQuery, window: Option<Window>) -> Result<Vec<TaskRow>> {
        self.inner.fetch_tasks(query, window).await
    }

    async fn get_task(&self, owner_id: &str, number: &TaskNumber) -> Result<Option<TaskRow>> {
        self.inner.get_task(owner_id, number).await
    }

    async fn get_task_by_id(&self, id: TaskId) -> Result<Option<TaskRow>> {
        self.inner.get_task_by_id(id).await
    }

    async fn series_members(&self, root_id: TaskId) -> Result<Vec<TaskRow>> {
        self.inner.series_members(root_id).await
    }

    async fn insert_task(&self, task: &NewTask) -> Result<TaskRow> {
        self.inner.insert_task(task).await
    }

    async fn update_task(&self, id: TaskId, patch: &TaskPatch) -> Result<TaskRow> {
        self.inner.update_task(id, patch).await
    }

    async fn update_tasks(&self, ids: &[TaskId], patch: &TaskPatch) -> Result<usize> {
        self.inner.update_tasks(ids, patch).await
    }

    async fn delete_tasks(&self, ids: &[TaskId]) -> Result<Deletion> {
        self.inner.delete_tasks(ids).await
    }

    async fn follow_ups_for(&self, _owner_id: &str, _numbers: &[TaskNumber]) -> Result<Vec<FollowUp>> {
        Err(unavailable("follow-ups"))
    }

    async fn task_numbers_with_follow_up_text(&self, owner_id: &str, term: &str) -> Result<Vec<TaskNumber>> {
        self.inner.task_numbers_with_follow_up_text(owner_id, term).await
    }

    async fn get_follow_up(&self, id: i64) -> Result<Option<FollowUp>> {
        self.inner.get_follow_up(id).await
    }

    async fn insert_follow_ups(&self, _owner_id: &str, _entries: &[NewFollowUp]) -> Result<Vec<FollowUp>> {
        Err(unavailable("follow-up writes"))
    }

    async fn update_follow_up(&self, id: i64, text: &str, created_at: i64) -> Result<FollowUp> {
        self.inner.update_follow_up(id, text, created_at).await
    }

    async fn delete_follow_up(&self, id: i64) -> Result<()> {
        self.inner.delete_follow_up(id).await
    }

    async fn project_names(&self, _ids: &[String]) -> Result<Vec<(String, String)>> {
        Err(unavailable("project names"))
    }

    async fn get_project(&self, id: &str) -> Result<Option<Project>> {
        self.inner.get_project(id).await
    }

    async fn list_projects(&self, owner_id: &str) -> Result<Vec<Project>> {
        self.inner.list_projects(owner_id).await
    }

    async fn insert_project(&self, project: &Project) -> Result<()> {
        self.inner.insert_project(project).await
    }

    async fn update_project(&self, id: &str, patch: &ProjectPatch) -> Result<Project> {
        self.inner.update_project(id, patch).await
    }

    async fn delete_project(&self, id: &str) -> Result<Deletion> {
        self.inner.delete_project(id).await
    }

    async fn running_time_entry(&self, owner_id: &str, number: &TaskNumber) -> Result<Option<TimeEntry>> {
        self.inner.running_time_entry(owner_id, number).await
    }

    async fn time_entries_for(&self, owner_id: &str, number: &TaskNumber) -> Result<Vec<TimeEntry>> {
        self.inner.time_entries_for(owner_id, number).await
    }

    async fn insert_time_entry(&self, owner_id: &str, number: &TaskNumber, started_at: i64) -> Result<TimeEntry> {
        self.inner.insert_time_entry(owner_id, number, started_at).await
    }

    async fn finish_time_entry(&self, id: i64, ended_at: i64) -> Result<TimeEntry> {
        self.inner.finish_time_entry(id, ended_at).await
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.inner.subscribe()
    }
}
