//! The relational backend contract.
//!
//! Everything in [`crate::sync`] talks to storage through [`Backend`]. The
//! trait covers the minimum surface the sync layer needs: filtered, sorted,
//! range-limited task reads; `IN (...)` joins for follow-ups and project
//! names; bulk writes by id list; and a change-notification channel.
//!
//! [`SqliteStorage`](super::SqliteStorage) is the reference implementation.

use std::future::Future;

use tokio::sync::broadcast;

use super::events::ChangeEvent;
use crate::error::Result;
use crate::model::{
    FollowUp, NewFollowUp, NewTask, Priority, Project, ProjectPatch, TaskId, TaskNumber,
    TaskPatch, TaskRow, TaskStatus, TimeEntry,
};

/// Status-class filter for task lists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    /// Everything not completed.
    #[default]
    Active,
    Open,
    InProgress,
    OnHold,
    /// Critical priority and not completed.
    Critical,
    All,
}

impl StatusFilter {
    /// Status set the filter admits, or `None` for no status restriction.
    #[must_use]
    pub fn statuses(self) -> Option<Vec<TaskStatus>> {
        match self {
            Self::Active | Self::Critical => Some(vec![
                TaskStatus::Open,
                TaskStatus::InProgress,
                TaskStatus::OnHold,
            ]),
            Self::Open => Some(vec![TaskStatus::Open]),
            Self::InProgress => Some(vec![TaskStatus::InProgress]),
            Self::OnHold => Some(vec![TaskStatus::OnHold]),
            Self::All => None,
        }
    }

    /// Priority the filter pins, if any.
    #[must_use]
    pub fn priority(self) -> Option<Priority> {
        matches!(self, Self::Critical).then_some(Priority::Critical)
    }

    /// In-memory evaluation of the same predicate the backend applies.
    #[must_use]
    pub fn admits(self, status: TaskStatus, priority: Priority) -> bool {
        self.statuses().is_none_or(|set| set.contains(&status))
            && self.priority().is_none_or(|p| p == priority)
    }
}

/// Backend-sortable task columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SortColumn {
    #[default]
    DueDate,
    Title,
    Responsible,
    TaskType,
    Environment,
    Sequence,
}

impl SortColumn {
    /// Storage column name.
    #[must_use]
    pub const fn column(&self) -> &'static str {
        match self {
            Self::DueDate => "due_date",
            Self::Title => "title",
            Self::Responsible => "responsible",
            Self::TaskType => "task_type",
            Self::Environment => "environment",
            Self::Sequence => "sequence",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    #[must_use]
    pub const fn sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Text clause for search mode: a case-insensitive substring match on
/// title/description/responsible, OR membership in `task_numbers` (tasks
/// whose follow-ups matched the same term).
///
/// Case folding is Unicode lowercasing (`Ü` matches `ü`), not full case
/// folding: `ß` does not match `SS`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextMatch {
    pub term: String,
    pub task_numbers: Vec<TaskNumber>,
}

/// Filter and order for a task query. Count and data reads built from the
/// same `TaskQuery` apply identical predicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskQuery {
    pub owner_id: String,
    pub filter: StatusFilter,
    pub project_id: Option<String>,
    pub text: Option<TextMatch>,
    pub order: SortColumn,
    pub direction: SortDirection,
}

impl TaskQuery {
    #[must_use]
    pub fn for_owner(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            ..Self::default()
        }
    }
}

/// Offset/limit range for a windowed read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: usize,
    pub limit: usize,
}

/// Rows removed by a cascading delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct Deletion {
    pub tasks: usize,
    pub follow_ups: usize,
}

/// Storage operations required by the sync layer.
///
/// All calls are non-blocking from the caller's point of view: they suspend
/// the calling operation until the backend answers. Implementations must be
/// shareable across tasks.
pub trait Backend: Send + Sync {
    // ── Task reads ───────────────────────────────────────────

    /// Number of tasks matching the query.
    fn count_tasks(&self, query: &TaskQuery) -> impl Future<Output = Result<usize>> + Send;

    /// Tasks matching the query in its order; the whole set when `window` is `None`.
    fn fetch_tasks(
        &self,
        query: &TaskQuery,
        window: Option<Window>,
    ) -> impl Future<Output = Result<Vec<TaskRow>>> + Send;

    fn get_task(
        &self,
        owner_id: &str,
        number: &TaskNumber,
    ) -> impl Future<Output = Result<Option<TaskRow>>> + Send;

    fn get_task_by_id(&self, id: TaskId) -> impl Future<Output = Result<Option<TaskRow>>> + Send;

    /// The root with `id` (if it still exists) plus every task whose
    /// `parent_task_id` is `id`.
    fn series_members(&self, root_id: TaskId) -> impl Future<Output = Result<Vec<TaskRow>>> + Send;

    // ── Task writes ──────────────────────────────────────────

    /// Insert a task, assigning the owner's next sequence number.
    fn insert_task(&self, task: &NewTask) -> impl Future<Output = Result<TaskRow>> + Send;

    /// Apply a patch to one task and return the stored result.
    fn update_task(
        &self,
        id: TaskId,
        patch: &TaskPatch,
    ) -> impl Future<Output = Result<TaskRow>> + Send;

    /// Apply the same patch to every listed task. Returns rows touched.
    fn update_tasks(
        &self,
        ids: &[TaskId],
        patch: &TaskPatch,
    ) -> impl Future<Output = Result<usize>> + Send;

    /// Delete task rows with their follow-ups and time entries, all in one
    /// transaction. Unknown ids are skipped.
    fn delete_tasks(&self, ids: &[TaskId]) -> impl Future<Output = Result<Deletion>> + Send;

    // ── Follow-ups ───────────────────────────────────────────

    /// All follow-ups for the listed tasks, oldest first.
    fn follow_ups_for(
        &self,
        owner_id: &str,
        numbers: &[TaskNumber],
    ) -> impl Future<Output = Result<Vec<FollowUp>>> + Send;

    /// Task numbers whose follow-up text contains `term` (case-insensitive).
    fn task_numbers_with_follow_up_text(
        &self,
        owner_id: &str,
        term: &str,
    ) -> impl Future<Output = Result<Vec<TaskNumber>>> + Send;

    fn get_follow_up(&self, id: i64) -> impl Future<Output = Result<Option<FollowUp>>> + Send;

    /// Bulk insert, all owned by `owner_id`.
    fn insert_follow_ups(
        &self,
        owner_id: &str,
        entries: &[NewFollowUp],
    ) -> impl Future<Output = Result<Vec<FollowUp>>> + Send;

    fn update_follow_up(
        &self,
        id: i64,
        text: &str,
        created_at: i64,
    ) -> impl Future<Output = Result<FollowUp>> + Send;

    fn delete_follow_up(&self, id: i64) -> impl Future<Output = Result<()>> + Send;

    // ── Projects ─────────────────────────────────────────────

    /// `(id, name)` for each listed project that exists.
    fn project_names(
        &self,
        ids: &[String],
    ) -> impl Future<Output = Result<Vec<(String, String)>>> + Send;

    fn get_project(&self, id: &str) -> impl Future<Output = Result<Option<Project>>> + Send;

    fn list_projects(&self, owner_id: &str) -> impl Future<Output = Result<Vec<Project>>> + Send;

    fn insert_project(&self, project: &Project) -> impl Future<Output = Result<()>> + Send;

    fn update_project(
        &self,
        id: &str,
        patch: &ProjectPatch,
    ) -> impl Future<Output = Result<Project>> + Send;

    /// Delete a project, its tasks and their follow-ups.
    fn delete_project(&self, id: &str) -> impl Future<Output = Result<Deletion>> + Send;

    // ── Time entries ─────────────────────────────────────────

    fn running_time_entry(
        &self,
        owner_id: &str,
        number: &TaskNumber,
    ) -> impl Future<Output = Result<Option<TimeEntry>>> + Send;

    fn time_entries_for(
        &self,
        owner_id: &str,
        number: &TaskNumber,
    ) -> impl Future<Output = Result<Vec<TimeEntry>>> + Send;

    fn insert_time_entry(
        &self,
        owner_id: &str,
        number: &TaskNumber,
        started_at: i64,
    ) -> impl Future<Output = Result<TimeEntry>> + Send;

    fn finish_time_entry(
        &self,
        id: i64,
        ended_at: i64,
    ) -> impl Future<Output = Result<TimeEntry>> + Send;

    // ── Notifications ────────────────────────────────────────

    /// Subscribe to change notifications for every table.
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_admits() {
        use TaskStatus::{Completed, InProgress, OnHold, Open};

        assert!(StatusFilter::Active.admits(OnHold, Priority::Low));
        assert!(!StatusFilter::Active.admits(Completed, Priority::Low));
        assert!(StatusFilter::Open.admits(Open, Priority::High));
        assert!(!StatusFilter::Open.admits(InProgress, Priority::High));
        assert!(StatusFilter::Critical.admits(InProgress, Priority::Critical));
        assert!(!StatusFilter::Critical.admits(InProgress, Priority::High));
        assert!(!StatusFilter::Critical.admits(Completed, Priority::Critical));
        assert!(StatusFilter::All.admits(Completed, Priority::Low));
    }
}
