//! Owner-scoped entry point over the sync layer.
//!
//! [`Workspace`] binds a backend, a name cache and an owner, and exposes the
//! operations a client issues: task and project CRUD, follow-ups, checklist
//! and link sub-edits, series operations, timers and paged reads. Every
//! task write goes through the audit generator.

use chrono::Utc;
use tracing::{debug, warn};

use super::audit::plan_update;
use super::batch::BatchLoader;
use super::name_cache::NameCache;
use super::pagination::{ListRequest, Page, PageController};
use super::recurrence::{RecurrenceManager, SeriesFields, SeriesOutcome, SeriesRef, resolve_series};
use super::timer::TimeTracker;
use crate::error::{Error, Result};
use crate::model::{
    ChecklistItem, FollowUp, LinkCategory, NewFollowUp, NewTask, Project, ProjectPatch, Task,
    TaskNumber, TaskPatch, TaskRow,
};
use crate::storage::{Backend, Deletion};

pub struct Workspace<B> {
    backend: B,
    cache: NameCache,
    owner_id: String,
}

impl<B: Backend> Workspace<B> {
    #[must_use]
    pub fn new(backend: B, owner_id: impl Into<String>) -> Self {
        Self {
            backend,
            cache: NameCache::new(),
            owner_id: owner_id.into(),
        }
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[must_use]
    pub fn cache(&self) -> &NameCache {
        &self.cache
    }

    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner_id
    }

    #[must_use]
    pub fn loader(&self) -> BatchLoader<'_, B> {
        BatchLoader::new(&self.backend, &self.cache)
    }

    #[must_use]
    pub fn pages(&self) -> PageController<'_, B> {
        PageController::new(&self.backend, &self.cache)
    }

    #[must_use]
    pub fn series(&self) -> RecurrenceManager<'_, B> {
        RecurrenceManager::new(&self.backend)
    }

    #[must_use]
    pub fn timers(&self) -> TimeTracker<'_, B> {
        TimeTracker::new(&self.backend, &self.owner_id)
    }

    /// A list request scoped to this owner.
    #[must_use]
    pub fn list_request(&self) -> ListRequest {
        ListRequest::new(self.owner_id.clone())
    }

    /// # Errors
    ///
    /// Returns an error if a backend read fails.
    pub async fn fetch_page(&self, request: &ListRequest) -> Result<Page<Task>> {
        self.pages().fetch(request).await
    }

    // ==================
    // Tasks
    // ==================

    /// Create a task owned by this workspace's owner.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a blank title or a recurring root that
    /// also names a parent, and `ProjectNotFound` for an unknown project.
    pub async fn create_task(&self, mut task: NewTask) -> Result<Task> {
        task.title = task.title.trim().to_string();
        if task.title.is_empty() {
            return Err(Error::InvalidArgument("task title cannot be empty".to_string()));
        }
        if task.is_recurring && task.parent_task_id.is_some() {
            return Err(Error::InvalidArgument(
                "a series occurrence cannot itself be recurring".to_string(),
            ));
        }
        if let Some(project_id) = &task.project_id {
            self.project(project_id).await?;
        }
        task.owner_id.clone_from(&self.owner_id);

        let row = self.backend.insert_task(&task).await?;
        debug!(task = %row.task_number, "task created");
        Ok(self.loader().hydrate_one(row).await)
    }

    /// # Errors
    ///
    /// Returns `TaskNotFound` if the task does not exist.
    pub async fn task(&self, number: &TaskNumber) -> Result<Task> {
        self.loader().load_one(&self.owner_id, number).await
    }

    /// Update a task, recording tracked field changes in its trail.
    ///
    /// The update is stored first; a failure to write the audit entries is
    /// logged and does not fail the call.
    ///
    /// # Errors
    ///
    /// Returns `TaskNotFound`, `ProjectNotFound`, `InvalidArgument` when an
    /// occurrence is marked recurring, or the backend's write error.
    pub async fn update_task(&self, number: &TaskNumber, patch: &TaskPatch) -> Result<Task> {
        let prev = self.row(number).await?;
        if patch.is_recurring == Some(true) && prev.parent_task_id.is_some() {
            return Err(Error::InvalidArgument(format!(
                "{number} is an occurrence of a series and cannot itself be recurring"
            )));
        }
        if let Some(Some(project_id)) = &patch.project_id {
            self.project(project_id).await?;
        }
        if patch.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(Error::InvalidArgument("task title cannot be empty".to_string()));
        }

        let plan = plan_update(&prev, patch, Utc::now());
        let row = self.backend.update_task(prev.id, &plan.patch).await?;

        if !plan.entries.is_empty() {
            if let Err(e) = self.backend.insert_follow_ups(&self.owner_id, &plan.entries).await {
                warn!(task = %number, entries = plan.entries.len(), error = %e, "audit entries not recorded");
            }
        }
        Ok(self.loader().hydrate_one(row).await)
    }

    /// Delete a task with its follow-ups and time entries.
    ///
    /// # Errors
    ///
    /// Returns `TaskNotFound` if the task does not exist.
    pub async fn delete_task(&self, number: &TaskNumber) -> Result<()> {
        let row = self.row(number).await?;
        let deleted = self.backend.delete_tasks(&[row.id]).await?;
        debug!(task = %number, follow_ups = deleted.follow_ups, "task deleted");
        Ok(())
    }

    async fn row(&self, number: &TaskNumber) -> Result<TaskRow> {
        self.backend
            .get_task(&self.owner_id, number)
            .await?
            .ok_or_else(|| Error::TaskNotFound { id: number.to_string() })
    }

    // ==================
    // Checklist and Links
    // ==================

    /// # Errors
    ///
    /// Returns `TaskNotFound` or `InvalidArgument` for blank text.
    pub async fn add_checklist_item(&self, number: &TaskNumber, text: &str) -> Result<Task> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::InvalidArgument("checklist item cannot be empty".to_string()));
        }
        let mut checklist = self.row(number).await?.checklist;
        checklist.push(ChecklistItem::new(text));
        self.write_checklist(number, checklist).await
    }

    /// Flip the completed flag of the item at `index` (0-based).
    ///
    /// # Errors
    ///
    /// Returns `TaskNotFound` or `InvalidArgument` for an out-of-range index.
    pub async fn toggle_checklist_item(&self, number: &TaskNumber, index: usize) -> Result<Task> {
        let mut checklist = self.row(number).await?.checklist;
        let item = checklist
            .get_mut(index)
            .ok_or_else(|| checklist_index_error(index))?;
        item.completed = !item.completed;
        self.write_checklist(number, checklist).await
    }

    /// # Errors
    ///
    /// Returns `TaskNotFound` or `InvalidArgument` for an out-of-range index.
    pub async fn remove_checklist_item(&self, number: &TaskNumber, index: usize) -> Result<Task> {
        let mut checklist = self.row(number).await?.checklist;
        if index >= checklist.len() {
            return Err(checklist_index_error(index));
        }
        checklist.remove(index);
        self.write_checklist(number, checklist).await
    }

    async fn write_checklist(&self, number: &TaskNumber, checklist: Vec<ChecklistItem>) -> Result<Task> {
        let patch = TaskPatch {
            checklist: Some(checklist),
            ..TaskPatch::default()
        };
        self.update_task(number, &patch).await
    }

    /// Add a link; returns the task and the new link's id.
    ///
    /// # Errors
    ///
    /// Returns `TaskNotFound` or `InvalidArgument` for a blank URL.
    pub async fn add_link(
        &self,
        number: &TaskNumber,
        category: LinkCategory,
        name: &str,
        url: &str,
    ) -> Result<(Task, String)> {
        if url.trim().is_empty() {
            return Err(Error::InvalidArgument("link url cannot be empty".to_string()));
        }
        let mut links = self.row(number).await?.links;
        let name = if name.trim().is_empty() { url } else { name };
        let id = links.add(category, name.trim(), url.trim());

        let patch = TaskPatch {
            links: Some(links),
            ..TaskPatch::default()
        };
        Ok((self.update_task(number, &patch).await?, id))
    }

    /// # Errors
    ///
    /// Returns `TaskNotFound` or `InvalidArgument` if the link is unknown.
    pub async fn remove_link(&self, number: &TaskNumber, link_id: &str) -> Result<Task> {
        let mut links = self.row(number).await?.links;
        if !links.remove(link_id) {
            return Err(Error::InvalidArgument(format!("no link '{link_id}' on {number}")));
        }
        let patch = TaskPatch {
            links: Some(links),
            ..TaskPatch::default()
        };
        self.update_task(number, &patch).await
    }

    // ==================
    // Follow-ups
    // ==================

    /// Add a user note to a task, stamped with the task's current status.
    ///
    /// # Errors
    ///
    /// Returns `TaskNotFound` or `InvalidArgument` for blank text.
    pub async fn add_follow_up(&self, number: &TaskNumber, text: &str) -> Result<FollowUp> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::InvalidArgument("follow-up text cannot be empty".to_string()));
        }
        let row = self.row(number).await?;
        let entry = NewFollowUp {
            task_number: row.task_number,
            text: text.to_string(),
            created_at: Utc::now().timestamp_millis(),
            task_status: row.status,
        };

        self.backend
            .insert_follow_ups(&self.owner_id, std::slice::from_ref(&entry))
            .await?
            .pop()
            .ok_or_else(|| Error::Other("follow-up insert returned no row".to_string()))
    }

    /// Edit a user note's text and, optionally, its timestamp.
    ///
    /// # Errors
    ///
    /// Returns `FollowUpNotFound`, or `AuditEntryImmutable` for audit entries.
    pub async fn edit_follow_up(&self, id: i64, text: &str, created_at: Option<i64>) -> Result<FollowUp> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::InvalidArgument("follow-up text cannot be empty".to_string()));
        }
        let existing = self.user_follow_up(id).await?;
        self.backend
            .update_follow_up(id, text, created_at.unwrap_or(existing.created_at))
            .await
    }

    /// # Errors
    ///
    /// Returns `FollowUpNotFound`, or `AuditEntryImmutable` for audit entries.
    pub async fn delete_follow_up(&self, id: i64) -> Result<()> {
        self.user_follow_up(id).await?;
        self.backend.delete_follow_up(id).await
    }

    async fn user_follow_up(&self, id: i64) -> Result<FollowUp> {
        let follow_up = self
            .backend
            .get_follow_up(id)
            .await?
            .ok_or(Error::FollowUpNotFound { id })?;
        if follow_up.is_audit() {
            return Err(Error::AuditEntryImmutable { id });
        }
        Ok(follow_up)
    }

    // ==================
    // Projects
    // ==================

    /// # Errors
    ///
    /// Returns `InvalidArgument` for a blank name and `DuplicateProjectName`
    /// if the owner already has a project with that name.
    pub async fn create_project(&self, name: &str, description: Option<&str>) -> Result<Project> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidArgument("project name cannot be empty".to_string()));
        }
        let mut project = Project::new(self.owner_id.clone(), name);
        project.description = description.map(str::to_string);

        self.backend.insert_project(&project).await?;
        self.cache.insert(project.id.clone(), project.name.clone());
        Ok(project)
    }

    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    pub async fn projects(&self) -> Result<Vec<Project>> {
        let projects = self.backend.list_projects(&self.owner_id).await?;
        self.cache
            .merge(projects.iter().map(|p| (p.id.clone(), p.name.clone())));
        Ok(projects)
    }

    /// Find a project by id, or by name case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns `ProjectNotFound` if nothing matches.
    pub async fn find_project(&self, key: &str) -> Result<Project> {
        if let Some(project) = self.backend.get_project(key).await? {
            if project.owner_id == self.owner_id {
                return Ok(project);
            }
        }
        self.projects()
            .await?
            .into_iter()
            .find(|p| p.name.eq_ignore_ascii_case(key.trim()))
            .ok_or_else(|| Error::ProjectNotFound { id: key.to_string() })
    }

    /// Rename a project and refresh its cached display name.
    ///
    /// # Errors
    ///
    /// Returns `ProjectNotFound` or `DuplicateProjectName`.
    pub async fn rename_project(&self, id: &str, name: &str) -> Result<Project> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidArgument("project name cannot be empty".to_string()));
        }
        self.project(id).await?;

        let patch = ProjectPatch {
            name: Some(name.to_string()),
            ..ProjectPatch::default()
        };
        let project = self.backend.update_project(id, &patch).await?;
        self.cache.insert(project.id.clone(), project.name.clone());
        Ok(project)
    }

    /// Delete a project, its tasks and their follow-ups.
    ///
    /// # Errors
    ///
    /// Returns `ProjectNotFound` if the project does not exist.
    pub async fn delete_project(&self, id: &str) -> Result<Deletion> {
        self.project(id).await?;
        let deleted = self.backend.delete_project(id).await?;
        self.cache.invalidate(id);
        Ok(deleted)
    }

    async fn project(&self, id: &str) -> Result<Project> {
        self.backend
            .get_project(id)
            .await?
            .filter(|p| p.owner_id == self.owner_id)
            .ok_or_else(|| Error::ProjectNotFound { id: id.to_string() })
    }

    // ==================
    // Series
    // ==================

    /// Delete the whole series `number` belongs to.
    ///
    /// # Errors
    ///
    /// Returns `TaskNotFound` if the task does not exist.
    pub async fn delete_series(&self, number: &TaskNumber) -> Result<SeriesOutcome> {
        match resolve_series(&self.row(number).await?) {
            SeriesRef::Root(root_id) => self.series().delete_series(root_id).await,
            SeriesRef::NotInSeries => Ok(SeriesOutcome::NotInSeries),
        }
    }

    /// Apply the series-wide subset of `patch` to the whole series.
    ///
    /// # Errors
    ///
    /// Returns `TaskNotFound` if the task does not exist.
    pub async fn update_series(&self, number: &TaskNumber, patch: &TaskPatch) -> Result<SeriesOutcome> {
        match resolve_series(&self.row(number).await?) {
            SeriesRef::Root(root_id) => {
                self.series()
                    .update_series(root_id, &SeriesFields::from_patch(patch))
                    .await
            }
            SeriesRef::NotInSeries => Ok(SeriesOutcome::NotInSeries),
        }
    }

    /// Create the next occurrence of the series `number` belongs to.
    ///
    /// # Errors
    ///
    /// Returns `TaskNotFound`, or `InvalidArgument` if the task is not in a
    /// recurring series.
    pub async fn spawn_next(&self, number: &TaskNumber) -> Result<Option<Task>> {
        let SeriesRef::Root(root_id) = resolve_series(&self.row(number).await?) else {
            return Err(Error::InvalidArgument(format!("{number} is not part of a series")));
        };
        let spawned = self
            .series()
            .spawn_next_instance(root_id, Utc::now().date_naive())
            .await?;
        match spawned {
            Some(row) => Ok(Some(self.loader().hydrate_one(row).await)),
            None => Ok(None),
        }
    }
}

fn checklist_index_error(index: usize) -> Error {
    Error::InvalidArgument(format!("no checklist item at position {}", index + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{COMPLETED_TEXT, Priority, RecurrenceRule, RecurrenceType, TaskStatus};
    use crate::storage::SqliteStorage;
    use crate::storage::testing::BrokenJoins;

    fn workspace() -> Workspace<SqliteStorage> {
        Workspace::new(SqliteStorage::open_memory().unwrap(), "alice")
    }

    #[tokio::test]
    async fn test_complete_stamps_and_audits() {
        let ws = workspace();
        let task = ws.create_task(NewTask::new("ignored", "Ship it")).await.unwrap();
        assert_eq!(task.row.owner_id, "alice");

        let patch = TaskPatch {
            status: Some(TaskStatus::Completed),
            ..TaskPatch::default()
        };
        let done = ws.update_task(&task.row.task_number, &patch).await.unwrap();

        assert_eq!(done.row.completion_date, Some(Utc::now().date_naive()));
        let texts: Vec<&str> = done.follow_ups.iter().map(|f| f.text.as_str()).collect();
        assert_eq!(texts, [COMPLETED_TEXT]);
        assert_eq!(done.follow_ups[0].task_status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_meeting_completion_is_silent() {
        let ws = workspace();
        let mut meeting = NewTask::new("alice", "Retro");
        meeting.task_type = Some("Meeting".to_string());
        let task = ws.create_task(meeting).await.unwrap();

        let patch = TaskPatch {
            status: Some(TaskStatus::Completed),
            ..TaskPatch::default()
        };
        let done = ws.update_task(&task.row.task_number, &patch).await.unwrap();

        assert!(done.row.completion_date.is_some());
        assert!(done.follow_ups.is_empty());
    }

    #[tokio::test]
    async fn test_audit_entries_are_immutable() {
        let ws = workspace();
        let task = ws.create_task(NewTask::new("alice", "Task")).await.unwrap();
        let number = task.row.task_number.clone();

        let patch = TaskPatch {
            priority: Some(Priority::High),
            ..TaskPatch::default()
        };
        let updated = ws.update_task(&number, &patch).await.unwrap();
        let audit = updated.follow_ups[0].id;
        assert!(matches!(
            ws.edit_follow_up(audit, "rewrite history", None).await,
            Err(Error::AuditEntryImmutable { .. })
        ));
        assert!(matches!(
            ws.delete_follow_up(audit).await,
            Err(Error::AuditEntryImmutable { .. })
        ));

        let note = ws.add_follow_up(&number, "called vendor").await.unwrap();
        let edited = ws.edit_follow_up(note.id, "called vendor twice", Some(5)).await.unwrap();
        assert_eq!(edited.text, "called vendor twice");
        assert_eq!(edited.created_at, 5);
        ws.delete_follow_up(note.id).await.unwrap();
        assert_eq!(ws.task(&number).await.unwrap().follow_ups.len(), 1);
    }

    #[tokio::test]
    async fn test_checklist_and_link_sub_edits() {
        let ws = workspace();
        let number = ws
            .create_task(NewTask::new("alice", "Task"))
            .await
            .unwrap()
            .row
            .task_number;

        ws.add_checklist_item(&number, "write tests").await.unwrap();
        ws.add_checklist_item(&number, "ship").await.unwrap();
        let task = ws.toggle_checklist_item(&number, 0).await.unwrap();
        assert!(task.row.checklist[0].completed);
        let task = ws.remove_checklist_item(&number, 1).await.unwrap();
        assert_eq!(task.row.checklist.len(), 1);
        assert!(ws.toggle_checklist_item(&number, 5).await.is_err());

        let (task, link_id) = ws
            .add_link(&number, LinkCategory::Repository, "api", "https://git.example.com/api")
            .await
            .unwrap();
        assert_eq!(task.row.links.get(LinkCategory::Repository).len(), 1);
        let task = ws.remove_link(&number, &link_id).await.unwrap();
        assert!(task.row.links.is_empty());

        // Sub-edits touch untracked fields only
        assert!(task.follow_ups.is_empty());
    }

    #[tokio::test]
    async fn test_project_rename_refreshes_names() {
        let ws = workspace();
        let project = ws.create_project("Apollo", None).await.unwrap();
        let mut new = NewTask::new("alice", "Launch");
        new.project_id = Some(project.id.clone());
        let task = ws.create_task(new).await.unwrap();
        assert_eq!(task.project_name, "Apollo");

        ws.rename_project(&project.id, "Artemis").await.unwrap();
        let task = ws.task(&task.row.task_number).await.unwrap();
        assert_eq!(task.project_name, "Artemis");

        assert_eq!(ws.find_project("artemis").await.unwrap().id, project.id);
        assert!(ws.create_project("ARTEMIS", None).await.is_err());

        let deleted = ws.delete_project(&project.id).await.unwrap();
        assert_eq!(deleted.tasks, 1);
        assert!(ws.task(&task.row.task_number).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_unknown_project_rejected() {
        let ws = workspace();
        let mut task = NewTask::new("alice", "Orphan");
        task.project_id = Some("proj_missing".to_string());
        let err = ws.create_task(task).await.unwrap_err();
        assert!(matches!(err, Error::ProjectNotFound { .. }));
    }

    #[tokio::test]
    async fn test_series_ops_on_plain_task() {
        let ws = workspace();
        let number = ws
            .create_task(NewTask::new("alice", "One-off"))
            .await
            .unwrap()
            .row
            .task_number;

        assert_eq!(ws.delete_series(&number).await.unwrap(), SeriesOutcome::NotInSeries);
        assert_eq!(
            ws.update_series(&number, &TaskPatch::default()).await.unwrap(),
            SeriesOutcome::NotInSeries
        );
        assert!(ws.task(&number).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_task_removes_follow_ups() {
        let ws = workspace();
        let number = ws
            .create_task(NewTask::new("alice", "Task"))
            .await
            .unwrap()
            .row
            .task_number;
        ws.add_follow_up(&number, "note").await.unwrap();

        ws.delete_task(&number).await.unwrap();
        assert!(ws.task(&number).await.unwrap_err().is_not_found());
        assert!(ws
            .backend()
            .follow_ups_for("alice", std::slice::from_ref(&number))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_update_stands_when_audit_write_fails() {
        let ws = Workspace::new(BrokenJoins::new(), "alice");
        let number = ws
            .create_task(NewTask::new("alice", "Task"))
            .await
            .unwrap()
            .row
            .task_number;

        let patch = TaskPatch {
            priority: Some(Priority::Critical),
            status: Some(TaskStatus::Completed),
            ..TaskPatch::default()
        };
        let updated = ws.update_task(&number, &patch).await.unwrap();

        assert_eq!(updated.row.priority, Priority::Critical);
        assert_eq!(updated.row.status, TaskStatus::Completed);
        assert!(updated.row.completion_date.is_some());
        assert!(updated.follow_ups.is_empty());

        let stored = ws.backend().inner.get_task("alice", &number).await.unwrap().unwrap();
        assert_eq!(stored.priority, Priority::Critical);
        let trail = ws
            .backend()
            .inner
            .follow_ups_for("alice", std::slice::from_ref(&number))
            .await
            .unwrap();
        assert!(trail.is_empty());
    }

    #[tokio::test]
    async fn test_occurrence_cannot_become_a_root() {
        let ws = workspace();
        let mut standup = NewTask::new("alice", "Standup");
        standup.is_recurring = true;
        standup.recurrence = Some(RecurrenceRule::new(RecurrenceType::Daily, 1));
        standup.due_date = Utc::now().date_naive().succ_opt();
        let root = ws.create_task(standup).await.unwrap().row;

        let instance = ws.spawn_next(&root.task_number).await.unwrap().unwrap().row;
        assert_eq!(instance.parent_task_id, Some(root.id));

        let promote = TaskPatch {
            is_recurring: Some(true),
            ..TaskPatch::default()
        };
        let err = ws.update_task(&instance.task_number, &promote).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let mut orphan = NewTask::new("alice", "Both");
        orphan.is_recurring = true;
        orphan.parent_task_id = Some(root.id);
        assert!(matches!(
            ws.create_task(orphan).await,
            Err(Error::InvalidArgument(_))
        ));

        assert_eq!(
            ws.delete_series(&instance.task_number).await.unwrap(),
            SeriesOutcome::Applied { members: 2 }
        );
        assert!(ws.task(&root.task_number).await.unwrap_err().is_not_found());
    }
}
