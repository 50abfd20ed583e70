//! Recurring series operations.
//!
//! A series is `{root} ∪ {tasks whose parent_task_id = root.id}`. Any member
//! resolves to the same root, and series-wide operations act on whatever
//! members still exist: an empty series is a neutral outcome, not an error.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use crate::error::{Error, Result};
use crate::model::{
    ChecklistItem, LinkGroups, NewTask, Priority, TaskId, TaskPatch, TaskRow, TaskStatus,
};
use crate::storage::Backend;

/// Where a task sits relative to a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesRef {
    Root(TaskId),
    NotInSeries,
}

/// Resolve the series root for any task.
#[must_use]
pub fn resolve_series(task: &TaskRow) -> SeriesRef {
    if task.is_recurring {
        SeriesRef::Root(task.id)
    } else {
        task.parent_task_id.map_or(SeriesRef::NotInSeries, SeriesRef::Root)
    }
}

/// Result of a series-wide operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SeriesOutcome {
    /// The operation touched this many tasks.
    Applied { members: usize },
    /// The series had no members left, or there was nothing to change.
    NothingToDo,
    /// The task is neither a root nor an instance.
    NotInSeries,
}

/// The fields a series-wide update may change.
///
/// Status and due date are deliberately absent: every occurrence keeps its
/// own.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesFields {
    pub title: Option<String>,
    pub environment: Option<Option<String>>,
    pub task_type: Option<Option<String>>,
    pub priority: Option<Priority>,
    pub responsible: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub details: Option<Option<String>>,
    pub planned_time_hours: Option<Option<f64>>,
    pub links: Option<LinkGroups>,
}

impl SeriesFields {
    /// Keep the series-wide subset of a general patch, dropping the rest.
    #[must_use]
    pub fn from_patch(patch: &TaskPatch) -> Self {
        Self {
            title: patch.title.clone(),
            environment: patch.environment.clone(),
            task_type: patch.task_type.clone(),
            priority: patch.priority,
            responsible: patch.responsible.clone(),
            description: patch.description.clone(),
            details: patch.details.clone(),
            planned_time_hours: patch.planned_time_hours,
            links: patch.links.clone(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn to_patch(&self) -> TaskPatch {
        TaskPatch {
            title: self.title.clone(),
            environment: self.environment.clone(),
            task_type: self.task_type.clone(),
            priority: self.priority,
            responsible: self.responsible.clone(),
            description: self.description.clone(),
            details: self.details.clone(),
            planned_time_hours: self.planned_time_hours,
            links: self.links.clone(),
            ..TaskPatch::default()
        }
    }
}

pub struct RecurrenceManager<'a, B> {
    backend: &'a B,
}

impl<'a, B: Backend> RecurrenceManager<'a, B> {
    #[must_use]
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Delete the root, every instance and all their follow-ups.
    ///
    /// # Errors
    ///
    /// Returns an error if a backend call fails.
    pub async fn delete_series(&self, root_id: TaskId) -> Result<SeriesOutcome> {
        let members = self.backend.series_members(root_id).await?;
        if members.is_empty() {
            return Ok(SeriesOutcome::NothingToDo);
        }

        let ids: Vec<_> = members.iter().map(|m| m.id).collect();
        let deleted = self.backend.delete_tasks(&ids).await?;

        info!(root = root_id, tasks = deleted.tasks, follow_ups = deleted.follow_ups, "series deleted");
        Ok(SeriesOutcome::Applied { members: deleted.tasks })
    }

    /// Apply `fields` to every member of the series.
    ///
    /// No audit entries are written for series-wide edits.
    ///
    /// # Errors
    ///
    /// Returns an error if a backend call fails.
    pub async fn update_series(&self, root_id: TaskId, fields: &SeriesFields) -> Result<SeriesOutcome> {
        if fields.is_empty() {
            return Ok(SeriesOutcome::NothingToDo);
        }

        let members = self.backend.series_members(root_id).await?;
        if members.is_empty() {
            return Ok(SeriesOutcome::NothingToDo);
        }

        let ids: Vec<_> = members.iter().map(|m| m.id).collect();
        let updated = self.backend.update_tasks(&ids, &fields.to_patch()).await?;

        info!(root = root_id, tasks = updated, "series updated");
        Ok(SeriesOutcome::Applied { members: updated })
    }

    /// Create the next occurrence of a series.
    ///
    /// The date follows the latest due date in the series (the root's own
    /// due date, or `today` when no member has one). Returns `None` once the
    /// rule's end date has passed.
    ///
    /// # Errors
    ///
    /// Returns `TaskNotFound` if the root is gone and `InvalidArgument` if it
    /// is not a recurring root with a rule.
    pub async fn spawn_next_instance(&self, root_id: TaskId, today: NaiveDate) -> Result<Option<TaskRow>> {
        let root = self
            .backend
            .get_task_by_id(root_id)
            .await?
            .ok_or_else(|| Error::TaskNotFound { id: root_id.to_string() })?;
        let Some(rule) = root.recurrence.as_ref().filter(|_| root.is_recurring) else {
            return Err(Error::InvalidArgument(format!(
                "{} is not a recurring series root",
                root.task_number
            )));
        };

        let members = self.backend.series_members(root_id).await?;
        let anchor = members
            .iter()
            .filter_map(|m| m.due_date)
            .max()
            .unwrap_or(today);

        let Some(due) = rule.next_after(anchor) else {
            info!(root = %root.task_number, "series has ended");
            return Ok(None);
        };

        let instance = self.backend.insert_task(&instance_of(&root, due)).await?;
        info!(root = %root.task_number, instance = %instance.task_number, due = %due, "series instance created");
        Ok(Some(instance))
    }
}

/// A fresh occurrence: the root's content, its own due date, status Open.
fn instance_of(root: &TaskRow, due: NaiveDate) -> NewTask {
    NewTask {
        owner_id: root.owner_id.clone(),
        title: root.title.clone(),
        description: root.description.clone(),
        details: root.details.clone(),
        status: TaskStatus::Open,
        priority: root.priority,
        responsible: root.responsible.clone(),
        scope: root.scope.clone(),
        task_type: root.task_type.clone(),
        environment: root.environment.clone(),
        project_id: root.project_id.clone(),
        start_date: None,
        due_date: Some(due),
        planned_time_hours: root.planned_time_hours,
        checklist: root
            .checklist
            .iter()
            .map(|item| ChecklistItem::new(item.text.clone()))
            .collect(),
        links: root.links.clone(),
        is_recurring: false,
        recurrence: None,
        parent_task_id: Some(root.id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewFollowUp, RecurrenceRule, RecurrenceType, TaskNumber};
    use crate::storage::{SqliteStorage, StatusFilter, TaskQuery};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    struct Series {
        root: TaskRow,
        instances: Vec<TaskRow>,
        bystander: TaskRow,
    }

    async fn seed(storage: &SqliteStorage) -> Series {
        let mut root = NewTask::new("alice", "Standup");
        root.is_recurring = true;
        root.recurrence = Some(RecurrenceRule::new(RecurrenceType::Weekly, 1));
        root.due_date = Some(date(2026, 3, 2));
        let root = storage.insert_task(&root).await.unwrap();

        let mut instances = Vec::new();
        for (week, status) in [(1, TaskStatus::Completed), (2, TaskStatus::InProgress), (3, TaskStatus::Open)] {
            let mut task = instance_of(&root, date(2026, 3, 2 + 7 * week));
            task.status = status;
            instances.push(storage.insert_task(&task).await.unwrap());
        }
        let bystander = storage
            .insert_task(&NewTask::new("alice", "Unrelated"))
            .await
            .unwrap();

        let mut notes = Vec::new();
        for task in instances.iter().chain([&root, &bystander]) {
            notes.push(NewFollowUp {
                task_number: task.task_number.clone(),
                text: "note".to_string(),
                created_at: 1,
                task_status: task.status,
            });
        }
        storage.insert_follow_ups("alice", &notes).await.unwrap();

        Series {
            root,
            instances,
            bystander,
        }
    }

    async fn all_numbers(storage: &SqliteStorage) -> Vec<TaskNumber> {
        let query = TaskQuery {
            filter: StatusFilter::All,
            ..TaskQuery::for_owner("alice")
        };
        storage
            .fetch_tasks(&query, None)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.task_number)
            .collect()
    }

    #[test]
    fn test_resolve_series() {
        let row = |id, recurring, parent| TaskRow {
            id,
            is_recurring: recurring,
            parent_task_id: parent,
            ..instance_row()
        };
        assert_eq!(resolve_series(&row(5, true, None)), SeriesRef::Root(5));
        assert_eq!(resolve_series(&row(6, false, Some(5))), SeriesRef::Root(5));
        assert_eq!(resolve_series(&row(7, false, None)), SeriesRef::NotInSeries);
    }

    fn instance_row() -> TaskRow {
        TaskRow {
            id: 0,
            task_number: TaskNumber::from_sequence(1),
            owner_id: "alice".to_string(),
            title: String::new(),
            description: None,
            details: None,
            status: TaskStatus::Open,
            priority: Priority::Medium,
            responsible: None,
            scope: std::collections::BTreeSet::new(),
            task_type: None,
            environment: None,
            project_id: None,
            start_date: None,
            due_date: None,
            completion_date: None,
            planned_time_hours: None,
            checklist: Vec::new(),
            links: LinkGroups::default(),
            is_recurring: false,
            recurrence: None,
            parent_task_id: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[tokio::test]
    async fn test_delete_from_instance_removes_whole_series() {
        let storage = SqliteStorage::open_memory().unwrap();
        let series = seed(&storage).await;

        // Initiated from the second instance
        let SeriesRef::Root(root_id) = resolve_series(&series.instances[1]) else {
            panic!("instance should resolve to its root");
        };
        let outcome = RecurrenceManager::new(&storage)
            .delete_series(root_id)
            .await
            .unwrap();

        assert_eq!(outcome, SeriesOutcome::Applied { members: 4 });
        assert_eq!(all_numbers(&storage).await, vec![series.bystander.task_number.clone()]);

        let mut gone: Vec<TaskNumber> = series.instances.iter().map(|t| t.task_number.clone()).collect();
        gone.push(series.root.task_number.clone());
        assert!(storage.follow_ups_for("alice", &gone).await.unwrap().is_empty());
        let kept = storage
            .follow_ups_for("alice", std::slice::from_ref(&series.bystander.task_number))
            .await
            .unwrap();
        assert_eq!(kept.len(), 1);
    }

    #[tokio::test]
    async fn test_update_keeps_status_and_due_date() {
        let storage = SqliteStorage::open_memory().unwrap();
        let series = seed(&storage).await;
        let before = storage.series_members(series.root.id).await.unwrap();

        let patch = TaskPatch {
            title: Some("Daily standup".to_string()),
            priority: Some(Priority::High),
            environment: Some(Some("prod".to_string())),
            status: Some(TaskStatus::Completed),
            due_date: Some(Some(date(2030, 1, 1))),
            ..TaskPatch::default()
        };
        let outcome = RecurrenceManager::new(&storage)
            .update_series(series.root.id, &SeriesFields::from_patch(&patch))
            .await
            .unwrap();
        assert_eq!(outcome, SeriesOutcome::Applied { members: 4 });

        let after = storage.series_members(series.root.id).await.unwrap();
        for (old, new) in before.iter().zip(&after) {
            assert_eq!(old.status, new.status);
            assert_eq!(old.due_date, new.due_date);
            assert_eq!(new.title, "Daily standup");
            assert_eq!(new.priority, Priority::High);
            assert_eq!(new.environment.as_deref(), Some("prod"));
        }

        let untouched = storage.get_task_by_id(series.bystander.id).await.unwrap().unwrap();
        assert_eq!(untouched.title, "Unrelated");
    }

    #[tokio::test]
    async fn test_shrunken_series_still_succeeds() {
        let storage = SqliteStorage::open_memory().unwrap();
        let series = seed(&storage).await;
        let manager = RecurrenceManager::new(&storage);

        // Root removed on its own; the instances keep their lineage pointer
        storage.delete_tasks(&[series.root.id]).await.unwrap();

        let fields = SeriesFields {
            title: Some("Renamed".to_string()),
            ..SeriesFields::default()
        };
        assert_eq!(
            manager.update_series(series.root.id, &fields).await.unwrap(),
            SeriesOutcome::Applied { members: 3 }
        );
        assert_eq!(
            manager.delete_series(series.root.id).await.unwrap(),
            SeriesOutcome::Applied { members: 3 }
        );
        assert_eq!(
            manager.delete_series(series.root.id).await.unwrap(),
            SeriesOutcome::NothingToDo
        );
    }

    #[tokio::test]
    async fn test_spawn_follows_latest_instance() {
        let storage = SqliteStorage::open_memory().unwrap();
        let series = seed(&storage).await;

        let spawned = RecurrenceManager::new(&storage)
            .spawn_next_instance(series.root.id, date(2026, 1, 1))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(spawned.due_date, Some(date(2026, 3, 30)));
        assert_eq!(spawned.status, TaskStatus::Open);
        assert_eq!(spawned.parent_task_id, Some(series.root.id));
        assert!(!spawned.is_recurring);
        assert_eq!(spawned.title, series.root.title);
    }

    #[tokio::test]
    async fn test_spawn_respects_end_date_and_roots() {
        let storage = SqliteStorage::open_memory().unwrap();
        let manager = RecurrenceManager::new(&storage);

        let mut ending = NewTask::new("alice", "Sprint review");
        ending.is_recurring = true;
        ending.due_date = Some(date(2026, 3, 2));
        ending.recurrence = Some(RecurrenceRule::new(RecurrenceType::Weekly, 2).until(date(2026, 3, 10)));
        let ending = storage.insert_task(&ending).await.unwrap();
        assert!(manager
            .spawn_next_instance(ending.id, date(2026, 3, 1))
            .await
            .unwrap()
            .is_none());

        let plain = storage
            .insert_task(&NewTask::new("alice", "One-off"))
            .await
            .unwrap();
        let err = manager
            .spawn_next_instance(plain.id, date(2026, 3, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
