//! Batch hydration of task rows.
//!
//! A batch of N rows costs at most one follow-up query and one project-name
//! query, whatever N is. Join misses degrade to an empty thread or an empty
//! project name; a failed join query degrades the same way for the whole
//! batch and is logged.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, warn};

use super::name_cache::NameCache;
use crate::error::{Error, Result};
use crate::model::{FollowUp, Task, TaskNumber, TaskRow};
use crate::storage::Backend;

pub struct BatchLoader<'a, B> {
    backend: &'a B,
    cache: &'a NameCache,
}

impl<'a, B: Backend> BatchLoader<'a, B> {
    #[must_use]
    pub fn new(backend: &'a B, cache: &'a NameCache) -> Self {
        Self { backend, cache }
    }

    /// Hydrate rows in order.
    ///
    /// Rows are expected to share an owner (every list view is scoped to
    /// one); a mixed batch costs one follow-up query per distinct owner.
    pub async fn hydrate(&self, rows: Vec<TaskRow>) -> Vec<Task> {
        if rows.is_empty() {
            return Vec::new();
        }

        let mut threads = self.follow_up_map(&rows).await;
        self.resolve_project_names(rows.iter().filter_map(|r| r.project_id.as_deref()))
            .await;

        debug!(rows = rows.len(), "batch hydrated");
        rows.into_iter()
            .map(|row| {
                let follow_ups = threads.remove(&(row.owner_id.clone(), row.task_number.clone()));
                self.assemble(row, follow_ups.unwrap_or_default())
            })
            .collect()
    }

    /// Hydrate a single row with its own queries.
    ///
    /// For single-entity lookups only; list views go through [`Self::hydrate`].
    pub async fn hydrate_one(&self, row: TaskRow) -> Task {
        let follow_ups = match self
            .backend
            .follow_ups_for(&row.owner_id, std::slice::from_ref(&row.task_number))
            .await
        {
            Ok(follow_ups) => follow_ups,
            Err(e) => {
                warn!(task = %row.task_number, error = %e, "follow-up lookup failed");
                Vec::new()
            }
        };
        self.resolve_project_names(row.project_id.as_deref()).await;
        self.assemble(row, follow_ups)
    }

    /// Fetch and hydrate one task by number.
    ///
    /// # Errors
    ///
    /// Returns `TaskNotFound` if no such task exists for the owner.
    pub async fn load_one(&self, owner_id: &str, number: &TaskNumber) -> Result<Task> {
        let row = self
            .backend
            .get_task(owner_id, number)
            .await?
            .ok_or_else(|| Error::TaskNotFound { id: number.to_string() })?;
        Ok(self.hydrate_one(row).await)
    }

    fn assemble(&self, row: TaskRow, follow_ups: Vec<FollowUp>) -> Task {
        let project_name = row
            .project_id
            .as_deref()
            .and_then(|id| self.cache.get(id))
            .unwrap_or_default();
        Task {
            row,
            project_name,
            follow_ups,
        }
    }

    /// One follow-up query per owner, grouped by `(owner, task number)`.
    async fn follow_up_map(&self, rows: &[TaskRow]) -> HashMap<(String, TaskNumber), Vec<FollowUp>> {
        let mut by_owner: HashMap<&str, BTreeSet<TaskNumber>> = HashMap::new();
        for row in rows {
            by_owner
                .entry(row.owner_id.as_str())
                .or_default()
                .insert(row.task_number.clone());
        }

        let mut threads: HashMap<(String, TaskNumber), Vec<FollowUp>> = HashMap::new();
        for (owner, numbers) in by_owner {
            let numbers: Vec<TaskNumber> = numbers.into_iter().collect();
            match self.backend.follow_ups_for(owner, &numbers).await {
                Ok(follow_ups) => {
                    for follow_up in follow_ups {
                        threads
                            .entry((owner.to_string(), follow_up.task_number.clone()))
                            .or_default()
                            .push(follow_up);
                    }
                }
                Err(e) => {
                    warn!(owner, tasks = numbers.len(), error = %e, "follow-up batch failed, hydrating without threads");
                }
            }
        }
        threads
    }

    /// Look up names not already cached, in one query, and merge them in.
    async fn resolve_project_names<'r>(&self, ids: impl IntoIterator<Item = &'r str>) {
        let missing = self.cache.missing(ids);
        if missing.is_empty() {
            return;
        }

        match self.backend.project_names(&missing).await {
            Ok(names) => {
                if names.len() < missing.len() {
                    debug!(
                        requested = missing.len(),
                        found = names.len(),
                        "some project ids did not resolve"
                    );
                }
                self.cache.merge(names);
            }
            Err(e) => warn!(projects = missing.len(), error = %e, "project name batch failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewFollowUp, NewTask, Project, TaskStatus};
    use crate::storage::testing::BrokenJoins;
    use crate::storage::{SqliteStorage, StatusFilter, TaskQuery};

    /// `count` tasks for alice spread over two projects, two notes each
    /// for the even ones.
    async fn seed(storage: &SqliteStorage, count: usize) -> Vec<TaskRow> {
        let apollo = Project::new("alice", "Apollo");
        let gemini = Project::new("alice", "Gemini");
        storage.insert_project(&apollo).await.unwrap();
        storage.insert_project(&gemini).await.unwrap();

        let mut notes = Vec::new();
        for i in 0..count {
            let mut task = NewTask::new("alice", format!("task {i}"));
            task.project_id = match i % 3 {
                0 => Some(apollo.id.clone()),
                1 => Some(gemini.id.clone()),
                _ => None,
            };
            let row = storage.insert_task(&task).await.unwrap();
            if i % 2 == 0 {
                for n in 0..2 {
                    notes.push(NewFollowUp {
                        task_number: row.task_number.clone(),
                        text: format!("note {n} on {i}"),
                        created_at: i64::try_from(i * 10 + n).unwrap(),
                        task_status: TaskStatus::Open,
                    });
                }
            }
        }
        storage.insert_follow_ups("alice", &notes).await.unwrap();

        let query = TaskQuery {
            filter: StatusFilter::All,
            ..TaskQuery::for_owner("alice")
        };
        storage.fetch_tasks(&query, None).await.unwrap()
    }

    #[tokio::test]
    async fn test_batch_matches_per_row_hydration() {
        for n in [0, 1, 50] {
            let storage = SqliteStorage::open_memory().unwrap();
            let rows = seed(&storage, n).await;
            assert_eq!(rows.len(), n);

            let batch_cache = NameCache::new();
            storage.reset_stats();
            let batched = BatchLoader::new(&storage, &batch_cache)
                .hydrate(rows.clone())
                .await;
            let stats = storage.stats();
            assert!(stats.follow_up_reads <= 1, "n={n}: {stats:?}");
            assert!(stats.project_reads <= 1, "n={n}: {stats:?}");
            assert_eq!(stats.task_reads, 0);

            let mut single = Vec::new();
            for row in rows {
                let fresh = NameCache::new();
                single.push(BatchLoader::new(&storage, &fresh).hydrate_one(row).await);
            }
            assert_eq!(batched, single, "n={n}");
        }
    }

    #[tokio::test]
    async fn test_warm_cache_skips_project_query() {
        let storage = SqliteStorage::open_memory().unwrap();
        let rows = seed(&storage, 6).await;
        let cache = NameCache::new();
        let loader = BatchLoader::new(&storage, &cache);

        loader.hydrate(rows.clone()).await;
        assert_eq!(cache.len(), 2);

        storage.reset_stats();
        let again = loader.hydrate(rows).await;
        assert_eq!(storage.stats().project_reads, 0);
        assert!(again.iter().any(|t| t.project_name == "Apollo"));
    }

    #[tokio::test]
    async fn test_missing_joins_degrade_to_defaults() {
        let storage = SqliteStorage::open_memory().unwrap();
        let row = storage
            .insert_task(&NewTask::new("alice", "lonely"))
            .await
            .unwrap();
        let mut dangling = row.clone();
        dangling.project_id = Some("proj_gone".to_string());

        let cache = NameCache::new();
        let tasks = BatchLoader::new(&storage, &cache)
            .hydrate(vec![row, dangling])
            .await;

        assert_eq!(tasks.len(), 2);
        assert!(tasks.iter().all(|t| t.follow_ups.is_empty()));
        assert_eq!(tasks[1].project_name, "");
    }

    #[tokio::test]
    async fn test_failing_joins_still_return_every_row() {
        let backend = BrokenJoins::new();
        let rows = seed(&backend.inner, 6).await;
        let numbers: Vec<_> = rows.iter().map(|r| r.task_number.clone()).collect();

        let cache = NameCache::new();
        let tasks = BatchLoader::new(&backend, &cache).hydrate(rows).await;

        let hydrated: Vec<_> = tasks.iter().map(|t| t.row.task_number.clone()).collect();
        assert_eq!(hydrated, numbers);
        assert!(tasks.iter().all(|t| t.follow_ups.is_empty()));
        assert!(tasks.iter().all(|t| t.project_name.is_empty()));
        assert!(tasks.iter().any(|t| t.row.project_id.is_some()));
    }

    #[tokio::test]
    async fn test_load_one_not_found() {
        let storage = SqliteStorage::open_memory().unwrap();
        let cache = NameCache::new();
        let err = BatchLoader::new(&storage, &cache)
            .load_one("alice", &TaskNumber::from_sequence(9))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
