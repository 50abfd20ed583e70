//! SQLite storage implementation.
//!
//! [`SqliteStorage`] is the reference [`Backend`]. Reads lock the connection
//! and run a synchronous query. Writes follow the mutation protocol:
//!
//! 1. Begin an IMMEDIATE transaction (write lock up front)
//! 2. Run the mutation closure, which records change events
//! 3. Commit (or roll back on error)
//! 4. Publish the recorded events on the change bus
//!
//! Events are only published for committed writes.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rusqlite::functions::FunctionFlags;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef};
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, broadcast};

use super::backend::{Backend, Deletion, SortColumn, TaskQuery, Window};
use super::events::{ChangeBus, ChangeEvent, ChangeKind, Table};
use super::schema::apply_schema;
use crate::error::{Error, Result};
use crate::model::{
    FollowUp, NewFollowUp, NewTask, Priority, Project, ProjectPatch, ProjectStatus, TaskId,
    TaskNumber, TaskPatch, TaskRow, TaskStatus, TimeEntry,
};

const TASK_COLUMNS: &str = "id, task_number, owner_id, title, description, details, status, \
     priority, responsible, scope, task_type, environment, project_id, start_date, due_date, \
     completion_date, planned_time_hours, checklist, links, is_recurring, recurrence, \
     parent_task_id, created_at, updated_at";

const PROJECT_COLUMNS: &str = "id, owner_id, name, description, team_members, scope, status, \
     start_date, end_date, cost_center, links, created_at, updated_at";

const FOLLOW_UP_COLUMNS: &str = "id, task_id, text, created_at, task_status";

const TIME_ENTRY_COLUMNS: &str = "id, owner_id, task_id, started_at, ended_at";

/// SQLite-based storage backend.
///
/// Cheap to clone; clones share the connection, the change bus and the
/// query counters.
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
    bus: ChangeBus,
    stats: Arc<QueryStats>,
}

/// Context for a mutation, collecting the change events to publish once
/// the transaction commits.
pub struct MutationContext {
    /// Name of the operation being performed.
    pub op_name: String,
    /// Events to publish after commit.
    pub events: Vec<ChangeEvent>,
}

impl MutationContext {
    #[must_use]
    pub fn new(op_name: &str) -> Self {
        Self {
            op_name: op_name.to_string(),
            events: Vec::new(),
        }
    }

    /// Record a row-level change.
    pub fn record(&mut self, table: Table, kind: ChangeKind, entity_id: impl Into<String>, owner: &str) {
        self.events.push(ChangeEvent::new(table, kind, entity_id, owner));
    }
}

/// Per-table read counters plus a write counter.
///
/// Every backend round trip bumps exactly one counter, which lets callers
/// verify how many queries an operation issued.
#[derive(Debug, Default)]
pub struct QueryStats {
    task_reads: AtomicUsize,
    follow_up_reads: AtomicUsize,
    project_reads: AtomicUsize,
    time_entry_reads: AtomicUsize,
    writes: AtomicUsize,
}

/// Point-in-time copy of [`QueryStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueryCounts {
    pub task_reads: usize,
    pub follow_up_reads: usize,
    pub project_reads: usize,
    pub time_entry_reads: usize,
    pub writes: usize,
}

impl QueryCounts {
    /// Total round trips of any kind.
    #[must_use]
    pub fn total(&self) -> usize {
        self.task_reads + self.follow_up_reads + self.project_reads + self.time_entry_reads + self.writes
    }
}

impl QueryStats {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> QueryCounts {
        QueryCounts {
            task_reads: self.task_reads.load(Ordering::Relaxed),
            follow_up_reads: self.follow_up_reads.load(Ordering::Relaxed),
            project_reads: self.project_reads.load(Ordering::Relaxed),
            time_entry_reads: self.time_entry_reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.task_reads,
            &self.follow_up_reads,
            &self.project_reads,
            &self.time_entry_reads,
            &self.writes,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl SqliteStorage {
    /// Open a database at the given path.
    ///
    /// Creates the database and applies schema if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a database with an optional busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(timeout_ms.map_or(Duration::from_secs(5), Duration::from_millis))?;
        apply_schema(&conn)?;
        register_functions(&conn)?;
        tracing::debug!(path = %path.display(), "database opened");
        Ok(Self::from_connection(conn))
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        register_functions(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            bus: ChangeBus::new(),
            stats: Arc::new(QueryStats::default()),
        }
    }

    /// Round trips issued since open (or the last reset).
    #[must_use]
    pub fn stats(&self) -> QueryCounts {
        self.stats.snapshot()
    }

    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    /// Poll for commits made by other connections to the same file.
    ///
    /// SQLite bumps `PRAGMA data_version` whenever another connection
    /// commits. Each bump publishes one owner-scoped task event, so a
    /// listener in this process reloads after writes from another `td`.
    #[must_use]
    pub fn spawn_external_watch(&self, owner_id: &str, every: Duration) -> tokio::task::JoinHandle<()> {
        let storage = self.clone();
        let owner_id = owner_id.to_string();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            let mut last: Option<i64> = None;
            loop {
                ticker.tick().await;
                let version = {
                    let conn = storage.conn.lock().await;
                    conn.query_row("PRAGMA data_version", [], |row| row.get::<_, i64>(0))
                };
                match version {
                    Ok(version) => {
                        if last.is_some_and(|seen| seen != version) {
                            tracing::debug!(version, "external change detected");
                            storage.bus.publish([ChangeEvent::new(
                                Table::Tasks,
                                ChangeKind::Update,
                                "*",
                                &owner_id,
                            )]);
                        }
                        last = Some(version);
                    }
                    Err(e) => tracing::warn!(error = %e, "data_version poll failed"),
                }
            }
        })
    }

    /// Run a read against the connection.
    async fn read<F, R>(&self, counter: &AtomicUsize, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R> + Send,
        R: Send,
    {
        QueryStats::bump(counter);
        let conn = self.conn.lock().await;
        f(&conn)
    }

    /// Execute a mutation with the transaction protocol.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails. The transaction is rolled back on
    /// error and nothing is published.
    pub async fn mutate<F, R>(&self, op: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction, &mut MutationContext) -> Result<R> + Send,
        R: Send,
    {
        QueryStats::bump(&self.stats.writes);
        let mut conn = self.conn.lock().await;

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut ctx = MutationContext::new(op);
        let result = f(&tx, &mut ctx)?;
        tx.commit()?;
        drop(conn);

        tracing::debug!(op = %ctx.op_name, changes = ctx.events.len(), "mutation committed");
        self.bus.publish(ctx.events);
        Ok(result)
    }
}

impl Backend for SqliteStorage {
    // ==================
    // Task Reads
    // ==================

    async fn count_tasks(&self, query: &TaskQuery) -> Result<usize> {
        self.read(&self.stats.task_reads, |conn| {
            let (filter, params) = task_where(query);
            let sql = format!("SELECT COUNT(*) FROM tasks{filter}");
            let count: i64 = conn.query_row(&sql, param_refs(&params).as_slice(), |row| row.get(0))?;
            Ok(usize::try_from(count).unwrap_or_default())
        })
        .await
    }

    async fn fetch_tasks(&self, query: &TaskQuery, window: Option<Window>) -> Result<Vec<TaskRow>> {
        self.read(&self.stats.task_reads, |conn| {
            let (filter, mut params) = task_where(query);
            let mut sql = format!("SELECT {TASK_COLUMNS} FROM tasks{filter}{}", task_order(query));
            if let Some(window) = window {
                sql.push_str(" LIMIT ? OFFSET ?");
                params.push(Box::new(sql_int(window.limit)));
                params.push(Box::new(sql_int(window.offset)));
            }

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(param_refs(&params).as_slice(), map_task_row)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Error::from)
        })
        .await
    }

    async fn get_task(&self, owner_id: &str, number: &TaskNumber) -> Result<Option<TaskRow>> {
        self.read(&self.stats.task_reads, |conn| {
            let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE owner_id = ?1 AND task_number = ?2");
            Ok(conn
                .query_row(&sql, rusqlite::params![owner_id, number], map_task_row)
                .optional()?)
        })
        .await
    }

    async fn get_task_by_id(&self, id: TaskId) -> Result<Option<TaskRow>> {
        self.read(&self.stats.task_reads, |conn| load_task(conn, id)).await
    }

    async fn series_members(&self, root_id: TaskId) -> Result<Vec<TaskRow>> {
        self.read(&self.stats.task_reads, |conn| {
            let sql = format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1 OR parent_task_id = ?1 ORDER BY sequence ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([root_id], map_task_row)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Error::from)
        })
        .await
    }

    // ==================
    // Task Writes
    // ==================

    async fn insert_task(&self, task: &NewTask) -> Result<TaskRow> {
        let now = chrono::Utc::now();
        let completion_date = task.initial_completion_date(now.date_naive());
        let now = now.timestamp_millis();

        self.mutate("insert_task", |tx, ctx| {
            let sequence = next_sequence(tx, &task.owner_id)?;
            let number = TaskNumber::from_sequence(sequence);

            tx.execute(
                "INSERT INTO tasks (owner_id, task_number, sequence, title, description, details,
                    status, priority, responsible, scope, task_type, environment, project_id,
                    start_date, due_date, completion_date, planned_time_hours, checklist, links,
                    is_recurring, recurrence, parent_task_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                    ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?23)",
                rusqlite::params![
                    task.owner_id,
                    number,
                    sequence,
                    task.title,
                    task.description,
                    task.details,
                    task.status,
                    task.priority,
                    task.responsible,
                    to_json(&task.scope)?,
                    task.task_type,
                    task.environment,
                    task.project_id,
                    task.start_date,
                    task.due_date,
                    completion_date,
                    task.planned_time_hours,
                    to_json(&task.checklist)?,
                    to_json(&task.links)?,
                    task.is_recurring,
                    task.recurrence.as_ref().map(to_json).transpose()?,
                    task.parent_task_id,
                    now,
                ],
            )?;

            let id = tx.last_insert_rowid();
            ctx.record(Table::Tasks, ChangeKind::Insert, number.as_str(), &task.owner_id);

            load_task(tx, id)?.ok_or_else(|| Error::TaskNotFound { id: number.to_string() })
        })
        .await
    }

    async fn update_task(&self, id: TaskId, patch: &TaskPatch) -> Result<TaskRow> {
        let now = chrono::Utc::now().timestamp_millis();

        self.mutate("update_task", |tx, ctx| {
            let mut row = load_task(tx, id)?.ok_or_else(|| Error::TaskNotFound { id: id.to_string() })?;
            patch.apply_to(&mut row);
            row.updated_at = now;
            write_task_row(tx, &row)?;

            ctx.record(Table::Tasks, ChangeKind::Update, row.task_number.as_str(), &row.owner_id);
            Ok(row)
        })
        .await
    }

    async fn update_tasks(&self, ids: &[TaskId], patch: &TaskPatch) -> Result<usize> {
        if ids.is_empty() || patch.is_empty() {
            return Ok(0);
        }
        let now = chrono::Utc::now().timestamp_millis();

        self.mutate("update_tasks", |tx, ctx| {
            let mut touched = 0;
            for &id in ids {
                let Some(mut row) = load_task(tx, id)? else {
                    continue;
                };
                patch.apply_to(&mut row);
                row.updated_at = now;
                write_task_row(tx, &row)?;

                ctx.record(Table::Tasks, ChangeKind::Update, row.task_number.as_str(), &row.owner_id);
                touched += 1;
            }
            Ok(touched)
        })
        .await
    }

    async fn delete_tasks(&self, ids: &[TaskId]) -> Result<Deletion> {
        if ids.is_empty() {
            return Ok(Deletion::default());
        }

        self.mutate("delete_tasks", |tx, ctx| {
            let mut deleted = Deletion::default();
            for &id in ids {
                let Some(row) = load_task(tx, id)? else {
                    continue;
                };
                // follow_ups.task_id has no cascade
                deleted.follow_ups +=
                    delete_follow_ups_tx(tx, ctx, &row.owner_id, std::slice::from_ref(&row.task_number))?;
                deleted.tasks += tx.execute("DELETE FROM tasks WHERE id = ?1", [id])?;
                ctx.record(Table::Tasks, ChangeKind::Delete, row.task_number.as_str(), &row.owner_id);
            }
            Ok(deleted)
        })
        .await
    }

    // ==================
    // Follow-ups
    // ==================

    async fn follow_ups_for(&self, owner_id: &str, numbers: &[TaskNumber]) -> Result<Vec<FollowUp>> {
        if numbers.is_empty() {
            return Ok(Vec::new());
        }

        self.read(&self.stats.follow_up_reads, |conn| {
            let sql = format!(
                "SELECT {FOLLOW_UP_COLUMNS} FROM follow_ups
                 WHERE owner_id = ? AND task_id IN ({})
                 ORDER BY created_at ASC, id ASC",
                placeholders(numbers.len())
            );
            let mut params: Vec<&dyn ToSql> = Vec::with_capacity(numbers.len() + 1);
            params.push(&owner_id);
            params.extend(numbers.iter().map(|n| n as &dyn ToSql));

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params.as_slice(), map_follow_up_row)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Error::from)
        })
        .await
    }

    async fn task_numbers_with_follow_up_text(&self, owner_id: &str, term: &str) -> Result<Vec<TaskNumber>> {
        self.read(&self.stats.follow_up_reads, |conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT task_id FROM follow_ups
                 WHERE owner_id = ?1 AND fold(text) LIKE ?2 ESCAPE '\\'",
            )?;
            let rows = stmt.query_map(rusqlite::params![owner_id, like_pattern(term)], |row| row.get(0))?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Error::from)
        })
        .await
    }

    async fn get_follow_up(&self, id: i64) -> Result<Option<FollowUp>> {
        self.read(&self.stats.follow_up_reads, |conn| load_follow_up(conn, id))
            .await
    }

    async fn insert_follow_ups(&self, owner_id: &str, entries: &[NewFollowUp]) -> Result<Vec<FollowUp>> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        self.mutate("insert_follow_ups", |tx, ctx| {
            let mut stmt = tx.prepare(
                "INSERT INTO follow_ups (owner_id, task_id, text, task_status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;

            let mut inserted = Vec::with_capacity(entries.len());
            for entry in entries {
                stmt.execute(rusqlite::params![
                    owner_id,
                    entry.task_number,
                    entry.text,
                    entry.task_status,
                    entry.created_at,
                ])?;
                let id = tx.last_insert_rowid();
                ctx.record(Table::FollowUps, ChangeKind::Insert, id.to_string(), owner_id);
                inserted.push(FollowUp {
                    id,
                    task_number: entry.task_number.clone(),
                    text: entry.text.clone(),
                    created_at: entry.created_at,
                    task_status: entry.task_status,
                });
            }
            Ok(inserted)
        })
        .await
    }

    async fn update_follow_up(&self, id: i64, text: &str, created_at: i64) -> Result<FollowUp> {
        self.mutate("update_follow_up", |tx, ctx| {
            let owner = follow_up_owner(tx, id)?;
            tx.execute(
                "UPDATE follow_ups SET text = ?1, created_at = ?2 WHERE id = ?3",
                rusqlite::params![text, created_at, id],
            )?;
            ctx.record(Table::FollowUps, ChangeKind::Update, id.to_string(), &owner);

            load_follow_up(tx, id)?.ok_or(Error::FollowUpNotFound { id })
        })
        .await
    }

    async fn delete_follow_up(&self, id: i64) -> Result<()> {
        self.mutate("delete_follow_up", |tx, ctx| {
            let owner = follow_up_owner(tx, id)?;
            tx.execute("DELETE FROM follow_ups WHERE id = ?1", [id])?;
            ctx.record(Table::FollowUps, ChangeKind::Delete, id.to_string(), &owner);
            Ok(())
        })
        .await
    }

    // ==================
    // Projects
    // ==================

    async fn project_names(&self, ids: &[String]) -> Result<Vec<(String, String)>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        self.read(&self.stats.project_reads, |conn| {
            let sql = format!(
                "SELECT id, name FROM projects WHERE id IN ({})",
                placeholders(ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(ids), |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Error::from)
        })
        .await
    }

    async fn get_project(&self, id: &str) -> Result<Option<Project>> {
        self.read(&self.stats.project_reads, |conn| load_project(conn, id))
            .await
    }

    async fn list_projects(&self, owner_id: &str) -> Result<Vec<Project>> {
        self.read(&self.stats.project_reads, |conn| {
            let sql = format!(
                "SELECT {PROJECT_COLUMNS} FROM projects WHERE owner_id = ?1 ORDER BY name COLLATE NOCASE ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([owner_id], map_project_row)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Error::from)
        })
        .await
    }

    async fn insert_project(&self, project: &Project) -> Result<()> {
        self.mutate("insert_project", |tx, ctx| {
            ensure_unique_name(tx, &project.owner_id, &project.name, None)?;
            tx.execute(
                "INSERT INTO projects (id, owner_id, name, description, team_members, scope, status,
                    start_date, end_date, cost_center, links, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                rusqlite::params![
                    project.id,
                    project.owner_id,
                    project.name,
                    project.description,
                    to_json(&project.team_members)?,
                    to_json(&project.scope)?,
                    project.status,
                    project.start_date,
                    project.end_date,
                    project.cost_center,
                    to_json(&project.links)?,
                    project.created_at,
                    project.updated_at,
                ],
            )?;
            ctx.record(Table::Projects, ChangeKind::Insert, project.id.as_str(), &project.owner_id);
            Ok(())
        })
        .await
    }

    async fn update_project(&self, id: &str, patch: &ProjectPatch) -> Result<Project> {
        let now = chrono::Utc::now().timestamp_millis();

        self.mutate("update_project", |tx, ctx| {
            let mut project =
                load_project(tx, id)?.ok_or_else(|| Error::ProjectNotFound { id: id.to_string() })?;
            if let Some(name) = &patch.name {
                ensure_unique_name(tx, &project.owner_id, name, Some(id))?;
            }
            patch.apply_to(&mut project);
            project.updated_at = now;

            tx.execute(
                "UPDATE projects SET name = ?1, description = ?2, team_members = ?3, scope = ?4,
                    status = ?5, start_date = ?6, end_date = ?7, cost_center = ?8, links = ?9,
                    updated_at = ?10
                 WHERE id = ?11",
                rusqlite::params![
                    project.name,
                    project.description,
                    to_json(&project.team_members)?,
                    to_json(&project.scope)?,
                    project.status,
                    project.start_date,
                    project.end_date,
                    project.cost_center,
                    to_json(&project.links)?,
                    project.updated_at,
                    project.id,
                ],
            )?;
            ctx.record(Table::Projects, ChangeKind::Update, id, &project.owner_id);
            Ok(project)
        })
        .await
    }

    async fn delete_project(&self, id: &str) -> Result<Deletion> {
        self.mutate("delete_project", |tx, ctx| {
            let project =
                load_project(tx, id)?.ok_or_else(|| Error::ProjectNotFound { id: id.to_string() })?;

            let numbers: Vec<TaskNumber> = {
                let mut stmt = tx.prepare("SELECT task_number FROM tasks WHERE project_id = ?1")?;
                let rows = stmt.query_map([id], |row| row.get(0))?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            };

            let follow_ups = delete_follow_ups_tx(tx, ctx, &project.owner_id, &numbers)?;
            let tasks = tx.execute("DELETE FROM tasks WHERE project_id = ?1", [id])?;
            for number in &numbers {
                ctx.record(Table::Tasks, ChangeKind::Delete, number.as_str(), &project.owner_id);
            }

            tx.execute("DELETE FROM projects WHERE id = ?1", [id])?;
            ctx.record(Table::Projects, ChangeKind::Delete, id, &project.owner_id);

            Ok(Deletion { tasks, follow_ups })
        })
        .await
    }

    // ==================
    // Time Entries
    // ==================

    async fn running_time_entry(&self, owner_id: &str, number: &TaskNumber) -> Result<Option<TimeEntry>> {
        self.read(&self.stats.time_entry_reads, |conn| {
            let sql = format!(
                "SELECT {TIME_ENTRY_COLUMNS} FROM time_entries
                 WHERE owner_id = ?1 AND task_id = ?2 AND ended_at IS NULL
                 ORDER BY started_at DESC LIMIT 1"
            );
            Ok(conn
                .query_row(&sql, rusqlite::params![owner_id, number], map_time_entry_row)
                .optional()?)
        })
        .await
    }

    async fn time_entries_for(&self, owner_id: &str, number: &TaskNumber) -> Result<Vec<TimeEntry>> {
        self.read(&self.stats.time_entry_reads, |conn| {
            let sql = format!(
                "SELECT {TIME_ENTRY_COLUMNS} FROM time_entries
                 WHERE owner_id = ?1 AND task_id = ?2
                 ORDER BY started_at ASC, id ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params![owner_id, number], map_time_entry_row)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Error::from)
        })
        .await
    }

    async fn insert_time_entry(&self, owner_id: &str, number: &TaskNumber, started_at: i64) -> Result<TimeEntry> {
        self.mutate("insert_time_entry", |tx, ctx| {
            let exists = tx
                .prepare("SELECT 1 FROM tasks WHERE owner_id = ?1 AND task_number = ?2")?
                .exists(rusqlite::params![owner_id, number])?;
            if !exists {
                return Err(Error::TaskNotFound { id: number.to_string() });
            }

            tx.execute(
                "INSERT INTO time_entries (owner_id, task_id, started_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![owner_id, number, started_at],
            )?;
            let id = tx.last_insert_rowid();
            ctx.record(Table::TimeEntries, ChangeKind::Insert, id.to_string(), owner_id);

            Ok(TimeEntry {
                id,
                owner_id: owner_id.to_string(),
                task_number: number.clone(),
                started_at,
                ended_at: None,
            })
        })
        .await
    }

    async fn finish_time_entry(&self, id: i64, ended_at: i64) -> Result<TimeEntry> {
        self.mutate("finish_time_entry", |tx, ctx| {
            let sql = format!("SELECT {TIME_ENTRY_COLUMNS} FROM time_entries WHERE id = ?1");
            let entry = tx.query_row(&sql, [id], map_time_entry_row).optional()?;
            let Some(mut entry) = entry.filter(TimeEntry::is_running) else {
                return Err(Error::NoRunningTimer { task: format!("time entry {id}") });
            };

            tx.execute(
                "UPDATE time_entries SET ended_at = ?1 WHERE id = ?2",
                rusqlite::params![ended_at, id],
            )?;
            entry.ended_at = Some(ended_at);
            ctx.record(Table::TimeEntries, ChangeKind::Update, id.to_string(), &entry.owner_id);
            Ok(entry)
        })
        .await
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.bus.subscribe()
    }
}

// ==================
// Query Helpers
// ==================

/// `?, ?, ?` for an `IN (...)` list.
fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn param_refs(params: &[Box<dyn ToSql>]) -> Vec<&dyn ToSql> {
    params.iter().map(AsRef::as_ref).collect()
}

/// `fold(text)`: Unicode lowercase, NULL-preserving.
///
/// SQLite's own `LIKE` and `lower()` only fold ASCII, so text matches
/// compare `fold(column)` against a pattern folded the same way.
fn register_functions(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "fold",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|t| t.to_lowercase()))
        },
    )?;
    Ok(())
}

/// `%term%`, folded, with LIKE metacharacters escaped (escape char `\`).
fn like_pattern(term: &str) -> String {
    let escaped = term
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn sql_int(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// WHERE clause and parameters shared by count and data reads.
fn task_where(query: &TaskQuery) -> (String, Vec<Box<dyn ToSql>>) {
    let mut sql = String::from(" WHERE owner_id = ?");
    let mut params: Vec<Box<dyn ToSql>> = vec![Box::new(query.owner_id.clone())];

    if let Some(statuses) = query.filter.statuses() {
        sql.push_str(&format!(" AND status IN ({})", placeholders(statuses.len())));
        params.extend(statuses.into_iter().map(|s| Box::new(s) as Box<dyn ToSql>));
    }

    if let Some(priority) = query.filter.priority() {
        sql.push_str(" AND priority = ?");
        params.push(Box::new(priority));
    }

    if let Some(project_id) = &query.project_id {
        sql.push_str(" AND project_id = ?");
        params.push(Box::new(project_id.clone()));
    }

    if let Some(text) = &query.text {
        let pattern = like_pattern(&text.term);
        sql.push_str(
            " AND (fold(title) LIKE ? ESCAPE '\\' OR fold(description) LIKE ? ESCAPE '\\' \
             OR fold(responsible) LIKE ? ESCAPE '\\'",
        );
        for _ in 0..3 {
            params.push(Box::new(pattern.clone()));
        }
        if !text.task_numbers.is_empty() {
            sql.push_str(&format!(
                " OR task_number IN ({})",
                placeholders(text.task_numbers.len())
            ));
            params.extend(
                text.task_numbers
                    .iter()
                    .map(|n| Box::new(n.clone()) as Box<dyn ToSql>),
            );
        }
        sql.push(')');
    }

    (sql, params)
}

/// Nulls sort last in either direction; ties fall back to task number.
fn task_order(query: &TaskQuery) -> String {
    let dir = query.direction.sql();
    match query.order {
        SortColumn::Sequence => format!(" ORDER BY sequence {dir}"),
        SortColumn::DueDate => {
            format!(" ORDER BY due_date IS NULL, due_date {dir}, sequence ASC")
        }
        column => {
            let col = column.column();
            format!(" ORDER BY {col} IS NULL, {col} COLLATE NOCASE {dir}, sequence ASC")
        }
    }
}

fn next_sequence(tx: &Transaction, owner_id: &str) -> Result<i64> {
    tx.execute(
        "INSERT INTO task_sequences (owner_id, next_number) VALUES (?1, 1)
         ON CONFLICT(owner_id) DO NOTHING",
        [owner_id],
    )?;
    let sequence: i64 = tx.query_row(
        "SELECT next_number FROM task_sequences WHERE owner_id = ?1",
        [owner_id],
        |row| row.get(0),
    )?;
    tx.execute(
        "UPDATE task_sequences SET next_number = next_number + 1 WHERE owner_id = ?1",
        [owner_id],
    )?;
    Ok(sequence)
}

fn load_task(conn: &Connection, id: TaskId) -> Result<Option<TaskRow>> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], map_task_row).optional()?)
}

/// Persist every mutable column of a task row.
fn write_task_row(tx: &Transaction, row: &TaskRow) -> Result<()> {
    tx.execute(
        "UPDATE tasks SET title = ?1, description = ?2, details = ?3, status = ?4, priority = ?5,
            responsible = ?6, scope = ?7, task_type = ?8, environment = ?9, project_id = ?10,
            start_date = ?11, due_date = ?12, completion_date = ?13, planned_time_hours = ?14,
            checklist = ?15, links = ?16, is_recurring = ?17, recurrence = ?18, updated_at = ?19
         WHERE id = ?20",
        rusqlite::params![
            row.title,
            row.description,
            row.details,
            row.status,
            row.priority,
            row.responsible,
            to_json(&row.scope)?,
            row.task_type,
            row.environment,
            row.project_id,
            row.start_date,
            row.due_date,
            row.completion_date,
            row.planned_time_hours,
            to_json(&row.checklist)?,
            to_json(&row.links)?,
            row.is_recurring,
            row.recurrence.as_ref().map(to_json).transpose()?,
            row.updated_at,
            row.id,
        ],
    )?;
    Ok(())
}

fn load_follow_up(conn: &Connection, id: i64) -> Result<Option<FollowUp>> {
    let sql = format!("SELECT {FOLLOW_UP_COLUMNS} FROM follow_ups WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], map_follow_up_row).optional()?)
}

fn follow_up_owner(tx: &Transaction, id: i64) -> Result<String> {
    tx.query_row("SELECT owner_id FROM follow_ups WHERE id = ?1", [id], |row| row.get(0))
        .optional()?
        .ok_or(Error::FollowUpNotFound { id })
}

fn delete_follow_ups_tx(
    tx: &Transaction,
    ctx: &mut MutationContext,
    owner_id: &str,
    numbers: &[TaskNumber],
) -> Result<usize> {
    if numbers.is_empty() {
        return Ok(0);
    }

    let in_list = placeholders(numbers.len());
    let mut params: Vec<&dyn ToSql> = Vec::with_capacity(numbers.len() + 1);
    params.push(&owner_id);
    params.extend(numbers.iter().map(|n| n as &dyn ToSql));

    let ids: Vec<i64> = {
        let sql = format!("SELECT id FROM follow_ups WHERE owner_id = ? AND task_id IN ({in_list})");
        let mut stmt = tx.prepare(&sql)?;
        let rows = stmt.query_map(params.as_slice(), |row| row.get(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()?
    };

    let sql = format!("DELETE FROM follow_ups WHERE owner_id = ? AND task_id IN ({in_list})");
    let removed = tx.execute(&sql, params.as_slice())?;
    for id in ids {
        ctx.record(Table::FollowUps, ChangeKind::Delete, id.to_string(), owner_id);
    }
    Ok(removed)
}

fn load_project(conn: &Connection, id: &str) -> Result<Option<Project>> {
    let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], map_project_row).optional()?)
}

/// Project names are unique per owner, compared case-insensitively.
fn ensure_unique_name(tx: &Transaction, owner_id: &str, name: &str, except_id: Option<&str>) -> Result<()> {
    let taken = tx
        .prepare(
            "SELECT 1 FROM projects
             WHERE owner_id = ?1 AND name = ?2 COLLATE NOCASE AND id IS NOT ?3",
        )?
        .exists(rusqlite::params![owner_id, name, except_id])?;
    if taken {
        return Err(Error::DuplicateProjectName { name: name.to_string() });
    }
    Ok(())
}

// ==================
// Column Conversions
// ==================

macro_rules! stored_enum {
    ($($ty:ty => $what:literal),* $(,)?) => {
        $(
            impl ToSql for $ty {
                fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                    Ok(ToSqlOutput::from(self.as_str()))
                }
            }

            impl FromSql for $ty {
                fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                    let raw = value.as_str()?;
                    <$ty>::from_stored(raw)
                        .ok_or_else(|| FromSqlError::Other(format!("unknown {} '{raw}'", $what).into()))
                }
            }
        )*
    };
}

stored_enum!(
    TaskStatus => "task status",
    Priority => "priority",
    ProjectStatus => "project status",
);

impl ToSql for TaskNumber {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TaskNumber {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        String::column_result(value).map(TaskNumber::from_stored)
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

fn json_column<T: DeserializeOwned>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn json_column_opt<T: DeserializeOwned>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn map_task_row(row: &rusqlite::Row) -> rusqlite::Result<TaskRow> {
    Ok(TaskRow {
        id: row.get(0)?,
        task_number: row.get(1)?,
        owner_id: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        details: row.get(5)?,
        status: row.get(6)?,
        priority: row.get(7)?,
        responsible: row.get(8)?,
        scope: json_column(row, 9)?,
        task_type: row.get(10)?,
        environment: row.get(11)?,
        project_id: row.get(12)?,
        start_date: row.get(13)?,
        due_date: row.get(14)?,
        completion_date: row.get(15)?,
        planned_time_hours: row.get(16)?,
        checklist: json_column(row, 17)?,
        links: json_column(row, 18)?,
        is_recurring: row.get(19)?,
        recurrence: json_column_opt(row, 20)?,
        parent_task_id: row.get(21)?,
        created_at: row.get(22)?,
        updated_at: row.get(23)?,
    })
}

fn map_follow_up_row(row: &rusqlite::Row) -> rusqlite::Result<FollowUp> {
    Ok(FollowUp {
        id: row.get(0)?,
        task_number: row.get(1)?,
        text: row.get(2)?,
        created_at: row.get(3)?,
        task_status: row.get(4)?,
    })
}

fn map_project_row(row: &rusqlite::Row) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        team_members: json_column(row, 4)?,
        scope: json_column(row, 5)?,
        status: row.get(6)?,
        start_date: row.get(7)?,
        end_date: row.get(8)?,
        cost_center: row.get(9)?,
        links: json_column(row, 10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn map_time_entry_row(row: &rusqlite::Row) -> rusqlite::Result<TimeEntry> {
    Ok(TimeEntry {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        task_number: row.get(2)?,
        started_at: row.get(3)?,
        ended_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LinkCategory, RecurrenceRule, RecurrenceType};
    use crate::storage::backend::{SortDirection, StatusFilter, TextMatch};
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn add(storage: &SqliteStorage, owner: &str, title: &str) -> TaskRow {
        storage.insert_task(&NewTask::new(owner, title)).await.unwrap()
    }

    fn note(number: &TaskNumber, text: &str, at: i64) -> NewFollowUp {
        NewFollowUp {
            task_number: number.clone(),
            text: text.to_string(),
            created_at: at,
            task_status: TaskStatus::Open,
        }
    }

    #[tokio::test]
    async fn test_task_numbers_are_per_owner() {
        let storage = SqliteStorage::open_memory().unwrap();

        let a1 = add(&storage, "alice", "one").await;
        let a2 = add(&storage, "alice", "two").await;
        let b1 = add(&storage, "bob", "one").await;

        assert_eq!(a1.task_number.as_str(), "T1");
        assert_eq!(a2.task_number.as_str(), "T2");
        assert_eq!(b1.task_number.as_str(), "T1");
    }

    #[tokio::test]
    async fn test_insert_round_trips_structured_columns() {
        let storage = SqliteStorage::open_memory().unwrap();

        let mut task = NewTask::new("alice", "Weekly sync");
        task.scope.insert("backend".to_string());
        task.links.add(LinkCategory::Documentation, "Runbook", "https://example.com/rb");
        task.is_recurring = true;
        task.recurrence = Some(RecurrenceRule::new(RecurrenceType::Weekly, 1));
        task.due_date = Some(date(2026, 3, 2));
        task.status = TaskStatus::Completed;

        let row = storage.insert_task(&task).await.unwrap();
        let loaded = storage.get_task_by_id(row.id).await.unwrap().unwrap();

        assert_eq!(loaded, row);
        assert!(loaded.scope.contains("backend"));
        assert_eq!(loaded.links.len(), 1);
        assert_eq!(loaded.recurrence.unwrap().kind, RecurrenceType::Weekly);
        assert!(loaded.completion_date.is_some());
    }

    #[tokio::test]
    async fn test_count_and_fetch_share_filters() {
        let storage = SqliteStorage::open_memory().unwrap();
        for i in 0..7 {
            let row = add(&storage, "alice", &format!("task {i}")).await;
            if i % 3 == 0 {
                let patch = TaskPatch {
                    status: Some(TaskStatus::Completed),
                    ..TaskPatch::default()
                };
                storage.update_task(row.id, &patch).await.unwrap();
            }
        }
        add(&storage, "bob", "other owner").await;

        for filter in [StatusFilter::Active, StatusFilter::All, StatusFilter::Open] {
            let query = TaskQuery {
                filter,
                ..TaskQuery::for_owner("alice")
            };
            let count = storage.count_tasks(&query).await.unwrap();
            let rows = storage.fetch_tasks(&query, None).await.unwrap();
            assert_eq!(count, rows.len(), "{filter:?}");
        }
    }

    #[tokio::test]
    async fn test_window_and_null_dates_last() {
        let storage = SqliteStorage::open_memory().unwrap();
        let dues = [Some(date(2026, 5, 1)), None, Some(date(2026, 1, 1)), Some(date(2026, 3, 1))];
        for (i, due) in dues.into_iter().enumerate() {
            let mut task = NewTask::new("alice", format!("t{i}"));
            task.due_date = due;
            storage.insert_task(&task).await.unwrap();
        }

        let mut query = TaskQuery::for_owner("alice");
        let all = storage.fetch_tasks(&query, None).await.unwrap();
        let titles: Vec<&str> = all.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, ["t2", "t3", "t0", "t1"]);

        query.direction = SortDirection::Desc;
        let window = storage
            .fetch_tasks(&query, Some(Window { offset: 1, limit: 2 }))
            .await
            .unwrap();
        let titles: Vec<&str> = window.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, ["t3", "t2"]);
    }

    #[tokio::test]
    async fn test_text_match_includes_follow_up_hits() {
        let storage = SqliteStorage::open_memory().unwrap();
        let by_title = add(&storage, "alice", "Fix invoice export").await;
        let by_note = add(&storage, "alice", "Quarterly review").await;
        add(&storage, "alice", "Unrelated").await;
        storage
            .insert_follow_ups("alice", &[note(&by_note.task_number, "waiting on INVOICE data", 1)])
            .await
            .unwrap();

        let hits = storage
            .task_numbers_with_follow_up_text("alice", "invoice")
            .await
            .unwrap();
        assert_eq!(hits, vec![by_note.task_number.clone()]);

        let query = TaskQuery {
            text: Some(TextMatch {
                term: "invoice".to_string(),
                task_numbers: hits,
            }),
            order: SortColumn::Sequence,
            ..TaskQuery::for_owner("alice")
        };
        let rows = storage.fetch_tasks(&query, None).await.unwrap();
        let numbers: Vec<_> = rows.into_iter().map(|r| r.task_number).collect();
        assert_eq!(numbers, vec![by_title.task_number, by_note.task_number]);
        assert_eq!(storage.count_tasks(&query).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_like_metacharacters_are_literal() {
        let storage = SqliteStorage::open_memory().unwrap();
        add(&storage, "alice", "100% done").await;
        add(&storage, "alice", "1000 done").await;

        let query = TaskQuery {
            text: Some(TextMatch {
                term: "0%".to_string(),
                task_numbers: Vec::new(),
            }),
            ..TaskQuery::for_owner("alice")
        };
        assert_eq!(storage.count_tasks(&query).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_text_match_folds_non_ascii_case() {
        let storage = SqliteStorage::open_memory().unwrap();
        let review = add(&storage, "alice", "ÜBERPRÜFUNG der Zahlen").await;
        let noted = add(&storage, "alice", "Quarterly").await;
        add(&storage, "alice", "Unrelated").await;
        storage
            .insert_follow_ups("alice", &[note(&noted.task_number, "Grüße an ÉMILE", 1)])
            .await
            .unwrap();

        let hits = storage
            .task_numbers_with_follow_up_text("alice", "émile")
            .await
            .unwrap();
        assert_eq!(hits, vec![noted.task_number.clone()]);

        let query = TaskQuery {
            text: Some(TextMatch {
                term: "überprüfung".to_string(),
                task_numbers: Vec::new(),
            }),
            ..TaskQuery::for_owner("alice")
        };
        let rows = storage.fetch_tasks(&query, None).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].task_number, review.task_number);
    }

    #[tokio::test]
    async fn test_follow_ups_ordered_and_deleted_with_task() {
        let storage = SqliteStorage::open_memory().unwrap();
        let task = add(&storage, "alice", "Task").await;
        storage
            .insert_follow_ups(
                "alice",
                &[note(&task.task_number, "second", 20), note(&task.task_number, "first", 10)],
            )
            .await
            .unwrap();

        let notes = storage
            .follow_ups_for("alice", std::slice::from_ref(&task.task_number))
            .await
            .unwrap();
        let texts: Vec<&str> = notes.iter().map(|n| n.text.as_str()).collect();
        assert_eq!(texts, ["first", "second"]);

        // The foreign key itself does not cascade
        {
            let conn = storage.conn.lock().await;
            assert!(conn.execute("DELETE FROM tasks WHERE id = ?1", [task.id]).is_err());
        }

        let deleted = storage.delete_tasks(&[task.id, 999]).await.unwrap();
        assert_eq!(deleted, Deletion { tasks: 1, follow_ups: 2 });
        assert!(storage.get_task_by_id(task.id).await.unwrap().is_none());
        assert!(storage
            .follow_ups_for("alice", std::slice::from_ref(&task.task_number))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_failed_task_delete_keeps_follow_ups() {
        let storage = SqliteStorage::open_memory().unwrap();
        let task = add(&storage, "alice", "Task").await;
        storage
            .insert_follow_ups("alice", &[note(&task.task_number, "keep me", 1)])
            .await
            .unwrap();
        {
            let conn = storage.conn.lock().await;
            conn.execute_batch(
                "CREATE TRIGGER no_task_delete BEFORE DELETE ON tasks
                 BEGIN SELECT RAISE(ABORT, 'locked'); END;",
            )
            .unwrap();
        }

        assert!(storage.delete_tasks(&[task.id]).await.is_err());

        let notes = storage
            .follow_ups_for("alice", std::slice::from_ref(&task.task_number))
            .await
            .unwrap();
        assert_eq!(notes.len(), 1);
        assert!(storage.get_task_by_id(task.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_empty_id_lists_skip_the_backend() {
        let storage = SqliteStorage::open_memory().unwrap();
        storage.reset_stats();

        assert!(storage.follow_ups_for("alice", &[]).await.unwrap().is_empty());
        assert!(storage.project_names(&[]).await.unwrap().is_empty());
        assert_eq!(storage.delete_tasks(&[]).await.unwrap(), Deletion::default());

        assert_eq!(storage.stats().total(), 0);
    }

    #[tokio::test]
    async fn test_project_names_unique_per_owner() {
        let storage = SqliteStorage::open_memory().unwrap();
        storage.insert_project(&Project::new("alice", "Apollo")).await.unwrap();
        storage.insert_project(&Project::new("bob", "Apollo")).await.unwrap();

        let err = storage
            .insert_project(&Project::new("alice", "apollo"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateProjectName { .. }));
    }

    #[tokio::test]
    async fn test_delete_project_cascades() {
        let storage = SqliteStorage::open_memory().unwrap();
        let project = Project::new("alice", "Apollo");
        storage.insert_project(&project).await.unwrap();

        let mut task = NewTask::new("alice", "In project");
        task.project_id = Some(project.id.clone());
        let inside = storage.insert_task(&task).await.unwrap();
        let outside = add(&storage, "alice", "Elsewhere").await;
        storage
            .insert_follow_ups("alice", &[note(&inside.task_number, "n", 1)])
            .await
            .unwrap();

        let deleted = storage.delete_project(&project.id).await.unwrap();
        assert_eq!(deleted, Deletion { tasks: 1, follow_ups: 1 });
        assert!(storage.get_project(&project.id).await.unwrap().is_none());
        assert!(storage.get_task_by_id(inside.id).await.unwrap().is_none());
        assert!(storage.get_task_by_id(outside.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_events_published_after_commit_only() {
        let storage = SqliteStorage::open_memory().unwrap();
        let mut rx = storage.subscribe();

        let task = add(&storage, "alice", "Task").await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event.table, Table::Tasks);
        assert_eq!(event.kind, ChangeKind::Insert);
        assert_eq!(event.entity_id, task.task_number.as_str());
        assert_eq!(event.owner_id, "alice");

        // Rolled back: unknown follow-up
        assert!(storage.delete_follow_up(999).await.is_err());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_time_entries() {
        let storage = SqliteStorage::open_memory().unwrap();
        let task = add(&storage, "alice", "Task").await;

        let entry = storage
            .insert_time_entry("alice", &task.task_number, 1_000)
            .await
            .unwrap();
        let running = storage
            .running_time_entry("alice", &task.task_number)
            .await
            .unwrap();
        assert_eq!(running.as_ref().map(|e| e.id), Some(entry.id));

        let finished = storage.finish_time_entry(entry.id, 5_000).await.unwrap();
        assert_eq!(finished.ended_at, Some(5_000));
        assert!(storage.finish_time_entry(entry.id, 6_000).await.is_err());
        assert!(storage
            .running_time_entry("alice", &task.task_number)
            .await
            .unwrap()
            .is_none());

        let missing = TaskNumber::from_sequence(42);
        assert!(storage.insert_time_entry("alice", &missing, 0).await.is_err());
    }

    #[tokio::test]
    async fn test_external_watch_sees_other_connection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taskdeck.db");
        let watcher = SqliteStorage::open(&path).unwrap();
        let writer = SqliteStorage::open(&path).unwrap();

        let mut rx = watcher.subscribe();
        let handle = watcher.spawn_external_watch("alice", Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;

        add(&writer, "alice", "From elsewhere").await;

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.owner_id, "alice");
        assert_eq!(event.table, Table::Tasks);
        handle.abort();
    }
}
