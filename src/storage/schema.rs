//! Database schema definitions.
//!
//! Timestamps are INTEGER Unix milliseconds. Calendar dates are ISO 8601
//! TEXT so that lexical order equals chronological order. Structured
//! columns (scope, checklist, links, recurrence) are JSON TEXT.

use rusqlite::{Connection, Result};

/// Current schema version for migration tracking.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// The complete SQL schema.
pub const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

-- Per-owner task number allocator
CREATE TABLE IF NOT EXISTS task_sequences (
    owner_id TEXT PRIMARY KEY,
    next_number INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    name TEXT NOT NULL,
    description TEXT,
    team_members TEXT NOT NULL DEFAULT '[]',
    scope TEXT NOT NULL DEFAULT '[]',
    status TEXT NOT NULL DEFAULT 'Active'
        CHECK (status IN ('Planning', 'Active', 'On Hold', 'Completed')),
    start_date TEXT,
    end_date TEXT,
    cost_center TEXT,
    links TEXT NOT NULL DEFAULT '{}',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    UNIQUE (owner_id, name)
);

CREATE INDEX IF NOT EXISTS idx_projects_owner ON projects(owner_id);

CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id TEXT NOT NULL,
    task_number TEXT NOT NULL,
    sequence INTEGER NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    details TEXT,
    status TEXT NOT NULL DEFAULT 'Open'
        CHECK (status IN ('Open', 'In Progress', 'Completed', 'On Hold')),
    priority TEXT NOT NULL DEFAULT 'Medium'
        CHECK (priority IN ('Low', 'Medium', 'High', 'Critical')),
    responsible TEXT,
    scope TEXT NOT NULL DEFAULT '[]',
    task_type TEXT,
    environment TEXT,
    project_id TEXT REFERENCES projects(id) ON DELETE SET NULL,
    start_date TEXT,
    due_date TEXT,
    completion_date TEXT,
    planned_time_hours REAL,
    checklist TEXT NOT NULL DEFAULT '[]',
    links TEXT NOT NULL DEFAULT '{}',
    is_recurring INTEGER NOT NULL DEFAULT 0,
    recurrence TEXT,
    -- Lineage pointer only; the root may be deleted before its instances
    parent_task_id INTEGER,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    UNIQUE (owner_id, task_number)
);

CREATE INDEX IF NOT EXISTS idx_tasks_owner_status ON tasks(owner_id, status);
CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks(project_id);
CREATE INDEX IF NOT EXISTS idx_tasks_parent ON tasks(parent_task_id);
CREATE INDEX IF NOT EXISTS idx_tasks_due ON tasks(owner_id, due_date);

-- Follow-ups reference the task number, not the row id. No cascade:
-- callers delete follow-ups before the task.
CREATE TABLE IF NOT EXISTS follow_ups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id TEXT NOT NULL,
    task_id TEXT NOT NULL,
    text TEXT NOT NULL,
    task_status TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    FOREIGN KEY (owner_id, task_id) REFERENCES tasks(owner_id, task_number)
);

CREATE INDEX IF NOT EXISTS idx_follow_ups_task ON follow_ups(owner_id, task_id, created_at);

CREATE TABLE IF NOT EXISTS time_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id TEXT NOT NULL,
    task_id TEXT NOT NULL,
    started_at INTEGER NOT NULL,
    ended_at INTEGER,
    FOREIGN KEY (owner_id, task_id) REFERENCES tasks(owner_id, task_number) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_time_entries_task ON time_entries(owner_id, task_id);
";

/// Apply the schema to the database.
///
/// Idempotent: every statement uses `IF NOT EXISTS`.
///
/// # Errors
///
/// Returns an error if the SQL execution fails or pragmas cannot be set.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;

    conn.execute_batch(SCHEMA_SQL)?;

    let version = format!("v{CURRENT_SCHEMA_VERSION}");
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![version, chrono::Utc::now().timestamp_millis()],
    )?;
    if inserted > 0 {
        tracing::info!(version = %version, "schema initialized");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).expect("Failed to apply schema");
        conn
    }

    #[test]
    fn test_apply_schema() {
        let conn = fresh();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        for table in ["tasks", "projects", "follow_ups", "time_entries", "task_sequences"] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = fresh();
        apply_schema(&conn).expect("Second apply failed");

        let versions: i32 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let conn = fresh();
        let fk_enabled: i32 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk_enabled, 1);
    }

    #[test]
    fn test_follow_up_requires_task() {
        let conn = fresh();

        let orphan = conn.execute(
            "INSERT INTO follow_ups (owner_id, task_id, text, task_status, created_at)
             VALUES ('alice', 'T1', 'hello', 'Open', 0)",
            [],
        );
        assert!(orphan.is_err());

        conn.execute(
            "INSERT INTO tasks (owner_id, task_number, sequence, title, created_at, updated_at)
             VALUES ('alice', 'T1', 1, 'Task', 0, 0)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO follow_ups (owner_id, task_id, text, task_status, created_at)
             VALUES ('alice', 'T1', 'hello', 'Open', 0)",
            [],
        )
        .unwrap();

        // No cascade: the task cannot go while it still has follow-ups
        let blocked = conn.execute("DELETE FROM tasks WHERE task_number = 'T1'", []);
        assert!(blocked.is_err());
    }

    #[test]
    fn test_priority_constraint() {
        let conn = fresh();

        let result = conn.execute(
            "INSERT INTO tasks (owner_id, task_number, sequence, title, priority, created_at, updated_at)
             VALUES ('alice', 'T1', 1, 'Task', 'Urgent', 0, 0)",
            [],
        );
        assert!(result.is_err());
    }
}
