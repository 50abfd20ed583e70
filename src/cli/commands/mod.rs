//! Command implementations.
//!
//! Every data command opens the database, wraps it in a
//! [`Workspace`] for the resolved owner, and drives the async sync layer on
//! a fresh tokio runtime.

pub mod completions;
pub mod init;
pub mod project;
pub mod series;
pub mod task;
pub mod timer;
pub mod watch;

use std::future::Future;
use std::path::PathBuf;

use chrono::NaiveDate;
use colored::Colorize;

use crate::config::{resolve_db_path, resolve_owner};
use crate::error::{Error, Result};
use crate::model::{Task, TaskStatus};
use crate::storage::SqliteStorage;
use crate::sync::Workspace;
use crate::validate::parse_date;

/// Database path and owner shared by every data command.
#[derive(Debug, Clone, Copy)]
pub struct Target<'a> {
    pub db: Option<&'a PathBuf>,
    pub owner: Option<&'a str>,
}

impl Target<'_> {
    /// Open the database and bind it to the resolved owner.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` if no database exists at the resolved path.
    pub fn open(&self) -> Result<Workspace<SqliteStorage>> {
        let db_path = resolve_db_path(self.db.map(PathBuf::as_path)).ok_or(Error::NotInitialized)?;

        if !db_path.exists() {
            return Err(Error::NotInitialized);
        }

        let storage = SqliteStorage::open(&db_path)?;
        Ok(Workspace::new(storage, resolve_owner(self.owner)))
    }
}

/// Run an async command body to completion.
pub(crate) fn block_on<F: Future<Output = Result<()>>>(future: F) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| Error::Other(format!("Failed to create async runtime: {e}")))?;
    rt.block_on(future)
}

/// `Some("")` → clear, `Some(text)` → set, `None` → untouched.
pub(crate) fn clearable(value: Option<&String>) -> Option<Option<String>> {
    value.map(|v| {
        let trimmed = v.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

/// Like [`clearable`] for dates.
pub(crate) fn clearable_date(value: Option<&String>) -> Result<Option<Option<NaiveDate>>> {
    match clearable(value) {
        None => Ok(None),
        Some(None) => Ok(Some(None)),
        Some(Some(text)) => Ok(Some(Some(parse_date(&text)?))),
    }
}

pub(crate) fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ts)
        .map(|dt| dt.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

pub(crate) fn status_label(status: TaskStatus) -> colored::ColoredString {
    match status {
        TaskStatus::Open => status.as_str().normal(),
        TaskStatus::InProgress => status.as_str().cyan(),
        TaskStatus::OnHold => status.as_str().yellow(),
        TaskStatus::Completed => status.as_str().green(),
    }
}

/// One table row per task.
pub(crate) fn print_task_rows(tasks: &[Task]) {
    for task in tasks {
        let row = &task.row;
        let due = row
            .due_date
            .map_or_else(|| "-".to_string(), |d| d.to_string());
        let project = if task.project_name.is_empty() {
            String::new()
        } else {
            format!("[{}]", task.project_name)
        };
        let series = if row.is_series_root() {
            " ↻"
        } else if row.is_series_instance() {
            " ·"
        } else {
            ""
        };
        println!(
            "  {:<6} {:<11} {:<8} {:<10} {}{} {}",
            row.task_number.as_str().bold(),
            status_label(row.status),
            row.priority.as_str(),
            due,
            row.title,
            series,
            project.dimmed()
        );
    }
}
