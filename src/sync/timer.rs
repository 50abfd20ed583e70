//! Time tracking with at most one running timer per task.
//!
//! Storage does not enforce the single-running rule; [`TimeTracker`] checks
//! it before starting a timer.

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::error::{Error, Result};
use crate::model::{TaskNumber, TimeEntry};
use crate::storage::Backend;

pub struct TimeTracker<'a, B> {
    backend: &'a B,
    owner_id: &'a str,
}

impl<'a, B: Backend> TimeTracker<'a, B> {
    #[must_use]
    pub fn new(backend: &'a B, owner_id: &'a str) -> Self {
        Self { backend, owner_id }
    }

    /// Start a timer on a task.
    ///
    /// # Errors
    ///
    /// Returns `TaskNotFound` for an unknown task and `TimerAlreadyRunning`
    /// if the task already has a running entry.
    pub async fn start(&self, number: &TaskNumber, now: DateTime<Utc>) -> Result<TimeEntry> {
        if self.backend.get_task(self.owner_id, number).await?.is_none() {
            return Err(Error::TaskNotFound { id: number.to_string() });
        }
        if self.backend.running_time_entry(self.owner_id, number).await?.is_some() {
            return Err(Error::TimerAlreadyRunning { task: number.to_string() });
        }

        let entry = self
            .backend
            .insert_time_entry(self.owner_id, number, now.timestamp_millis())
            .await?;
        info!(task = %number, entry = entry.id, "timer started");
        Ok(entry)
    }

    /// Stop the running timer on a task.
    ///
    /// # Errors
    ///
    /// Returns `NoRunningTimer` if nothing is running for the task.
    pub async fn stop(&self, number: &TaskNumber, now: DateTime<Utc>) -> Result<TimeEntry> {
        let running = self
            .backend
            .running_time_entry(self.owner_id, number)
            .await?
            .ok_or_else(|| Error::NoRunningTimer { task: number.to_string() })?;

        let entry = self
            .backend
            .finish_time_entry(running.id, now.timestamp_millis().max(running.started_at))
            .await?;
        info!(task = %number, entry = entry.id, "timer stopped");
        Ok(entry)
    }

    /// All entries for a task, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    pub async fn entries(&self, number: &TaskNumber) -> Result<Vec<TimeEntry>> {
        self.backend.time_entries_for(self.owner_id, number).await
    }

    /// Total tracked time, counting a running entry up to `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    pub async fn total(&self, number: &TaskNumber, now: DateTime<Utc>) -> Result<Duration> {
        let entries = self.entries(number).await?;
        Ok(entries
            .iter()
            .map(|entry| entry.duration(now))
            .fold(Duration::zero(), |acc, d| acc + d))
    }
}
