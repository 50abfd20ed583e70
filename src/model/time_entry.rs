//! Time entries recorded against a task.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::task::TaskNumber;

/// A tracked span of work. Running while `ended_at` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeEntry {
    pub id: i64,
    pub owner_id: String,
    pub task_number: TaskNumber,
    /// Unix milliseconds.
    pub started_at: i64,
    /// Unix milliseconds.
    pub ended_at: Option<i64>,
}

impl TimeEntry {
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Elapsed time; a running entry is measured up to `now`.
    #[must_use]
    pub fn duration(&self, now: DateTime<Utc>) -> Duration {
        let end = self.ended_at.unwrap_or_else(|| now.timestamp_millis());
        Duration::milliseconds((end - self.started_at).max(0))
    }
}
