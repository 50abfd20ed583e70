//! In-memory list view state.
//!
//! A view keeps two layers: the last confirmed page from the backend and an
//! overlay of local edits not yet seen in a reload. Reads merge the overlay
//! over the confirmed rows.
//!
//! A reload that lands while an edit is pending keeps the edit if it is
//! younger than the edit window (last local edit wins) and drops it
//! otherwise, by which time the write has either reached the backend or
//! failed and been discarded.

use std::collections::HashMap;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tracing::debug;

use super::pagination::{ListRequest, Page};
use crate::model::{Task, TaskNumber, TaskPatch};

/// Default lifetime of a pending edit across reloads.
pub const DEFAULT_EDIT_WINDOW: Duration = Duration::from_millis(2000);

/// SHA-256 digest of a serialized page.
pub type Fingerprint = [u8; 32];

/// A local edit not yet confirmed by a reload.
#[derive(Debug, Clone)]
pub struct PendingEdit {
    pub patch: TaskPatch,
    pub recorded_at: Instant,
}

/// What a backend response did to the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The response answers a request the view has moved past.
    Stale,
    /// Same content as the confirmed page.
    Unchanged,
    Replaced,
}

#[derive(Debug)]
pub struct TaskListView {
    request: ListRequest,
    confirmed: Option<Page<Task>>,
    fingerprint: Option<Fingerprint>,
    pending: HashMap<TaskNumber, PendingEdit>,
    edit_window: Duration,
}

impl TaskListView {
    #[must_use]
    pub fn new(request: ListRequest, edit_window: Duration) -> Self {
        Self {
            request,
            confirmed: None,
            fingerprint: None,
            pending: HashMap::new(),
            edit_window,
        }
    }

    #[must_use]
    pub fn request(&self) -> &ListRequest {
        &self.request
    }

    /// Move the view to a new context (page, filter, search...). Responses
    /// to the old request become stale.
    pub fn set_request(&mut self, request: ListRequest) {
        if request != self.request {
            self.request = request;
            self.fingerprint = None;
        }
    }

    /// Record a local edit; edits to the same task accumulate.
    pub fn record_edit(&mut self, number: TaskNumber, patch: TaskPatch) {
        let now = Instant::now();
        self.pending
            .entry(number)
            .and_modify(|edit| {
                edit.patch.merge(patch.clone());
                edit.recorded_at = now;
            })
            .or_insert(PendingEdit {
                patch,
                recorded_at: now,
            });
    }

    /// Drop a pending edit whose write failed.
    pub fn discard_edit(&mut self, number: &TaskNumber) -> Option<PendingEdit> {
        self.pending.remove(number)
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Apply a backend response for `request`.
    pub fn apply_response(&mut self, request: &ListRequest, page: Page<Task>) -> ApplyOutcome {
        if *request != self.request {
            debug!(page = request.page, "stale response discarded");
            return ApplyOutcome::Stale;
        }

        let window = self.edit_window;
        self.pending
            .retain(|_, edit| edit.recorded_at.elapsed() < window);

        let digest = fingerprint(&page);
        if digest.is_some() && digest == self.fingerprint {
            return ApplyOutcome::Unchanged;
        }

        self.fingerprint = digest;
        self.confirmed = Some(page);
        ApplyOutcome::Replaced
    }

    #[must_use]
    pub fn confirmed(&self) -> Option<&Page<Task>> {
        self.confirmed.as_ref()
    }

    #[must_use]
    pub fn fingerprint(&self) -> Option<Fingerprint> {
        self.fingerprint
    }

    /// Confirmed rows with pending edits applied.
    #[must_use]
    pub fn rows(&self) -> Vec<Task> {
        let Some(page) = &self.confirmed else {
            return Vec::new();
        };
        page.items
            .iter()
            .map(|task| {
                let mut task = task.clone();
                if let Some(edit) = self.pending.get(&task.row.task_number) {
                    edit.patch.apply_to(&mut task.row);
                }
                task
            })
            .collect()
    }
}

/// Digest of a page's serialized form, or `None` if it cannot be serialized.
#[must_use]
pub fn fingerprint(page: &Page<Task>) -> Option<Fingerprint> {
    let bytes = serde_json::to_vec(page).ok()?;
    Some(Sha256::digest(&bytes).into())
}
