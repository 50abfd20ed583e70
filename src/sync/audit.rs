//! Audit trail synthesis for task updates.
//!
//! [`plan_update`] diffs the stored row against an incoming patch and
//! returns the follow-ups to insert plus the patch to actually write. The
//! caller applies the patch first; audit inserts are best-effort and never
//! undo the update.

use chrono::{DateTime, Utc};

use crate::model::follow_up::{display_date, display_text};
use crate::model::{AuditKind, NewFollowUp, TaskPatch, TaskRow, TaskStatus};

/// Task type whose completion is not recorded in the trail.
pub const MEETING_TASK_TYPE: &str = "Meeting";

/// What an update will write.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditPlan {
    /// Follow-ups to insert once the update is stored.
    pub entries: Vec<NewFollowUp>,
    /// The patch to store; completion date is owned by this module.
    pub patch: TaskPatch,
}

/// Plan an update of `prev` with `patch` at `now`.
///
/// The completion date in `patch` is ignored. Entering `Completed` stamps
/// today's date and records one completion entry (none for meetings) in
/// place of the generic status entry. Leaving `Completed` clears the date.
/// Priority, task type and due date changes are recorded independently.
#[must_use]
pub fn plan_update(prev: &TaskRow, patch: &TaskPatch, now: DateTime<Utc>) -> AuditPlan {
    let mut patch = patch.clone();
    patch.completion_date = None;

    let new_status = patch.status.unwrap_or(prev.status);
    let completing = new_status.is_terminal() && !prev.status.is_terminal();
    let reopening = prev.status.is_terminal() && !new_status.is_terminal();

    if completing {
        patch.completion_date = Some(Some(now.date_naive()));
    } else if reopening {
        patch.completion_date = Some(None);
    }

    let new_type = patch.task_type.as_ref().unwrap_or(&prev.task_type);
    let mut texts = Vec::new();

    if completing {
        let is_meeting = new_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case(MEETING_TASK_TYPE));
        if !is_meeting {
            texts.push(AuditKind::Completed.render("", ""));
        }
    } else if new_status != prev.status {
        texts.push(AuditKind::StatusChange.render(prev.status.as_str(), new_status.as_str()));
    }

    if let Some(priority) = patch.priority.filter(|p| *p != prev.priority) {
        texts.push(AuditKind::PriorityChange.render(prev.priority.as_str(), priority.as_str()));
    }

    if *new_type != prev.task_type {
        texts.push(AuditKind::TypeChange.render(
            display_text(prev.task_type.as_deref()),
            display_text(new_type.as_deref()),
        ));
    }

    if let Some(due) = patch.due_date.filter(|d| *d != prev.due_date) {
        texts.push(AuditKind::DueDateChange.render(
            &display_date(prev.due_date),
            &display_date(due),
        ));
    }

    let entries = texts
        .into_iter()
        .map(|text| entry(prev, text, new_status, now))
        .collect();

    AuditPlan { entries, patch }
}

fn entry(prev: &TaskRow, text: String, status: TaskStatus, now: DateTime<Utc>) -> NewFollowUp {
    NewFollowUp {
        task_number: prev.task_number.clone(),
        text,
        created_at: now.timestamp_millis(),
        task_status: status,
    }
}
