//! Data models for taskdeck.
//!
//! This module contains all domain models:
//! - Task (row, hydrated task, patches)
//! - Project
//! - FollowUp (user notes and audit entries)
//! - RecurrenceRule
//! - TimeEntry
//! - LinkGroups

pub mod follow_up;
pub mod links;
pub mod project;
pub mod recurrence;
pub mod task;
pub mod time_entry;

pub use follow_up::{AuditKind, FollowUp, FollowUpOrigin, NewFollowUp, COMPLETED_TEXT};
pub use links::{Link, LinkCategory, LinkGroups};
pub use project::{Project, ProjectPatch, ProjectStatus};
pub use recurrence::{RecurrenceRule, RecurrenceType};
pub use task::{
    ChecklistItem, NewTask, Priority, Task, TaskId, TaskNumber, TaskPatch, TaskRow, TaskStatus,
};
pub use time_entry::TimeEntry;
