//! Task model.
//!
//! A task has two identities: the human-readable sequence number
//! ([`TaskNumber`], e.g. `T468`) that everything user-facing refers to, and
//! the internal row id ([`TaskId`]) used only for storage joins and series
//! lineage.

use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::follow_up::FollowUp;
use super::links::LinkGroups;
use super::recurrence::RecurrenceRule;
use crate::error::{Error, Result};

/// Internal storage row id.
pub type TaskId = i64;

/// Human-readable, per-owner unique sequence number (`T` + integer).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskNumber(String);

impl TaskNumber {
    const PREFIX: char = 'T';

    /// Build the task number for a sequence value.
    #[must_use]
    pub fn from_sequence(sequence: i64) -> Self {
        Self(format!("{}{sequence}", Self::PREFIX))
    }

    /// Parse user input: `T12`, `t12` and `12` are all accepted.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the input has no numeric part.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let digits = trimmed
            .strip_prefix(Self::PREFIX)
            .or_else(|| trimmed.strip_prefix(Self::PREFIX.to_ascii_lowercase()))
            .unwrap_or(trimmed);

        digits
            .parse::<i64>()
            .ok()
            .filter(|n| *n > 0)
            .map(Self::from_sequence)
            .ok_or_else(|| Error::InvalidArgument(format!("invalid task number '{input}'")))
    }

    /// The numeric part of the task number.
    #[must_use]
    pub fn sequence(&self) -> Option<i64> {
        self.0.get(1..).and_then(|s| s.parse().ok())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wrap a value read back from storage without re-validating it.
    #[must_use]
    pub(crate) fn from_stored(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for TaskNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Task workflow status. `Completed` is the terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Open,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
    #[serde(rename = "On Hold")]
    OnHold,
}

impl TaskStatus {
    pub const ALL: [Self; 4] = [Self::Open, Self::InProgress, Self::Completed, Self::OnHold];

    /// Display and storage form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
            Self::OnHold => "On Hold",
        }
    }

    /// Inverse of [`TaskStatus::as_str`].
    #[must_use]
    pub fn from_stored(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task priority with a fixed rank used for client-side ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    pub const ALL: [Self; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    /// Critical=4, High=3, Medium=2, Low=1.
    #[must_use]
    pub const fn rank(&self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
            Self::Critical => 4,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Critical => "Critical",
        }
    }

    #[must_use]
    pub fn from_stored(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == s)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a task's free-form checklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub text: String,
    #[serde(default)]
    pub completed: bool,
}

impl ChecklistItem {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            completed: false,
        }
    }
}

/// A task exactly as stored: no follow-ups, no resolved project name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRow {
    pub id: TaskId,
    pub task_number: TaskNumber,
    pub owner_id: String,
    pub title: String,
    pub description: Option<String>,
    pub details: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub responsible: Option<String>,
    #[serde(default)]
    pub scope: BTreeSet<String>,
    pub task_type: Option<String>,
    pub environment: Option<String>,
    pub project_id: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub completion_date: Option<NaiveDate>,
    pub planned_time_hours: Option<f64>,
    #[serde(default)]
    pub checklist: Vec<ChecklistItem>,
    #[serde(default)]
    pub links: LinkGroups,
    #[serde(default)]
    pub is_recurring: bool,
    pub recurrence: Option<RecurrenceRule>,
    pub parent_task_id: Option<TaskId>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TaskRow {
    /// Whether this task is the root of a recurring series.
    #[must_use]
    pub fn is_series_root(&self) -> bool {
        self.is_recurring
    }

    /// Whether this task is a generated occurrence of some series.
    #[must_use]
    pub fn is_series_instance(&self) -> bool {
        !self.is_recurring && self.parent_task_id.is_some()
    }
}

/// A fully hydrated task: the stored row plus its joins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(flatten)]
    pub row: TaskRow,
    /// Resolved project display name; empty when unassigned or unresolved.
    pub project_name: String,
    pub follow_ups: Vec<FollowUp>,
}

/// Input for creating a task. The sequence number is assigned by storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub owner_id: String,
    pub title: String,
    pub description: Option<String>,
    pub details: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub responsible: Option<String>,
    pub scope: BTreeSet<String>,
    pub task_type: Option<String>,
    pub environment: Option<String>,
    pub project_id: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub planned_time_hours: Option<f64>,
    pub checklist: Vec<ChecklistItem>,
    pub links: LinkGroups,
    pub is_recurring: bool,
    pub recurrence: Option<RecurrenceRule>,
    pub parent_task_id: Option<TaskId>,
}

impl NewTask {
    /// A new open, medium-priority task with nothing else set.
    #[must_use]
    pub fn new(owner_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            title: title.into(),
            description: None,
            details: None,
            status: TaskStatus::Open,
            priority: Priority::default(),
            responsible: None,
            scope: BTreeSet::new(),
            task_type: None,
            environment: None,
            project_id: None,
            start_date: None,
            due_date: None,
            planned_time_hours: None,
            checklist: Vec::new(),
            links: LinkGroups::default(),
            is_recurring: false,
            recurrence: None,
            parent_task_id: None,
        }
    }

    /// Completion date implied by the initial status.
    #[must_use]
    pub fn initial_completion_date(&self, today: NaiveDate) -> Option<NaiveDate> {
        self.status.is_terminal().then_some(today)
    }
}

/// A partial update. `None` leaves a field untouched; for nullable fields
/// `Some(None)` clears the stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub details: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub responsible: Option<Option<String>>,
    pub scope: Option<BTreeSet<String>>,
    pub task_type: Option<Option<String>>,
    pub environment: Option<Option<String>>,
    pub project_id: Option<Option<String>>,
    pub start_date: Option<Option<NaiveDate>>,
    pub due_date: Option<Option<NaiveDate>>,
    pub completion_date: Option<Option<NaiveDate>>,
    pub planned_time_hours: Option<Option<f64>>,
    pub checklist: Option<Vec<ChecklistItem>>,
    pub links: Option<LinkGroups>,
    pub is_recurring: Option<bool>,
    pub recurrence: Option<Option<RecurrenceRule>>,
}

impl TaskPatch {
    /// True when applying the patch would change nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Overlay `later` onto `self`; fields set in `later` win.
    pub fn merge(&mut self, later: Self) {
        macro_rules! take_later {
            ($($field:ident),*) => {
                $(if later.$field.is_some() { self.$field = later.$field; })*
            };
        }
        take_later!(
            title,
            description,
            details,
            status,
            priority,
            responsible,
            scope,
            task_type,
            environment,
            project_id,
            start_date,
            due_date,
            completion_date,
            planned_time_hours,
            checklist,
            links,
            is_recurring,
            recurrence
        );
    }

    /// Apply the patch to an in-memory row.
    pub fn apply_to(&self, row: &mut TaskRow) {
        macro_rules! apply {
            ($($field:ident),*) => {
                $(if let Some(value) = &self.$field { row.$field = value.clone(); })*
            };
        }
        apply!(
            title,
            description,
            details,
            status,
            priority,
            responsible,
            scope,
            task_type,
            environment,
            project_id,
            start_date,
            due_date,
            completion_date,
            planned_time_hours,
            checklist,
            links,
            is_recurring,
            recurrence
        );
    }
}
