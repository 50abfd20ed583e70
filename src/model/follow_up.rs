//! Follow-up notes attached to a task.
//!
//! A follow-up's origin is structural: text that matches one of the audit
//! templates is an audit entry, anything else was written by a user. No flag
//! is stored.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::task::{TaskNumber, TaskStatus};

/// Text of the distinguished entry written when a task is completed.
pub const COMPLETED_TEXT: &str = "Task marked completed";

/// Rendering of an absent value in change templates.
const NONE_TEXT: &str = "None";

/// A stored follow-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUp {
    pub id: i64,
    /// The owning task's sequence number (not its row id).
    pub task_number: TaskNumber,
    pub text: String,
    /// Unix milliseconds.
    pub created_at: i64,
    /// Status of the task when the entry was written.
    pub task_status: TaskStatus,
}

impl FollowUp {
    #[must_use]
    pub fn origin(&self) -> FollowUpOrigin {
        FollowUpOrigin::classify(&self.text)
    }

    #[must_use]
    pub fn is_audit(&self) -> bool {
        matches!(self.origin(), FollowUpOrigin::Audit(_))
    }
}

/// A follow-up about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFollowUp {
    pub task_number: TaskNumber,
    pub text: String,
    pub created_at: i64,
    pub task_status: TaskStatus,
}

/// The tracked change an audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditKind {
    StatusChange,
    PriorityChange,
    TypeChange,
    DueDateChange,
    Completed,
}

impl AuditKind {
    const CHANGES: [Self; 4] = [
        Self::StatusChange,
        Self::PriorityChange,
        Self::TypeChange,
        Self::DueDateChange,
    ];

    /// Field label used in the change template.
    const fn label(self) -> Option<&'static str> {
        match self {
            Self::StatusChange => Some("Status"),
            Self::PriorityChange => Some("Priority"),
            Self::TypeChange => Some("Task type"),
            Self::DueDateChange => Some("Due date"),
            Self::Completed => None,
        }
    }

    /// Render the entry text for a field change.
    ///
    /// `Completed` ignores both values.
    #[must_use]
    pub fn render(self, old: &str, new: &str) -> String {
        match self.label() {
            Some(label) => format!("{label} changed from \"{old}\" to \"{new}\""),
            None => COMPLETED_TEXT.to_string(),
        }
    }

    fn matches(self, text: &str) -> bool {
        let Some(label) = self.label() else {
            return text == COMPLETED_TEXT;
        };
        text.strip_prefix(label)
            .and_then(|rest| rest.strip_prefix(" changed from \""))
            .and_then(|rest| rest.strip_suffix('"'))
            .is_some_and(|values| values.contains("\" to \""))
    }
}

/// Where a follow-up came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUpOrigin {
    User,
    Audit(AuditKind),
}

impl FollowUpOrigin {
    #[must_use]
    pub fn classify(text: &str) -> Self {
        if AuditKind::Completed.matches(text) {
            return Self::Audit(AuditKind::Completed);
        }
        AuditKind::CHANGES
            .into_iter()
            .find(|kind| kind.matches(text))
            .map_or(Self::User, Self::Audit)
    }
}

/// Template value for an optional text field.
#[must_use]
pub fn display_text(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => NONE_TEXT,
    }
}

/// Template value for an optional date (ISO 8601).
#[must_use]
pub fn display_date(value: Option<NaiveDate>) -> String {
    value.map_or_else(|| NONE_TEXT.to_string(), |d| d.format("%Y-%m-%d").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_templates() {
        assert_eq!(
            AuditKind::StatusChange.render("Open", "In Progress"),
            "Status changed from \"Open\" to \"In Progress\""
        );
        assert_eq!(
            AuditKind::TypeChange.render("Bug", "Feature"),
            "Task type changed from \"Bug\" to \"Feature\""
        );
        assert_eq!(AuditKind::Completed.render("x", "y"), COMPLETED_TEXT);
    }

    #[test]
    fn test_classify_by_structure() {
        for kind in AuditKind::CHANGES {
            let text = kind.render("a", "b");
            assert_eq!(FollowUpOrigin::classify(&text), FollowUpOrigin::Audit(kind));
        }
        assert_eq!(
            FollowUpOrigin::classify(COMPLETED_TEXT),
            FollowUpOrigin::Audit(AuditKind::Completed)
        );
        assert_eq!(
            FollowUpOrigin::classify("Status changed, see ticket"),
            FollowUpOrigin::User
        );
        assert_eq!(
            FollowUpOrigin::classify("Task marked completed early"),
            FollowUpOrigin::User
        );
        assert_eq!(FollowUpOrigin::classify("called the vendor"), FollowUpOrigin::User);
    }

    #[test]
    fn test_display_helpers() {
        assert_eq!(display_text(None), "None");
        assert_eq!(display_text(Some("")), "None");
        assert_eq!(display_text(Some("Bug")), "Bug");
        let date = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        assert_eq!(display_date(Some(date)), "2026-03-09");
        assert_eq!(display_date(None), "None");
    }
}
