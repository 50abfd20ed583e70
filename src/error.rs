//! Error types for taskdeck.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=db, 3=not_found, 4=validation, etc.)
//! - Retryability flags for scripted callers
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers
//!
//! Conditions that are recoverable by design (a task outside any recurring
//! series, a series with nothing left to touch) are not errors; they are
//! reported through outcome enums in [`crate::sync::recurrence`].

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for taskdeck operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (exit 2)
    NotInitialized,
    AlreadyInitialized,
    DatabaseError,

    // Not Found (exit 3)
    TaskNotFound,
    ProjectNotFound,
    FollowUpNotFound,
    NoRunningTimer,

    // Validation (exit 4)
    InvalidArgument,
    DuplicateProjectName,

    // Conflict (exit 5)
    AuditEntryImmutable,
    TimerAlreadyRunning,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::AlreadyInitialized => "ALREADY_INITIALIZED",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::TaskNotFound => "TASK_NOT_FOUND",
            Self::ProjectNotFound => "PROJECT_NOT_FOUND",
            Self::FollowUpNotFound => "FOLLOW_UP_NOT_FOUND",
            Self::NoRunningTimer => "NO_RUNNING_TIMER",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::DuplicateProjectName => "DUPLICATE_PROJECT_NAME",
            Self::AuditEntryImmutable => "AUDIT_ENTRY_IMMUTABLE",
            Self::TimerAlreadyRunning => "TIMER_ALREADY_RUNNING",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-8).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::NotInitialized | Self::AlreadyInitialized | Self::DatabaseError => 2,
            Self::TaskNotFound
            | Self::ProjectNotFound
            | Self::FollowUpNotFound
            | Self::NoRunningTimer => 3,
            Self::InvalidArgument | Self::DuplicateProjectName => 4,
            Self::AuditEntryImmutable | Self::TimerAlreadyRunning => 5,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether the caller can reasonably re-issue the action with corrected input.
    ///
    /// Nothing in this crate retries on its own; this flag only informs the caller.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument | Self::DuplicateProjectName | Self::DatabaseError
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in taskdeck operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not initialized: run `td init` first")]
    NotInitialized,

    #[error("Already initialized at {path}")]
    AlreadyInitialized { path: PathBuf },

    #[error("Task not found: {id}")]
    TaskNotFound { id: String },

    #[error("Project not found: {id}")]
    ProjectNotFound { id: String },

    #[error("Follow-up not found: {id}")]
    FollowUpNotFound { id: i64 },

    #[error("A project named \"{name}\" already exists")]
    DuplicateProjectName { name: String },

    #[error("Follow-up {id} was generated by the audit trail and cannot be edited")]
    AuditEntryImmutable { id: i64 },

    #[error("A timer is already running for {task}")]
    TimerAlreadyRunning { task: String },

    #[error("No running timer for {task}")]
    NoRunningTimer { task: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized => ErrorCode::NotInitialized,
            Self::AlreadyInitialized { .. } => ErrorCode::AlreadyInitialized,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::TaskNotFound { .. } => ErrorCode::TaskNotFound,
            Self::ProjectNotFound { .. } => ErrorCode::ProjectNotFound,
            Self::FollowUpNotFound { .. } => ErrorCode::FollowUpNotFound,
            Self::NoRunningTimer { .. } => ErrorCode::NoRunningTimer,
            Self::DuplicateProjectName { .. } => ErrorCode::DuplicateProjectName,
            Self::AuditEntryImmutable { .. } => ErrorCode::AuditEntryImmutable,
            Self::TimerAlreadyRunning { .. } => ErrorCode::TimerAlreadyRunning,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Whether this error means the referenced entity does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        self.error_code().exit_code() == 3
    }

    /// Context-aware recovery hint for humans and scripts.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized => Some("Run `td init` to create the database".to_string()),

            Self::AlreadyInitialized { path } => Some(format!(
                "Database already exists at {}. Use `--force` to reinitialize.",
                path.display()
            )),

            Self::TaskNotFound { id } => Some(format!(
                "No task with number '{id}'. Use `td task list --filter all` to see available tasks."
            )),

            Self::ProjectNotFound { id } => Some(format!(
                "No project with ID '{id}'. Use `td project list` to see available projects."
            )),

            Self::DuplicateProjectName { .. } => {
                Some("Project names are unique per owner. Pick another name.".to_string())
            }

            Self::AuditEntryImmutable { .. } => Some(
                "Only user-authored notes can be edited. Add a new note instead.".to_string(),
            ),

            Self::TimerAlreadyRunning { task } => {
                Some(format!("Stop it first: td timer stop {task}"))
            }

            Self::NoRunningTimer { task } => Some(format!("Start one: td timer start {task}")),

            Self::InvalidArgument(msg) => {
                if msg.contains("status") {
                    Some(
                        "Valid statuses: open, in_progress, completed, on_hold. \
                         Synonyms: done→completed, wip→in_progress, hold→on_hold"
                            .to_string(),
                    )
                } else if msg.contains("priority") {
                    Some("Valid priorities: low, medium, high, critical".to_string())
                } else if msg.contains("filter") {
                    Some(
                        "Valid filters: active, open, in_progress, on_hold, critical, all"
                            .to_string(),
                    )
                } else {
                    None
                }
            }

            Self::FollowUpNotFound { .. }
            | Self::Database(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Config(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
