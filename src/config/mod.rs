//! Configuration management.
//!
//! Resolves the database path, the owner every command acts for, and the
//! sync tunables (page size, search debounce, pending-edit window).
//!
//! taskdeck uses a single global database at
//! `~/.taskdeck/data/taskdeck.db`, overridable per invocation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sync::{DEFAULT_EDIT_WINDOW, DEFAULT_PAGE_SIZE, DEFAULT_SEARCH_DEBOUNCE};

/// Get the global taskdeck directory (`~/.taskdeck/`).
#[must_use]
pub fn global_taskdeck_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".taskdeck"))
}

/// Check if test mode is enabled.
///
/// Test mode is enabled by setting `TD_TEST_DB=1` (or any non-empty value
/// other than `0`/`false`). It redirects to an isolated test database.
#[must_use]
pub fn is_test_mode() -> bool {
    std::env::var("TD_TEST_DB").is_ok_and(|v| is_truthy(&v))
}

fn is_truthy(value: &str) -> bool {
    !value.is_empty() && value != "0" && !value.eq_ignore_ascii_case("false")
}

/// Get the test database path (`~/.taskdeck/test/taskdeck.db`).
#[must_use]
pub fn test_db_path() -> Option<PathBuf> {
    global_taskdeck_dir().map(|dir| dir.join("test").join("taskdeck.db"))
}

/// Resolve the database path.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `TD_TEST_DB` environment variable → uses test database
/// 3. `TASKDECK_DB` environment variable
/// 4. Global location: `~/.taskdeck/data/taskdeck.db`
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if is_test_mode() {
        return test_db_path();
    }

    if let Ok(db_path) = std::env::var("TASKDECK_DB") {
        if !db_path.trim().is_empty() {
            return Some(PathBuf::from(db_path));
        }
    }

    global_taskdeck_dir().map(|dir| dir.join("data").join("taskdeck.db"))
}

/// Resolve the owner id commands act for.
///
/// Priority:
/// 1. Explicit `--owner` flag
/// 2. `TD_OWNER` environment variable
/// 3. Git user name
/// 4. System username
/// 5. "unknown"
#[must_use]
pub fn resolve_owner(explicit: Option<&str>) -> String {
    if let Some(owner) = explicit.map(str::trim).filter(|o| !o.is_empty()) {
        return owner.to_string();
    }

    if let Ok(owner) = std::env::var("TD_OWNER") {
        if !owner.trim().is_empty() {
            return owner.trim().to_string();
        }
    }

    if let Ok(output) = std::process::Command::new("git")
        .args(["config", "user.name"])
        .output()
    {
        if output.status.success() {
            let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !name.is_empty() {
                return name;
            }
        }
    }

    if let Ok(user) = std::env::var("USER") {
        return user;
    }

    "unknown".to_string()
}

/// Sync-layer tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    /// Rows per page (`TD_PAGE_SIZE`).
    pub page_size: usize,
    /// Quiet period before a search is issued (`TD_SEARCH_DEBOUNCE_MS`).
    pub search_debounce: Duration,
    /// How long a local edit survives reloads (`TD_PENDING_EDIT_WINDOW_MS`).
    pub pending_edit_window: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            search_debounce: DEFAULT_SEARCH_DEBOUNCE,
            pending_edit_window: DEFAULT_EDIT_WINDOW,
        }
    }
}

impl SyncSettings {
    /// Load from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary key lookup. Invalid values are logged and
    /// replaced by the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let positive = |key: &str| -> Option<u64> {
            let raw = lookup(key)?;
            match raw.trim().parse::<u64>() {
                Ok(value) if value > 0 => Some(value),
                _ => {
                    tracing::warn!(key, value = %raw, "ignoring invalid setting");
                    None
                }
            }
        };

        Self {
            page_size: positive("TD_PAGE_SIZE")
                .and_then(|v| usize::try_from(v).ok())
                .unwrap_or(defaults.page_size),
            search_debounce: positive("TD_SEARCH_DEBOUNCE_MS")
                .map_or(defaults.search_debounce, Duration::from_millis),
            pending_edit_window: positive("TD_PENDING_EDIT_WINDOW_MS")
                .map_or(defaults.pending_edit_window, Duration::from_millis),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_resolve_owner_explicit_wins() {
        assert_eq!(resolve_owner(Some(" alice ")), "alice");
        assert!(!resolve_owner(None).is_empty());
    }

    #[test]
    fn test_resolve_db_path_with_explicit() {
        let explicit = PathBuf::from("/custom/path/db.sqlite");
        let result = resolve_db_path(Some(&explicit));
        assert_eq!(result, Some(explicit));
    }

    #[test]
    fn test_test_db_path_is_separate() {
        let global = global_taskdeck_dir().unwrap();
        let test = test_db_path().unwrap();

        assert!(test.to_string_lossy().contains("test"));
        assert!(test.ends_with("taskdeck.db"));
        assert_ne!(global.join("data").join("taskdeck.db"), test);
    }

    #[test]
    fn test_truthy_parsing() {
        for value in ["", "0", "false", "FALSE"] {
            assert!(!is_truthy(value), "{value:?}");
        }
        for value in ["1", "true", "yes"] {
            assert!(is_truthy(value), "{value:?}");
        }
    }

    #[test]
    fn test_settings_from_lookup() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("TD_PAGE_SIZE", "50"),
            ("TD_SEARCH_DEBOUNCE_MS", "nope"),
            ("TD_PENDING_EDIT_WINDOW_MS", "0"),
        ]);
        let settings = SyncSettings::from_lookup(|key| env.get(key).map(ToString::to_string));

        assert_eq!(settings.page_size, 50);
        assert_eq!(settings.search_debounce, DEFAULT_SEARCH_DEBOUNCE);
        assert_eq!(settings.pending_edit_window, DEFAULT_EDIT_WINDOW);
    }
}
