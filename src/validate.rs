//! Input normalization for CLI arguments.
//!
//! Statuses, priorities, list filters, sort fields and weekdays accept
//! loose spellings. Resolution is three-tier: exact match → synonym lookup
//! → `InvalidArgument` with the closest suggestion.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{NaiveDate, Weekday};

use crate::error::{Error, Result};
use crate::model::{Priority, RecurrenceType, TaskStatus};
use crate::storage::{SortDirection, StatusFilter};
use crate::sync::SortField;

// ── Canonical values (O(1) lookups) ──────────────────────────

pub static STATUSES: LazyLock<HashMap<&str, TaskStatus>> = LazyLock::new(|| {
    [
        ("open", TaskStatus::Open),
        ("in_progress", TaskStatus::InProgress),
        ("completed", TaskStatus::Completed),
        ("on_hold", TaskStatus::OnHold),
    ]
    .into_iter()
    .collect()
});

pub static PRIORITIES: LazyLock<HashMap<&str, Priority>> = LazyLock::new(|| {
    [
        ("low", Priority::Low),
        ("medium", Priority::Medium),
        ("high", Priority::High),
        ("critical", Priority::Critical),
    ]
    .into_iter()
    .collect()
});

pub static FILTERS: LazyLock<HashMap<&str, StatusFilter>> = LazyLock::new(|| {
    [
        ("active", StatusFilter::Active),
        ("open", StatusFilter::Open),
        ("in_progress", StatusFilter::InProgress),
        ("on_hold", StatusFilter::OnHold),
        ("critical", StatusFilter::Critical),
        ("all", StatusFilter::All),
    ]
    .into_iter()
    .collect()
});

pub static SORT_FIELDS: LazyLock<HashMap<&str, SortField>> = LazyLock::new(|| {
    [
        ("due_date", SortField::DueDate),
        ("title", SortField::Title),
        ("responsible", SortField::Responsible),
        ("task_type", SortField::TaskType),
        ("environment", SortField::Environment),
        ("number", SortField::Sequence),
        ("priority", SortField::Priority),
    ]
    .into_iter()
    .collect()
});

// ── Synonym maps (typo recovery) ─────────────────────────────

pub static STATUS_SYNONYMS: LazyLock<HashMap<&str, &str>> = LazyLock::new(|| {
    [
        ("done", "completed"),
        ("complete", "completed"),
        ("closed", "completed"),
        ("finished", "completed"),
        ("resolved", "completed"),
        ("wip", "in_progress"),
        ("working", "in_progress"),
        ("started", "in_progress"),
        ("in progress", "in_progress"),
        ("inprogress", "in_progress"),
        ("new", "open"),
        ("todo", "open"),
        ("hold", "on_hold"),
        ("on hold", "on_hold"),
        ("blocked", "on_hold"),
        ("paused", "on_hold"),
        ("waiting", "on_hold"),
    ]
    .into_iter()
    .collect()
});

pub static PRIORITY_SYNONYMS: LazyLock<HashMap<&str, &str>> = LazyLock::new(|| {
    [
        ("crit", "critical"),
        ("urgent", "critical"),
        ("highest", "critical"),
        ("p0", "critical"),
        ("important", "high"),
        ("p1", "high"),
        ("normal", "medium"),
        ("default", "medium"),
        ("med", "medium"),
        ("p2", "medium"),
        ("minor", "low"),
        ("lowest", "low"),
        ("trivial", "low"),
        ("p3", "low"),
    ]
    .into_iter()
    .collect()
});

pub static FILTER_SYNONYMS: LazyLock<HashMap<&str, &str>> = LazyLock::new(|| {
    [
        ("everything", "all"),
        ("any", "all"),
        ("pending", "active"),
        ("incomplete", "active"),
        ("wip", "in_progress"),
        ("in progress", "in_progress"),
        ("hold", "on_hold"),
        ("on hold", "on_hold"),
        ("urgent", "critical"),
    ]
    .into_iter()
    .collect()
});

pub static SORT_SYNONYMS: LazyLock<HashMap<&str, &str>> = LazyLock::new(|| {
    [
        ("due", "due_date"),
        ("date", "due_date"),
        ("deadline", "due_date"),
        ("name", "title"),
        ("owner", "responsible"),
        ("assignee", "responsible"),
        ("type", "task_type"),
        ("env", "environment"),
        ("id", "number"),
        ("sequence", "number"),
        ("task_number", "number"),
        ("prio", "priority"),
    ]
    .into_iter()
    .collect()
});

/// Resolve `input` against a canonical table and its synonyms.
fn resolve<T: Copy>(
    what: &str,
    input: &str,
    canonical: &HashMap<&str, T>,
    synonyms: &HashMap<&str, &str>,
) -> Result<T> {
    let lower = input.trim().to_lowercase();
    let key = lower.replace('-', "_");

    // Tier 1: exact match
    if let Some(&value) = canonical.get(key.as_str()) {
        return Ok(value);
    }

    // Tier 2: synonym lookup
    if let Some(&value) = synonyms
        .get(lower.as_str())
        .or_else(|| synonyms.get(key.as_str()))
        .and_then(|name| canonical.get(name))
    {
        return Ok(value);
    }

    // Tier 3: closest suggestion
    let message = match find_closest_match(&key, canonical, synonyms) {
        Some(suggestion) => format!("unknown {what} '{input}' (did you mean '{suggestion}'?)"),
        None => format!("unknown {what} '{input}'"),
    };
    Err(Error::InvalidArgument(message))
}

/// Normalize a task status (`done`, `wip`, `On Hold`, ...).
///
/// # Errors
///
/// Returns `InvalidArgument` with a suggestion when nothing matches.
pub fn normalize_status(input: &str) -> Result<TaskStatus> {
    if let Some(status) = TaskStatus::from_stored(input.trim()) {
        return Ok(status);
    }
    resolve("status", input, &STATUSES, &STATUS_SYNONYMS)
}

/// Normalize a priority name (`high`, `urgent`, `P1`, ...).
///
/// # Errors
///
/// Returns `InvalidArgument` with a suggestion when nothing matches.
pub fn normalize_priority(input: &str) -> Result<Priority> {
    resolve("priority", input, &PRIORITIES, &PRIORITY_SYNONYMS)
}

/// Normalize a list filter.
///
/// # Errors
///
/// Returns `InvalidArgument` with a suggestion when nothing matches.
pub fn normalize_filter(input: &str) -> Result<StatusFilter> {
    resolve("filter", input, &FILTERS, &FILTER_SYNONYMS)
}

/// Normalize a sort field.
///
/// # Errors
///
/// Returns `InvalidArgument` with a suggestion when nothing matches.
pub fn normalize_sort(input: &str) -> Result<SortField> {
    resolve("sort field", input, &SORT_FIELDS, &SORT_SYNONYMS)
}

/// Parse `asc`/`desc`.
///
/// # Errors
///
/// Returns `InvalidArgument` for anything else.
pub fn parse_direction(input: &str) -> Result<SortDirection> {
    match input.trim().to_lowercase().as_str() {
        "asc" | "ascending" | "up" => Ok(SortDirection::Asc),
        "desc" | "descending" | "down" => Ok(SortDirection::Desc),
        _ => Err(Error::InvalidArgument(format!(
            "unknown sort direction '{input}' (use asc or desc)"
        ))),
    }
}

/// Parse a recurrence kind.
///
/// # Errors
///
/// Returns `InvalidArgument` for anything other than daily/weekly/monthly.
pub fn parse_recurrence_type(input: &str) -> Result<RecurrenceType> {
    RecurrenceType::parse(input).ok_or_else(|| {
        Error::InvalidArgument(format!(
            "unknown recurrence '{input}' (use daily, weekly or monthly)"
        ))
    })
}

/// Parse a comma-separated weekday list (`mon,wed,fri`).
///
/// # Errors
///
/// Returns `InvalidArgument` naming the first unparseable day.
pub fn parse_weekdays(input: &str) -> Result<Vec<Weekday>> {
    input
        .split(',')
        .map(str::trim)
        .filter(|day| !day.is_empty())
        .map(|day| {
            day.parse::<Weekday>()
                .map_err(|_| Error::InvalidArgument(format!("unknown weekday '{day}'")))
        })
        .collect()
}

/// Parse a `YYYY-MM-DD` date.
///
/// # Errors
///
/// Returns `InvalidArgument` if the value is not a calendar date.
pub fn parse_date(input: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|_| Error::InvalidArgument(format!("invalid date '{input}' (expected YYYY-MM-DD)")))
}

/// Find the closest matching value across canonical names and synonyms.
fn find_closest_match<T>(
    input: &str,
    canonical: &HashMap<&str, T>,
    synonyms: &HashMap<&str, &str>,
) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;

    for &candidate in canonical.keys().chain(synonyms.keys()) {
        let dist = levenshtein_distance(input, candidate);
        if dist <= 3 && best.is_none_or(|(_, best_dist)| dist < best_dist) {
            // For synonyms, show what it maps to
            let target = synonyms.get(candidate).copied().unwrap_or(candidate);
            best = Some((target, dist));
        }
    }

    best.map(|(v, _)| v.to_string())
}

// ── Levenshtein distance ─────────────────────────────────────

/// Compute the Levenshtein edit distance between two strings.
#[must_use]
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}
