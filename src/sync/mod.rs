//! Data synchronization and recurrence layer.
//!
//! Sits between a client and a [`Backend`](crate::storage::Backend):
//!
//! - [`name_cache`] - Project id → name memo shared across batches
//! - [`batch`] - Hydrates task rows with at most two join queries per batch
//! - [`audit`] - Synthesizes follow-ups for tracked field changes
//! - [`recurrence`] - Series resolution, series-wide update/delete, next instance
//! - [`pagination`] - Two-phase paged reads and materialized search
//! - [`view`] - Confirmed page plus pending local edits
//! - [`realtime`] - Change notifications → full view reloads
//! - [`debounce`] - Search keystroke coalescing
//! - [`timer`] - Time tracking
//! - [`workspace`] - Owner-scoped facade over all of the above

pub mod audit;
pub mod batch;
pub mod debounce;
pub mod name_cache;
pub mod pagination;
pub mod realtime;
pub mod recurrence;
pub mod timer;
pub mod view;
pub mod workspace;

pub use audit::{AuditPlan, plan_update};
pub use batch::BatchLoader;
pub use debounce::{DEFAULT_SEARCH_DEBOUNCE, debounce, spawn_search_debouncer};
pub use name_cache::NameCache;
pub use pagination::{DEFAULT_PAGE_SIZE, ListRequest, Page, PageController, SortField, sort_by_priority};
pub use realtime::{RealtimeListener, Reload, ViewReloader};
pub use recurrence::{
    RecurrenceManager, SeriesFields, SeriesOutcome, SeriesRef, resolve_series,
};
pub use timer::TimeTracker;
pub use view::{ApplyOutcome, DEFAULT_EDIT_WINDOW, PendingEdit, TaskListView};
pub use workspace::Workspace;
