//! Storage layer for taskdeck.
//!
//! The sync layer only sees the [`Backend`] trait. [`SqliteStorage`] is the
//! reference implementation:
//! - WAL mode for concurrent reads
//! - IMMEDIATE transactions for atomic writes
//! - Change events published after every commit
//!
//! # Submodules
//!
//! - [`backend`] - The backend contract and query types
//! - [`events`] - Change notifications
//! - [`schema`] - Database schema definitions
//! - [`sqlite`] - SQLite implementation

pub mod backend;
pub mod events;
pub mod schema;
pub mod sqlite;
#[cfg(test)]
pub(crate) mod testing;

pub use backend::{
    Backend, Deletion, SortColumn, SortDirection, StatusFilter, TaskQuery, TextMatch, Window,
};
pub use events::{ChangeBus, ChangeEvent, ChangeKind, Table};
pub use sqlite::{MutationContext, QueryCounts, QueryStats, SqliteStorage};
