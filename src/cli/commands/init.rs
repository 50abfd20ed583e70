//! Create the taskdeck database.
//!
//! The database lives at `~/.taskdeck/data/taskdeck.db` unless `--db` or
//! `TASKDECK_DB` says otherwise. With `TD_TEST_DB=1` it goes to
//! `~/.taskdeck/test/taskdeck.db`.

use crate::config::resolve_db_path;
use crate::error::{Error, Result};
use crate::storage::SqliteStorage;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct InitOutput {
    database: PathBuf,
    reinitialized: bool,
}

/// Execute the init command.
///
/// # Errors
///
/// Returns `AlreadyInitialized` if the database exists and `force` is not
/// set, or an error if the directory or database cannot be created.
pub fn execute(db_path: Option<&PathBuf>, force: bool, json: bool) -> Result<()> {
    let db_path = resolve_db_path(db_path.map(PathBuf::as_path)).ok_or_else(|| {
        Error::Config("Could not determine the taskdeck data directory".to_string())
    })?;

    let reinitialized = initialize(&db_path, force)?;

    if crate::is_silent() {
        println!("{}", db_path.display());
        return Ok(());
    }

    if json {
        let output = InitOutput {
            database: db_path,
            reinitialized,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("Initialized taskdeck database");
        println!("  Database: {}", db_path.display());
        println!();
        println!("Next: td project create <name>, then td task create <title>");
    }

    Ok(())
}

/// Create (or with `force`, recreate) the database and apply the schema.
/// Returns whether an existing database was replaced.
fn initialize(db_path: &Path, force: bool) -> Result<bool> {
    let existed = db_path.exists();
    if existed && !force {
        return Err(Error::AlreadyInitialized {
            path: db_path.to_path_buf(),
        });
    }

    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }

    if existed {
        fs::remove_file(db_path)?;
        for suffix in ["-wal", "-shm"] {
            let sidecar = PathBuf::from(format!("{}{suffix}", db_path.display()));
            if sidecar.exists() {
                fs::remove_file(sidecar)?;
            }
        }
    }

    SqliteStorage::open(db_path)?;
    Ok(existed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_creates_database() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("taskdeck.db");

        assert!(!initialize(&path, false).unwrap());
        assert!(path.exists());
    }

    #[test]
    fn test_init_fails_if_already_initialized() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("taskdeck.db");

        initialize(&path, false).unwrap();
        let result = initialize(&path, false);
        assert!(matches!(result, Err(Error::AlreadyInitialized { .. })));
    }

    #[test]
    fn test_init_force_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("taskdeck.db");

        initialize(&path, false).unwrap();
        assert!(initialize(&path, true).unwrap());
        assert!(path.exists());
    }
}
