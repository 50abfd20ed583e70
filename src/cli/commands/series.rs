//! Recurring series commands.
//!
//! Any member of a series (root or generated occurrence) identifies it.

use colored::Colorize;

use super::{Target, block_on, clearable};
use crate::cli::{SeriesCommands, SeriesUpdateArgs};
use crate::error::{Error, Result};
use crate::model::{TaskNumber, TaskPatch};
use crate::storage::SqliteStorage;
use crate::sync::{SeriesOutcome, Workspace};
use crate::validate::normalize_priority;

/// Execute a series command.
///
/// # Errors
///
/// Returns `NotInitialized`, `TaskNotFound`, `InvalidArgument` or a storage
/// error. A task outside any series is reported, not treated as an error,
/// except by `spawn`, which needs a series to extend.
pub fn execute(command: &SeriesCommands, target: Target<'_>, json: bool) -> Result<()> {
    let ws = target.open()?;

    block_on(async {
        match command {
            SeriesCommands::Update(args) => update(&ws, args, json).await,
            SeriesCommands::Delete { number } => {
                let number = TaskNumber::parse(number)?;
                let outcome = ws.delete_series(&number).await?;
                report(&number, "Deleted", outcome, json)
            }
            SeriesCommands::Spawn { number } => spawn(&ws, number, json).await,
        }
    })
}

fn series_patch(args: &SeriesUpdateArgs) -> Result<TaskPatch> {
    let mut patch = TaskPatch {
        title: args.title.clone(),
        description: clearable(args.description.as_ref()),
        details: clearable(args.details.as_ref()),
        responsible: clearable(args.responsible.as_ref()),
        task_type: clearable(args.task_type.as_ref()),
        environment: clearable(args.environment.as_ref()),
        planned_time_hours: args.hours.map(Some),
        ..TaskPatch::default()
    };
    if let Some(priority) = &args.priority {
        patch.priority = Some(normalize_priority(priority)?);
    }
    Ok(patch)
}

async fn update(ws: &Workspace<SqliteStorage>, args: &SeriesUpdateArgs, json: bool) -> Result<()> {
    let number = TaskNumber::parse(&args.number)?;
    let patch = series_patch(args)?;
    if patch.is_empty() {
        return Err(Error::InvalidArgument("nothing to update: pass at least one field flag".to_string()));
    }
    let outcome = ws.update_series(&number, &patch).await?;
    report(&number, "Updated", outcome, json)
}

fn report(number: &TaskNumber, verb: &str, outcome: SeriesOutcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(&outcome)?);
        return Ok(());
    }

    match outcome {
        SeriesOutcome::Applied { members } => {
            if crate::is_silent() {
                println!("{members}");
            } else {
                println!("{verb} {members} task(s) in the series of {number}");
            }
        }
        SeriesOutcome::NothingToDo => {
            if !crate::is_silent() {
                println!("Nothing to do for the series of {number}");
            }
        }
        SeriesOutcome::NotInSeries => {
            if !crate::is_silent() {
                println!("{} {number} is not part of a recurring series", "Note:".yellow());
            }
        }
    }
    Ok(())
}

async fn spawn(ws: &Workspace<SqliteStorage>, number: &str, json: bool) -> Result<()> {
    let number = TaskNumber::parse(number)?;
    let spawned = ws.spawn_next(&number).await?;

    if json {
        println!("{}", serde_json::json!({ "spawned": spawned }));
        return Ok(());
    }

    match spawned {
        Some(task) if crate::is_silent() => println!("{}", task.row.task_number),
        Some(task) => {
            let due = task
                .row
                .due_date
                .map_or_else(|| "-".to_string(), |d| d.to_string());
            println!("Spawned {} due {due}: {}", task.row.task_number, task.row.title);
        }
        None if crate::is_silent() => {}
        None => println!("The series of {number} has ended; nothing spawned"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Priority;

    #[test]
    fn test_series_patch_excludes_status_and_due() {
        let args = SeriesUpdateArgs {
            number: "T1".to_string(),
            title: Some("Standup".to_string()),
            description: None,
            details: None,
            priority: Some("high".to_string()),
            responsible: Some(String::new()),
            task_type: None,
            environment: None,
            hours: Some(0.5),
        };
        let patch = series_patch(&args).unwrap();

        assert_eq!(patch.title.as_deref(), Some("Standup"));
        assert_eq!(patch.priority, Some(Priority::High));
        assert_eq!(patch.responsible, Some(None));
        assert_eq!(patch.status, None);
        assert_eq!(patch.due_date, None);
    }
}
