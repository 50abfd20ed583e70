//! Time tracking commands.

use chrono::Utc;
use colored::Colorize;
use serde::Serialize;

use super::{Target, block_on, format_timestamp};
use crate::cli::TimerCommands;
use crate::error::Result;
use crate::model::{TaskNumber, TimeEntry};

#[derive(Serialize)]
struct EntryOutput<'a> {
    #[serde(flatten)]
    entry: &'a TimeEntry,
    running: bool,
    minutes: i64,
}

#[derive(Serialize)]
struct EntryListOutput<'a> {
    task: &'a TaskNumber,
    entries: Vec<EntryOutput<'a>>,
    total_minutes: i64,
}

/// Execute a timer command.
///
/// # Errors
///
/// Returns `NotInitialized`, `TaskNotFound`, `TimerAlreadyRunning`,
/// `NoRunningTimer` or a storage error.
pub fn execute(command: &TimerCommands, target: Target<'_>, json: bool) -> Result<()> {
    let ws = target.open()?;

    block_on(async {
        let now = Utc::now();
        match command {
            TimerCommands::Start { number } => {
                let number = TaskNumber::parse(number)?;
                let entry = ws.timers().start(&number, now).await?;
                print_entry("Started timer", &entry, json)
            }
            TimerCommands::Stop { number } => {
                let number = TaskNumber::parse(number)?;
                let entry = ws.timers().stop(&number, now).await?;
                print_entry("Stopped timer", &entry, json)
            }
            TimerCommands::List { number } => {
                let number = TaskNumber::parse(number)?;
                ws.task(&number).await?;
                let entries = ws.timers().entries(&number).await?;
                let total = ws.timers().total(&number, now).await?;

                if json {
                    let output = EntryListOutput {
                        task: &number,
                        entries: entries
                            .iter()
                            .map(|entry| EntryOutput {
                                entry,
                                running: entry.is_running(),
                                minutes: entry.duration(now).num_minutes(),
                            })
                            .collect(),
                        total_minutes: total.num_minutes(),
                    };
                    println!("{}", serde_json::to_string(&output)?);
                } else if entries.is_empty() {
                    println!("No time tracked on {number}.");
                } else {
                    println!("Time on {number} ({}m total):", total.num_minutes());
                    for entry in &entries {
                        let end = entry
                            .ended_at
                            .map_or_else(|| "running".green().to_string(), format_timestamp);
                        println!(
                            "  #{:<4} {} → {} {}",
                            entry.id,
                            format_timestamp(entry.started_at),
                            end,
                            format!("({}m)", entry.duration(now).num_minutes()).dimmed()
                        );
                    }
                }
                Ok(())
            }
        }
    })
}

fn print_entry(verb: &str, entry: &TimeEntry, json: bool) -> Result<()> {
    if crate::is_silent() {
        println!("{}", entry.id);
    } else if json {
        let output = EntryOutput {
            entry,
            running: entry.is_running(),
            minutes: entry.duration(Utc::now()).num_minutes(),
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("{verb} on {} (entry #{})", entry.task_number, entry.id);
    }
    Ok(())
}
