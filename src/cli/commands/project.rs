//! Project management commands.
//!
//! - `td project create <name>` - Create a project
//! - `td project list` - List the owner's projects
//! - `td project rename <project> <name>` - Rename (by id or current name)
//! - `td project delete <project>` - Delete with every task in it

use super::{Target, block_on, format_timestamp};
use crate::cli::ProjectCommands;
use crate::error::Result;
use crate::model::Project;
use crate::storage::SqliteStorage;
use crate::sync::Workspace;
use colored::Colorize;
use serde::Serialize;

#[derive(Serialize)]
struct ProjectOutput {
    id: String,
    name: String,
    description: Option<String>,
    status: &'static str,
    created_at: String,
    updated_at: String,
}

impl From<Project> for ProjectOutput {
    fn from(p: Project) -> Self {
        Self {
            id: p.id,
            name: p.name,
            description: p.description,
            status: p.status.as_str(),
            created_at: format_timestamp(p.created_at),
            updated_at: format_timestamp(p.updated_at),
        }
    }
}

#[derive(Serialize)]
struct ProjectListOutput {
    projects: Vec<ProjectOutput>,
    count: usize,
}

#[derive(Serialize)]
struct ProjectDeleteOutput {
    id: String,
    name: String,
    tasks_deleted: usize,
    follow_ups_deleted: usize,
}

/// Execute a project command.
///
/// # Errors
///
/// Returns `NotInitialized`, `ProjectNotFound`, `DuplicateProjectName` or a
/// storage error.
pub fn execute(command: &ProjectCommands, target: Target<'_>, json: bool) -> Result<()> {
    let ws = target.open()?;

    block_on(async {
        match command {
            ProjectCommands::Create { name, description } => {
                create(&ws, name, description.as_deref(), json).await
            }
            ProjectCommands::List => list(&ws, json).await,
            ProjectCommands::Rename { project, name } => rename(&ws, project, name, json).await,
            ProjectCommands::Delete { project } => delete(&ws, project, json).await,
        }
    })
}

async fn create(ws: &Workspace<SqliteStorage>, name: &str, description: Option<&str>, json: bool) -> Result<()> {
    let project = ws.create_project(name, description).await?;

    if crate::is_silent() {
        println!("{}", project.id);
        return Ok(());
    }

    if json {
        println!("{}", serde_json::to_string(&ProjectOutput::from(project))?);
    } else {
        println!("Created project: {}", project.name);
        println!("  ID: {}", project.id);
    }
    Ok(())
}

async fn list(ws: &Workspace<SqliteStorage>, json: bool) -> Result<()> {
    let projects = ws.projects().await?;

    if json {
        let output = ProjectListOutput {
            count: projects.len(),
            projects: projects.into_iter().map(ProjectOutput::from).collect(),
        };
        println!("{}", serde_json::to_string(&output)?);
    } else if projects.is_empty() {
        println!("No projects found.");
        println!("\nCreate one with: td project create <name>");
    } else {
        println!("Projects ({}):", projects.len());
        for project in &projects {
            println!(
                "  {} {} {}",
                project.name.bold(),
                format!("[{}]", project.status.as_str()).dimmed(),
                project.id.dimmed()
            );
            if let Some(description) = &project.description {
                println!("      {description}");
            }
        }
    }
    Ok(())
}

async fn rename(ws: &Workspace<SqliteStorage>, key: &str, name: &str, json: bool) -> Result<()> {
    let existing = ws.find_project(key).await?;
    let old_name = existing.name.clone();
    let project = ws.rename_project(&existing.id, name).await?;

    if crate::is_silent() {
        println!("{}", project.id);
        return Ok(());
    }

    if json {
        println!("{}", serde_json::to_string(&ProjectOutput::from(project))?);
    } else {
        println!("Renamed project: {old_name} → {}", project.name);
    }
    Ok(())
}

async fn delete(ws: &Workspace<SqliteStorage>, key: &str, json: bool) -> Result<()> {
    let project = ws.find_project(key).await?;
    let deleted = ws.delete_project(&project.id).await?;

    if crate::is_silent() {
        println!("{}", project.id);
        return Ok(());
    }

    if json {
        let output = ProjectDeleteOutput {
            id: project.id,
            name: project.name,
            tasks_deleted: deleted.tasks,
            follow_ups_deleted: deleted.follow_ups,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("Deleted project: {}", project.name);
        println!("  Tasks removed: {}", deleted.tasks);
        println!("  Follow-ups removed: {}", deleted.follow_ups);
    }
    Ok(())
}
