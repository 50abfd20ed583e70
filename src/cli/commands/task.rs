//! Task commands.
//!
//! - `td task create <title>` - Create a task (optionally a recurring series root)
//! - `td task list` / `td task search <term>` - One page of hydrated tasks
//! - `td task show <number>` - Details with the follow-up trail
//! - `td task update <number>` - Field update; tracked changes land in the trail
//! - `td task delete <numbers>...`
//! - `td task note|check|link ...` - Follow-up, checklist and link sub-edits

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;

use super::{Target, block_on, clearable, clearable_date, format_timestamp, print_task_rows, status_label};
use crate::cli::{
    CheckCommands, LinkCommands, ListArgs, NoteCommands, RecurrenceArgs, TaskCommands, TaskCreateArgs,
    TaskUpdateArgs,
};
use crate::config::SyncSettings;
use crate::error::{Error, Result};
use crate::model::{FollowUp, LinkCategory, NewTask, RecurrenceRule, Task, TaskNumber, TaskPatch};
use crate::storage::SqliteStorage;
use crate::sync::{ListRequest, Page, Workspace};
use crate::validate::{
    normalize_filter, normalize_priority, normalize_sort, normalize_status, parse_date, parse_direction,
    parse_recurrence_type, parse_weekdays,
};

#[derive(Serialize)]
struct PageOutput<'a> {
    #[serde(flatten)]
    page: &'a Page<Task>,
    total_pages: usize,
}

#[derive(Serialize)]
struct DeleteOutput {
    deleted: Vec<TaskNumber>,
    count: usize,
}

/// Execute a task command.
///
/// # Errors
///
/// Returns `NotInitialized`, a not-found error for unknown tasks, projects
/// or follow-ups, `InvalidArgument` for malformed input, or a storage error.
pub fn execute(command: &TaskCommands, target: Target<'_>, json: bool) -> Result<()> {
    let ws = target.open()?;

    block_on(async {
        match command {
            TaskCommands::Create(args) => create(&ws, args, json).await,
            TaskCommands::List(args) => list(&ws, args, None, json).await,
            TaskCommands::Search { term, list: args } => list(&ws, args, Some(term), json).await,
            TaskCommands::Show { number } => show(&ws, number, json).await,
            TaskCommands::Update(args) => update(&ws, args, json).await,
            TaskCommands::Delete { numbers } => delete(&ws, numbers, json).await,
            TaskCommands::Note { command } => note(&ws, command, json).await,
            TaskCommands::Check { command } => check(&ws, command, json).await,
            TaskCommands::Link { command } => link(&ws, command, json).await,
        }
    })
}

/// Turn list flags into a request for the workspace owner.
pub(crate) async fn build_request(
    ws: &Workspace<SqliteStorage>,
    args: &ListArgs,
    search: Option<&str>,
) -> Result<ListRequest> {
    let mut request = ws.list_request();
    request.filter = normalize_filter(&args.filter)?;
    request.sort = normalize_sort(&args.sort)?;
    request.direction = parse_direction(&args.direction)?;
    request.page = args.page.max(1);
    request.page_size = args
        .page_size
        .filter(|size| *size > 0)
        .unwrap_or_else(|| SyncSettings::from_env().page_size);
    request.search = search.map(str::to_string);
    if let Some(project) = &args.project {
        request.project_id = Some(ws.find_project(project).await?.id);
    }
    Ok(request)
}

async fn create(ws: &Workspace<SqliteStorage>, args: &TaskCreateArgs, json: bool) -> Result<()> {
    let mut task = NewTask::new(ws.owner(), args.title.clone());
    task.description = clearable(args.description.as_ref()).flatten();
    task.details = clearable(args.details.as_ref()).flatten();
    task.responsible = clearable(args.responsible.as_ref()).flatten();
    task.task_type = clearable(args.task_type.as_ref()).flatten();
    task.environment = clearable(args.environment.as_ref()).flatten();
    task.planned_time_hours = args.hours;

    if let Some(status) = &args.status {
        task.status = normalize_status(status)?;
    }
    if let Some(priority) = &args.priority {
        task.priority = normalize_priority(priority)?;
    }
    if let Some(project) = &args.project {
        task.project_id = Some(ws.find_project(project).await?.id);
    }
    if let Some(scope) = &args.scope {
        task.scope = scope_set(scope);
    }
    if let Some(start) = &args.start {
        task.start_date = Some(parse_date(start)?);
    }
    if let Some(due) = &args.due {
        task.due_date = Some(parse_date(due)?);
    }
    if let Some(rule) = recurrence_rule(&args.recurrence)? {
        task.is_recurring = true;
        task.recurrence = Some(rule);
    }

    let task = ws.create_task(task).await?;

    if crate::is_silent() {
        println!("{}", task.row.task_number);
        return Ok(());
    }

    if json {
        println!("{}", serde_json::to_string(&task)?);
    } else {
        println!("Created task: {} [{}]", task.row.title, task.row.task_number);
        println!("  Status: {}", task.row.status);
        println!("  Priority: {}", task.row.priority);
        if task.row.is_series_root() {
            println!("  Recurring: yes (td series spawn {} to schedule the next one)", task.row.task_number);
        }
    }
    Ok(())
}

fn recurrence_rule(args: &RecurrenceArgs) -> Result<Option<RecurrenceRule>> {
    let Some(kind) = &args.repeat else {
        return Ok(None);
    };
    let mut rule = RecurrenceRule::new(parse_recurrence_type(kind)?, args.every);
    if let Some(days) = &args.on {
        rule = rule.on(parse_weekdays(days)?);
    }
    if let Some(until) = &args.until {
        rule = rule.until(parse_date(until)?);
    }
    Ok(Some(rule))
}

fn scope_set(values: &[String]) -> BTreeSet<String> {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

async fn list(ws: &Workspace<SqliteStorage>, args: &ListArgs, term: Option<&String>, json: bool) -> Result<()> {
    let request = build_request(ws, args, term.map(String::as_str)).await?;
    let page = ws.fetch_page(&request).await?;

    if json {
        let output = PageOutput {
            page: &page,
            total_pages: page.total_pages(),
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    if crate::is_silent() {
        for task in &page.items {
            println!("{}", task.row.task_number);
        }
        return Ok(());
    }

    if page.items.is_empty() {
        match request.search_term() {
            Some(term) => println!("No tasks match \"{term}\"."),
            None => println!("No tasks found."),
        }
        return Ok(());
    }

    println!(
        "Tasks {} (page {} of {}, {} total):",
        request.search_term().map(|t| format!("matching \"{t}\"")).unwrap_or_default(),
        page.page,
        page.total_pages().max(1),
        page.total
    );
    print_task_rows(&page.items);
    Ok(())
}

async fn show(ws: &Workspace<SqliteStorage>, number: &str, json: bool) -> Result<()> {
    let number = TaskNumber::parse(number)?;
    let task = ws.task(&number).await?;

    if json {
        println!("{}", serde_json::to_string(&task)?);
        return Ok(());
    }

    let tracked = ws.timers().total(&number, Utc::now()).await?;
    print_task_detail(&task, tracked);
    Ok(())
}

fn print_task_detail(task: &Task, tracked: chrono::Duration) {
    let row = &task.row;
    println!("{} {}", row.task_number.as_str().bold(), row.title.bold());
    println!("  Status:      {}", status_label(row.status));
    println!("  Priority:    {}", row.priority);
    if !task.project_name.is_empty() {
        println!("  Project:     {}", task.project_name);
    }
    for (label, value) in [
        ("Responsible", row.responsible.as_deref()),
        ("Type", row.task_type.as_deref()),
        ("Environment", row.environment.as_deref()),
    ] {
        if let Some(value) = value {
            println!("  {label:<12} {value}");
        }
    }
    if let Some(start) = row.start_date {
        println!("  Start:       {start}");
    }
    if let Some(due) = row.due_date {
        println!("  Due:         {due}");
    }
    if let Some(done) = row.completion_date {
        println!("  Completed:   {done}");
    }
    if let Some(hours) = row.planned_time_hours {
        println!("  Planned:     {hours}h");
    }
    if tracked > chrono::Duration::zero() {
        println!("  Tracked:     {}m", tracked.num_minutes());
    }
    if !row.scope.is_empty() {
        let scope: Vec<&str> = row.scope.iter().map(String::as_str).collect();
        println!("  Scope:       {}", scope.join(", "));
    }
    if let Some(rule) = &row.recurrence {
        println!("  Repeats:     every {} {:?}", rule.interval, rule.kind);
    } else if row.is_series_instance() {
        println!("  Series:      occurrence of a recurring task");
    }
    if let Some(description) = &row.description {
        println!("\n{description}");
    }
    if let Some(details) = &row.details {
        println!("\n{}", details.dimmed());
    }

    if !row.checklist.is_empty() {
        println!("\n{}", "Checklist".cyan().bold());
        for (i, item) in row.checklist.iter().enumerate() {
            let mark = if item.completed { "[x]" } else { "[ ]" };
            println!("  {}. {mark} {}", i + 1, item.text);
        }
    }

    if !row.links.is_empty() {
        println!("\n{}", "Links".cyan().bold());
        for (category, link) in row.links.iter() {
            println!(
                "  {} {} {} {}",
                format!("[{}]", category.as_str()).dimmed(),
                link.name,
                link.url,
                link.id.dimmed()
            );
        }
    }

    if !task.follow_ups.is_empty() {
        println!("\n{}", "Follow-ups".cyan().bold());
        for follow_up in &task.follow_ups {
            print_follow_up(follow_up);
        }
    }
}

fn print_follow_up(follow_up: &FollowUp) {
    let when = format_timestamp(follow_up.created_at);
    let meta = format!("#{} {when} ({})", follow_up.id, follow_up.task_status);
    if follow_up.is_audit() {
        println!("  {} {}", meta.dimmed(), follow_up.text.dimmed().italic());
    } else {
        println!("  {} {}", meta.dimmed(), follow_up.text);
    }
}

/// Build a patch from update flags, resolving the project by id or name.
async fn update_patch(ws: &Workspace<SqliteStorage>, args: &TaskUpdateArgs) -> Result<TaskPatch> {
    let mut patch = TaskPatch {
        title: args.title.clone(),
        description: clearable(args.description.as_ref()),
        details: clearable(args.details.as_ref()),
        responsible: clearable(args.responsible.as_ref()),
        task_type: clearable(args.task_type.as_ref()),
        environment: clearable(args.environment.as_ref()),
        start_date: clearable_date(args.start.as_ref())?,
        due_date: clearable_date(args.due.as_ref())?,
        planned_time_hours: args.hours.map(Some),
        scope: args.scope.as_deref().map(scope_set),
        ..TaskPatch::default()
    };
    if let Some(status) = &args.status {
        patch.status = Some(normalize_status(status)?);
    }
    if let Some(priority) = &args.priority {
        patch.priority = Some(normalize_priority(priority)?);
    }
    patch.project_id = match clearable(args.project.as_ref()) {
        None => None,
        Some(None) => Some(None),
        Some(Some(key)) => Some(Some(ws.find_project(&key).await?.id)),
    };
    Ok(patch)
}

async fn update(ws: &Workspace<SqliteStorage>, args: &TaskUpdateArgs, json: bool) -> Result<()> {
    let number = TaskNumber::parse(&args.number)?;
    let patch = update_patch(ws, args).await?;
    if patch.is_empty() {
        return Err(Error::InvalidArgument("nothing to update: pass at least one field flag".to_string()));
    }

    let before = ws.task(&number).await?.follow_ups.len();
    let task = ws.update_task(&number, &patch).await?;

    if crate::is_silent() {
        println!("{}", task.row.task_number);
        return Ok(());
    }

    if json {
        println!("{}", serde_json::to_string(&task)?);
    } else {
        println!("Updated task: {} [{}]", task.row.title, task.row.task_number);
        for follow_up in task.follow_ups.iter().skip(before) {
            println!("  {}", follow_up.text.dimmed());
        }
    }
    Ok(())
}

async fn delete(ws: &Workspace<SqliteStorage>, numbers: &[String], json: bool) -> Result<()> {
    let numbers = numbers
        .iter()
        .map(|n| TaskNumber::parse(n))
        .collect::<Result<Vec<_>>>()?;

    for number in &numbers {
        ws.delete_task(number).await?;
    }

    if crate::is_silent() {
        for number in &numbers {
            println!("{number}");
        }
        return Ok(());
    }

    if json {
        let output = DeleteOutput {
            count: numbers.len(),
            deleted: numbers,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        for number in &numbers {
            println!("Deleted task: {number}");
        }
    }
    Ok(())
}

async fn note(ws: &Workspace<SqliteStorage>, command: &NoteCommands, json: bool) -> Result<()> {
    let (verb, follow_up) = match command {
        NoteCommands::Add { number, text } => {
            let number = TaskNumber::parse(number)?;
            ("Added", Some(ws.add_follow_up(&number, text).await?))
        }
        NoteCommands::Edit { id, text, at } => {
            let created_at = at.as_deref().map(parse_timestamp).transpose()?;
            ("Edited", Some(ws.edit_follow_up(*id, text, created_at).await?))
        }
        NoteCommands::Delete { id } => {
            ws.delete_follow_up(*id).await?;
            if json {
                println!("{}", serde_json::json!({ "deleted": id }));
            } else if crate::is_silent() {
                println!("{id}");
            } else {
                println!("Deleted follow-up #{id}");
            }
            ("Deleted", None)
        }
    };

    let Some(follow_up) = follow_up else {
        return Ok(());
    };
    if crate::is_silent() {
        println!("{}", follow_up.id);
    } else if json {
        println!("{}", serde_json::to_string(&follow_up)?);
    } else {
        println!("{verb} follow-up #{} on {}", follow_up.id, follow_up.task_number);
    }
    Ok(())
}

fn parse_timestamp(input: &str) -> Result<i64> {
    DateTime::parse_from_rfc3339(input.trim())
        .map(|dt| dt.timestamp_millis())
        .map_err(|_| Error::InvalidArgument(format!("invalid timestamp '{input}' (expected RFC 3339)")))
}

/// Convert a 1-based position to an index.
fn position(item: usize) -> Result<usize> {
    item.checked_sub(1)
        .ok_or_else(|| Error::InvalidArgument("checklist positions start at 1".to_string()))
}

async fn check(ws: &Workspace<SqliteStorage>, command: &CheckCommands, json: bool) -> Result<()> {
    let task = match command {
        CheckCommands::Add { number, text } => {
            ws.add_checklist_item(&TaskNumber::parse(number)?, text).await?
        }
        CheckCommands::Toggle { number, item } => {
            ws.toggle_checklist_item(&TaskNumber::parse(number)?, position(*item)?)
                .await?
        }
        CheckCommands::Remove { number, item } => {
            ws.remove_checklist_item(&TaskNumber::parse(number)?, position(*item)?)
                .await?
        }
    };

    if crate::is_silent() {
        println!("{}", task.row.task_number);
    } else if json {
        println!("{}", serde_json::to_string(&task.row.checklist)?);
    } else {
        let done = task.row.checklist.iter().filter(|i| i.completed).count();
        println!(
            "Checklist for {}: {done}/{} done",
            task.row.task_number,
            task.row.checklist.len()
        );
    }
    Ok(())
}

async fn link(ws: &Workspace<SqliteStorage>, command: &LinkCommands, json: bool) -> Result<()> {
    match command {
        LinkCommands::Add {
            number,
            url,
            category,
            name,
        } => {
            let category = LinkCategory::parse(category).ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "unknown link category '{category}' (use documentation, repository, design, ticket, meeting or other)"
                ))
            })?;
            let (task, id) = ws
                .add_link(&TaskNumber::parse(number)?, category, name, url)
                .await?;
            if crate::is_silent() {
                println!("{id}");
            } else if json {
                println!("{}", serde_json::json!({ "task": task.row.task_number, "link_id": id }));
            } else {
                println!("Added {} link {id} to {}", category.as_str(), task.row.task_number);
            }
        }
        LinkCommands::Remove { number, id } => {
            let task = ws.remove_link(&TaskNumber::parse(number)?, id).await?;
            if crate::is_silent() {
                println!("{id}");
            } else if json {
                println!("{}", serde_json::json!({ "task": task.row.task_number, "removed": id }));
            } else {
                println!("Removed link {id} from {}", task.row.task_number);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Priority, RecurrenceType, TaskStatus};
    use crate::storage::StatusFilter;
    use crate::sync::SortField;

    fn workspace() -> Workspace<SqliteStorage> {
        Workspace::new(SqliteStorage::open_memory().unwrap(), "alice")
    }

    fn list_args() -> ListArgs {
        ListArgs {
            filter: "all".to_string(),
            project: None,
            sort: "prio".to_string(),
            direction: "desc".to_string(),
            page: 0,
            page_size: Some(10),
        }
    }

    #[tokio::test]
    async fn test_build_request_normalizes_flags() {
        let ws = workspace();
        let project = ws.create_project("Apollo", None).await.unwrap();
        let mut args = list_args();
        args.project = Some("apollo".to_string());

        let request = build_request(&ws, &args, Some("deploy")).await.unwrap();
        assert_eq!(request.filter, StatusFilter::All);
        assert_eq!(request.sort, SortField::Priority);
        assert_eq!(request.page, 1);
        assert_eq!(request.page_size, 10);
        assert_eq!(request.project_id, Some(project.id));
        assert_eq!(request.search_term(), Some("deploy"));
    }

    #[tokio::test]
    async fn test_update_patch_clears_and_sets() {
        let ws = workspace();
        let args = TaskUpdateArgs {
            number: "T1".to_string(),
            title: None,
            description: Some(String::new()),
            details: None,
            status: Some("done".to_string()),
            priority: Some("urgent".to_string()),
            responsible: None,
            task_type: None,
            environment: None,
            project: Some(String::new()),
            scope: None,
            start: None,
            due: Some("2026-06-01".to_string()),
            hours: None,
        };

        let patch = update_patch(&ws, &args).await.unwrap();
        assert_eq!(patch.description, Some(None));
        assert_eq!(patch.status, Some(TaskStatus::Completed));
        assert_eq!(patch.priority, Some(Priority::Critical));
        assert_eq!(patch.project_id, Some(None));
        assert!(matches!(patch.due_date, Some(Some(_))));
        assert_eq!(patch.title, None);
    }

    #[test]
    fn test_recurrence_rule_from_flags() {
        let args = RecurrenceArgs {
            repeat: Some("weekly".to_string()),
            every: 2,
            on: Some("mon,thu".to_string()),
            until: Some("2026-12-31".to_string()),
        };
        let rule = recurrence_rule(&args).unwrap().unwrap();
        assert_eq!(rule.kind, RecurrenceType::Weekly);
        assert_eq!(rule.interval, 2);
        assert_eq!(rule.weekdays.len(), 2);
        assert!(rule.end_date.is_some());

        assert!(recurrence_rule(&RecurrenceArgs::default()).unwrap().is_none());
    }

    #[test]
    fn test_position_is_one_based() {
        assert_eq!(position(1).unwrap(), 0);
        assert!(position(0).is_err());
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(parse_timestamp("1970-01-01T00:00:01Z").unwrap(), 1000);
        assert!(parse_timestamp("yesterday").is_err());
    }
}
