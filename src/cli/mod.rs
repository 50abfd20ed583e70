//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// taskdeck - task and project tracker
#[derive(Parser, Debug)]
#[command(name = "td", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: ~/.taskdeck/data/taskdeck.db)
    #[arg(long, global = true, env = "TASKDECK_DB")]
    pub db: Option<PathBuf>,

    /// Owner whose tasks and projects are read and written
    #[arg(long, global = true, env = "TD_OWNER")]
    pub owner: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (print only ids, no logs)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the taskdeck database
    Init {
        /// Overwrite existing database
        #[arg(long)]
        force: bool,
    },

    /// Project management
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },

    /// Task management
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },

    /// Recurring series operations
    Series {
        #[command(subcommand)]
        command: SeriesCommands,
    },

    /// Time tracking
    Timer {
        #[command(subcommand)]
        command: TimerCommands,
    },

    /// Show a task page and reload it whenever the data changes
    Watch(WatchArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

// ============================================================================
// Project Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum ProjectCommands {
    /// Create a new project
    Create {
        /// Project name (unique per owner)
        name: String,

        /// Project description
        #[arg(short, long)]
        description: Option<String>,
    },

    /// List projects
    List,

    /// Rename a project
    Rename {
        /// Project id or current name
        project: String,

        /// New name
        name: String,
    },

    /// Delete a project and every task in it
    Delete {
        /// Project id or name
        project: String,
    },
}

// ============================================================================
// Task Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Create a new task
    Create(TaskCreateArgs),

    /// List one page of tasks
    List(ListArgs),

    /// Search titles, descriptions and follow-up text
    Search {
        /// Search term
        term: String,

        #[command(flatten)]
        list: ListArgs,
    },

    /// Show task details with follow-ups
    Show {
        /// Task number (T12 or 12)
        number: String,
    },

    /// Update task fields (tracked changes are written to the audit trail)
    Update(TaskUpdateArgs),

    /// Delete task(s)
    Delete {
        /// Task numbers (one or more)
        #[arg(required = true)]
        numbers: Vec<String>,
    },

    /// Manage follow-up notes
    Note {
        #[command(subcommand)]
        command: NoteCommands,
    },

    /// Manage the checklist
    Check {
        #[command(subcommand)]
        command: CheckCommands,
    },

    /// Manage links
    Link {
        #[command(subcommand)]
        command: LinkCommands,
    },
}

#[derive(Args, Debug)]
pub struct TaskCreateArgs {
    /// Task title
    pub title: String,

    /// Task description
    #[arg(short, long)]
    pub description: Option<String>,

    /// Longer implementation details
    #[arg(long)]
    pub details: Option<String>,

    /// Initial status (open, in_progress, on_hold, completed)
    #[arg(short, long)]
    pub status: Option<String>,

    /// Priority (low, medium, high, critical)
    #[arg(short, long)]
    pub priority: Option<String>,

    /// Person responsible
    #[arg(short, long)]
    pub responsible: Option<String>,

    /// Task type (free text, e.g. Meeting)
    #[arg(short = 't', long = "type")]
    pub task_type: Option<String>,

    /// Environment (free text)
    #[arg(short, long)]
    pub environment: Option<String>,

    /// Project id or name
    #[arg(long)]
    pub project: Option<String>,

    /// Scope tags (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub scope: Option<Vec<String>>,

    /// Start date (YYYY-MM-DD)
    #[arg(long)]
    pub start: Option<String>,

    /// Due date (YYYY-MM-DD)
    #[arg(long)]
    pub due: Option<String>,

    /// Planned effort in hours
    #[arg(long)]
    pub hours: Option<f64>,

    #[command(flatten)]
    pub recurrence: RecurrenceArgs,
}

/// Recurrence options; giving `--repeat` makes the task a series root.
#[derive(Args, Debug, Default)]
pub struct RecurrenceArgs {
    /// Repeat rule (daily, weekly, monthly)
    #[arg(long)]
    pub repeat: Option<String>,

    /// Repeat every N days/weeks/months
    #[arg(long, default_value = "1", requires = "repeat")]
    pub every: u32,

    /// Weekdays for weekly rules (comma-separated, e.g. mon,thu)
    #[arg(long, requires = "repeat")]
    pub on: Option<String>,

    /// Last date an occurrence may fall on (YYYY-MM-DD)
    #[arg(long, requires = "repeat")]
    pub until: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// Status filter (active, open, in_progress, on_hold, critical, all)
    #[arg(short, long, default_value = "active")]
    pub filter: String,

    /// Only tasks in this project (id or name)
    #[arg(long)]
    pub project: Option<String>,

    /// Sort field (due_date, title, responsible, task_type, environment, number, priority)
    #[arg(long, default_value = "due_date")]
    pub sort: String,

    /// Sort direction (asc, desc)
    #[arg(long, default_value = "asc")]
    pub direction: String,

    /// Page number (1-based)
    #[arg(long, default_value = "1")]
    pub page: usize,

    /// Rows per page (default: TD_PAGE_SIZE or 25)
    #[arg(long)]
    pub page_size: Option<usize>,
}

#[derive(Args, Debug)]
pub struct TaskUpdateArgs {
    /// Task number
    pub number: String,

    /// New title
    #[arg(long)]
    pub title: Option<String>,

    /// New description (empty string clears)
    #[arg(short, long)]
    pub description: Option<String>,

    /// New details (empty string clears)
    #[arg(long)]
    pub details: Option<String>,

    /// New status
    #[arg(short, long)]
    pub status: Option<String>,

    /// New priority
    #[arg(short, long)]
    pub priority: Option<String>,

    /// New responsible person (empty string clears)
    #[arg(short, long)]
    pub responsible: Option<String>,

    /// New task type (empty string clears)
    #[arg(short = 't', long = "type")]
    pub task_type: Option<String>,

    /// New environment (empty string clears)
    #[arg(short, long)]
    pub environment: Option<String>,

    /// Move to project (id or name; empty string unassigns)
    #[arg(long)]
    pub project: Option<String>,

    /// Replace scope tags (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub scope: Option<Vec<String>>,

    /// New start date (YYYY-MM-DD, empty string clears)
    #[arg(long)]
    pub start: Option<String>,

    /// New due date (YYYY-MM-DD, empty string clears)
    #[arg(long)]
    pub due: Option<String>,

    /// New planned effort in hours
    #[arg(long)]
    pub hours: Option<f64>,
}

#[derive(Subcommand, Debug)]
pub enum NoteCommands {
    /// Add a follow-up note
    Add {
        /// Task number
        number: String,

        /// Note text
        text: String,
    },

    /// Edit a user note
    Edit {
        /// Follow-up id
        id: i64,

        /// New text
        text: String,

        /// Move the note to another time (RFC 3339)
        #[arg(long)]
        at: Option<String>,
    },

    /// Delete a user note
    Delete {
        /// Follow-up id
        id: i64,
    },
}

#[derive(Subcommand, Debug)]
pub enum CheckCommands {
    /// Append a checklist item
    Add {
        /// Task number
        number: String,

        /// Item text
        text: String,
    },

    /// Toggle a checklist item (1-based position)
    Toggle {
        /// Task number
        number: String,

        /// Item position
        item: usize,
    },

    /// Remove a checklist item (1-based position)
    Remove {
        /// Task number
        number: String,

        /// Item position
        item: usize,
    },
}

#[derive(Subcommand, Debug)]
pub enum LinkCommands {
    /// Add a link
    Add {
        /// Task number
        number: String,

        /// Link URL
        url: String,

        /// Category (documentation, repository, design, ticket, meeting, other)
        #[arg(short, long, default_value = "other")]
        category: String,

        /// Display name (defaults to the URL)
        #[arg(short, long, default_value = "")]
        name: String,
    },

    /// Remove a link by id
    Remove {
        /// Task number
        number: String,

        /// Link id
        id: String,
    },
}

// ============================================================================
// Series Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum SeriesCommands {
    /// Apply field changes to every task in a series
    Update(SeriesUpdateArgs),

    /// Delete every task in a series
    Delete {
        /// Any task number in the series
        number: String,
    },

    /// Create the next occurrence of a series
    Spawn {
        /// Any task number in the series
        number: String,
    },
}

#[derive(Args, Debug)]
pub struct SeriesUpdateArgs {
    /// Any task number in the series
    pub number: String,

    /// New title
    #[arg(long)]
    pub title: Option<String>,

    /// New description (empty string clears)
    #[arg(short, long)]
    pub description: Option<String>,

    /// New details (empty string clears)
    #[arg(long)]
    pub details: Option<String>,

    /// New priority
    #[arg(short, long)]
    pub priority: Option<String>,

    /// New responsible person (empty string clears)
    #[arg(short, long)]
    pub responsible: Option<String>,

    /// New task type (empty string clears)
    #[arg(short = 't', long = "type")]
    pub task_type: Option<String>,

    /// New environment (empty string clears)
    #[arg(short, long)]
    pub environment: Option<String>,

    /// New planned effort in hours
    #[arg(long)]
    pub hours: Option<f64>,
}

// ============================================================================
// Timer Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum TimerCommands {
    /// Start a timer on a task
    Start {
        /// Task number
        number: String,
    },

    /// Stop the running timer on a task
    Stop {
        /// Task number
        number: String,
    },

    /// List time entries for a task
    List {
        /// Task number
        number: String,
    },
}

// ============================================================================
// Watch
// ============================================================================

#[derive(Args, Debug)]
pub struct WatchArgs {
    #[command(flatten)]
    pub list: ListArgs,

    /// Only show tasks matching this search term
    #[arg(long)]
    pub search: Option<String>,

    /// How often to check for writes from other processes (ms)
    #[arg(long, default_value = "500")]
    pub poll_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_task_update() {
        let cli = Cli::parse_from(["td", "--owner", "alice", "task", "update", "T3", "-s", "done", "--due", ""]);
        assert_eq!(cli.owner.as_deref(), Some("alice"));
        let Commands::Task { command: TaskCommands::Update(args) } = cli.command else {
            panic!("expected task update");
        };
        assert_eq!(args.number, "T3");
        assert_eq!(args.status.as_deref(), Some("done"));
        assert_eq!(args.due.as_deref(), Some(""));
    }

    #[test]
    fn test_parse_search_with_list_flags() {
        let cli = Cli::parse_from(["td", "task", "search", "deploy", "--page", "2", "-f", "all"]);
        let Commands::Task { command: TaskCommands::Search { term, list } } = cli.command else {
            panic!("expected task search");
        };
        assert_eq!(term, "deploy");
        assert_eq!(list.page, 2);
        assert_eq!(list.filter, "all");
    }
}
