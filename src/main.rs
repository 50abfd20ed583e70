//! taskdeck CLI entry point.

use clap::Parser;
use std::process::ExitCode;
use td::cli::commands::{self, Target};
use td::cli::{Cli, Commands};
use td::error::Error;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.quiet {
        td::SILENT.store(true, std::sync::atomic::Ordering::Relaxed);
    }
    if cli.no_color {
        colored::control::set_override(false);
    }

    // Set up tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    // Resolve effective JSON mode: --json OR non-TTY stdout
    let json = cli.json || !std::io::IsTerminal::is_terminal(&std::io::stdout());

    match run(&cli, json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                eprintln!("{}", e.to_structured_json());
            } else if let Some(hint) = e.hint() {
                eprintln!("Error: {e}\n  Hint: {hint}");
            } else {
                eprintln!("Error: {e}");
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,rusqlite=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    let target = Target {
        db: cli.db.as_ref(),
        owner: cli.owner.as_deref(),
    };

    match &cli.command {
        Commands::Init { force } => commands::init::execute(cli.db.as_ref(), *force, json),
        Commands::Project { command } => commands::project::execute(command, target, json),
        Commands::Task { command } => commands::task::execute(command, target, json),
        Commands::Series { command } => commands::series::execute(command, target, json),
        Commands::Timer { command } => commands::timer::execute(command, target, json),
        Commands::Watch(args) => commands::watch::execute(args, target, json),
        Commands::Completions { shell } => commands::completions::execute(shell),
    }
}
