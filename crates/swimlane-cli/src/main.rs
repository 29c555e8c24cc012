#![forbid(unsafe_code)]

mod cmd;
mod context;
mod output;

use clap::{CommandFactory, Parser, Subcommand};
use output::{CliError, OutputMode, render_error, resolve_output_mode};
use std::env;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "swl: kanban stage and phase configuration",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Output format (overrides --json and FORMAT).
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Suppress non-essential output (logs at error level only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        resolve_output_mode(self.format, self.json)
    }

    fn log_override(&self) -> Option<&'static str> {
        if self.quiet {
            Some("error")
        } else if self.verbose {
            Some("swimlane=debug,info")
        } else {
            None
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Setup",
        about = "Initialize a board",
        long_about = "Create .swimlane/ with a config template and the seed taxonomy.",
        after_help = "EXAMPLES:\n    # Initialize a board in the current directory\n    swl init\n\n    # Emit machine-readable output\n    swl init --json"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        next_help_heading = "Read",
        about = "Show the board",
        long_about = "Project the taxonomy and items into columns of phase buckets.",
        after_help = "EXAMPLES:\n    # Show every column\n    swl board\n\n    # Only one column\n    swl board --status IN_PROGRESS\n\n    # Emit machine-readable output\n    swl board --json"
    )]
    Board(cmd::board::BoardArgs),

    #[command(
        next_help_heading = "Taxonomy",
        about = "Edit a status column",
        after_help = "EXAMPLES:\n    # Rename a column\n    swl group rename COMPLETED \"Won\""
    )]
    Group(cmd::group::GroupArgs),

    #[command(
        next_help_heading = "Taxonomy",
        about = "Add, remove, reorder or edit stages",
        long_about = "Edit the stages of a status column. Removing a stage first moves its items \
                      to the previous stage (or the next one when it was first).",
        after_help = "EXAMPLES:\n    # Add a stage\n    swl stage add DRAFT \"Review\"\n\n    # Remove a stage\n    swl stage rm DRAFT draft-2\n\n    # Reorder\n    swl stage reorder DRAFT draft-3 draft-1 draft-2"
    )]
    Stage(cmd::stage::StageArgs),

    #[command(
        next_help_heading = "Items",
        about = "Add, move or show work items",
        after_help = "EXAMPLES:\n    # Add an item\n    swl item add job-1 --status DRAFT --stage draft-1\n\n    # Move it\n    swl item mv job-1 IN_PROGRESS --stage in-progress-1\n\n    # Show it\n    swl item show job-1 --json"
    )]
    Item(cmd::item::ItemArgs),

    #[command(
        next_help_heading = "Recovery",
        about = "List pending taxonomy commits",
        long_about = "List stage removals that are waiting for item migrations to succeed."
    )]
    Pending(cmd::pending::PendingArgs),

    #[command(
        next_help_heading = "Recovery",
        about = "Retry pending taxonomy commits",
        after_help = "EXAMPLES:\n    # Finish removals that were interrupted\n    swl retry"
    )]
    Retry(cmd::pending::RetryArgs),

    #[command(
        next_help_heading = "Project Maintenance",
        about = "Generate shell completion scripts",
        after_help = "EXAMPLES:\n    # Generate bash completions\n    swl completions bash"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing(level_override: Option<&str>) {
    let filter = match level_override {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_env("SWIMLANE_LOG").unwrap_or_else(|_| {
            EnvFilter::new(if env::var("DEBUG").is_ok() {
                "swimlane=debug,info"
            } else {
                "swimlane=info,warn"
            })
        }),
    };

    let format = env::var("SWIMLANE_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_override());

    let output = cli.output_mode();
    debug!(?output, "resolved output mode");

    let result = env::current_dir()
        .map_err(anyhow::Error::from)
        .and_then(|project_root| match cli.command {
            Commands::Init(ref args) => cmd::init::run_init(args, output, &project_root),
            Commands::Board(ref args) => cmd::board::run_board(args, output, &project_root),
            Commands::Group(args) => cmd::group::run_group(args, output, &project_root),
            Commands::Stage(args) => cmd::stage::run_stage(args, output, &project_root),
            Commands::Item(args) => cmd::item::run_item(args, output, &project_root),
            Commands::Pending(ref args) => cmd::pending::run_pending(args, output, &project_root),
            Commands::Retry(ref args) => cmd::pending::run_retry(args, output, &project_root),
            Commands::Completions(args) => {
                let mut command = Cli::command();
                cmd::completions::run_completions(args.shell, &mut command)
            }
        });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            debug!(error = ?err, "command failed");
            if render_error(output, &CliError::from(&err)).is_err() {
                eprintln!("error: {err:#}");
            }
            ExitCode::FAILURE
        }
    }
}
