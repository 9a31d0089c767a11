#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{Parser, Subcommand};
use flowcast_core::config::load_user_config;
use output::OutputMode;
use std::env;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "fc: daily flow-metrics consolidation and Monte-Carlo forecasting",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Output format (overrides `FORMAT` and the user config).
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        let configured = load_user_config().ok().and_then(|user| user.output);
        output::resolve_output_mode(self.format, self.json, configured.as_deref())
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Setup",
        about = "Initialize a flowcast project",
        long_about = "Create .flowcast/ with a default config.toml and an empty, migrated database.",
        after_help = "EXAMPLES:\n    # Initialize a project in the current directory\n    fc init\n\n    # Rewrite the default config of an existing project\n    fc init --force"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Import entities and demands from a JSON corpus",
        long_about = "Upsert entities, demands and memberships from a corpus document.\n\n\
                      Re-importing the same document refreshes values without duplicating rows.",
        after_help = "EXAMPLES:\n    # Load an export\n    fc import --file corpus.json\n\n    # Emit machine-readable counts\n    fc import --file corpus.json --json"
    )]
    Import(cmd::import::ImportArgs),

    #[command(
        next_help_heading = "Consolidation",
        about = "Consolidate one entity for one date",
        long_about = "Compute and upsert the daily snapshot of one entity.\n\n\
                      Running it again for the same date replaces the row with identical figures.",
        after_help = "EXAMPLES:\n    # Today's snapshot of a project\n    fc consolidate project alpha\n\n    # A specific date, as JSON\n    fc consolidate team platform --date 2024-01-31 --json"
    )]
    Consolidate(cmd::consolidate::ConsolidateArgs),

    #[command(
        next_help_heading = "Consolidation",
        about = "Consolidate one entity over a range of dates",
        long_about = "Consolidate every day of an inclusive date range, oldest first.",
        after_help = "EXAMPLES:\n    # Rebuild January\n    fc backfill project alpha --from 2024-01-01 --to 2024-01-31"
    )]
    Backfill(cmd::backfill::BackfillArgs),

    #[command(
        next_help_heading = "Consolidation",
        about = "Consolidate every active entity for one date",
        long_about = "Fan the day's active entities out over a worker pool.\n\n\
                      One entity failing does not stop the others; the command exits non-zero \
                      when any entity failed.",
        after_help = "EXAMPLES:\n    # Nightly run\n    fc batch\n\n    # Re-run a past day with two workers\n    fc batch --date 2024-01-31 --workers 2"
    )]
    Batch(cmd::batch::BatchArgs),

    #[command(
        next_help_heading = "Read",
        about = "Show stored snapshots",
        long_about = "Show the stored snapshot of an entity: the latest one, a given date, or \
                      the rows that close a week, month or year.",
        after_help = "EXAMPLES:\n    # Latest snapshot\n    fc show project alpha\n\n    # Month-end rows\n    fc show project alpha --rollup month --json"
    )]
    Show(cmd::show::ShowArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("FLOWCAST_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "flowcast=debug,info"
        } else {
            "flowcast=info,warn"
        })
    });

    let format = env::var("FLOWCAST_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

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

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let project_root = std::env::current_dir()?;
    let output = cli.output_mode();

    match cli.command {
        Commands::Init(ref args) => cmd::init::run_init(args, output, &project_root),
        Commands::Import(ref args) => cmd::import::run_import(args, output, &project_root),
        Commands::Consolidate(ref args) => {
            cmd::consolidate::run_consolidate(args, output, &project_root)
        }
        Commands::Backfill(ref args) => cmd::backfill::run_backfill(args, output, &project_root),
        Commands::Batch(ref args) => cmd::batch::run_batch(args, output, &project_root),
        Commands::Show(ref args) => cmd::show::run_show(args, output, &project_root),
    }
}
