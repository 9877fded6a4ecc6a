#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod commands;
mod wiring;

use clap::{Parser, Subcommand};
use concord_core::config::Config;
use concord_telemetry::{init_logging, LogFormat};

/// concord -- three-way issue tracker sync engine (Huly <-> Vibe <-> Beads).
#[derive(Parser)]
#[command(name = "concord", version, about)]
struct Cli {
    /// Path to a config file (defaults to ~/.config/concord/config.toml).
    #[arg(short = 'c', long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the sync process: detectors, workflow runtime, and schedulers.
    Run,

    /// Trigger one FullOrchestration sweep, or ProjectSync for a single
    /// named/foldered project.
    Sync {
        /// Project identifier, filesystem path, or folder name.
        project: Option<String>,
    },

    /// Run DataReconciliation over every active project.
    Reconcile {
        /// Report only; do not apply any action.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        /// Restrict application to one action kind.
        #[arg(long)]
        action: Option<commands::reconcile::ActionFilter>,
    },

    /// Connectivity and configuration sanity check.
    Doctor {
        /// Exit non-zero if any checks fail.
        #[arg(short = 'S', long, default_value_t = false)]
        strict: bool,
        /// Output JSON.
        #[arg(short = 'j', long, default_value_t = false)]
        json: bool,
        /// Write JSON artifact to this file path.
        #[arg(short = 'o', long = "out")]
        out: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            std::process::exit(2);
        }
    };

    init_logging(LogFormat::parse(&config.general.log_format), &config.general.log_level);

    // Building the workflow context (store, tracker clients, breakers) is
    // the only thing that can fail before any sync work starts — that's a
    // startup error (exit 1, §6), distinct from a failure surfaced by the
    // command itself once it's running (exit 3).
    let ctx = match wiring::build_context(&config).await {
        Ok(ctx) => ctx,
        Err(err) => {
            tracing::error!(error = %err, "failed to start concord");
            std::process::exit(1);
        }
    };

    let result = run_command(&config, ctx, cli.command).await;
    match result {
        Ok(()) => Ok(()),
        Err(err) => {
            tracing::error!(error = %err, "concord exited with an error");
            std::process::exit(3);
        }
    }
}

async fn run_command(
    config: &Config,
    ctx: concord_workflows::WorkflowContext,
    command: Option<Commands>,
) -> anyhow::Result<()> {
    match command {
        None | Some(Commands::Run) => commands::run::run(config, ctx).await,
        Some(Commands::Sync { project }) => commands::sync::run(&ctx, project.as_deref()).await,
        Some(Commands::Reconcile { dry_run, action }) => commands::reconcile::run(&ctx, dry_run, action).await,
        Some(Commands::Doctor { strict, json, out }) => {
            commands::doctor::run(config, &ctx, strict, json, out.as_deref()).await
        }
    }
}
