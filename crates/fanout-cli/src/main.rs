//! Fanout command-line interface.
//!
//! Batches shell commands into PBS/Slurm submission scripts and fans work
//! out to pools of queue-consuming workers.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::style;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{SchedulerArgs, launch, resume, worker};

/// Fanout - batch shell commands onto HPC cluster nodes
#[derive(Parser)]
#[command(name = "fanout")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch a new batch of commands
    Launch {
        #[command(flatten)]
        scheduler: SchedulerArgs,

        /// File containing commands to launch, one per line (replaces
        /// trailing command words)
        #[arg(short = 'f', long)]
        commands_file: Option<PathBuf>,

        /// Command and options; [a b c] arguments expand to one command
        /// per value
        #[arg(trailing_var_arg = true)]
        command_and_options: Vec<String>,
    },

    /// Resume a previously launched batch from its UID
    Resume {
        #[command(flatten)]
        scheduler: SchedulerArgs,

        /// Batch UID of the jobs to resume
        batch_uid: String,
    },

    /// Consume commands from a batch's queue file (run on cluster nodes)
    #[command(hide = true)]
    Worker {
        /// Queue file seeded at launch
        queue_file: PathBuf,

        /// Directory receiving per-command logs
        logs_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Launch {
            scheduler,
            commands_file,
            command_and_options,
        } => launch::execute(&scheduler, commands_file, command_and_options).await,

        Commands::Resume {
            scheduler,
            batch_uid,
        } => resume::execute(&scheduler, &batch_uid).await,

        Commands::Worker {
            queue_file,
            logs_dir,
        } => worker::execute(&queue_file, &logs_dir).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
