//! CLI command implementations.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use fanout_core::{LauncherKind, SessionConfig, queues};

pub mod launch;
pub mod resume;
pub mod worker;

/// Scheduler options shared by launch and resume.
#[derive(Args)]
pub struct SchedulerArgs {
    /// Queue to submit to (ex: qwork@mp2, qfat256@mp2)
    #[arg(short, long)]
    pub queue: String,

    /// Estimated job running time, DD:HH:MM:SS (defaults to the queue
    /// maximum)
    #[arg(short = 't', long)]
    pub walltime: Option<String>,

    /// Commands packed per node (defaults to the queue's core count)
    #[arg(short = 'n', long)]
    pub commands_per_job: Option<u32>,

    /// Number of workers consuming commands from a shared queue
    #[arg(long)]
    pub pool: Option<u32>,

    /// Load CUDA before executing the commands
    #[arg(short = 'c', long)]
    pub cuda: bool,

    /// Build the submission scripts without launching them
    #[arg(short = 'x', long)]
    pub no_submit: bool,

    /// Submission program (qsub, msub or sbatch)
    #[arg(long, default_value = "qsub")]
    pub launcher: String,

    /// Accounting string forwarded to the scheduler
    #[arg(long)]
    pub account: Option<String>,

    /// Root directory for batch folders
    #[arg(long, default_value = fanout_core::session::DEFAULT_ROOT)]
    pub root: PathBuf,
}

impl SchedulerArgs {
    /// Resolve queue defaults and build the session configuration.
    pub fn session_config(&self) -> Result<SessionConfig> {
        let (commands_per_job, walltime_seconds) = queues::resolve(
            &self.queue,
            self.commands_per_job,
            self.walltime.as_deref(),
        )?;

        let mut config = SessionConfig::new(&self.queue, commands_per_job, walltime_seconds);
        config.root_dir = self.root.clone();
        config.pool = self.pool;
        config.no_submit = self.no_submit;
        config.launcher = self.launcher.parse::<LauncherKind>()?;
        config.account = self.account.clone();
        config.worker_binary =
            std::env::current_exe().unwrap_or_else(|_| PathBuf::from("fanout"));
        if self.cuda {
            config.prelude = vec!["module load cuda".to_string()];
        }

        Ok(config)
    }
}
