//! Batch sessions: launch and resume.
//!
//! A session owns a batch's directory tree for its lifetime:
//!
//! ```text
//! <root>/<batch_uid>/logs/         per-command stdout/stderr
//! <root>/<batch_uid>/commands/     generated submission scripts
//! <root>/<batch_uid>/commands/commands.txt   queue file (pool mode)
//! ```
//!
//! In direct mode commands are chunked straight into submission scripts.
//! In pool mode the queue file is seeded instead and exactly `pool`
//! worker-invocation scripts are submitted, whatever the command count.

use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::chunk::{self, JobGroup};
use crate::command;
use crate::error::{DispatchError, DispatchResult};
use crate::launcher::{Launcher, LauncherKind};
use crate::queue::WorkQueueStore;
use crate::script::{PbsScriptBuilder, ScriptBuilder};

/// Default root directory for batch folders, relative to the working
/// directory.
pub const DEFAULT_ROOT: &str = "FANOUT_LOGS";

/// Name of the queue file inside a batch's commands directory.
pub const QUEUE_FILENAME: &str = "commands.txt";

/// Where a batch's commands come from.
#[derive(Debug, Clone)]
pub enum CommandSource {
    /// A file with one command per non-empty line.
    File(PathBuf),

    /// Literal argument words, expanded via bracketed lists.
    Arguments(Vec<String>),
}

/// Explicit session configuration; there is no process-wide state.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Root directory holding one subdirectory per batch UID.
    pub root_dir: PathBuf,

    /// Scheduler queue to submit to.
    pub queue: String,

    /// Commands packed per job in direct mode.
    pub commands_per_job: u32,

    /// Effective walltime in seconds.
    pub walltime_seconds: u64,

    /// Worker pool size; `None` selects direct mode.
    pub pool: Option<u32>,

    /// Submission program.
    pub launcher: LauncherKind,

    /// Build scripts without submitting them.
    pub no_submit: bool,

    /// Binary invoked for pool workers.
    pub worker_binary: PathBuf,

    /// Accounting string passed to the script builder.
    pub account: Option<String>,

    /// Raw scheduler directives passed to the script builder.
    pub extra_directives: Vec<String>,

    /// Shell lines run in each script before its commands (module loads
    /// and the like).
    pub prelude: Vec<String>,
}

impl SessionConfig {
    /// Configuration with the given scheduler parameters and defaults for
    /// everything else.
    pub fn new(queue: impl Into<String>, commands_per_job: u32, walltime_seconds: u64) -> Self {
        Self {
            root_dir: PathBuf::from(DEFAULT_ROOT),
            queue: queue.into(),
            commands_per_job,
            walltime_seconds,
            pool: None,
            launcher: LauncherKind::default(),
            no_submit: false,
            worker_binary: PathBuf::from("fanout"),
            account: None,
            extra_directives: Vec::new(),
            prelude: Vec::new(),
        }
    }
}

/// Outcome of a launch or resume.
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// UID addressing this batch under the root directory.
    pub batch_uid: String,

    /// Generated submission scripts, in group order.
    pub scripts: Vec<PathBuf>,

    /// Scheduler job ids for the scripts that were submitted successfully.
    pub scheduler_job_ids: Vec<String>,
}

/// Orchestrates one launch or resume over a script builder.
pub struct BatchSession<B: ScriptBuilder> {
    config: SessionConfig,
    builder: B,
}

impl BatchSession<PbsScriptBuilder> {
    /// Session with the default PBS script builder.
    pub fn new(config: SessionConfig) -> DispatchResult<Self> {
        let builder = PbsScriptBuilder::new(&config.queue, config.walltime_seconds)
            .with_account(config.account.clone())
            .with_extra_directives(config.extra_directives.clone())
            .with_prelude(config.prelude.clone());
        Self::with_builder(config, builder)
    }
}

impl<B: ScriptBuilder> BatchSession<B> {
    /// Session with a caller-provided script builder.
    pub fn with_builder(config: SessionConfig, builder: B) -> DispatchResult<Self> {
        if config.commands_per_job == 0 {
            return Err(DispatchError::Config(
                "commands per job must be positive".to_string(),
            ));
        }
        if config.pool == Some(0) {
            return Err(DispatchError::Config(
                "worker pool size must be positive".to_string(),
            ));
        }

        Ok(Self { config, builder })
    }

    /// Launch a fresh batch.
    pub async fn launch(&mut self, source: CommandSource) -> DispatchResult<BatchReport> {
        let (batch_uid, commands) = match source {
            CommandSource::File(path) => (
                command::batch_uid_from_file(&path),
                command::commands_from_file(&path)?,
            ),
            CommandSource::Arguments(arguments) => {
                if arguments.is_empty() {
                    return Err(DispatchError::Config(
                        "You need to specify a command to launch".to_string(),
                    ));
                }
                (
                    command::batch_uid_from_arguments(&arguments),
                    command::expand_arguments(&arguments),
                )
            }
        };

        let commands = command::replace_uid_tag(commands);
        let (logs_dir, commands_dir) = self.batch_paths(&batch_uid);

        // The "already launched" guard: a commands directory for this UID
        // means the batch exists and must be resumed, not relaunched.
        if commands_dir.exists() {
            return Err(DispatchError::Config(format!(
                "Batch '{batch_uid}' was already launched; resume it or remove {}",
                commands_dir.display()
            )));
        }

        std::fs::create_dir_all(&commands_dir)?;
        std::fs::create_dir_all(&logs_dir)?;

        info!(
            batch_uid,
            commands = commands.len(),
            pool = ?self.config.pool,
            "launching batch"
        );

        let groups = match self.config.pool {
            Some(pool) => {
                let store = WorkQueueStore::new(commands_dir.join(QUEUE_FILENAME));
                store.seed(&commands)?;
                self.worker_groups(pool, store.path(), &logs_dir)
            }
            None => {
                let redirected = self.with_log_redirection(commands, &logs_dir);
                chunk::chunk_commands(&redirected, self.config.commands_per_job)?
            }
        };

        self.dispatch(&batch_uid, &groups, &commands_dir).await
    }

    /// Resume an existing batch: reset in-flight records and relaunch the
    /// worker pool without reseeding, so DONE/PENDING state survives.
    pub async fn resume(&mut self, batch_uid: &str) -> DispatchResult<BatchReport> {
        let pool = self.config.pool.ok_or_else(|| {
            DispatchError::Config("resume only works with a worker pool (--pool)".to_string())
        })?;

        let (logs_dir, commands_dir) = self.batch_paths(batch_uid);
        if !commands_dir.exists() {
            return Err(DispatchError::BatchNotFound(batch_uid.to_string()));
        }
        if !logs_dir.exists() {
            std::fs::create_dir_all(&logs_dir)?;
        }

        let store = WorkQueueStore::new(commands_dir.join(QUEUE_FILENAME));
        let reset = store.reset_running()?;
        info!(batch_uid, reset, "resuming batch");

        let groups = self.worker_groups(pool, store.path(), &logs_dir);
        self.dispatch(batch_uid, &groups, &commands_dir).await
    }

    fn batch_paths(&self, batch_uid: &str) -> (PathBuf, PathBuf) {
        let batch_dir = self.config.root_dir.join(batch_uid);
        (batch_dir.join("logs"), batch_dir.join("commands"))
    }

    /// One JobGroup per pool slot, each holding a single worker
    /// invocation.
    fn worker_groups(&self, pool: u32, queue_file: &Path, logs_dir: &Path) -> Vec<JobGroup> {
        let invocation = format!(
            "{} worker \"{}\" \"{}\"",
            self.config.worker_binary.display(),
            queue_file.display(),
            logs_dir.display()
        );

        let commands =
            self.with_log_redirection(vec![invocation; pool as usize], logs_dir);

        commands
            .into_iter()
            .enumerate()
            .map(|(index, command)| JobGroup {
                index,
                commands: vec![command],
            })
            .collect()
    }

    /// Append per-command stdout/stderr redirection into the logs
    /// directory.
    fn with_log_redirection(&self, commands: Vec<String>, logs_dir: &Path) -> Vec<String> {
        commands
            .into_iter()
            .map(|cmd| {
                let base = logs_dir.join(command::log_name(&cmd));
                format!(
                    "{cmd} 1>> \"{base}.o\" 2>> \"{base}.e\"",
                    base = base.display()
                )
            })
            .collect()
    }

    /// Build one script per group, then submit unless asked not to. A
    /// failed submission is reported and does not abort the remaining
    /// groups.
    async fn dispatch(
        &mut self,
        batch_uid: &str,
        groups: &[JobGroup],
        commands_dir: &Path,
    ) -> DispatchResult<BatchReport> {
        let mut scripts = Vec::with_capacity(groups.len());

        for group in groups {
            let path = commands_dir.join(format!("job_commands_{}.sh", group.index));
            self.builder.add_commands(&group.commands);
            self.builder.save(&path)?;
            self.builder.clear_commands();
            scripts.push(path);
        }

        let mut scheduler_job_ids = Vec::new();
        if !self.config.no_submit {
            let launcher = Launcher::new(self.config.launcher);
            for script in &scripts {
                match launcher.submit(script).await {
                    Ok(job_id) => {
                        info!(script = %script.display(), job_id, "submitted");
                        scheduler_job_ids.push(job_id);
                    }
                    Err(e) => error!(script = %script.display(), "submission failed: {e}"),
                }
            }
        }

        Ok(BatchReport {
            batch_uid: batch_uid.to_string(),
            scripts,
            scheduler_job_ids,
        })
    }
}
