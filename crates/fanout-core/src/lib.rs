//! Command batching and resumable work queues for PBS/Slurm clusters.
//!
//! `fanout-core` packs an ordered list of shell commands into
//! scheduler-submission scripts (one per node, sized by the queue's core
//! count) and, in pool mode, fans the commands out to a fixed set of
//! long-lived workers that claim work from a shared, crash-recoverable
//! queue file.
//!
//! The pieces, leaves first:
//! - [`walltime`] / [`queues`]: duration parsing and per-queue defaults;
//! - [`command`]: list expansion, `{UID}` substitution, derived names;
//! - [`chunk`]: even distribution of commands across job groups;
//! - [`queue`]: the persisted work queue shared across worker processes;
//! - [`worker`]: the claim/execute/complete loop run on each slot;
//! - [`script`] / [`launcher`]: submission-script glue and `qsub` calls;
//! - [`session`]: launch/resume orchestration over all of the above.

pub mod chunk;
pub mod command;
pub mod error;
pub mod launcher;
pub mod queue;
pub mod queues;
pub mod script;
pub mod session;
pub mod walltime;
pub mod worker;

pub use chunk::{JobGroup, chunk_commands};
pub use error::{DispatchError, DispatchResult};
pub use launcher::{Launcher, LauncherKind};
pub use queue::{CommandRecord, CommandState, WorkQueueStore};
pub use queues::QueueSpec;
pub use script::{PbsScriptBuilder, ScriptBuilder};
pub use session::{BatchReport, BatchSession, CommandSource, SessionConfig};
pub use worker::WorkerLoop;
