//! Worker loop: claim, execute, complete, repeat.
//!
//! One worker runs per allocated slot and is itself submitted as an
//! ordinary command. It keeps pulling from the shared queue until no
//! PENDING record remains, then exits. The queue tracks *attempted*, not
//! *succeeded*: a claimed command is marked DONE whatever its exit status,
//! and failure visibility is its log file, not the queue.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{info, warn};

use crate::command;
use crate::error::DispatchResult;
use crate::queue::WorkQueueStore;

/// A long-lived consumer of the shared work queue.
#[derive(Debug)]
pub struct WorkerLoop {
    store: WorkQueueStore,
    logs_dir: PathBuf,
}

impl WorkerLoop {
    /// Create a worker over the given queue file and logs directory.
    pub fn new(store: WorkQueueStore, logs_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            logs_dir: logs_dir.into(),
        }
    }

    /// Consume the queue until it is exhausted.
    ///
    /// Each claimed command runs under `sh -c` with stdout and stderr
    /// appended to its own `<name>.o` / `<name>.e` log files. The worker
    /// blocks until the child exits, then completes the record
    /// unconditionally. Returns the number of commands attempted.
    pub async fn run(&self) -> DispatchResult<usize> {
        let mut attempted = 0;

        while let Some(record) = self.store.claim()? {
            info!(id = record.id, command = %record.text, "running command");

            let log_base = self.logs_dir.join(command::log_name(&record.text));
            let stdout = OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_base.with_extension("o"))?;
            let stderr = OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_base.with_extension("e"))?;

            let status = Command::new("sh")
                .arg("-c")
                .arg(&record.text)
                .stdin(Stdio::null())
                .stdout(Stdio::from(stdout))
                .stderr(Stdio::from(stderr))
                .status()
                .await?;

            if !status.success() {
                // Not retried and not a queue error; the log file is the
                // record of what went wrong.
                warn!(id = record.id, code = ?status.code(), "command failed");
            }

            self.store.complete(record.id)?;
            attempted += 1;
        }

        info!(attempted, "queue exhausted, worker exiting");
        Ok(attempted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::CommandState;

    fn setup(commands: &[&str]) -> (tempfile::TempDir, WorkQueueStore, WorkerLoop) {
        let dir = tempfile::tempdir().unwrap();
        let logs_dir = dir.path().join("logs");
        std::fs::create_dir_all(&logs_dir).unwrap();

        let store = WorkQueueStore::new(dir.path().join("commands.txt"));
        store.seed(commands).unwrap();

        let worker = WorkerLoop::new(store.clone(), &logs_dir);
        (dir, store, worker)
    }

    #[tokio::test]
    async fn test_worker_drains_queue() {
        let (_dir, store, worker) = setup(&["echo one", "echo two", "echo three"]);

        let attempted = worker.run().await.unwrap();
        assert_eq!(attempted, 3);

        let records = store.records().unwrap();
        assert!(records.iter().all(|r| r.state == CommandState::Done));
        assert!(store.claim().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_worker_writes_logs() {
        let (dir, _store, worker) = setup(&["echo hello", "echo oops 1>&2"]);
        worker.run().await.unwrap();

        let logs_dir = dir.path().join("logs");
        let out = std::fs::read_to_string(
            logs_dir.join(format!("{}.o", command::log_name("echo hello"))),
        )
        .unwrap();
        assert_eq!(out, "hello\n");

        let err = std::fs::read_to_string(
            logs_dir.join(format!("{}.e", command::log_name("echo oops 1>&2"))),
        )
        .unwrap();
        assert_eq!(err, "oops\n");
    }

    #[tokio::test]
    async fn test_failing_command_is_marked_done() {
        let (_dir, store, worker) = setup(&["false", "echo after"]);

        let attempted = worker.run().await.unwrap();
        assert_eq!(attempted, 2);

        // The failure neither blocked the queue nor left the record
        // running.
        let records = store.records().unwrap();
        assert_eq!(records[0].state, CommandState::Done);
        assert_eq!(records[1].state, CommandState::Done);
    }

    #[tokio::test]
    async fn test_two_workers_share_one_queue() {
        let (_dir, store, worker_a) = setup(&["echo 1", "echo 2", "echo 3", "echo 4", "echo 5"]);
        let worker_b = WorkerLoop::new(store.clone(), worker_a.logs_dir.clone());

        let (a, b) = tokio::join!(worker_a.run(), worker_b.run());
        assert_eq!(a.unwrap() + b.unwrap(), 5);

        let records = store.records().unwrap();
        assert!(records.iter().all(|r| r.state == CommandState::Done));
    }
}
