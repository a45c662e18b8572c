//! Crash-recoverable work queue persisted in a single shared file.
//!
//! One record per line, `<marker> <command>`, with markers `P` (pending),
//! `R` (running) and `D` (done). Workers on different nodes coordinate
//! exclusively through this file: every mutation is a read-modify-rewrite
//! of the whole file under an exclusive `flock` on the queue file's own
//! descriptor, so a dying process can never orphan the lock. The file is
//! rewritten in place (seek + truncate), never renamed, which keeps the
//! locked inode stable for concurrent claimers.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use tracing::debug;

use crate::error::{DispatchError, DispatchResult};

/// Lock retry budget before giving up with a timeout error.
const LOCK_ATTEMPTS: u32 = 120;

/// Backoff step between lock attempts; grows linearly, capped below.
const LOCK_BACKOFF_STEP: Duration = Duration::from_millis(20);
const LOCK_BACKOFF_CAP: Duration = Duration::from_millis(250);

/// State of one queued command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    /// Waiting to be claimed.
    Pending,
    /// Claimed by a worker, not yet completed.
    Running,
    /// Attempted (successfully or not) by a worker.
    Done,
}

impl CommandState {
    /// Single-character marker written at the start of a record line.
    pub fn marker(self) -> char {
        match self {
            CommandState::Pending => 'P',
            CommandState::Running => 'R',
            CommandState::Done => 'D',
        }
    }

    fn from_marker(marker: &str) -> Option<Self> {
        match marker {
            "P" => Some(CommandState::Pending),
            "R" => Some(CommandState::Running),
            "D" => Some(CommandState::Done),
            _ => None,
        }
    }

    /// Lowercase state name, for messages.
    pub fn as_str(self) -> &'static str {
        match self {
            CommandState::Pending => "pending",
            CommandState::Running => "running",
            CommandState::Done => "done",
        }
    }
}

/// One record of the work queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRecord {
    /// Line position in the queue file; stable for the batch's lifetime.
    pub id: usize,

    /// The shell command to run.
    pub text: String,

    /// Current state.
    pub state: CommandState,
}

/// Persisted, crash-recoverable queue of command records.
///
/// Cloneable and cheap to construct: every operation opens its own
/// descriptor so independent processes (and threads in tests) contend on
/// the advisory lock, never on shared in-memory state.
#[derive(Debug, Clone)]
pub struct WorkQueueStore {
    path: PathBuf,
}

impl WorkQueueStore {
    /// Create a handle for the queue file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the queue with one PENDING record per command.
    ///
    /// Only used on a fresh launch; resuming must never reseed.
    pub fn seed<S: AsRef<str>>(&self, commands: &[S]) -> DispatchResult<()> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;

        let mut guard = self.lock(file)?;
        let records: Vec<CommandRecord> = commands
            .iter()
            .enumerate()
            .map(|(id, text)| CommandRecord {
                id,
                text: text.as_ref().to_string(),
                state: CommandState::Pending,
            })
            .collect();

        self.rewrite(&mut guard, &records)?;
        debug!(count = records.len(), path = %self.path.display(), "seeded queue");
        Ok(())
    }

    /// Claim the first PENDING record: transition it to RUNNING, persist,
    /// and return it. `None` once no PENDING record remains.
    pub fn claim(&self) -> DispatchResult<Option<CommandRecord>> {
        let mut guard = self.lock(self.open_existing()?)?;
        let mut records = self.parse(&mut guard)?;

        let Some(record) = records
            .iter_mut()
            .find(|r| r.state == CommandState::Pending)
        else {
            return Ok(None);
        };

        record.state = CommandState::Running;
        let claimed = record.clone();

        self.rewrite(&mut guard, &records)?;
        debug!(id = claimed.id, "claimed record");
        Ok(Some(claimed))
    }

    /// Transition a RUNNING record to DONE, persisted immediately.
    ///
    /// Any other source state is rejected: only RUNNING -> DONE is legal.
    pub fn complete(&self, id: usize) -> DispatchResult<()> {
        let mut guard = self.lock(self.open_existing()?)?;
        let mut records = self.parse(&mut guard)?;

        let record = records
            .get_mut(id)
            .ok_or_else(|| DispatchError::StoreCorruption {
                path: self.path.clone(),
                detail: format!("no record with id {id}"),
            })?;

        if record.state != CommandState::Running {
            return Err(DispatchError::InvalidTransition {
                id,
                from: record.state.as_str().to_string(),
            });
        }

        record.state = CommandState::Done;
        self.rewrite(&mut guard, &records)?;
        debug!(id, "completed record");
        Ok(())
    }

    /// Reset every RUNNING record back to PENDING.
    ///
    /// A crash leaves no trace of partial progress, so anything mid-flight
    /// is conservatively re-run on resume. DONE and PENDING records are
    /// untouched. Returns how many records were reset.
    pub fn reset_running(&self) -> DispatchResult<usize> {
        let mut guard = self.lock(self.open_existing()?)?;
        let mut records = self.parse(&mut guard)?;

        let mut reset = 0;
        for record in &mut records {
            if record.state == CommandState::Running {
                record.state = CommandState::Pending;
                reset += 1;
            }
        }

        if reset > 0 {
            self.rewrite(&mut guard, &records)?;
        }

        debug!(reset, "reset running records");
        Ok(reset)
    }

    /// Snapshot of all records, in file order.
    pub fn records(&self) -> DispatchResult<Vec<CommandRecord>> {
        let mut guard = self.lock(self.open_existing()?)?;
        self.parse(&mut guard)
    }

    fn open_existing(&self) -> DispatchResult<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    DispatchError::StoreCorruption {
                        path: self.path.clone(),
                        detail: "queue file is missing".to_string(),
                    }
                } else {
                    DispatchError::Io(e)
                }
            })
    }

    /// Acquire the exclusive advisory lock, retrying with bounded backoff.
    fn lock(&self, file: File) -> DispatchResult<Flock<File>> {
        let mut file = file;

        for attempt in 1..=LOCK_ATTEMPTS {
            match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
                Ok(guard) => return Ok(guard),
                Err((returned, errno)) if errno == Errno::EWOULDBLOCK => {
                    file = returned;
                    let backoff = (LOCK_BACKOFF_STEP * attempt).min(LOCK_BACKOFF_CAP);
                    std::thread::sleep(backoff);
                }
                Err((_, errno)) => {
                    return Err(DispatchError::Io(std::io::Error::from_raw_os_error(
                        errno as i32,
                    )));
                }
            }
        }

        Err(DispatchError::LockTimeout {
            path: self.path.clone(),
            attempts: LOCK_ATTEMPTS,
        })
    }

    /// Parse all records while holding the lock.
    fn parse(&self, guard: &mut Flock<File>) -> DispatchResult<Vec<CommandRecord>> {
        guard.seek(SeekFrom::Start(0))?;
        let mut content = String::new();
        guard.read_to_string(&mut content)?;

        let mut records = Vec::new();
        for (id, line) in content.lines().enumerate() {
            let (marker, text) = line.split_once(' ').ok_or_else(|| self.corrupt(id, line))?;

            let state =
                CommandState::from_marker(marker).ok_or_else(|| self.corrupt(id, line))?;

            records.push(CommandRecord {
                id,
                text: text.to_string(),
                state,
            });
        }

        Ok(records)
    }

    /// Rewrite the whole file in place while holding the lock.
    fn rewrite(&self, guard: &mut Flock<File>, records: &[CommandRecord]) -> DispatchResult<()> {
        let mut content = String::new();
        for record in records {
            content.push(record.state.marker());
            content.push(' ');
            content.push_str(&record.text);
            content.push('\n');
        }

        guard.seek(SeekFrom::Start(0))?;
        guard.set_len(0)?;
        guard.write_all(content.as_bytes())?;
        guard.sync_all()?;
        Ok(())
    }

    fn corrupt(&self, id: usize, line: &str) -> DispatchError {
        DispatchError::StoreCorruption {
            path: self.path.clone(),
            detail: format!("malformed record on line {}: {line:?}", id + 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, WorkQueueStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = WorkQueueStore::new(dir.path().join("commands.txt"));
        (dir, store)
    }

    #[test]
    fn test_seed_writes_pending_records() {
        let (_dir, store) = temp_store();
        store.seed(&["echo a", "echo b", "echo c"]).unwrap();

        let records = store.records().unwrap();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.state == CommandState::Pending));
        assert_eq!(records[1].text, "echo b");

        // Reseeding overwrites prior content.
        store.seed(&["echo z"]).unwrap();
        assert_eq!(store.records().unwrap().len(), 1);
    }

    #[test]
    fn test_claims_are_fifo_then_exhausted() {
        let (_dir, store) = temp_store();
        store.seed(&["echo a", "echo b", "echo c"]).unwrap();

        let mut ids = Vec::new();
        while let Some(record) = store.claim().unwrap() {
            assert_eq!(record.state, CommandState::Running);
            ids.push(record.id);
        }

        assert_eq!(ids, vec![0, 1, 2]);
        assert!(store.claim().unwrap().is_none());
    }

    #[test]
    fn test_complete_requires_running() {
        let (_dir, store) = temp_store();
        store.seed(&["echo a", "echo b"]).unwrap();

        // Pending record cannot be completed.
        assert!(matches!(
            store.complete(1),
            Err(DispatchError::InvalidTransition { id: 1, .. })
        ));

        let record = store.claim().unwrap().unwrap();
        store.complete(record.id).unwrap();
        assert_eq!(store.records().unwrap()[0].state, CommandState::Done);

        // Completing twice is also illegal.
        assert!(matches!(
            store.complete(record.id),
            Err(DispatchError::InvalidTransition { .. })
        ));

        // Unknown id is corruption, not a transition error.
        assert!(matches!(
            store.complete(99),
            Err(DispatchError::StoreCorruption { .. })
        ));
    }

    #[test]
    fn test_reset_running_leaves_done_untouched() {
        let (_dir, store) = temp_store();
        store.seed(&["echo a", "echo b", "echo c"]).unwrap();

        let first = store.claim().unwrap().unwrap();
        store.complete(first.id).unwrap();
        let _second = store.claim().unwrap().unwrap();

        // States now: D, R, P.
        assert_eq!(store.reset_running().unwrap(), 1);

        let records = store.records().unwrap();
        assert_eq!(records[0].state, CommandState::Done);
        assert_eq!(records[1].state, CommandState::Pending);
        assert_eq!(records[2].state, CommandState::Pending);

        // A reset record is claimable again, in FIFO order.
        let reclaimed = store.claim().unwrap().unwrap();
        assert_eq!(reclaimed.id, 1);
    }

    #[test]
    fn test_missing_file_is_corruption() {
        let (_dir, store) = temp_store();

        assert!(matches!(
            store.claim(),
            Err(DispatchError::StoreCorruption { .. })
        ));
        assert!(matches!(
            store.complete(0),
            Err(DispatchError::StoreCorruption { .. })
        ));
    }

    #[test]
    fn test_malformed_line_is_corruption() {
        let (_dir, store) = temp_store();
        std::fs::write(store.path(), "P echo a\nX echo b\n").unwrap();

        let err = store.records().unwrap_err();
        assert!(matches!(err, DispatchError::StoreCorruption { .. }));
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_command_text_with_spaces_survives() {
        let (_dir, store) = temp_store();
        let command = r#"python train.py --name "my run" 1>> "log.o""#;
        store.seed(&[command]).unwrap();

        let record = store.claim().unwrap().unwrap();
        assert_eq!(record.text, command);
    }

    #[test]
    fn test_concurrent_claimers_never_share_a_record() {
        let (_dir, store) = temp_store();
        let commands: Vec<String> = (0..40).map(|i| format!("echo {i}")).collect();
        store.seed(&commands).unwrap();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                let mut ids = Vec::new();
                while let Some(record) = store.claim().unwrap() {
                    ids.push(record.id);
                }
                ids
            }));
        }

        let mut all_ids: Vec<usize> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();

        all_ids.sort_unstable();
        let expected: Vec<usize> = (0..40).collect();
        assert_eq!(all_ids, expected);
    }
}
