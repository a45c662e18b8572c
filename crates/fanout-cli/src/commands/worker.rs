//! Worker command implementation: the entry point scripts run on
//! allocated cluster slots.

use std::path::Path;

use anyhow::Result;

use fanout_core::{WorkQueueStore, WorkerLoop};

/// Execute the worker command.
pub async fn execute(queue_file: &Path, logs_dir: &Path) -> Result<()> {
    let store = WorkQueueStore::new(queue_file);
    let worker = WorkerLoop::new(store, logs_dir);

    let attempted = worker.run().await?;
    println!("worker exiting after {attempted} command(s)");
    Ok(())
}
