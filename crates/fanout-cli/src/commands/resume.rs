//! Resume command implementation.

use anyhow::Result;

use fanout_core::BatchSession;

use super::SchedulerArgs;
use super::launch::print_report;

/// Execute the resume command.
pub async fn execute(scheduler: &SchedulerArgs, batch_uid: &str) -> Result<()> {
    let mut session = BatchSession::new(scheduler.session_config()?)?;
    let report = session.resume(batch_uid).await?;

    print_report(&report, scheduler.no_submit);
    Ok(())
}
