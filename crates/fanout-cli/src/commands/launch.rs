//! Launch command implementation.

use std::path::PathBuf;

use anyhow::Result;
use console::style;

use fanout_core::{BatchReport, BatchSession, CommandSource};

use super::SchedulerArgs;

/// Execute the launch command.
pub async fn execute(
    scheduler: &SchedulerArgs,
    commands_file: Option<PathBuf>,
    command_and_options: Vec<String>,
) -> Result<()> {
    let source = match commands_file {
        Some(path) => CommandSource::File(path),
        None => CommandSource::Arguments(command_and_options),
    };

    let mut session = BatchSession::new(scheduler.session_config()?)?;
    let report = session.launch(source).await?;

    print_report(&report, scheduler.no_submit);
    Ok(())
}

/// Shared report printer for launch and resume.
pub(super) fn print_report(report: &BatchReport, no_submit: bool) {
    println!(
        "{} Batch {}",
        style("→").cyan().bold(),
        style(&report.batch_uid).green()
    );
    println!(
        "  {} submission script(s) under {}",
        report.scripts.len(),
        report
            .scripts
            .first()
            .and_then(|p| p.parent())
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string())
    );

    if no_submit {
        println!("  {} scripts were not submitted (-x)", style("·").dim());
        return;
    }

    for job_id in &report.scheduler_job_ids {
        println!("  submitted as {}", style(job_id).yellow());
    }

    let failed = report.scripts.len() - report.scheduler_job_ids.len();
    if failed > 0 {
        println!(
            "  {} {failed} script(s) failed to submit, see log output",
            style("!").red().bold()
        );
    }
}
