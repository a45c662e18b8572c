//! Scheduler submission: hand a generated script to `qsub`/`msub`/`sbatch`.

use std::path::Path;
use std::process::Stdio;
use std::str::FromStr;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::error::{DispatchError, DispatchResult};

const SUBMIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Supported submission programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LauncherKind {
    /// PBS/Torque `qsub`.
    #[default]
    Qsub,
    /// Moab `msub`.
    Msub,
    /// Slurm `sbatch`.
    Sbatch,
}

impl LauncherKind {
    /// Program name invoked on the submission host.
    pub fn program(self) -> &'static str {
        match self {
            LauncherKind::Qsub => "qsub",
            LauncherKind::Msub => "msub",
            LauncherKind::Sbatch => "sbatch",
        }
    }
}

impl FromStr for LauncherKind {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "qsub" => Ok(LauncherKind::Qsub),
            "msub" => Ok(LauncherKind::Msub),
            "sbatch" => Ok(LauncherKind::Sbatch),
            other => Err(DispatchError::Config(format!(
                "Unsupported launcher '{other}': expected qsub, msub or sbatch"
            ))),
        }
    }
}

/// Submits generated scripts to the batch scheduler.
#[derive(Debug, Clone, Copy, Default)]
pub struct Launcher {
    kind: LauncherKind,
}

impl Launcher {
    /// Create a launcher for the given submission program.
    pub fn new(kind: LauncherKind) -> Self {
        Self { kind }
    }

    /// Submit one script and return the scheduler-assigned job id.
    pub async fn submit(&self, script: &Path) -> DispatchResult<String> {
        let program = self.kind.program();
        debug!(program, script = %script.display(), "submitting script");

        let output = tokio::time::timeout(
            SUBMIT_TIMEOUT,
            Command::new(program)
                .arg(script)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output(),
        )
        .await
        .map_err(|_| {
            DispatchError::Timeout(format!(
                "{program} timed out after {}s",
                SUBMIT_TIMEOUT.as_secs()
            ))
        })?
        .map_err(|e| DispatchError::Submit {
            script: script.to_path_buf(),
            message: format!("{program}: {e}"),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DispatchError::Submit {
                script: script.to_path_buf(),
                message: stderr.trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_job_id(&stdout).ok_or_else(|| DispatchError::Submit {
            script: script.to_path_buf(),
            message: format!("unexpected {program} output: {:?}", stdout.trim()),
        })
    }
}

/// Extract the job id from submission output.
///
/// `qsub`/`msub` print the id alone (`12345.server`); `sbatch` prints
/// `Submitted batch job 12345`.
fn parse_job_id(output: &str) -> Option<String> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;

    if let Some(rest) = line.strip_prefix("Submitted batch job") {
        let id = rest.trim();
        return (!id.is_empty()).then(|| id.to_string());
    }

    Some(line.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launcher_kind_from_str() {
        assert_eq!("qsub".parse::<LauncherKind>().unwrap(), LauncherKind::Qsub);
        assert_eq!("msub".parse::<LauncherKind>().unwrap(), LauncherKind::Msub);
        assert_eq!(
            "sbatch".parse::<LauncherKind>().unwrap(),
            LauncherKind::Sbatch
        );
        assert!("condor".parse::<LauncherKind>().is_err());
    }

    #[test]
    fn test_parse_job_id_qsub() {
        assert_eq!(parse_job_id("12345.pbs-server\n").unwrap(), "12345.pbs-server");
        assert_eq!(parse_job_id("\n  6789.mp2  \n").unwrap(), "6789.mp2");
    }

    #[test]
    fn test_parse_job_id_sbatch() {
        assert_eq!(parse_job_id("Submitted batch job 42\n").unwrap(), "42");
        assert!(parse_job_id("Submitted batch job \n").is_none());
    }

    #[test]
    fn test_parse_job_id_empty() {
        assert!(parse_job_id("\n\n").is_none());
    }

    #[tokio::test]
    async fn test_submit_missing_program_is_submit_error() {
        // A launcher program that does not exist on any PATH.
        let launcher = Launcher::new(LauncherKind::Qsub);
        let err = launcher
            .submit(Path::new("/nonexistent/job.sh"))
            .await
            .unwrap_err();

        // Spawn failure and a nonzero scheduler exit both surface as a
        // submission error for this script.
        assert!(matches!(err, DispatchError::Submit { .. }));
    }
}
