//! Submission script generation.
//!
//! The session is deliberately ignorant of scheduler script syntax: it
//! hands each job group to a [`ScriptBuilder`] with the fixed call order
//! `add_commands`, `save`, `clear_commands`. The PBS implementation here
//! is glue, not core contract.

use std::path::Path;

use crate::error::DispatchResult;
use crate::walltime;

/// Builder for scheduler-native submission scripts.
pub trait ScriptBuilder {
    /// Append commands to the script being built.
    fn add_commands(&mut self, commands: &[String]);

    /// Write the script for the accumulated commands to `path`.
    fn save(&self, path: &Path) -> DispatchResult<()>;

    /// Forget accumulated commands, readying the builder for the next
    /// group.
    fn clear_commands(&mut self);
}

/// PBS (`qsub`) script builder.
///
/// Commands in one script share a node, so each is backgrounded and the
/// script waits for all of them.
#[derive(Debug, Clone)]
pub struct PbsScriptBuilder {
    queue: String,
    walltime_seconds: u64,
    account: Option<String>,
    extra_directives: Vec<String>,
    prelude: Vec<String>,
    commands: Vec<String>,
}

impl PbsScriptBuilder {
    /// Create a builder for the given queue and walltime.
    pub fn new(queue: impl Into<String>, walltime_seconds: u64) -> Self {
        Self {
            queue: queue.into(),
            walltime_seconds,
            account: None,
            extra_directives: Vec::new(),
            prelude: Vec::new(),
            commands: Vec::new(),
        }
    }

    /// Set the accounting string (`#PBS -A`).
    pub fn with_account(mut self, account: Option<String>) -> Self {
        self.account = account;
        self
    }

    /// Add raw `#PBS` directives appended after the generated ones.
    pub fn with_extra_directives(mut self, directives: Vec<String>) -> Self {
        self.extra_directives = directives;
        self
    }

    /// Add shell lines run once before the commands (`module load cuda`
    /// and the like).
    pub fn with_prelude(mut self, prelude: Vec<String>) -> Self {
        self.prelude = prelude;
        self
    }

    fn render(&self, path: &Path) -> String {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "job".to_string());

        let mut script = String::new();
        script.push_str("#!/bin/bash\n");
        script.push_str(&format!("#PBS -N {}\n", sanitize_name(&name)));
        script.push_str(&format!("#PBS -q {}\n", self.queue));
        script.push_str(&format!(
            "#PBS -l walltime={}\n",
            walltime::format_seconds(self.walltime_seconds)
        ));

        if let Some(ref account) = self.account {
            script.push_str(&format!("#PBS -A {account}\n"));
        }

        for directive in &self.extra_directives {
            script.push_str(&format!("#PBS {directive}\n"));
        }

        script.push_str("\ncd \"$PBS_O_WORKDIR\"\n\n");

        if !self.prelude.is_empty() {
            for line in &self.prelude {
                script.push_str(line);
                script.push('\n');
            }
            script.push('\n');
        }

        // One slot per command: background them all, then wait.
        for command in &self.commands {
            script.push_str(command);
            script.push_str(" &\n");
        }
        script.push_str("wait\n");

        script
    }
}

impl ScriptBuilder for PbsScriptBuilder {
    fn add_commands(&mut self, commands: &[String]) {
        self.commands.extend_from_slice(commands);
    }

    fn save(&self, path: &Path) -> DispatchResult<()> {
        std::fs::write(path, self.render(path))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
        }

        Ok(())
    }

    fn clear_commands(&mut self) {
        self.commands.clear();
    }
}

/// Sanitize a job name for PBS (15 character limit, stricter than SLURM).
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(15)
        .collect()
}
