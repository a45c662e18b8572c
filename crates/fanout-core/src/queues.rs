//! Known scheduler queues and per-queue default resolution.
//!
//! Each queue carries the core count of its nodes (which sizes
//! commands-per-job) and the longest walltime it accepts. Unknown queues
//! can still be used when both values are supplied explicitly.

use crate::error::{DispatchError, DispatchResult};
use crate::walltime;

/// Static properties of a scheduler queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSpec {
    /// Cores available on one node of this queue.
    pub cores_per_node: u32,

    /// Longest walltime the queue accepts (DD:HH:MM:SS).
    pub max_walltime: &'static str,
}

/// Look up a known queue by name.
pub fn lookup(name: &str) -> Option<QueueSpec> {
    let spec = match name {
        // Mammouth Parallel
        "qtest@mp2" => QueueSpec {
            cores_per_node: 24,
            max_walltime: "00:01:00:00",
        },
        "qwork@mp2" => QueueSpec {
            cores_per_node: 24,
            max_walltime: "05:00:00:00",
        },
        "qfbb@mp2" => QueueSpec {
            cores_per_node: 288,
            max_walltime: "05:00:00:00",
        },
        "qfat256@mp2" => QueueSpec {
            cores_per_node: 48,
            max_walltime: "05:00:00:00",
        },
        "qfat512@mp2" => QueueSpec {
            cores_per_node: 48,
            max_walltime: "02:00:00:00",
        },

        // Mammouth Serie
        "qtest@ms" => QueueSpec {
            cores_per_node: 8,
            max_walltime: "00:01:00:00",
        },
        "qwork@ms" => QueueSpec {
            cores_per_node: 8,
            max_walltime: "05:00:00:00",
        },
        "qlong@ms" => QueueSpec {
            cores_per_node: 8,
            max_walltime: "41:16:00:00",
        },

        _ => return None,
    };

    Some(spec)
}

/// Resolve the effective commands-per-job and walltime for a queue.
///
/// Explicit overrides win over queue defaults. For an unknown queue both
/// overrides are required.
pub fn resolve(
    queue: &str,
    commands_per_job: Option<u32>,
    walltime_override: Option<&str>,
) -> DispatchResult<(u32, u64)> {
    let spec = lookup(queue);

    let per_job = match (commands_per_job, spec) {
        (Some(n), _) => n,
        (None, Some(spec)) => spec.cores_per_node,
        (None, None) => {
            return Err(DispatchError::Config(format!(
                "Unknown queue '{queue}': --commands-per-job and --walltime must be set"
            )));
        }
    };

    if per_job == 0 {
        return Err(DispatchError::Config(
            "commands per job must be positive".to_string(),
        ));
    }

    let walltime = match (walltime_override, spec) {
        (Some(w), _) => walltime::parse(w)?,
        (None, Some(spec)) => walltime::parse(spec.max_walltime)?,
        (None, None) => {
            return Err(DispatchError::Config(format!(
                "Unknown queue '{queue}': --commands-per-job and --walltime must be set"
            )));
        }
    };

    Ok((per_job, walltime))
}
