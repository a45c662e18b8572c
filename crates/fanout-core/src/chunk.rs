//! Packing commands into per-script job groups.

use crate::error::{DispatchError, DispatchResult};

/// An ordered, contiguous slice of commands assigned to one submission
/// script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobGroup {
    /// Position of this group in the batch.
    pub index: usize,

    /// Commands to run on the group's node, in input order.
    pub commands: Vec<String>,
}

/// Split commands into the minimal number of evenly sized job groups.
///
/// The computation is two-pass on purpose: the requested per-job size only
/// decides *how many* jobs exist (`ceil(n / commands_per_job)`); commands
/// are then re-balanced across those jobs with `ceil(n / nb_jobs)` per
/// group. Ten commands at eight per job would otherwise produce groups of
/// 8 and 2; re-balancing yields 5 and 5.
///
/// Order is preserved: concatenating the groups reproduces the input
/// exactly. Zero commands yield zero groups.
pub fn chunk_commands(commands: &[String], commands_per_job: u32) -> DispatchResult<Vec<JobGroup>> {
    if commands_per_job == 0 {
        return Err(DispatchError::Config(
            "commands per job must be positive".to_string(),
        ));
    }

    if commands.is_empty() {
        return Ok(Vec::new());
    }

    let nb_jobs = commands.len().div_ceil(commands_per_job as usize);

    // Spread the remainder over the leading groups so sizes never differ
    // by more than one.
    let base = commands.len() / nb_jobs;
    let remainder = commands.len() % nb_jobs;

    let mut groups = Vec::with_capacity(nb_jobs);
    let mut start = 0;

    for index in 0..nb_jobs {
        let size = base + usize::from(index < remainder);
        groups.push(JobGroup {
            index,
            commands: commands[start..start + size].to_vec(),
        });
        start += size;
    }

    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn commands(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("echo {i}")).collect()
    }

    #[test]
    fn test_three_commands_two_per_job() {
        let groups = chunk_commands(&commands(3), 2).unwrap();

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].commands, vec!["echo 0", "echo 1"]);
        assert_eq!(groups[1].commands, vec!["echo 2"]);
    }

    #[test]
    fn test_rebalancing_avoids_lopsided_tail() {
        // 10 commands at 8 per job: 2 jobs, re-balanced to 5 + 5.
        let groups = chunk_commands(&commands(10), 8).unwrap();

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].commands.len(), 5);
        assert_eq!(groups[1].commands.len(), 5);
    }

    #[test]
    fn test_remainder_spread_over_leading_groups() {
        let groups = chunk_commands(&commands(7), 3).unwrap();

        let sizes: Vec<usize> = groups.iter().map(|g| g.commands.len()).collect();
        assert_eq!(sizes, vec![3, 2, 2]);
    }

    #[test]
    fn test_exact_fit() {
        let groups = chunk_commands(&commands(24), 24).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].commands.len(), 24);
    }

    #[test]
    fn test_zero_commands_is_noop() {
        assert!(chunk_commands(&[], 8).unwrap().is_empty());
    }

    #[test]
    fn test_zero_per_job_is_config_error() {
        assert!(matches!(
            chunk_commands(&commands(3), 0),
            Err(DispatchError::Config(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_groups_reassemble_input(n in 0usize..200, per_job in 1u32..40) {
            let input = commands(n);
            let groups = chunk_commands(&input, per_job).unwrap();

            let reassembled: Vec<String> = groups
                .iter()
                .flat_map(|g| g.commands.iter().cloned())
                .collect();
            prop_assert_eq!(reassembled, input);
        }

        #[test]
        fn prop_group_sizes_are_balanced(n in 1usize..200, per_job in 1u32..40) {
            let groups = chunk_commands(&commands(n), per_job).unwrap();

            let nb_jobs = n.div_ceil(per_job as usize);
            let cap = n.div_ceil(nb_jobs);

            prop_assert_eq!(groups.len(), nb_jobs);

            let sizes: Vec<usize> = groups.iter().map(|g| g.commands.len()).collect();
            let max = *sizes.iter().max().unwrap();
            let min = *sizes.iter().min().unwrap();

            prop_assert!(max <= cap);
            prop_assert!(max - min <= 1);
        }

        #[test]
        fn prop_indices_are_sequential(n in 0usize..100, per_job in 1u32..20) {
            let groups = chunk_commands(&commands(n), per_job).unwrap();
            for (i, group) in groups.iter().enumerate() {
                prop_assert_eq!(group.index, i);
            }
        }
    }
}
