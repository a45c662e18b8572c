//! Walltime parsing and formatting.
//!
//! Queue walltimes are written `DD:HH:MM:SS`, with leading fields optional:
//! `HH:MM:SS`, `MM:SS` and plain `SS` are all accepted. Empty segments
//! count as zero, so `::30:` parses the same as `00:00:30:00`.

use crate::error::{DispatchError, DispatchResult};

/// Parse a walltime string into seconds.
pub fn parse(walltime: &str) -> DispatchResult<u64> {
    let segments: Vec<&str> = walltime.split(':').collect();

    if segments.len() > 4 {
        return Err(invalid(walltime));
    }

    let mut fields = [0u64; 4];
    let offset = 4 - segments.len();

    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        fields[offset + i] = segment.parse().map_err(|_| invalid(walltime))?;
    }

    let [days, hours, minutes, seconds] = fields;
    days.checked_mul(24)
        .and_then(|h| h.checked_add(hours))
        .and_then(|h| h.checked_mul(60))
        .and_then(|m| m.checked_add(minutes))
        .and_then(|m| m.checked_mul(60))
        .and_then(|s| s.checked_add(seconds))
        .ok_or_else(|| invalid(walltime))
}

/// Render seconds as a canonical `DD:HH:MM:SS` walltime.
pub fn format_seconds(total: u64) -> String {
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    format!("{days:02}:{hours:02}:{minutes:02}:{seconds:02}")
}

fn invalid(walltime: &str) -> DispatchError {
    DispatchError::Config(format!(
        "Invalid walltime format: {walltime}. It must be either DD:HH:MM:SS, HH:MM:SS, MM:SS or S"
    ))
}
