//! Command construction: list expansion, `{UID}` substitution and the
//! identifiers derived from command text (log names, batch UIDs).

use std::hash::{Hash, Hasher};
use std::io::{BufRead, BufReader};
use std::path::Path;

use rustc_hash::FxHasher;

use crate::error::DispatchResult;

/// Placeholder token replaced with a fresh identifier per command.
pub const UID_TAG: &str = "{UID}";

/// Longest command prefix kept in a derived log name.
pub const LOG_NAME_PREFIX_LEN: usize = 30;

/// Convert text to a filesystem-safe slug: lowercase, alphanumerics kept,
/// whitespace and dashes become underscores, everything else is dropped.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut last_was_sep = true;

    for c in value.trim().chars() {
        if c.is_alphanumeric() || c == '_' {
            slug.extend(c.to_lowercase());
            last_was_sep = false;
        } else if (c.is_whitespace() || c == '-') && !last_was_sep {
            slug.push('_');
            last_was_sep = true;
        }
    }

    while slug.ends_with('_') {
        slug.pop();
    }

    slug
}

/// Truncate a slug to at most `max` bytes, never splitting a character.
///
/// Slugs keep any alphanumeric character, so a fixed byte offset can land
/// inside a multi-byte sequence; the cut is floored to the nearest
/// boundary instead.
fn truncate_slug(slug: &mut String, max: usize) {
    if slug.len() <= max {
        return;
    }

    let mut cut = max;
    while !slug.is_char_boundary(cut) {
        cut -= 1;
    }
    slug.truncate(cut);
}

/// Derive the log file base name for a command.
///
/// The slug is capped at [`LOG_NAME_PREFIX_LEN`] bytes to stay within
/// filesystem filename limits; a stable hash of the full text disambiguates
/// commands that share a prefix.
pub fn log_name(command: &str) -> String {
    let mut slug = slugify(command);
    truncate_slug(&mut slug, LOG_NAME_PREFIX_LEN);

    let mut hasher = FxHasher::default();
    command.hash(&mut hasher);

    format!("{slug}_{:016x}", hasher.finish())
}

/// Expand bracketed list arguments into the cross product of commands.
///
/// `["python", "train.py", "[0.1 0.01]"]` yields `python train.py 0.1`
/// and `python train.py 0.01`, in list order.
pub fn expand_arguments(arguments: &[String]) -> Vec<String> {
    if arguments.is_empty() {
        return Vec::new();
    }

    let mut commands = vec![String::new()];

    for argument in arguments {
        let variants = unfold_argument(argument);
        let mut expanded = Vec::with_capacity(commands.len() * variants.len());

        for command in &commands {
            for variant in &variants {
                if command.is_empty() {
                    expanded.push(variant.clone());
                } else {
                    expanded.push(format!("{command} {variant}"));
                }
            }
        }

        commands = expanded;
    }

    commands
}

/// Split a `[a b c]` argument into its variants; anything else is literal.
fn unfold_argument(argument: &str) -> Vec<String> {
    if let Some(inner) = argument
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
    {
        let variants: Vec<String> = inner.split_whitespace().map(str::to_string).collect();
        if !variants.is_empty() {
            return variants;
        }
    }

    vec![argument.to_string()]
}

/// Replace every [`UID_TAG`] with a fresh identifier, one per command.
pub fn replace_uid_tag(commands: Vec<String>) -> Vec<String> {
    commands
        .into_iter()
        .map(|command| {
            if command.contains(UID_TAG) {
                let uid = uuid::Uuid::new_v4().simple().to_string();
                command.replace(UID_TAG, &uid)
            } else {
                command
            }
        })
        .collect()
}

/// Read commands from a file, one per non-empty line.
pub fn commands_from_file(path: &Path) -> DispatchResult<Vec<String>> {
    let file = std::fs::File::open(path)?;
    let mut commands = Vec::new();

    for line in BufReader::new(file).lines() {
        let line = line?;
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            commands.push(trimmed.to_string());
        }
    }

    Ok(commands)
}

/// Generate a batch UID from launch arguments: a capped slug of the
/// argument text plus a launch timestamp.
pub fn batch_uid_from_arguments(arguments: &[String]) -> String {
    let mut slug = slugify(&arguments.join(" "));
    truncate_slug(&mut slug, 45);

    let stamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
    if slug.is_empty() {
        format!("batch_{stamp}")
    } else {
        format!("{slug}_{stamp}")
    }
}

/// Generate a batch UID from a commands file name.
pub fn batch_uid_from_file(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let slug = slugify(&stem);
    if slug.is_empty() {
        format!("batch_{}", chrono::Local::now().format("%Y-%m-%d_%H-%M-%S"))
    } else {
        slug
    }
}
