//! Live mount table reads
//!
//! The mount table is polled fresh on every pass; it is kernel-owned shared
//! state that changes between retries and must never be cached.

use crate::config::types::{Result, TeardownError};
use std::cmp::Reverse;
use std::fs;
use std::path::{Path, PathBuf};

/// One active mount, as read from `/proc/mounts`. Ephemeral.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MountEntry {
    /// Normalized source token (device, fs name, or bind origin)
    pub source: String,
    /// Mount target path, octal escapes decoded
    pub target: PathBuf,
}

/// Every mount target equal to or below `canonical`, deepest path first.
///
/// Deepest-first ordering lets a single unmount pass clear nested mounts
/// without tripping over still-mounted children.
pub fn targets_under(canonical: &Path) -> Result<Vec<PathBuf>> {
    let entries = read_mounts()?;
    Ok(filter_targets(&entries, canonical))
}

/// Whether `path` is currently a mount target.
pub fn is_mounted(path: &Path) -> Result<bool> {
    let entries = read_mounts()?;
    Ok(entries.iter().any(|e| e.target == path))
}

/// Read and parse the live mount table. Fails hard when `/proc/mounts` is
/// unreadable, since teardown cannot proceed blind.
pub fn read_mounts() -> Result<Vec<MountEntry>> {
    let content = fs::read_to_string("/proc/mounts")
        .map_err(|e| TeardownError::Mount(format!("cannot read /proc/mounts: {}", e)))?;
    Ok(parse_mounts(&content))
}

pub(crate) fn parse_mounts(content: &str) -> Vec<MountEntry> {
    content
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let source = fields.next()?;
            let target = fields.next()?;
            Some(MountEntry {
                source: unescape(source),
                target: PathBuf::from(unescape(target)),
            })
        })
        .collect()
}

pub(crate) fn filter_targets(entries: &[MountEntry], canonical: &Path) -> Vec<PathBuf> {
    let mut targets: Vec<PathBuf> = entries
        .iter()
        .filter(|e| e.target.starts_with(canonical))
        .map(|e| e.target.clone())
        .collect();
    targets.sort_by_key(|t| Reverse(t.as_os_str().len()));
    targets
}

/// Decode the octal escapes mount entries use for embedded whitespace
/// (`\040` space, `\011` tab, `\012` newline, `\\134` backslash).
pub(crate) fn unescape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        let mut octal = String::new();
        for _ in 0..3 {
            match chars.peek() {
                Some(&d) if ('0'..='7').contains(&d) => {
                    octal.push(d);
                    chars.next();
                }
                _ => break,
            }
        }
        match u32::from_str_radix(&octal, 8) {
            Ok(code) if octal.len() == 3 && code <= 255 => {
                result.push(code as u8 as char);
            }
            _ => {
                // not a valid escape, keep the text as-is
                result.push(c);
                result.push_str(&octal);
            }
        }
    }

    result
}
