//! Process table scanning
//!
//! Every scan is a fresh snapshot of `/proc`. Per-pid reads race with
//! process exit and with permission boundaries; entries that cannot be
//! fully resolved are skipped silently, since a partially visible process
//! table is the normal state of the world, not an error.

use crate::config::types::{Result, TeardownError, CORE_MARKER};
use log::debug;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// One process as seen at scan time. Ephemeral, re-read on every scan.
#[derive(Clone, Debug)]
pub struct ProcessRecord {
    pub pid: i32,
    /// Parent pid; `None` when the stat line could not be parsed
    pub ppid: Option<i32>,
    /// Resolved root-namespace path (`/proc/<pid>/root`)
    pub root: PathBuf,
    /// Command line with NUL separators flattened to spaces
    pub cmdline: String,
    /// Set when the process environment carries the core marker sentinel
    pub core_marked: bool,
}

/// A single snapshot of the process table, indexed for parent lookups.
#[derive(Clone, Debug, Default)]
pub struct ProcessSnapshot {
    records: Vec<ProcessRecord>,
    by_pid: HashMap<i32, usize>,
}

impl ProcessSnapshot {
    pub fn from_records(records: Vec<ProcessRecord>) -> Self {
        let by_pid = records
            .iter()
            .enumerate()
            .map(|(idx, r)| (r.pid, idx))
            .collect();
        Self { records, by_pid }
    }

    pub fn records(&self) -> &[ProcessRecord] {
        &self.records
    }

    pub fn get(&self, pid: i32) -> Option<&ProcessRecord> {
        self.by_pid.get(&pid).map(|&idx| &self.records[idx])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Take a fresh snapshot of all processes visible to the caller.
///
/// Fails hard only when `/proc` itself cannot be enumerated; no teardown
/// decision can be trusted without process data.
pub fn snapshot() -> Result<ProcessSnapshot> {
    snapshot_from(Path::new("/proc"))
}

/// Snapshot implementation parameterized on the proc root, for tests.
pub(crate) fn snapshot_from(proc_root: &Path) -> Result<ProcessSnapshot> {
    let entries = fs::read_dir(proc_root).map_err(|e| {
        TeardownError::Scan(format!(
            "cannot enumerate {}: {}",
            proc_root.display(),
            e
        ))
    })?;

    let mut records = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(pid) = name.to_str().and_then(|s| s.parse::<i32>().ok()) else {
            continue;
        };
        match read_record(&entry.path(), pid) {
            Some(record) => records.push(record),
            None => debug!("skipping pid {} (exited or not readable)", pid),
        }
    }

    Ok(ProcessSnapshot::from_records(records))
}

/// Resolve one `/proc/<pid>` entry. `None` means the process exited
/// mid-scan or is not readable by the caller.
fn read_record(pid_dir: &Path, pid: i32) -> Option<ProcessRecord> {
    let root = fs::read_link(pid_dir.join("root")).ok()?;

    let stat = fs::read_to_string(pid_dir.join("stat")).ok()?;
    let ppid = parse_ppid(&stat);

    let cmdline_raw = fs::read(pid_dir.join("cmdline")).ok()?;
    let cmdline = flatten_nul(&cmdline_raw);

    // environ is root-readable only for foreign processes; an unreadable
    // environ simply means the marker cannot be present for us
    let core_marked = fs::read(pid_dir.join("environ"))
        .map(|environ| has_core_marker(&environ))
        .unwrap_or(false);

    Some(ProcessRecord {
        pid,
        ppid,
        root,
        cmdline,
        core_marked,
    })
}

/// Extract the ppid from a `/proc/<pid>/stat` line.
///
/// The comm field is parenthesized and may itself contain spaces or
/// parentheses, so parsing starts after the last `)`.
pub(crate) fn parse_ppid(stat: &str) -> Option<i32> {
    let after_comm = &stat[stat.rfind(')')? + 1..];
    // fields after comm: state ppid pgrp ...
    after_comm.split_whitespace().nth(1)?.parse().ok()
}

pub(crate) fn flatten_nul(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches('\0')
        .replace('\0', " ")
}

pub(crate) fn has_core_marker(environ: &[u8]) -> bool {
    environ
        .split(|&b| b == 0)
        .any(|entry| entry == CORE_MARKER.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ppid_simple() {
        let stat = "1234 (bash) S 987 1234 1234 0 -1 4194304";
        assert_eq!(parse_ppid(stat), Some(987));
    }

    #[test]
    fn test_parse_ppid_comm_with_spaces_and_parens() {
        let stat = "42 (tmux: server) (x) S 7 42 42 0 -1";
        assert_eq!(parse_ppid(stat), Some(7));
    }

    #[test]
    fn test_parse_ppid_malformed() {
        assert_eq!(parse_ppid("garbage"), None);
        assert_eq!(parse_ppid("1 (a S"), None);
    }

    #[test]
    fn test_flatten_nul_cmdline() {
        assert_eq!(flatten_nul(b"ls\0-la\0/tmp\0"), "ls -la /tmp");
        assert_eq!(flatten_nul(b""), "");
    }

    #[test]
    fn test_core_marker_detection() {
        assert!(has_core_marker(b"PATH=/bin\0UNBOX_CORE=1\0HOME=/\0"));
        assert!(!has_core_marker(b"PATH=/bin\0UNBOX_CORE=0\0"));
        assert!(!has_core_marker(b"UNBOX_CORE=12\0"));
        assert!(!has_core_marker(b""));
    }

    #[test]
    fn test_snapshot_contains_self() {
        let snap = snapshot().expect("/proc must be enumerable");
        let me = std::process::id() as i32;
        let record = snap.get(me).expect("own pid visible in snapshot");
        assert_eq!(record.pid, me);
        // test runner is not chrooted
        assert_eq!(record.root, PathBuf::from("/"));
        assert!(record.ppid.is_some());
    }

    #[test]
    fn test_snapshot_fails_on_missing_proc_root() {
        let err = snapshot_from(Path::new("/nonexistent-proc-root"));
        assert!(err.is_err());
    }
}
