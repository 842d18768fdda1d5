//! Environment usage detection
//!
//! Decides whether an environment path is in active use, separating
//! "process running inside the environment" from host processes that merely
//! share the path. The exclusion rules below are deliberate heuristics
//! carried over as documented behavior; see `exclusion_reason`.

use crate::config::types::INIT_PID;
use crate::kernel::proc::{ProcessRecord, ProcessSnapshot};
use std::path::Path;

/// Why a contained process is not counted as a blocker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Exclusion {
    /// Parent pid missing or init: reparented orphan, not a live claimant
    Orphan,
    /// Parent runs with a different effective root: a straggler that
    /// daemonized into the background after its launcher exited
    ParentRootMismatch,
    /// Infrastructure helper flagged by the core marker sentinel
    CoreMarked,
}

/// Whether a process's resolved root is `canonical` or a descendant of it.
pub fn contains(canonical: &Path, root: &Path) -> bool {
    root.starts_with(canonical)
}

/// Exclusion rule for one contained process, or `None` when it blocks.
pub fn exclusion_reason(
    snapshot: &ProcessSnapshot,
    record: &ProcessRecord,
) -> Option<Exclusion> {
    if record.core_marked {
        return Some(Exclusion::CoreMarked);
    }
    let ppid = match record.ppid {
        None => return Some(Exclusion::Orphan),
        Some(p) if p == INIT_PID || p <= 0 => return Some(Exclusion::Orphan),
        Some(p) => p,
    };
    match snapshot.get(ppid) {
        // parent exited between reads: same reparenting window as Orphan
        None => Some(Exclusion::Orphan),
        Some(parent) if parent.root != record.root => Some(Exclusion::ParentRootMismatch),
        Some(_) => None,
    }
}

/// Report-only listing: every process whose root falls under `canonical`,
/// with no exclusion rules applied. This is what gets printed for the
/// operator and what escalation signals.
pub fn contained<'a>(snapshot: &'a ProcessSnapshot, canonical: &Path) -> Vec<&'a ProcessRecord> {
    snapshot
        .records()
        .iter()
        .filter(|r| contains(canonical, &r.root))
        .collect()
}

/// Usage gate: blockers after exclusion rules, and the in-use verdict.
///
/// With `force` set the caller accepts the risk and the gate always passes.
pub fn is_in_use<'a>(
    snapshot: &'a ProcessSnapshot,
    canonical: &Path,
    force: bool,
) -> (bool, Vec<&'a ProcessRecord>) {
    if force {
        return (false, Vec::new());
    }
    let blockers: Vec<&ProcessRecord> = contained(snapshot, canonical)
        .into_iter()
        .filter(|r| exclusion_reason(snapshot, r).is_none())
        .collect();
    (!blockers.is_empty(), blockers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn record(pid: i32, ppid: Option<i32>, root: &str, core_marked: bool) -> ProcessRecord {
        ProcessRecord {
            pid,
            ppid,
            root: PathBuf::from(root),
            cmdline: format!("proc-{}", pid),
            core_marked,
        }
    }

    fn snap(records: Vec<ProcessRecord>) -> ProcessSnapshot {
        ProcessSnapshot::from_records(records)
    }

    #[test]
    fn test_containment_boundaries() {
        let env = Path::new("/chroots/bar");
        assert!(contains(env, Path::new("/chroots/bar")));
        assert!(contains(env, Path::new("/chroots/bar/home/user")));
        assert!(!contains(env, Path::new("/chroots/barn")));
        assert!(!contains(env, Path::new("/")));
    }

    #[test]
    fn test_no_contained_processes_not_in_use() {
        let s = snap(vec![
            record(1, None, "/", false),
            record(100, Some(1), "/", false),
        ]);
        let (in_use, blockers) = is_in_use(&s, Path::new("/chroots/foo"), false);
        assert!(!in_use);
        assert!(blockers.is_empty());
    }

    #[test]
    fn test_live_claimant_blocks() {
        // parent and child both rooted in the environment
        let s = snap(vec![
            record(10, Some(1), "/chroots/bar", false),
            record(20, Some(10), "/chroots/bar", false),
        ]);
        let (in_use, blockers) = is_in_use(&s, Path::new("/chroots/bar"), false);
        assert!(in_use);
        assert_eq!(blockers.len(), 1);
        assert_eq!(blockers[0].pid, 20);
    }

    #[test]
    fn test_orphan_excluded() {
        let s = snap(vec![record(30, Some(1), "/chroots/bar", false)]);
        let (in_use, _) = is_in_use(&s, Path::new("/chroots/bar"), false);
        assert!(!in_use);
        assert_eq!(
            exclusion_reason(&s, s.get(30).unwrap()),
            Some(Exclusion::Orphan)
        );
    }

    #[test]
    fn test_missing_parent_excluded() {
        let s = snap(vec![record(30, Some(999), "/chroots/bar", false)]);
        let (in_use, _) = is_in_use(&s, Path::new("/chroots/bar"), false);
        assert!(!in_use);
    }

    #[test]
    fn test_parent_root_mismatch_excluded() {
        // daemonized straggler: parent alive but running with host root
        let s = snap(vec![
            record(10, Some(1), "/", false),
            record(20, Some(10), "/chroots/bar", false),
        ]);
        let (in_use, _) = is_in_use(&s, Path::new("/chroots/bar"), false);
        assert!(!in_use);
        assert_eq!(
            exclusion_reason(&s, s.get(20).unwrap()),
            Some(Exclusion::ParentRootMismatch)
        );
    }

    #[test]
    fn test_core_marked_never_blocks() {
        let s = snap(vec![
            record(10, Some(1), "/chroots/bar", false),
            record(20, Some(10), "/chroots/bar", true),
        ]);
        let (in_use, blockers) = is_in_use(&s, Path::new("/chroots/bar"), false);
        assert!(!in_use);
        assert!(blockers.is_empty());
    }

    #[test]
    fn test_force_overrides_gate() {
        let s = snap(vec![
            record(10, Some(1), "/chroots/bar", false),
            record(20, Some(10), "/chroots/bar", false),
        ]);
        let (in_use, blockers) = is_in_use(&s, Path::new("/chroots/bar"), true);
        assert!(!in_use);
        assert!(blockers.is_empty());
    }

    #[test]
    fn test_report_only_listing_has_no_exclusions() {
        let s = snap(vec![
            record(30, Some(1), "/chroots/bar", false),
            record(40, Some(30), "/chroots/bar", true),
            record(50, Some(1), "/", false),
        ]);
        let listed = contained(&s, Path::new("/chroots/bar"));
        let pids: Vec<i32> = listed.iter().map(|r| r.pid).collect();
        assert_eq!(pids, vec![30, 40]);
    }
}
