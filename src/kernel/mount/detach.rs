//! Unmount and mount-propagation primitives

use crate::config::types::Result;
use log::{debug, info, warn};
use nix::errno::Errno;
use nix::mount::{mount, umount, MsFlags};
use std::path::Path;

/// Outcome of one unmount attempt on one target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetachOutcome {
    /// Target detached
    Detached,
    /// Target was not mounted (already gone)
    AlreadyGone,
    /// Target still held (busy or permission denied)
    StillHeld,
}

/// Try to detach one mount target.
///
/// EINVAL and ENOENT mean the target is no longer a mount point, which is
/// the desired end state; they never abort a batch.
pub fn detach(target: &Path) -> DetachOutcome {
    match umount(target) {
        Ok(()) => {
            debug!("unmounted {}", target.display());
            DetachOutcome::Detached
        }
        Err(Errno::EINVAL) | Err(Errno::ENOENT) => {
            debug!("already unmounted: {}", target.display());
            DetachOutcome::AlreadyGone
        }
        Err(e) => {
            debug!("unmount failed for {}: {}", target.display(), e);
            DetachOutcome::StillHeld
        }
    }
}

/// Mark a mount point's propagation as slave, recursively.
///
/// Unmount events inside this view then stop propagating to the host-wide
/// mount it was bound from. Idempotent; only called for currently mounted
/// bind points.
pub fn make_slave(target: &Path) -> Result<()> {
    mount(
        None::<&str>,
        target,
        None::<&str>,
        MsFlags::MS_SLAVE | MsFlags::MS_REC,
        None::<&str>,
    )?;
    info!("reclassified {} to slave propagation", target.display());
    Ok(())
}

/// Slave-guard a shared bind point if and only if it is currently mounted.
///
/// Runs once per teardown attempt; a guard failure is reported but does not
/// stop the attempt, the unmount pass will surface the real problem.
pub fn guard_shared_bind(target: &Path) -> Result<bool> {
    if !super::table::is_mounted(target)? {
        debug!("shared bind not mounted, no guard needed: {}", target.display());
        return Ok(false);
    }
    match make_slave(target) {
        Ok(()) => Ok(true),
        Err(e) => {
            warn!("slave guard failed for {}: {}", target.display(), e);
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_detach_unmounted_path_is_noop() {
        // A plain directory is not a mount point; umount returns EINVAL
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(detach(dir.path()), DetachOutcome::AlreadyGone);
    }

    #[test]
    fn test_detach_missing_path_is_noop() {
        let path = PathBuf::from("/nonexistent/unbox/mount/point");
        assert_eq!(detach(&path), DetachOutcome::AlreadyGone);
    }

    #[test]
    fn test_guard_skips_unmounted_bind() {
        let dir = tempfile::tempdir().unwrap();
        // Not a mount point, so the guard must decline to touch it
        assert!(!guard_shared_bind(dir.path()).unwrap());
    }
}
