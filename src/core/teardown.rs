//! Mount teardown passes
//!
//! One pass attempts every target currently under the canonical path and
//! reports what remains. A pass never aborts on a busy target; the caller
//! retries until the tree is clear or the retry budget runs out.

use crate::config::types::Result;
use crate::kernel::mount;
use log::debug;
use std::path::{Path, PathBuf};

/// Result of one unmount pass.
#[derive(Clone, Debug)]
pub struct PassResult {
    /// Targets attempted this pass
    pub attempted: usize,
    /// Targets still in the mount table after the pass
    pub remaining: Vec<PathBuf>,
}

impl PassResult {
    pub fn cleared(&self) -> bool {
        self.remaining.is_empty()
    }
}

/// Run one unmount pass over everything mounted under `canonical`.
///
/// Targets come back deepest-first from the table, so nested mounts are
/// attempted before their parents. Individual failures are tolerated; the
/// table is re-queried afterward for ground truth rather than trusting the
/// per-target return codes.
pub fn unmount_pass(canonical: &Path) -> Result<PassResult> {
    let targets = mount::targets_under(canonical)?;
    if targets.is_empty() {
        return Ok(PassResult {
            attempted: 0,
            remaining: Vec::new(),
        });
    }

    debug!(
        "unmount pass: {} target(s) under {}",
        targets.len(),
        canonical.display()
    );
    for target in &targets {
        mount::detach(target);
    }

    let remaining = mount::targets_under(canonical)?;
    Ok(PassResult {
        attempted: targets.len(),
        remaining,
    })
}
