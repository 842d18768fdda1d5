/// Core types and structures for the unbox teardown engine
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Sentinel environment variable marking infrastructure helper processes.
/// Processes carrying this exact `KEY=VALUE` pair never block teardown of
/// the environment they live in.
pub const CORE_MARKER: &str = "UNBOX_CORE=1";

/// Pid that orphaned processes are reparented to.
pub const INIT_PID: i32 = 1;

/// A chroot-style isolated environment on disk.
///
/// The core never creates one; by the end of a run it is either left
/// untouched (in use, error) or fully unmounted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Environment {
    /// Environment name (directory name under the environments root)
    pub name: String,
    /// Nominal path on disk
    pub path: PathBuf,
    /// Real underlying storage root when the nominal path is an overlay
    /// (resolved by the caller from the marker file, never computed here)
    pub alternate_root: Option<PathBuf>,
}

impl Environment {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            alternate_root: None,
        }
    }

    /// Path teardown actually operates on: the alternate root when one was
    /// resolved, the nominal path otherwise.
    pub fn teardown_path(&self) -> &PathBuf {
        self.alternate_root.as_ref().unwrap_or(&self.path)
    }
}

/// Termination signal strength, weak to strong.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum SignalStrength {
    /// Graceful termination (SIGTERM)
    #[serde(rename = "term")]
    Term,
    /// Forceful kill (SIGKILL)
    #[serde(rename = "kill")]
    Kill,
}

/// Consecutive-failure budget before escalation is considered.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum RetryBudget {
    /// Ask (or apply policy) after this many failed unmount passes
    Limited(u32),
    /// Never escalate, keep retrying until the tree clears
    Patient,
}

impl Default for RetryBudget {
    fn default() -> Self {
        RetryBudget::Limited(5)
    }
}

/// Teardown configuration shared by every environment in a run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TeardownConfig {
    /// Directory containing the environments
    pub envs_root: PathBuf,
    /// Accept the risk and skip the usage gate
    pub force: bool,
    /// Consecutive failed passes before a decision point
    pub retry_budget: RetryBudget,
    /// Pause between unmount passes, in milliseconds
    pub pause_ms: u64,
    /// Shared host-media bind point name inside each environment
    pub media_dir: String,
    /// Shared restricted-path override released after the run, if unused
    pub shared_root: Option<PathBuf>,
}

impl Default for TeardownConfig {
    fn default() -> Self {
        Self {
            envs_root: PathBuf::from("/var/lib/unbox"),
            force: false,
            retry_budget: RetryBudget::default(),
            pause_ms: 1000,
            media_dir: "media".to_string(),
            shared_root: None,
        }
    }
}

/// Why a teardown run for one environment gave up.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum AbortReason {
    /// A new claimant appeared mid-teardown
    #[serde(rename = "race_detected")]
    RaceDetected,
    /// Operator declined at a confirmation point
    #[serde(rename = "user_declined")]
    UserDeclined,
    /// Budget exhausted with no interactive confirmation and no
    /// auto-escalate policy
    #[serde(rename = "budget_exhausted")]
    BudgetExhausted,
}

/// Custom error types for unbox
#[derive(Error, Debug)]
pub enum TeardownError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Process scan error: {0}")]
    Scan(String),

    #[error("Mount error: {0}")]
    Mount(String),
}

impl From<nix::errno::Errno> for TeardownError {
    fn from(err: nix::errno::Errno) -> Self {
        TeardownError::Mount(err.to_string())
    }
}

/// Result type alias for unbox operations
pub type Result<T> = std::result::Result<T, TeardownError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_teardown_path_prefers_alternate_root() {
        let mut env = Environment::new("foo", "/var/lib/unbox/foo");
        assert_eq!(env.teardown_path(), &PathBuf::from("/var/lib/unbox/foo"));

        env.alternate_root = Some(PathBuf::from("/mnt/storage/foo"));
        assert_eq!(env.teardown_path(), &PathBuf::from("/mnt/storage/foo"));
    }

    #[test]
    fn test_signal_strength_ordering() {
        assert!(SignalStrength::Term < SignalStrength::Kill);
    }

    #[test]
    fn test_default_budget_is_limited() {
        assert_eq!(RetryBudget::default(), RetryBudget::Limited(5));
    }
}
