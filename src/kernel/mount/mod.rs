//! Mount table reads and unmount/propagation primitives
//!
//! The table side is read-only and polled; the detach side performs the
//! actual unmount and propagation changes.

pub mod detach;
pub mod table;

pub use detach::{detach, guard_shared_bind, make_slave, DetachOutcome};
pub use table::{is_mounted, read_mounts, targets_under, MountEntry};
