//! unbox: teardown engine for chroot-based isolated environments
//!
//! Determines whether an environment is still in active use, unmounts its
//! bind-mounted tree, and escalates to signaling the processes holding it
//! open when unmounting stalls. Not a container runtime: no namespaces, no
//! cgroups, no images, only teardown of a pre-existing bind-mount root.
//!
//! # Architecture
//!
//! ## Kernel Primitives ([`kernel`])
//! - [`kernel::proc`]: fresh `/proc` snapshots (pid, ppid, root, cmdline,
//!   core-marker)
//! - [`kernel::mount`]: live mount table reads, unmount, slave propagation
//! - [`kernel::signal`]: graceful/forceful signal delivery
//!
//! ## Teardown Core ([`core`])
//! - [`core::usage`]: containment and exclusion rules deciding "in use"
//! - [`core::teardown`]: batched unmount passes over the mount tree
//! - [`core::escalate`]: retry budget and signal escalation state machine
//! - [`core::orchestrator`]: per-environment control flow and run summary
//!
//! ## Configuration ([`config`])
//! - [`config::types`]: shared types, error taxonomy, teardown config
//!
//! # Design Principles
//!
//! 1. **Kernel as truth** - process and mount tables are polled fresh every
//!    pass, never cached across retries
//! 2. **Gate before action** - nothing is unmounted or signaled while the
//!    usage detector reports a live claimant (absent an explicit force)
//! 3. **Idempotent passes** - unmounting an already-unmounted target is a
//!    no-op, never a batch abort
//! 4. **Monotonic escalation** - signal strength never decreases within a
//!    single teardown run
//! 5. **Per-environment failure** - one environment aborting never stops
//!    the run; failures aggregate into a single exit flag

// Kernel Primitives
pub mod kernel;

// Teardown Core
pub mod core;

// Configuration
pub mod config;

// CLI entrypoint wiring for the unbox binary.
pub mod cli;

// Re-export commonly used types for convenience
pub use config::types::*;
pub use crate::core::orchestrator::{RunSummary, TeardownOrchestrator, TeardownOutcome};
