//! Teardown engine core.
//!
//! Core owns usage detection, unmount passes, the escalation state
//! machine, and per-environment orchestration. Kernel access lives in
//! [`crate::kernel`]; interactive I/O lives behind the
//! [`escalate::DecisionProvider`] capability.

pub mod escalate;
pub mod orchestrator;
pub mod teardown;
pub mod usage;
