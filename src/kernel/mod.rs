//! Thin wrappers over the Linux primitives teardown depends on
//!
//! Each submodule is a leaf: no dependencies on the core engine, kernel
//! state read fresh on every call.

pub mod mount;
pub mod proc;
pub mod signal;
