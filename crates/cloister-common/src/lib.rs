//! # cloister-common
//!
//! Shared types, error definitions, configuration models, and constants
//! used across the entire Cloister workspace.
//!
//! This crate is the leaf of the dependency graph: it depends on no other
//! internal crate and holds the declarative [`SandboxPolicy`](types::SandboxPolicy)
//! that the enforcement pipeline in `cloister-core` consumes.

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
