//! # cloister-sdk
//!
//! Public SDK for sandboxing the current process with Cloister.
//!
//! Build a policy with [`PolicyBuilder`](builder::PolicyBuilder), then apply
//! it once, early, before the process starts threads. If applying fails for
//! any reason other than an invalid policy, the process is partially
//! confined and must exit.
//!
//! # Example
//!
//! ```rust,no_run
//! use cloister_sdk::builder::PolicyBuilder;
//!
//! let result = PolicyBuilder::new()
//!     .jail_root("/tmp/sbx")
//!     .readonly_mount("/usr")
//!     .writable_mount("/tmp/work")
//!     .working_directory("/tmp/work")
//!     .deny_syscalls([libc_ptrace_number()])
//!     .apply();
//! if result.is_err() {
//!     std::process::exit(1);
//! }
//! # fn libc_ptrace_number() -> i64 { 101 }
//! ```

pub mod builder;

pub use builder::PolicyBuilder;
pub use cloister_common::config::RuntimeConfig;
pub use cloister_common::error::{CloisterError, Result};
pub use cloister_common::types::{NamespaceOptions, SandboxPolicy, Stage, SyscallPolicy};
pub use cloister_core::{Enforcer, ErrorSink, StderrSink, TracingSink, apply};
