//! # cloister-core
//!
//! Confines the calling process using Linux isolation primitives:
//! - **Namespaces**: user (with UID/GID mapped to root), mount, and
//!   optionally network.
//! - **Filesystem jail**: bind mounts of selected host paths under a private
//!   root, followed by `chroot`.
//! - **Capabilities**: the bounding, effective, permitted, inheritable and
//!   ambient sets are cleared.
//! - **Seccomp**: a classic BPF filter over syscall numbers.
//!
//! [`Enforcer`] runs these in the only safe order. Every syscall goes
//! through [`kernel::KernelOps`]; the unsafe calls live in
//! [`kernel::linux`] with `// SAFETY:` notes.

#[cfg(not(target_os = "linux"))]
compile_error!("cloister-core only supports Linux");

pub mod capability;
pub mod enforcer;
pub mod filesystem;
pub mod hardening;
pub mod kernel;
pub mod namespace;
pub mod seccomp;
pub mod sink;

pub use enforcer::{Enforcer, apply};
pub use kernel::{KernelOps, LinuxKernel};
pub use sink::{ErrorSink, StderrSink, TracingSink};
