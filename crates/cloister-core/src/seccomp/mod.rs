//! Seccomp syscall filtering.
//!
//! Compiles an allow-list or deny-list of syscall numbers into a classic BPF
//! program and installs it on the calling thread. Installation is permanent:
//! the kernel only lets later filters narrow what is allowed, so it runs as
//! the very last step of enforcement.

pub mod bpf;

use cloister_common::error::{CloisterError, Result};
use cloister_common::types::SyscallPolicy;

use crate::kernel::KernelOps;

pub use bpf::{BpfProgram, FilterAction, SockFilter};

/// Compiles the filter for `policy`, or `None` when no filter is requested.
///
/// Allow-lists return ALLOW per listed syscall and kill the process
/// otherwise; deny-lists do the opposite. Empty lists install nothing.
///
/// # Errors
///
/// Returns [`CloisterError::Filter`] if the program would not fit in
/// `max_instructions`.
pub fn compile_policy(
    policy: &SyscallPolicy,
    max_instructions: usize,
) -> Result<Option<BpfProgram>> {
    if !policy.is_active() {
        return Ok(None);
    }
    let (per_syscall, default) = match policy {
        SyscallPolicy::Allowlist(_) => (FilterAction::Allow, FilterAction::KillProcess),
        SyscallPolicy::Denylist(_) => (FilterAction::KillProcess, FilterAction::Allow),
        SyscallPolicy::None => return Ok(None),
    };
    BpfProgram::compile(policy.syscalls(), per_syscall, default, max_instructions).map(Some)
}

/// Installs `program` on the calling thread.
///
/// Without `no_new_privs` set, the kernel requires `CAP_SYS_ADMIN` here.
///
/// # Errors
///
/// Returns [`CloisterError::FilterInstall`] if the kernel rejects the program.
pub fn install<K: KernelOps>(kernel: &K, program: &BpfProgram) -> Result<()> {
    kernel
        .install_filter(program)
        .map_err(|e| CloisterError::FilterInstall { source: e.into() })?;
    tracing::info!(instructions = program.len(), "seccomp filter installed");
    Ok(())
}
