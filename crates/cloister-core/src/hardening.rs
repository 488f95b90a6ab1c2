//! Process attribute hardening.

use cloister_common::error::{CloisterError, Result};

use crate::kernel::KernelOps;

/// Clears the dumpable flag: no core dumps, and `/proc/self` becomes owned
/// by root so other processes of the same user cannot `ptrace` this one.
///
/// # Errors
///
/// Returns [`CloisterError::PrivilegeReduction`] if `prctl` fails.
pub fn set_non_dumpable<K: KernelOps>(kernel: &K) -> Result<()> {
    kernel
        .set_dumpable(false)
        .map_err(|e| CloisterError::PrivilegeReduction {
            op: "prctl(PR_SET_DUMPABLE)".into(),
            source: e.into(),
        })?;
    tracing::debug!("process marked non-dumpable");
    Ok(())
}

/// Sets `no_new_privs`, so `execve` can never grant privileges through
/// setuid bits or file capabilities. Irreversible.
///
/// # Errors
///
/// Returns [`CloisterError::PrivilegeReduction`] if `prctl` fails.
pub fn set_no_new_privileges<K: KernelOps>(kernel: &K) -> Result<()> {
    kernel
        .set_no_new_privs()
        .map_err(|e| CloisterError::PrivilegeReduction {
            op: "prctl(PR_SET_NO_NEW_PRIVS)".into(),
            source: e.into(),
        })?;
    tracing::debug!("no_new_privs set");
    Ok(())
}
