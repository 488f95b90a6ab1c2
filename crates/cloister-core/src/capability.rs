//! Linux capability removal.
//!
//! Inside the new user namespace the process holds a full capability set.
//! Everything is dropped: the bounding set first, so nothing can be regained
//! across `execve`, then the effective, permitted and inheritable sets, then
//! the ambient set.

use cloister_common::error::{CloisterError, Result};
use nix::errno::Errno;

use crate::kernel::KernelOps;

/// Upper bound on the bounding-set walk. The kernel currently knows about 41
/// capabilities; the walk normally ends much earlier on `EINVAL`.
const MAX_CAPABILITY: u32 = 63;

/// Drops every capability the process holds.
///
/// # Errors
///
/// Returns [`CloisterError::PrivilegeReduction`] if any of the three steps
/// fails. `EINVAL` from the bounding-set walk marks its end and is not an
/// error; neither is `EINVAL` from the ambient clear on kernels without
/// ambient capabilities.
pub fn drop_all_capabilities<K: KernelOps>(kernel: &K) -> Result<()> {
    let dropped = drop_bounding_set(kernel)?;

    kernel
        .clear_capabilities()
        .map_err(|e| privilege_error("capset", e))?;

    match kernel.clear_ambient_capabilities() {
        Ok(()) | Err(Errno::EINVAL) => {}
        Err(e) => return Err(privilege_error("prctl(PR_CAP_AMBIENT)", e)),
    }

    tracing::info!(bounding = dropped, "capabilities dropped");
    Ok(())
}

/// Walks the bounding set from 0 until the kernel reports `EINVAL`.
/// Returns how many capabilities were dropped.
fn drop_bounding_set<K: KernelOps>(kernel: &K) -> Result<u32> {
    for cap in 0..=MAX_CAPABILITY {
        match kernel.drop_bounding_cap(cap) {
            Ok(()) => {}
            Err(Errno::EINVAL) => return Ok(cap),
            Err(e) => return Err(privilege_error("prctl(PR_CAPBSET_DROP)", e)),
        }
    }
    Ok(MAX_CAPABILITY + 1)
}

fn privilege_error(op: &str, errno: Errno) -> CloisterError {
    CloisterError::PrivilegeReduction {
        op: op.to_string(),
        source: errno.into(),
    }
}
