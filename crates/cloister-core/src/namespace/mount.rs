//! Mount namespace isolation.
//!
//! Gives the process its own mount table so the jail's bind mounts never
//! show up on the host.

use cloister_common::error::{CloisterError, Result};
use nix::sched::CloneFlags;

use crate::kernel::KernelOps;

/// Creates a new mount namespace and makes every mount in it private.
///
/// Must run after the user namespace is set up: the unshare needs
/// `CAP_SYS_ADMIN` in the owning user namespace.
///
/// # Errors
///
/// Returns an error if `unshare(CLONE_NEWNS)` or the private remount fails.
pub fn create_mount_namespace<K: KernelOps>(kernel: &K) -> Result<()> {
    kernel
        .unshare(CloneFlags::CLONE_NEWNS)
        .map_err(|e| CloisterError::Namespace {
            op: "unshare(CLONE_NEWNS)".into(),
            source: e.into(),
        })?;
    kernel
        .make_mounts_private()
        .map_err(|e| CloisterError::Namespace {
            op: "mount(/, MS_REC | MS_PRIVATE)".into(),
            source: e.into(),
        })?;
    tracing::debug!("mount namespace created");
    Ok(())
}
