//! Network namespace isolation.
//!
//! Leaves the process with an empty network stack: only a loopback
//! interface, which stays down.

use cloister_common::error::{CloisterError, Result};
use nix::sched::CloneFlags;

use crate::kernel::KernelOps;

/// Creates a new network namespace for the calling process.
///
/// # Errors
///
/// Returns an error if the `unshare(CLONE_NEWNET)` syscall fails.
pub fn create_network_namespace<K: KernelOps>(kernel: &K) -> Result<()> {
    kernel
        .unshare(CloneFlags::CLONE_NEWNET)
        .map_err(|e| CloisterError::Namespace {
            op: "unshare(CLONE_NEWNET)".into(),
            source: e.into(),
        })?;
    tracing::debug!("network namespace created");
    Ok(())
}
