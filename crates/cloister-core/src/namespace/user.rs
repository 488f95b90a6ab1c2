//! User namespace isolation.
//!
//! Maps the caller's host UID/GID to root inside a new user namespace,
//! enabling mounts and `chroot` without host privileges.

use std::path::Path;

use cloister_common::constants::{PROC_GID_MAP, PROC_SETGROUPS, PROC_UID_MAP};
use cloister_common::error::{CloisterError, Result};
use nix::sched::CloneFlags;

use crate::kernel::KernelOps;

/// Creates a new user namespace for the calling process.
///
/// The calling process gains full privileges within the new namespace,
/// regardless of its privileges in the parent namespace.
///
/// # Errors
///
/// Returns an error if the `unshare(CLONE_NEWUSER)` syscall fails.
pub fn create_user_namespace<K: KernelOps>(kernel: &K) -> Result<()> {
    kernel
        .unshare(CloneFlags::CLONE_NEWUSER)
        .map_err(|e| CloisterError::Namespace {
            op: "unshare(CLONE_NEWUSER)".into(),
            source: e.into(),
        })?;
    tracing::debug!("user namespace created");
    Ok(())
}

/// Writes single-entry identity maps sending `uid`/`gid` to 0.
///
/// `setgroups` is denied first; the kernel refuses an unprivileged
/// `gid_map` write while `setgroups(2)` is still permitted.
///
/// # Errors
///
/// Returns an error if writing `/proc/self/setgroups`, `/proc/self/uid_map`
/// or `/proc/self/gid_map` fails.
pub fn write_id_maps<K: KernelOps>(kernel: &K, uid: u32, gid: u32) -> Result<()> {
    write_control(kernel, PROC_SETGROUPS, "deny")?;
    write_control(kernel, PROC_UID_MAP, &format!("0 {uid} 1"))?;
    write_control(kernel, PROC_GID_MAP, &format!("0 {gid} 1"))?;
    tracing::debug!(uid, gid, "wrote UID/GID map");
    Ok(())
}

fn write_control<K: KernelOps>(kernel: &K, path: &str, contents: &str) -> Result<()> {
    kernel
        .write_proc_file(Path::new(path), contents)
        .map_err(|e| CloisterError::Namespace {
            op: format!("write {path}"),
            source: e.into(),
        })
}
