//! Bind mounts of host paths into the jail.

use std::path::{Path, PathBuf};

use cloister_common::error::{CloisterError, Result};
use nix::errno::Errno;
use nix::mount::MsFlags;

use super::directory::ensure_directory_path;
use crate::kernel::KernelOps;

/// Location of host path `source` inside `jail_root`.
///
/// `source` is taken relative to `/`, so `/usr/lib` under `/tmp/sbx` lands
/// at `/tmp/sbx/usr/lib`.
pub fn jail_destination(jail_root: &Path, source: &Path) -> PathBuf {
    jail_root.join(source.strip_prefix("/").unwrap_or(source))
}

/// Bind-mounts each of `paths` to the same relative location under
/// `jail_root`, in list order.
///
/// Mount points are created with `mode`. Read-only entries are bind-mounted
/// and then made read-only, because the kernel ignores `MS_RDONLY` on the
/// initial bind. The bind is recursive, so the read-only step covers every
/// mount below the entry as well; see [`make_readonly`].
///
/// Stops at the first failure. Mounts made before it stay in place.
///
/// # Errors
///
/// Returns [`CloisterError::Jail`] naming the failed operation and path.
pub fn bind_mount_paths<K: KernelOps>(
    kernel: &K,
    jail_root: &Path,
    paths: &[PathBuf],
    read_only: bool,
    mode: u32,
) -> Result<()> {
    for source in paths {
        let target = jail_destination(jail_root, source);
        ensure_directory_path(kernel, &target, mode)?;

        kernel
            .bind_mount(source, &target)
            .map_err(|e| jail_error("bind mount", &target, e))?;

        if read_only {
            make_readonly(kernel, &target)?;
        }

        tracing::info!(
            source = %source.display(),
            target = %target.display(),
            read_only,
            "bind mounted into jail"
        );
    }
    Ok(())
}

/// Makes the bind mount at `target` and all of its submounts read-only.
///
/// Uses a single recursive `mount_setattr(2)`. Kernels older than 5.12
/// lack it; there each mount below `target` is bind-remounted `MS_RDONLY`
/// in turn, keeping its own locked flags, since `MS_REC` has no effect on
/// a remount.
///
/// # Errors
///
/// Returns [`CloisterError::Jail`] if any mount cannot be made read-only.
pub fn make_readonly<K: KernelOps>(kernel: &K, target: &Path) -> Result<()> {
    match kernel.set_readonly_recursive(target) {
        Ok(()) => return Ok(()),
        Err(Errno::ENOSYS) => {}
        Err(e) => return Err(jail_error("mount_setattr", target, e)),
    }

    let mounts = kernel
        .submounts(target)
        .map_err(|e| jail_error("read mountinfo", target, e))?;
    for mount in &mounts {
        let locked = kernel
            .mount_flags(mount)
            .map_err(|e| jail_error("statvfs", mount, e))?;
        kernel
            .remount_bind(mount, locked | MsFlags::MS_RDONLY)
            .map_err(|e| jail_error("read-only remount", mount, e))?;
    }
    tracing::debug!(path = %target.display(), mounts = mounts.len(), "read-only by remount");
    Ok(())
}

fn jail_error(op: &str, path: &Path, errno: Errno) -> CloisterError {
    CloisterError::Jail {
        op: op.to_string(),
        path: path.to_path_buf(),
        source: errno.into(),
    }
}
