//! Kernel operations used by the enforcement pipeline.
//!
//! Every syscall the pipeline issues goes through [`KernelOps`], so the
//! ordering logic can be exercised against a recording fake while
//! [`LinuxKernel`] talks to the real kernel.

#[cfg(any(test, feature = "test-util"))]
pub mod fake;
pub mod linux;

use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::mount::MsFlags;
use nix::sched::CloneFlags;

use crate::seccomp::BpfProgram;

pub use linux::LinuxKernel;

/// Result of a single kernel operation.
pub type KernelResult<T> = std::result::Result<T, Errno>;

/// The kernel surface touched while applying a policy.
///
/// Methods map one-to-one onto syscalls (or `/proc` writes) and carry no
/// policy logic; sequencing lives in the callers.
pub trait KernelOps {
    /// `unshare(2)` with `flags`.
    ///
    /// # Errors
    ///
    /// Returns the errno reported by the kernel.
    fn unshare(&self, flags: CloneFlags) -> KernelResult<()>;

    /// Real UID and GID of the calling process.
    fn current_ids(&self) -> (u32, u32);

    /// Writes `contents` to a `/proc` control file in a single `write(2)`.
    ///
    /// # Errors
    ///
    /// Returns the errno of the failed open or write.
    fn write_proc_file(&self, path: &Path, contents: &str) -> KernelResult<()>;

    /// Marks every mount under `/` private so nothing propagates out.
    ///
    /// # Errors
    ///
    /// Returns the errno reported by `mount(2)`.
    fn make_mounts_private(&self) -> KernelResult<()>;

    /// `mkdir(2)`; `EEXIST` is reported like any other error.
    ///
    /// # Errors
    ///
    /// Returns the errno reported by the kernel.
    fn mkdir(&self, path: &Path, mode: u32) -> KernelResult<()>;

    /// Owner UID of `path`, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns the errno of a failed `lstat(2)` other than `ENOENT`.
    fn path_owner(&self, path: &Path) -> KernelResult<Option<u32>>;

    /// Recursive bind mount of `source` onto `target`.
    ///
    /// # Errors
    ///
    /// Returns the errno reported by `mount(2)`.
    fn bind_mount(&self, source: &Path, target: &Path) -> KernelResult<()>;

    /// Per-mount flags of the filesystem holding `path` that a bind remount
    /// must keep (`nosuid`, `nodev`, `noexec`, atime flags).
    ///
    /// # Errors
    ///
    /// Returns the errno reported by `statvfs(2)`.
    fn mount_flags(&self, path: &Path) -> KernelResult<MsFlags>;

    /// Remounts the bind mount at `target` with `flags`.
    ///
    /// # Errors
    ///
    /// Returns the errno reported by `mount(2)`.
    fn remount_bind(&self, target: &Path, flags: MsFlags) -> KernelResult<()>;

    /// Marks the mount at `target` and every mount below it read-only with
    /// `mount_setattr(2)` and `AT_RECURSIVE`.
    ///
    /// # Errors
    ///
    /// Returns the errno reported by the kernel; `ENOSYS` before Linux 5.12.
    fn set_readonly_recursive(&self, target: &Path) -> KernelResult<()>;

    /// Mount points at or below `target`, parents before children, as
    /// listed in `/proc/self/mountinfo`.
    ///
    /// # Errors
    ///
    /// Returns the errno of a failed read of `/proc/self/mountinfo`.
    fn submounts(&self, target: &Path) -> KernelResult<Vec<PathBuf>>;

    /// `chroot(2)`.
    ///
    /// # Errors
    ///
    /// Returns the errno reported by the kernel.
    fn chroot(&self, path: &Path) -> KernelResult<()>;

    /// `chdir(2)`.
    ///
    /// # Errors
    ///
    /// Returns the errno reported by the kernel.
    fn chdir(&self, path: &Path) -> KernelResult<()>;

    /// Removes `cap` from the bounding set. `EINVAL` means `cap` is past the
    /// last capability the kernel knows about.
    ///
    /// # Errors
    ///
    /// Returns the errno reported by `prctl(PR_CAPBSET_DROP)`.
    fn drop_bounding_cap(&self, cap: u32) -> KernelResult<()>;

    /// Clears the effective, permitted and inheritable sets in one `capset(2)`.
    ///
    /// # Errors
    ///
    /// Returns the errno reported by the kernel.
    fn clear_capabilities(&self) -> KernelResult<()>;

    /// Clears the ambient capability set.
    ///
    /// # Errors
    ///
    /// Returns the errno reported by `prctl(PR_CAP_AMBIENT)`.
    fn clear_ambient_capabilities(&self) -> KernelResult<()>;

    /// `prctl(PR_SET_DUMPABLE)`.
    ///
    /// # Errors
    ///
    /// Returns the errno reported by the kernel.
    fn set_dumpable(&self, dumpable: bool) -> KernelResult<()>;

    /// `prctl(PR_SET_NO_NEW_PRIVS, 1)`.
    ///
    /// # Errors
    ///
    /// Returns the errno reported by the kernel.
    fn set_no_new_privs(&self) -> KernelResult<()>;

    /// `prctl(PR_SET_SECCOMP, SECCOMP_MODE_FILTER)` with `program`.
    ///
    /// # Errors
    ///
    /// Returns the errno reported by the kernel.
    fn install_filter(&self, program: &BpfProgram) -> KernelResult<()>;
}
