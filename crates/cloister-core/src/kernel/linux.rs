//! [`KernelOps`] backed by real Linux syscalls.

#![allow(unsafe_code)]

use std::ffi::OsString;
use std::io;
use std::os::unix::ffi::OsStringExt;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use nix::NixPath;
use nix::errno::Errno;
use nix::mount::{MsFlags, mount};
use nix::sched::{CloneFlags, unshare};
use nix::sys::prctl;
use nix::sys::stat::Mode;
use nix::sys::statvfs::{FsFlags, statvfs};

use super::{KernelOps, KernelResult};
use crate::seccomp::BpfProgram;

const LINUX_CAPABILITY_VERSION_3: u32 = 0x2008_0522;
const SECCOMP_MODE_FILTER: libc::c_ulong = 2;
const AT_RECURSIVE: libc::c_uint = 0x8000;
const MOUNT_ATTR_RDONLY: u64 = 0x1;
const PROC_MOUNTINFO: &str = "/proc/self/mountinfo";

/// `struct mount_attr`
#[repr(C)]
#[derive(Default)]
struct MountAttr {
    attr_set: u64,
    attr_clr: u64,
    propagation: u64,
    userns_fd: u64,
}

/// `struct __user_cap_header_struct`
#[repr(C)]
struct CapUserHeader {
    version: u32,
    pid: i32,
}

/// `struct __user_cap_data_struct`
#[repr(C)]
#[derive(Clone, Copy, Default)]
struct CapUserData {
    effective: u32,
    permitted: u32,
    inheritable: u32,
}

/// Flags a bind remount must carry over from the source mount. The kernel
/// refuses to clear them from inside a user namespace.
const LOCKED_FLAGS: [(FsFlags, MsFlags); 6] = [
    (FsFlags::ST_NOSUID, MsFlags::MS_NOSUID),
    (FsFlags::ST_NODEV, MsFlags::MS_NODEV),
    (FsFlags::ST_NOEXEC, MsFlags::MS_NOEXEC),
    (FsFlags::ST_NOATIME, MsFlags::MS_NOATIME),
    (FsFlags::ST_NODIRATIME, MsFlags::MS_NODIRATIME),
    (FsFlags::ST_RELATIME, MsFlags::MS_RELATIME),
];

fn io_errno(err: &io::Error) -> Errno {
    err.raw_os_error().map_or(Errno::EIO, Errno::from_raw)
}

/// The host kernel.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinuxKernel;

impl LinuxKernel {
    /// Creates a handle to the host kernel.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl KernelOps for LinuxKernel {
    fn unshare(&self, flags: CloneFlags) -> KernelResult<()> {
        tracing::debug!(?flags, "unshare");
        unshare(flags)
    }

    fn current_ids(&self) -> (u32, u32) {
        (
            nix::unistd::getuid().as_raw(),
            nix::unistd::getgid().as_raw(),
        )
    }

    fn write_proc_file(&self, path: &Path, contents: &str) -> KernelResult<()> {
        tracing::debug!(path = %path.display(), contents, "write proc file");
        std::fs::write(path, contents).map_err(|e| io_errno(&e))
    }

    fn make_mounts_private(&self) -> KernelResult<()> {
        tracing::debug!("remount / recursively private");
        mount(
            None::<&str>,
            "/",
            None::<&str>,
            MsFlags::MS_REC | MsFlags::MS_PRIVATE,
            None::<&str>,
        )
    }

    fn mkdir(&self, path: &Path, mode: u32) -> KernelResult<()> {
        nix::unistd::mkdir(path, Mode::from_bits_truncate(mode))
    }

    fn path_owner(&self, path: &Path) -> KernelResult<Option<u32>> {
        match std::fs::symlink_metadata(path) {
            Ok(meta) => Ok(Some(meta.uid())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_errno(&e)),
        }
    }

    fn bind_mount(&self, source: &Path, target: &Path) -> KernelResult<()> {
        tracing::debug!(source = %source.display(), target = %target.display(), "bind mount");
        mount(
            Some(source),
            target,
            None::<&str>,
            MsFlags::MS_BIND | MsFlags::MS_REC,
            None::<&str>,
        )
    }

    fn mount_flags(&self, path: &Path) -> KernelResult<MsFlags> {
        let fs_flags = statvfs(path)?.flags();
        Ok(LOCKED_FLAGS
            .iter()
            .filter(|(st, _)| fs_flags.contains(*st))
            .fold(MsFlags::empty(), |acc, (_, ms)| acc | *ms))
    }

    fn remount_bind(&self, target: &Path, flags: MsFlags) -> KernelResult<()> {
        tracing::debug!(target = %target.display(), ?flags, "bind remount");
        mount(
            None::<&str>,
            target,
            None::<&str>,
            MsFlags::MS_BIND | MsFlags::MS_REMOUNT | flags,
            None::<&str>,
        )
    }

    fn set_readonly_recursive(&self, target: &Path) -> KernelResult<()> {
        tracing::debug!(target = %target.display(), "recursive read-only");
        let attr = MountAttr {
            attr_set: MOUNT_ATTR_RDONLY,
            ..MountAttr::default()
        };
        let rc = target.with_nix_path(|path| {
            // SAFETY: path is NUL-terminated and attr is a valid
            // `struct mount_attr` of the size passed; both outlive the call.
            unsafe {
                libc::syscall(
                    libc::SYS_mount_setattr,
                    libc::AT_FDCWD,
                    path.as_ptr(),
                    AT_RECURSIVE,
                    &raw const attr,
                    size_of::<MountAttr>(),
                )
            }
        })?;
        Errno::result(rc).map(drop)
    }

    fn submounts(&self, target: &Path) -> KernelResult<Vec<PathBuf>> {
        let info = std::fs::read_to_string(PROC_MOUNTINFO).map_err(|e| io_errno(&e))?;
        Ok(mount_points_under(&info, target))
    }

    fn chroot(&self, path: &Path) -> KernelResult<()> {
        tracing::debug!(path = %path.display(), "chroot");
        nix::unistd::chroot(path)
    }

    fn chdir(&self, path: &Path) -> KernelResult<()> {
        tracing::debug!(path = %path.display(), "chdir");
        nix::unistd::chdir(path)
    }

    fn drop_bounding_cap(&self, cap: u32) -> KernelResult<()> {
        let zero: libc::c_ulong = 0;
        // SAFETY: PR_CAPBSET_DROP takes a capability number and no pointers.
        let rc = unsafe {
            libc::prctl(
                libc::PR_CAPBSET_DROP,
                libc::c_ulong::from(cap),
                zero,
                zero,
                zero,
            )
        };
        Errno::result(rc).map(drop)
    }

    fn clear_capabilities(&self) -> KernelResult<()> {
        let mut header = CapUserHeader {
            version: LINUX_CAPABILITY_VERSION_3,
            pid: 0,
        };
        // Version 3 carries two 32-bit words per set.
        let data = [CapUserData::default(); 2];
        // SAFETY: header and data are valid, correctly sized capset arguments
        // that live for the duration of the call.
        let rc = unsafe { libc::syscall(libc::SYS_capset, &raw mut header, data.as_ptr()) };
        Errno::result(rc).map(drop)
    }

    fn clear_ambient_capabilities(&self) -> KernelResult<()> {
        let zero: libc::c_ulong = 0;
        // SAFETY: PR_CAP_AMBIENT_CLEAR_ALL takes no pointers.
        let rc = unsafe {
            libc::prctl(
                libc::PR_CAP_AMBIENT,
                libc::PR_CAP_AMBIENT_CLEAR_ALL as libc::c_ulong,
                zero,
                zero,
                zero,
            )
        };
        Errno::result(rc).map(drop)
    }

    fn set_dumpable(&self, dumpable: bool) -> KernelResult<()> {
        prctl::set_dumpable(dumpable)
    }

    fn set_no_new_privs(&self) -> KernelResult<()> {
        prctl::set_no_new_privs()
    }

    fn install_filter(&self, program: &BpfProgram) -> KernelResult<()> {
        let fprog = program.as_fprog().map_err(|_| Errno::E2BIG)?;
        // SAFETY: fprog points into `program`, which outlives the call; the
        // kernel copies the instructions before returning.
        let rc = unsafe {
            libc::prctl(
                libc::PR_SET_SECCOMP,
                SECCOMP_MODE_FILTER,
                &raw const fprog,
            )
        };
        Errno::result(rc).map(drop)
    }
}

/// Mount points in `mountinfo` that are `target` or lie below it, in file
/// order, without duplicates.
fn mount_points_under(mountinfo: &str, target: &Path) -> Vec<PathBuf> {
    let mut points: Vec<PathBuf> = Vec::new();
    for line in mountinfo.lines() {
        let Some(field) = line.split(' ').nth(4) else {
            continue;
        };
        let point = unescape_mount_point(field);
        if point.starts_with(target) && !points.contains(&point) {
            points.push(point);
        }
    }
    points
}

/// Decodes the `\ooo` octal escapes the kernel uses for space, tab,
/// newline and backslash in mountinfo paths.
fn unescape_mount_point(field: &str) -> PathBuf {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let octal = bytes
            .get(i + 1..i + 4)
            .filter(|_| bytes[i] == b'\\')
            .and_then(|d| std::str::from_utf8(d).ok())
            .and_then(|d| u8::from_str_radix(d, 8).ok());
        if let Some(byte) = octal {
            out.push(byte);
            i += 4;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    PathBuf::from(OsString::from_vec(out))
}
