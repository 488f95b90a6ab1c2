//! Recording [`KernelOps`] fake for ordering tests.
//!
//! Every call is appended to a log; calls matching a primed predicate fail
//! with the primed errno instead of succeeding.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::mount::MsFlags;
use nix::sched::CloneFlags;

use super::{KernelOps, KernelResult};
use crate::seccomp::BpfProgram;

/// A recorded kernel call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// `unshare(flags)`
    Unshare(CloneFlags),
    /// UID/GID lookup.
    CurrentIds,
    /// `/proc` control file write.
    WriteProcFile {
        /// File written.
        path: PathBuf,
        /// Bytes written.
        contents: String,
    },
    /// Recursive private remount of `/`.
    MakeMountsPrivate,
    /// `mkdir(path, mode)`
    Mkdir(PathBuf, u32),
    /// Ownership lookup.
    PathOwner(PathBuf),
    /// Recursive bind mount.
    BindMount {
        /// Host path.
        source: PathBuf,
        /// Mount point.
        target: PathBuf,
    },
    /// `statvfs` lookup of locked mount flags.
    MountFlags(PathBuf),
    /// Bind remount with extra flags.
    RemountBind {
        /// Mount point.
        target: PathBuf,
        /// Flags passed alongside `MS_BIND | MS_REMOUNT`.
        flags: MsFlags,
    },
    /// Recursive `mount_setattr(MOUNT_ATTR_RDONLY)`.
    SetReadonlyRecursive(PathBuf),
    /// Mount table lookup below a path.
    Submounts(PathBuf),
    /// `chroot(path)`
    Chroot(PathBuf),
    /// `chdir(path)`
    Chdir(PathBuf),
    /// `prctl(PR_CAPBSET_DROP, cap)`
    DropBoundingCap(u32),
    /// `capset` clearing every set.
    ClearCapabilities,
    /// `prctl(PR_CAP_AMBIENT, PR_CAP_AMBIENT_CLEAR_ALL)`
    ClearAmbientCapabilities,
    /// `prctl(PR_SET_DUMPABLE, dumpable)`
    SetDumpable(bool),
    /// `prctl(PR_SET_NO_NEW_PRIVS, 1)`
    SetNoNewPrivs,
    /// `prctl(PR_SET_SECCOMP)` with a program of `len` instructions.
    InstallFilter {
        /// Program length.
        len: usize,
    },
}

type Predicate = Box<dyn Fn(&Call) -> bool>;

/// In-memory kernel that records calls instead of making them.
pub struct RecordingKernel {
    calls: RefCell<Vec<Call>>,
    failures: Vec<(Predicate, Errno)>,
    directories: RefCell<HashSet<PathBuf>>,
    owners: HashMap<PathBuf, u32>,
    mount_points: Vec<PathBuf>,
    ids: (u32, u32),
    last_cap: u32,
    locked_flags: MsFlags,
}

impl RecordingKernel {
    /// A kernel where `/` and `/tmp` exist, the caller is UID/GID 1000, and
    /// capabilities 0 through 40 are known.
    #[must_use]
    pub fn new() -> Self {
        let directories = ["/", "/tmp"].into_iter().map(PathBuf::from).collect();
        Self {
            calls: RefCell::new(Vec::new()),
            failures: Vec::new(),
            directories: RefCell::new(directories),
            owners: HashMap::new(),
            mount_points: Vec::new(),
            ids: (1000, 1000),
            last_cap: 40,
            locked_flags: MsFlags::MS_NOSUID | MsFlags::MS_NODEV,
        }
    }

    /// Fails every call matching `predicate` with `errno`.
    #[must_use]
    pub fn failing(mut self, predicate: impl Fn(&Call) -> bool + 'static, errno: Errno) -> Self {
        self.failures.push((Box::new(predicate), errno));
        self
    }

    /// Marks `path` as an existing directory owned by `uid`.
    #[must_use]
    pub fn with_directory(mut self, path: impl Into<PathBuf>, uid: u32) -> Self {
        let path = path.into();
        let _ = self.owners.insert(path.clone(), uid);
        let _ = self.directories.get_mut().insert(path);
        self
    }

    /// Adds a mount point reported by [`KernelOps::submounts`].
    #[must_use]
    pub fn with_mount_point(mut self, path: impl Into<PathBuf>) -> Self {
        self.mount_points.push(path.into());
        self
    }

    /// Sets the UID/GID reported for the caller.
    #[must_use]
    pub const fn with_ids(mut self, uid: u32, gid: u32) -> Self {
        self.ids = (uid, gid);
        self
    }

    /// Sets the highest capability number the bounding set accepts.
    #[must_use]
    pub const fn with_last_cap(mut self, last_cap: u32) -> Self {
        self.last_cap = last_cap;
        self
    }

    /// Calls recorded so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    /// Recorded calls, skipping read-only lookups.
    pub fn mutations(&self) -> Vec<Call> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| {
                !matches!(
                    c,
                    Call::CurrentIds
                        | Call::PathOwner(_)
                        | Call::MountFlags(_)
                        | Call::Submounts(_)
                )
            })
            .cloned()
            .collect()
    }

    /// Whether `path` exists as a directory.
    pub fn has_directory(&self, path: &Path) -> bool {
        self.directories.borrow().contains(path)
    }

    fn record(&self, call: Call) -> KernelResult<()> {
        let failure = self
            .failures
            .iter()
            .find(|(predicate, _)| predicate(&call))
            .map(|(_, errno)| *errno);
        self.calls.borrow_mut().push(call);
        failure.map_or(Ok(()), Err)
    }
}

impl Default for RecordingKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RecordingKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingKernel")
            .field("calls", &self.calls.borrow().len())
            .field("failures", &self.failures.len())
            .field("ids", &self.ids)
            .finish_non_exhaustive()
    }
}

impl KernelOps for RecordingKernel {
    fn unshare(&self, flags: CloneFlags) -> KernelResult<()> {
        self.record(Call::Unshare(flags))
    }

    fn current_ids(&self) -> (u32, u32) {
        self.calls.borrow_mut().push(Call::CurrentIds);
        self.ids
    }

    fn write_proc_file(&self, path: &Path, contents: &str) -> KernelResult<()> {
        self.record(Call::WriteProcFile {
            path: path.to_path_buf(),
            contents: contents.to_string(),
        })
    }

    fn make_mounts_private(&self) -> KernelResult<()> {
        self.record(Call::MakeMountsPrivate)
    }

    fn mkdir(&self, path: &Path, mode: u32) -> KernelResult<()> {
        self.record(Call::Mkdir(path.to_path_buf(), mode))?;
        if self.directories.borrow_mut().insert(path.to_path_buf()) {
            Ok(())
        } else {
            Err(Errno::EEXIST)
        }
    }

    fn path_owner(&self, path: &Path) -> KernelResult<Option<u32>> {
        self.record(Call::PathOwner(path.to_path_buf()))?;
        if !self.has_directory(path) {
            return Ok(None);
        }
        Ok(Some(self.owners.get(path).copied().unwrap_or(self.ids.0)))
    }

    fn bind_mount(&self, source: &Path, target: &Path) -> KernelResult<()> {
        self.record(Call::BindMount {
            source: source.to_path_buf(),
            target: target.to_path_buf(),
        })
    }

    fn mount_flags(&self, path: &Path) -> KernelResult<MsFlags> {
        self.record(Call::MountFlags(path.to_path_buf()))?;
        Ok(self.locked_flags)
    }

    fn remount_bind(&self, target: &Path, flags: MsFlags) -> KernelResult<()> {
        self.record(Call::RemountBind {
            target: target.to_path_buf(),
            flags,
        })
    }

    fn set_readonly_recursive(&self, target: &Path) -> KernelResult<()> {
        self.record(Call::SetReadonlyRecursive(target.to_path_buf()))
    }

    /// `target` itself, then every primed mount point below it.
    fn submounts(&self, target: &Path) -> KernelResult<Vec<PathBuf>> {
        self.record(Call::Submounts(target.to_path_buf()))?;
        let below = self
            .mount_points
            .iter()
            .filter(|p| p.starts_with(target) && p.as_path() != target)
            .cloned();
        Ok(std::iter::once(target.to_path_buf()).chain(below).collect())
    }

    fn chroot(&self, path: &Path) -> KernelResult<()> {
        self.record(Call::Chroot(path.to_path_buf()))
    }

    fn chdir(&self, path: &Path) -> KernelResult<()> {
        self.record(Call::Chdir(path.to_path_buf()))
    }

    fn drop_bounding_cap(&self, cap: u32) -> KernelResult<()> {
        self.record(Call::DropBoundingCap(cap))?;
        if cap > self.last_cap {
            Err(Errno::EINVAL)
        } else {
            Ok(())
        }
    }

    fn clear_capabilities(&self) -> KernelResult<()> {
        self.record(Call::ClearCapabilities)
    }

    fn clear_ambient_capabilities(&self) -> KernelResult<()> {
        self.record(Call::ClearAmbientCapabilities)
    }

    fn set_dumpable(&self, dumpable: bool) -> KernelResult<()> {
        self.record(Call::SetDumpable(dumpable))
    }

    fn set_no_new_privs(&self) -> KernelResult<()> {
        self.record(Call::SetNoNewPrivs)
    }

    fn install_filter(&self, program: &BpfProgram) -> KernelResult<()> {
        self.record(Call::InstallFilter { len: program.len() })
    }
}
