//! Policy data model used across the Cloister workspace.

use std::fmt;
use std::path::PathBuf;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::{CloisterError, Result};

bitflags! {
    /// Extra namespaces to enter on top of the user and mount namespaces.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct NamespaceOptions: u32 {
        /// Give the process an empty network namespace (loopback only, down).
        const ISOLATE_NETWORK = 1 << 1;
    }
}

/// Syscall filtering mode.
///
/// Allow and deny lists are mutually exclusive, so a policy carries at most
/// one of them. Syscall numbers are compared in list order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyscallPolicy {
    /// No syscall filter is installed.
    #[default]
    None,
    /// Only the listed syscalls may run; anything else kills the process.
    Allowlist(Vec<i64>),
    /// The listed syscalls kill the process; anything else runs.
    Denylist(Vec<i64>),
}

impl SyscallPolicy {
    /// Builds a policy from the two-list shape used by callers that keep
    /// allow and deny lists side by side.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when both lists are present.
    pub fn from_lists(allowed: Option<Vec<i64>>, denied: Option<Vec<i64>>) -> Result<Self> {
        match (allowed, denied) {
            (Some(_), Some(_)) => Err(CloisterError::config(
                "cannot mix allowed and denied syscall lists",
            )),
            (Some(list), None) => Ok(Self::Allowlist(list)),
            (None, Some(list)) => Ok(Self::Denylist(list)),
            (None, None) => Ok(Self::None),
        }
    }

    /// Listed syscall numbers, empty for [`SyscallPolicy::None`].
    pub fn syscalls(&self) -> &[i64] {
        match self {
            Self::None => &[],
            Self::Allowlist(list) | Self::Denylist(list) => list,
        }
    }

    /// Whether a filter will be installed. Empty lists install nothing.
    pub fn is_active(&self) -> bool {
        !self.syscalls().is_empty()
    }
}

/// Declarative description of the sandbox a process should end up in.
///
/// Built once by the host, consumed by a single call to the enforcer, then
/// dropped. Bind-mount paths are host paths relative to `/` and are recreated
/// at the same relative location under the jail root.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxPolicy {
    /// Clear every Linux capability.
    pub drop_capabilities: bool,
    /// Forbid ptrace attach and core dumps of this process.
    pub make_non_dumpable: bool,
    /// Forbid privilege gain through setuid/setcap executables.
    pub no_new_privileges: bool,
    /// Additional namespaces to enter.
    pub namespace_options: NamespaceOptions,
    /// Syscall filtering mode.
    pub syscall_policy: SyscallPolicy,
    /// Root of the filesystem jail. A configured fallback is used when unset.
    pub jail_root: Option<PathBuf>,
    /// Working directory after enforcement, resolved inside the jail.
    pub working_directory: PathBuf,
    /// Host paths bind-mounted read-only into the jail.
    pub readonly_bind_mounts: Vec<PathBuf>,
    /// Host paths bind-mounted writable into the jail.
    pub writable_bind_mounts: Vec<PathBuf>,
}

impl SandboxPolicy {
    /// Creates the default policy: drop capabilities, non-dumpable and
    /// no-new-privileges on; no jail, no syscall filter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            drop_capabilities: true,
            make_non_dumpable: true,
            no_new_privileges: true,
            namespace_options: NamespaceOptions::empty(),
            syscall_policy: SyscallPolicy::None,
            jail_root: None,
            working_directory: PathBuf::from("/"),
            readonly_bind_mounts: Vec::new(),
            writable_bind_mounts: Vec::new(),
        }
    }

    /// Whether any bind mounts were requested, which implies a root change.
    pub fn has_bind_mounts(&self) -> bool {
        !self.readonly_bind_mounts.is_empty() || !self.writable_bind_mounts.is_empty()
    }
}

impl Default for SandboxPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Progress of policy enforcement.
///
/// Transitions only move forward. `Failed` is terminal: the process is in an
/// unknown, partially confined state and must exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Nothing has been applied yet.
    Unapplied,
    /// Entering user, mount and optional network namespaces.
    EnteringNamespaces,
    /// Bind-mounting paths, changing root and working directory.
    Jailing,
    /// Dropping capabilities and setting process flags.
    ReducingPrivileges,
    /// Installing the syscall filter.
    Filtering,
    /// The process is fully confined.
    Applied,
    /// A stage failed.
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unapplied => write!(f, "unapplied"),
            Self::EnteringNamespaces => write!(f, "entering-namespaces"),
            Self::Jailing => write!(f, "jailing"),
            Self::ReducingPrivileges => write!(f, "reducing-privileges"),
            Self::Filtering => write!(f, "filtering"),
            Self::Applied => write!(f, "applied"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
