//! Fluent API for describing and applying a sandbox policy.

use std::path::PathBuf;

use cloister_common::error::Result;
use cloister_common::types::{NamespaceOptions, SandboxPolicy, SyscallPolicy};
use cloister_core::kernel::KernelOps;
use cloister_core::sink::ErrorSink;
use cloister_core::Enforcer;

/// Builder for a [`SandboxPolicy`].
///
/// Starts from the safe defaults of [`SandboxPolicy::new`]. Allow and deny
/// lists may both be given here; [`build`](Self::build) rejects that
/// combination before anything is applied.
#[derive(Debug)]
pub struct PolicyBuilder {
    policy: SandboxPolicy,
    allowed: Option<Vec<i64>>,
    denied: Option<Vec<i64>>,
}

impl PolicyBuilder {
    /// Creates a builder holding the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self {
            policy: SandboxPolicy::new(),
            allowed: None,
            denied: None,
        }
    }

    /// Sets whether every capability is dropped.
    #[must_use]
    pub const fn drop_capabilities(mut self, drop: bool) -> Self {
        self.policy.drop_capabilities = drop;
        self
    }

    /// Sets whether the process is marked non-dumpable.
    #[must_use]
    pub const fn non_dumpable(mut self, enabled: bool) -> Self {
        self.policy.make_non_dumpable = enabled;
        self
    }

    /// Sets whether `no_new_privs` is set.
    #[must_use]
    pub const fn no_new_privileges(mut self, enabled: bool) -> Self {
        self.policy.no_new_privileges = enabled;
        self
    }

    /// Moves the process into its own network namespace.
    #[must_use]
    pub fn isolate_network(mut self, enabled: bool) -> Self {
        self.policy
            .namespace_options
            .set(NamespaceOptions::ISOLATE_NETWORK, enabled);
        self
    }

    /// Adds syscall numbers to the allow-list.
    #[must_use]
    pub fn allow_syscalls(mut self, syscalls: impl IntoIterator<Item = i64>) -> Self {
        self.allowed.get_or_insert_with(Vec::new).extend(syscalls);
        self
    }

    /// Adds syscall numbers to the deny-list.
    #[must_use]
    pub fn deny_syscalls(mut self, syscalls: impl IntoIterator<Item = i64>) -> Self {
        self.denied.get_or_insert_with(Vec::new).extend(syscalls);
        self
    }

    /// Sets the directory that becomes `/` when bind mounts are used.
    #[must_use]
    pub fn jail_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.policy.jail_root = Some(root.into());
        self
    }

    /// Sets the working directory after confinement, resolved inside the
    /// jail when there is one.
    #[must_use]
    pub fn working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.policy.working_directory = dir.into();
        self
    }

    /// Exposes host path `path` read-only at the same path inside the jail.
    #[must_use]
    pub fn readonly_mount(mut self, path: impl Into<PathBuf>) -> Self {
        self.policy.readonly_bind_mounts.push(path.into());
        self
    }

    /// Exposes host path `path` writable at the same path inside the jail.
    #[must_use]
    pub fn writable_mount(mut self, path: impl Into<PathBuf>) -> Self {
        self.policy.writable_bind_mounts.push(path.into());
        self
    }

    /// Returns the configured policy.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if both an allow-list and a deny-list
    /// were given.
    pub fn build(self) -> Result<SandboxPolicy> {
        let mut policy = self.policy;
        policy.syscall_policy = SyscallPolicy::from_lists(self.allowed, self.denied)?;
        tracing::debug!(?policy, "policy built");
        Ok(policy)
    }

    /// Builds the policy and applies it to the calling process.
    ///
    /// # Errors
    ///
    /// See [`cloister_core::Enforcer::apply`]. Any error other than a
    /// configuration or filter-compilation error means the process must
    /// terminate.
    pub fn apply(self) -> Result<()> {
        cloister_core::apply(self.build()?)
    }

    /// Builds the policy and applies it through `enforcer`.
    ///
    /// # Errors
    ///
    /// As for [`apply`](Self::apply).
    pub fn apply_with<K: KernelOps, S: ErrorSink>(
        self,
        enforcer: &mut Enforcer<K, S>,
    ) -> Result<()> {
        enforcer.apply(self.build()?)
    }
}

impl Default for PolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}
