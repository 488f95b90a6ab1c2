//! Policy enforcement: the one safe ordering of every confinement step.
//!
//! ```text
//! validate -> namespaces -> jail -> capabilities/flags -> seccomp
//! ```
//!
//! Each step needs privileges that the following one removes. Mounting and
//! `chroot` need the capabilities granted by the user namespace; dropping
//! capabilities must follow the jail; the seccomp filter goes last so
//! nothing after it can run unfiltered.

use std::path::{Component, Path, PathBuf};

use cloister_common::config::RuntimeConfig;
use cloister_common::error::{CloisterError, Result};
use cloister_common::types::{SandboxPolicy, Stage};

use crate::filesystem::{bind_mount_paths, change_directory, ensure_directory_path, enter_jail};
use crate::kernel::{KernelOps, LinuxKernel};
use crate::seccomp::{self, BpfProgram};
use crate::sink::{ErrorSink, StderrSink};
use crate::{capability, hardening, namespace};

/// Applies a [`SandboxPolicy`] to the calling process.
///
/// One enforcer confines one process, once. After a failure past
/// validation the process is partially confined and must exit.
pub struct Enforcer<K: KernelOps = LinuxKernel, S: ErrorSink = StderrSink> {
    kernel: K,
    sink: S,
    config: RuntimeConfig,
    stage: Stage,
}

impl Enforcer {
    /// Creates an enforcer for the real kernel that reports to stderr.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Creates an enforcer for the real kernel with custom configuration.
    #[must_use]
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self::with_parts(LinuxKernel::new(), StderrSink, config)
    }
}

impl Default for Enforcer {
    fn default() -> Self {
        Self::new()
    }
}

/// A validated policy, ready for the irreversible steps.
struct Plan {
    policy: SandboxPolicy,
    jail_root: Option<PathBuf>,
    filter: Option<BpfProgram>,
}

impl<K: KernelOps, S: ErrorSink> Enforcer<K, S> {
    /// Creates an enforcer from explicit parts.
    pub const fn with_parts(kernel: K, sink: S, config: RuntimeConfig) -> Self {
        Self {
            kernel,
            sink,
            config,
            stage: Stage::Unapplied,
        }
    }

    /// Current pipeline stage.
    pub const fn stage(&self) -> Stage {
        self.stage
    }

    /// The kernel operations in use.
    pub const fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Applies `policy` to the calling process.
    ///
    /// Must run before the process starts any other thread. The policy is
    /// consumed and dropped when this returns.
    ///
    /// On error the first failure is also passed to the error sink. A
    /// [`CloisterError::Configuration`] or [`CloisterError::Filter`] error
    /// leaves the process untouched and the enforcer reusable; any other
    /// error moves it to [`Stage::Failed`] and the process must terminate.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error. Calling this again after
    /// kernel state was changed is a configuration error.
    pub fn apply(&mut self, policy: SandboxPolicy) -> Result<()> {
        let result = self.run(policy);
        if let Err(err) = &result {
            if !err.is_side_effect_free() {
                self.stage = Stage::Failed;
            }
            self.sink.report(err);
        }
        result
    }

    /// Marks the end of the sandboxed section. Does nothing.
    ///
    /// Namespaces, dropped capabilities and seccomp filters cannot be
    /// undone by the process that holds them, so there is nothing to
    /// restore.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn end_policy(&self) -> Result<()> {
        tracing::debug!(stage = %self.stage, "end of policy requested; nothing to undo");
        Ok(())
    }

    fn run(&mut self, policy: SandboxPolicy) -> Result<()> {
        if self.stage != Stage::Unapplied {
            return Err(CloisterError::config(format!(
                "policy already applied (stage {})",
                self.stage
            )));
        }

        let plan = self.validate(policy)?;
        let Plan {
            policy,
            jail_root,
            filter,
        } = plan;

        self.advance(Stage::EnteringNamespaces);
        namespace::enter_namespaces(&self.kernel, policy.namespace_options)?;

        self.advance(Stage::Jailing);
        match &jail_root {
            Some(root) => self.build_jail(root, &policy)?,
            None => change_directory(&self.kernel, &policy.working_directory)?,
        }

        self.advance(Stage::ReducingPrivileges);
        if policy.drop_capabilities {
            capability::drop_all_capabilities(&self.kernel)?;
        }
        if policy.make_non_dumpable {
            hardening::set_non_dumpable(&self.kernel)?;
        }
        if policy.no_new_privileges {
            hardening::set_no_new_privileges(&self.kernel)?;
        }

        self.advance(Stage::Filtering);
        if let Some(program) = &filter {
            seccomp::install(&self.kernel, program)?;
        }

        self.advance(Stage::Applied);
        Ok(())
    }

    /// Checks everything that can be checked without changing kernel state.
    fn validate(&self, policy: SandboxPolicy) -> Result<Plan> {
        check_path("working directory", &policy.working_directory)?;
        for path in policy
            .readonly_bind_mounts
            .iter()
            .chain(&policy.writable_bind_mounts)
        {
            check_path("bind mount", path)?;
        }

        let filter =
            seccomp::compile_policy(&policy.syscall_policy, self.config.max_filter_instructions)?;

        let jail_root = if policy.has_bind_mounts() {
            let root = policy
                .jail_root
                .clone()
                .unwrap_or_else(|| self.config.fallback_jail_root.clone());
            check_path("jail root", &root)?;
            if root == Path::new("/") {
                return Err(CloisterError::config("jail root cannot be /"));
            }
            self.check_jail_owner(&root)?;
            Some(root)
        } else {
            if let Some(root) = &policy.jail_root {
                check_path("jail root", root)?;
            }
            None
        };

        tracing::debug!(
            jail_root = ?jail_root,
            filter_instructions = filter.as_ref().map_or(0, BpfProgram::len),
            "policy validated"
        );
        Ok(Plan {
            policy,
            jail_root,
            filter,
        })
    }

    /// Refuses an existing jail root that belongs to someone else.
    fn check_jail_owner(&self, root: &Path) -> Result<()> {
        let (uid, _) = self.kernel.current_ids();
        let owner = self.kernel.path_owner(root).map_err(|e| {
            CloisterError::config(format!("cannot inspect jail root {}: {e}", root.display()))
        })?;
        match owner {
            Some(owner) if owner != uid => Err(CloisterError::config(format!(
                "jail root {} is owned by uid {owner}, not {uid}",
                root.display()
            ))),
            _ => Ok(()),
        }
    }

    fn build_jail(&self, root: &Path, policy: &SandboxPolicy) -> Result<()> {
        let mode = self.config.directory_mode;
        ensure_directory_path(&self.kernel, root, mode)?;
        bind_mount_paths(&self.kernel, root, &policy.readonly_bind_mounts, true, mode)?;
        bind_mount_paths(&self.kernel, root, &policy.writable_bind_mounts, false, mode)?;
        enter_jail(&self.kernel, root, &policy.working_directory)
    }

    fn advance(&mut self, stage: Stage) {
        tracing::info!(from = %self.stage, to = %stage, "sandbox stage");
        self.stage = stage;
    }
}

/// Rejects relative paths and `..` components.
fn check_path(what: &str, path: &Path) -> Result<()> {
    if !path.is_absolute() {
        return Err(CloisterError::config(format!(
            "{what} {} is not absolute",
            path.display()
        )));
    }
    if path.components().any(|c| c == Component::ParentDir) {
        return Err(CloisterError::config(format!(
            "{what} {} contains '..'",
            path.display()
        )));
    }
    Ok(())
}

/// Applies `policy` to the calling process with the default enforcer.
///
/// # Errors
///
/// See [`Enforcer::apply`]. On any error other than a configuration or
/// filter-compilation error the caller must terminate the process.
pub fn apply(policy: SandboxPolicy) -> Result<()> {
    Enforcer::new().apply(policy)
}
