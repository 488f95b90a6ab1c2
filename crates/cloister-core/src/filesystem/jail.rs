//! Root and working directory changes.
//!
//! `chroot` is used rather than `pivot_root`: the host root stays mounted in
//! the private mount namespace, but with capabilities dropped afterwards the
//! process cannot `chroot` its way back out.

use std::path::Path;

use cloister_common::error::{CloisterError, Result};

use crate::kernel::KernelOps;

/// Changes the process root to `jail_root`, then the working directory to
/// `working_directory` resolved inside the new root.
///
/// Call only after every bind mount for `jail_root` is in place.
///
/// # Errors
///
/// Returns [`CloisterError::Jail`] if `chroot(2)` or `chdir(2)` fails.
pub fn enter_jail<K: KernelOps>(
    kernel: &K,
    jail_root: &Path,
    working_directory: &Path,
) -> Result<()> {
    kernel.chroot(jail_root).map_err(|e| CloisterError::Jail {
        op: "chroot".into(),
        path: jail_root.to_path_buf(),
        source: e.into(),
    })?;
    tracing::info!(root = %jail_root.display(), "entered jail");
    change_directory(kernel, working_directory)
}

/// Changes the working directory without touching the root.
///
/// # Errors
///
/// Returns [`CloisterError::Jail`] if `chdir(2)` fails.
pub fn change_directory<K: KernelOps>(kernel: &K, working_directory: &Path) -> Result<()> {
    kernel
        .chdir(working_directory)
        .map_err(|e| CloisterError::Jail {
            op: "chdir".into(),
            path: working_directory.to_path_buf(),
            source: e.into(),
        })?;
    tracing::debug!(cwd = %working_directory.display(), "changed working directory");
    Ok(())
}
