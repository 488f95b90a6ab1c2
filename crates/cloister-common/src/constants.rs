//! System-wide constants and default paths.

use std::path::PathBuf;
use std::sync::OnceLock;

/// Environment variable overriding the fallback jail root.
pub const JAIL_ROOT_ENV: &str = "CLOISTER_JAIL_ROOT";

/// Returns the fallback jail root, preferring `$CLOISTER_JAIL_ROOT` and
/// otherwise a per-user directory under `/tmp`.
fn resolve_fallback_jail_root() -> PathBuf {
    if let Some(root) = std::env::var_os(JAIL_ROOT_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(root);
    }
    PathBuf::from(format!("/tmp/.cloister-{}", nix::unistd::getuid()))
}

static FALLBACK_JAIL_ROOT: OnceLock<PathBuf> = OnceLock::new();

/// Returns the fallback jail root resolved for this process.
pub fn fallback_jail_root() -> &'static PathBuf {
    FALLBACK_JAIL_ROOT.get_or_init(resolve_fallback_jail_root)
}

/// Mode for directories created while building the jail.
pub const DEFAULT_DIRECTORY_MODE: u32 = 0o700;

/// Upper bound on the compiled seccomp program length, in instructions.
pub const DEFAULT_MAX_FILTER_INSTRUCTIONS: usize = 1024;

/// Longest path accepted by the kernel, including the trailing NUL
/// (`PATH_MAX` in `linux/limits.h`).
pub const PATH_MAX: usize = 4096;

/// Controls whether the process may drop supplementary groups.
pub const PROC_SETGROUPS: &str = "/proc/self/setgroups";

/// UID mapping of the current user namespace.
pub const PROC_UID_MAP: &str = "/proc/self/uid_map";

/// GID mapping of the current user namespace.
pub const PROC_GID_MAP: &str = "/proc/self/gid_map";

/// Application name used in diagnostics.
pub const APP_NAME: &str = "cloister";
