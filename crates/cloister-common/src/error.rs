//! Unified error types for the Cloister workspace.
//!
//! Variants follow the enforcement pipeline: each one names the stage that
//! failed. Apart from [`CloisterError::Configuration`], every error leaves the
//! calling process partially confined and the only safe response is to
//! terminate it.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::Stage;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum CloisterError {
    /// The policy is invalid. Raised before any kernel state is touched.
    #[error("invalid policy: {message}")]
    Configuration {
        /// Description of the invalid setting.
        message: String,
    },

    /// Entering a namespace or writing an identity map failed.
    #[error("namespace setup failed during {op}: {source}")]
    Namespace {
        /// Operation that failed.
        op: String,
        /// Underlying OS error.
        source: io::Error,
    },

    /// Building the filesystem jail failed.
    #[error("jail setup failed during {op} at {path}: {source}")]
    Jail {
        /// Operation that failed.
        op: String,
        /// Path the operation was applied to.
        path: PathBuf,
        /// Underlying OS error.
        source: io::Error,
    },

    /// Dropping capabilities or setting a process flag failed.
    #[error("privilege reduction failed during {op}: {source}")]
    PrivilegeReduction {
        /// Operation that failed.
        op: String,
        /// Underlying OS error.
        source: io::Error,
    },

    /// The syscall filter could not be compiled.
    #[error("seccomp filter rejected: {message}")]
    Filter {
        /// Why compilation failed.
        message: String,
    },

    /// The kernel refused to install the compiled syscall filter.
    #[error("seccomp filter installation failed: {source}")]
    FilterInstall {
        /// Underlying OS error.
        source: io::Error,
    },
}

impl CloisterError {
    /// Shorthand for a [`CloisterError::Configuration`] error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Pipeline stage whose component produced this error.
    ///
    /// Configuration errors map to [`Stage::Unapplied`]: nothing was changed.
    pub const fn stage(&self) -> Stage {
        match self {
            Self::Configuration { .. } => Stage::Unapplied,
            Self::Namespace { .. } => Stage::EnteringNamespaces,
            Self::Jail { .. } => Stage::Jailing,
            Self::PrivilegeReduction { .. } => Stage::ReducingPrivileges,
            Self::Filter { .. } | Self::FilterInstall { .. } => Stage::Filtering,
        }
    }

    /// Underlying errno, when the failure came from the kernel.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Namespace { source, .. }
            | Self::Jail { source, .. }
            | Self::PrivilegeReduction { source, .. }
            | Self::FilterInstall { source } => source.raw_os_error(),
            Self::Configuration { .. } | Self::Filter { .. } => None,
        }
    }

    /// Whether the process is still in its original state.
    ///
    /// Only validation failures qualify; everything else means the caller
    /// must terminate the process.
    pub const fn is_side_effect_free(&self) -> bool {
        matches!(self, Self::Configuration { .. } | Self::Filter { .. })
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, CloisterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_follows_variant() {
        let err = CloisterError::Jail {
            op: "mount".into(),
            path: PathBuf::from("/tmp/sbx/usr"),
            source: io::Error::from_raw_os_error(1),
        };
        assert_eq!(err.stage(), Stage::Jailing);
        assert_eq!(CloisterError::config("x").stage(), Stage::Unapplied);
    }

    #[test]
    fn raw_os_error_is_exposed() {
        let err = CloisterError::Namespace {
            op: "unshare(CLONE_NEWUSER)".into(),
            source: io::Error::from_raw_os_error(22),
        };
        assert_eq!(err.raw_os_error(), Some(22));
        assert!(!err.is_side_effect_free());
    }

    #[test]
    fn display_names_path_and_operation() {
        let err = CloisterError::Jail {
            op: "chroot".into(),
            path: PathBuf::from("/tmp/sbx"),
            source: io::Error::from_raw_os_error(13),
        };
        let text = err.to_string();
        assert!(text.contains("chroot"));
        assert!(text.contains("/tmp/sbx"));
    }
}
