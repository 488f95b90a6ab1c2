//! Runtime configuration for policy enforcement.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants;

/// Knobs that are not part of a policy but shape how it is enforced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Jail root used when a policy requests bind mounts but sets no root.
    pub fallback_jail_root: PathBuf,
    /// Largest seccomp program, in instructions, the compiler will emit.
    pub max_filter_instructions: usize,
    /// Mode for directories created inside the jail.
    pub directory_mode: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            fallback_jail_root: constants::fallback_jail_root().clone(),
            max_filter_instructions: constants::DEFAULT_MAX_FILTER_INSTRUCTIONS,
            directory_mode: constants::DEFAULT_DIRECTORY_MODE,
        }
    }
}
