//! Filesystem jail construction.
//!
//! Builds a private root containing only the host paths a policy asks for:
//! mount points are created under the jail root, host paths are bind-mounted
//! onto them, and the process then changes root into the jail.

pub mod directory;
pub mod jail;
pub mod mount;

pub use directory::ensure_directory_path;
pub use jail::{change_directory, enter_jail};
pub use mount::{bind_mount_paths, jail_destination};
