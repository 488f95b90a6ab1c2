//! Linux namespace entry for self-sandboxing.
//!
//! The process moves itself into a fresh user namespace, maps its own
//! UID/GID to root inside it, then enters a private mount namespace (and a
//! network namespace when asked). This grants the in-namespace capabilities
//! needed to build the jail without any host privilege.

pub mod mount;
pub mod network;
pub mod user;

use cloister_common::error::Result;
use cloister_common::types::NamespaceOptions;

use crate::kernel::KernelOps;

/// Enters the user, mount and optional network namespaces, in that order.
///
/// The UID/GID are sampled before the user namespace exists: afterwards
/// they read as the overflow ID until the maps are written.
///
/// # Errors
///
/// Returns [`CloisterError::Namespace`](cloister_common::error::CloisterError::Namespace)
/// for the first unshare or map write that fails. There is no safe way to
/// continue from a partial entry.
pub fn enter_namespaces<K: KernelOps>(kernel: &K, options: NamespaceOptions) -> Result<()> {
    tracing::info!(?options, "entering namespaces");
    let (uid, gid) = kernel.current_ids();

    user::create_user_namespace(kernel)?;
    user::write_id_maps(kernel, uid, gid)?;
    mount::create_mount_namespace(kernel)?;

    if options.contains(NamespaceOptions::ISOLATE_NETWORK) {
        network::create_network_namespace(kernel)?;
    }
    Ok(())
}
