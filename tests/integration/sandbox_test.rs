//! Integration tests for process confinement.
//!
//! These tests are implemented per crate:
//! - `crates/cloister-core/tests/seccomp_test.rs`: filters installed on the
//!   real kernel in forked children (no privileges needed)
//! - `crates/cloister-core/tests/enforcer_test.rs`: full policies applied in
//!   forked children; ignored unless run with `-- --ignored` on a host that
//!   allows unprivileged user namespaces
//! - `crates/cloister-sdk/tests/policy_test.rs`: builder output driven
//!   through the recording kernel
//!
//! Covered scenarios:
//! - `default_policy_drops_everything`: non-dumpable, `no_new_privs`, empty
//!   capability sets, working directory `/`
//! - `writable_bind_mount_is_visible_inside_jail`: jail root becomes `/`, the
//!   bound host directory is readable and writable at its original path
//! - `readonly_bind_mount_rejects_writes`: writes fail with `EROFS`
//! - `readonly_bind_covers_nested_mounts`: a tmpfs mounted below a read-only
//!   entry is read-only inside the jail too
//! - `allowlist_permits_exit` / `allowlist_kills_on_unlisted_syscall`:
//!   listed syscalls run, anything else ends the process with `SIGSYS`
//! - `denylisted_syscall_kills_the_process`: the converse for deny-lists
//! - `mixed_lists_make_no_kernel_calls`: allow plus deny is rejected before
//!   any kernel call
