//! End-to-end policy application on a real kernel.
//!
//! Every scenario confines a forked child, which reports through its exit
//! code. They need unprivileged user namespaces, which many CI sandboxes
//! and containers forbid, so they are ignored by default:
//!
//! ```text
//! cargo test -p cloister-core --test enforcer_test -- --ignored
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used, unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use cloister_common::config::RuntimeConfig;
use cloister_common::types::{SandboxPolicy, SyscallPolicy};
use cloister_core::{Enforcer, LinuxKernel, TracingSink};
use nix::errno::Errno;
use nix::mount::{MsFlags, mount};
use nix::sched::{CloneFlags, unshare};
use nix::sys::signal::Signal;
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, fork, getgid, getuid};

/// Runs `body` in a forked child and returns how the child ended. The
/// child's exit code is `body`'s return value.
fn in_child(body: impl FnOnce() -> i32) -> WaitStatus {
    // SAFETY: the child runs `body` and leaves through `_exit` without
    // returning into the test harness.
    match unsafe { fork() }.expect("fork") {
        ForkResult::Child => {
            let code = body();
            unsafe { libc::_exit(code) };
        }
        ForkResult::Parent { child } => waitpid(child, None).expect("waitpid"),
    }
}

fn enforcer() -> Enforcer<LinuxKernel, TracingSink> {
    Enforcer::with_parts(LinuxKernel::new(), TracingSink, RuntimeConfig::default())
}

/// Reads a hex capability mask such as `CapBnd` from `/proc/self/status`.
fn capability_mask(field: &str) -> Option<u64> {
    let status = fs::read_to_string("/proc/self/status").ok()?;
    let line = status.lines().find(|l| l.starts_with(field))?;
    u64::from_str_radix(line.split_whitespace().nth(1)?, 16).ok()
}

#[test]
#[ignore = "requires unprivileged user namespaces"]
fn default_policy_drops_everything() {
    let status = in_child(|| {
        if enforcer().apply(SandboxPolicy::new()).is_err() {
            return 10;
        }
        if nix::sys::prctl::get_dumpable().unwrap_or(true) {
            return 11;
        }
        if !nix::sys::prctl::get_no_new_privs().unwrap_or(false) {
            return 12;
        }
        for field in ["CapBnd:", "CapEff:", "CapPrm:", "CapInh:", "CapAmb:"] {
            if capability_mask(field) != Some(0) {
                return 13;
            }
        }
        if std::env::current_dir().ok() != Some(PathBuf::from("/")) {
            return 14;
        }
        // Gated on CAP_SYS_CHROOT, which is gone.
        if nix::unistd::chroot("/") != Err(nix::errno::Errno::EPERM) {
            return 15;
        }
        0
    });
    assert!(
        matches!(status, WaitStatus::Exited(_, 0)),
        "unexpected {status:?}"
    );
}

#[test]
#[ignore = "requires unprivileged user namespaces"]
fn writable_bind_mount_is_visible_inside_jail() {
    let tmp = tempfile::tempdir().unwrap();
    let work = tmp.path().join("work");
    let jail = tmp.path().join("sbx");
    fs::create_dir(&work).unwrap();
    fs::write(work.join("marker"), b"host").unwrap();

    let policy = SandboxPolicy {
        jail_root: Some(jail.clone()),
        working_directory: work.clone(),
        writable_bind_mounts: vec![work.clone()],
        ..SandboxPolicy::new()
    };

    let status = in_child(move || {
        if enforcer().apply(policy).is_err() {
            return 20;
        }
        // The jail root is now `/`; its host path no longer resolves.
        if jail.exists() {
            return 21;
        }
        if fs::read("marker").ok().as_deref() != Some(b"host".as_slice()) {
            return 22;
        }
        if fs::write(work.join("from-jail"), b"jail").is_err() {
            return 23;
        }
        0
    });

    assert!(
        matches!(status, WaitStatus::Exited(_, 0)),
        "unexpected {status:?}"
    );
    assert_eq!(fs::read(tmp.path().join("work/from-jail")).unwrap(), b"jail");
}

#[test]
#[ignore = "requires unprivileged user namespaces"]
fn readonly_bind_mount_rejects_writes() {
    let tmp = tempfile::tempdir().unwrap();
    let data = tmp.path().join("data");
    fs::create_dir(&data).unwrap();

    let policy = SandboxPolicy {
        jail_root: Some(tmp.path().join("sbx")),
        readonly_bind_mounts: vec![data.clone()],
        ..SandboxPolicy::new()
    };

    let status = in_child(move || {
        if enforcer().apply(policy).is_err() {
            return 30;
        }
        match fs::write(data.join("nope"), b"x") {
            Err(e) if e.raw_os_error() == Some(libc::EROFS) => 0,
            _ => 31,
        }
    });
    assert!(
        matches!(status, WaitStatus::Exited(_, 0)),
        "unexpected {status:?}"
    );
    assert!(!tmp.path().join("data/nope").exists());
}

/// Enters a fresh user and mount namespace as root and mounts a tmpfs at
/// `at`, so the caller owns a mount it can nest under a bind source.
fn mount_tmpfs_in_own_namespace(at: &Path) -> nix::Result<()> {
    let (uid, gid) = (getuid(), getgid());
    unshare(CloneFlags::CLONE_NEWUSER | CloneFlags::CLONE_NEWNS)?;
    let write = |file: &str, contents: String| {
        fs::write(file, contents).map_err(|e| Errno::from_raw(e.raw_os_error().unwrap_or(0)))
    };
    write("/proc/self/setgroups", "deny".to_string())?;
    write("/proc/self/uid_map", format!("0 {uid} 1"))?;
    write("/proc/self/gid_map", format!("0 {gid} 1"))?;
    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_REC | MsFlags::MS_PRIVATE,
        None::<&str>,
    )?;
    mount(
        Some("tmpfs"),
        at,
        Some("tmpfs"),
        MsFlags::empty(),
        None::<&str>,
    )
}

#[test]
#[ignore = "requires unprivileged user namespaces"]
fn readonly_bind_covers_nested_mounts() {
    let tmp = tempfile::tempdir().unwrap();
    let data = tmp.path().join("data");
    let sub = data.join("sub");
    fs::create_dir_all(&sub).unwrap();

    let policy = SandboxPolicy {
        jail_root: Some(tmp.path().join("sbx")),
        readonly_bind_mounts: vec![data.clone()],
        ..SandboxPolicy::new()
    };

    let status = in_child(move || {
        if mount_tmpfs_in_own_namespace(&sub).is_err() {
            return 60;
        }
        if fs::write(sub.join("before"), b"x").is_err() {
            return 61;
        }
        if enforcer().apply(policy).is_err() {
            return 62;
        }
        for path in [data.join("top"), sub.join("nested")] {
            match fs::write(&path, b"x") {
                Err(e) if e.raw_os_error() == Some(libc::EROFS) => {}
                _ => return 63,
            }
        }
        0
    });
    assert!(
        matches!(status, WaitStatus::Exited(_, 0)),
        "unexpected {status:?}"
    );
}

fn exit_only_policy() -> SandboxPolicy {
    SandboxPolicy {
        syscall_policy: SyscallPolicy::Allowlist(vec![
            i64::from(libc::SYS_read),
            i64::from(libc::SYS_write),
            i64::from(libc::SYS_exit),
            i64::from(libc::SYS_exit_group),
        ]),
        ..SandboxPolicy::new()
    }
}

#[test]
#[ignore = "requires unprivileged user namespaces"]
fn allowlist_permits_exit() {
    let policy = exit_only_policy();
    let status = in_child(move || match enforcer().apply(policy) {
        Ok(()) => 0,
        Err(_) => 40,
    });
    assert!(
        matches!(status, WaitStatus::Exited(_, 0)),
        "unexpected {status:?}"
    );
}

#[test]
#[ignore = "requires unprivileged user namespaces"]
fn allowlist_kills_on_unlisted_syscall() {
    let policy = exit_only_policy();
    let status = in_child(move || {
        if enforcer().apply(policy).is_err() {
            return 50;
        }
        unsafe {
            let _ = libc::syscall(libc::SYS_getpid);
        }
        51
    });
    assert!(
        matches!(status, WaitStatus::Signaled(_, Signal::SIGSYS, _)),
        "unexpected {status:?}"
    );
}
