//! Mount point creation inside the jail.

use std::io;
use std::path::{Component, Path, PathBuf};

use cloister_common::constants::PATH_MAX;
use cloister_common::error::{CloisterError, Result};
use nix::errno::Errno;

use crate::kernel::KernelOps;

/// Creates every missing directory along `path` with `mode`.
///
/// Segments that already exist are skipped, so calling this twice on the
/// same path succeeds both times. Repeated slashes are collapsed.
///
/// # Errors
///
/// Returns [`CloisterError::Jail`] if `path` is longer than `PATH_MAX` or a
/// `mkdir(2)` fails with anything other than `EEXIST`.
pub fn ensure_directory_path<K: KernelOps>(kernel: &K, path: &Path, mode: u32) -> Result<()> {
    if path.as_os_str().len() >= PATH_MAX {
        return Err(CloisterError::Jail {
            op: "mkdir".into(),
            path: path.to_path_buf(),
            source: io::Error::from(Errno::ENAMETOOLONG),
        });
    }

    let mut current = PathBuf::new();
    for component in path.components() {
        current.push(component);
        if matches!(component, Component::RootDir | Component::CurDir) {
            continue;
        }
        match kernel.mkdir(&current, mode) {
            Ok(()) => tracing::debug!(path = %current.display(), mode, "created directory"),
            Err(Errno::EEXIST) => {}
            Err(e) => {
                return Err(CloisterError::Jail {
                    op: "mkdir".into(),
                    path: current,
                    source: e.into(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;
    use crate::kernel::LinuxKernel;
    use crate::kernel::fake::{Call, RecordingKernel};

    #[test]
    fn creates_each_missing_segment_in_order() {
        let kernel = RecordingKernel::new();
        ensure_directory_path(&kernel, Path::new("/tmp/sbx/usr/lib"), 0o700).unwrap();
        assert_eq!(
            kernel.calls(),
            vec![
                Call::Mkdir("/tmp".into(), 0o700),
                Call::Mkdir("/tmp/sbx".into(), 0o700),
                Call::Mkdir("/tmp/sbx/usr".into(), 0o700),
                Call::Mkdir("/tmp/sbx/usr/lib".into(), 0o700),
            ]
        );
        assert!(kernel.has_directory(Path::new("/tmp/sbx/usr/lib")));
    }

    #[test]
    fn repeated_slashes_are_collapsed() {
        let kernel = RecordingKernel::new();
        ensure_directory_path(&kernel, Path::new("/tmp//sbx///work/"), 0o755).unwrap();
        assert!(kernel.has_directory(Path::new("/tmp/sbx/work")));
        assert_eq!(kernel.calls().len(), 3);
    }

    #[test]
    fn other_errors_abort() {
        let kernel = RecordingKernel::new().failing(
            |c| matches!(c, Call::Mkdir(p, _) if p.ends_with("sbx")),
            Errno::EACCES,
        );
        let err = ensure_directory_path(&kernel, Path::new("/tmp/sbx/work"), 0o700).unwrap_err();
        match err {
            CloisterError::Jail { path, .. } => assert_eq!(path, PathBuf::from("/tmp/sbx")),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(!kernel.calls().contains(&Call::Mkdir("/tmp/sbx/work".into(), 0o700)));
    }

    #[test]
    fn overlong_path_is_fatal() {
        let kernel = RecordingKernel::new();
        let long = format!("/tmp/{}", "a/".repeat(PATH_MAX));
        let err = ensure_directory_path(&kernel, Path::new(&long), 0o700).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENAMETOOLONG));
        assert!(kernel.calls().is_empty());
    }

    #[test]
    fn second_call_on_real_tree_succeeds() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("jail/usr/share");
        let kernel = LinuxKernel::new();

        ensure_directory_path(&kernel, &target, 0o700).unwrap();
        ensure_directory_path(&kernel, &target, 0o700).unwrap();

        assert!(target.is_dir());
        let mode = std::fs::metadata(&target).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700 & !current_umask());
    }

    #[test]
    fn file_in_the_way_is_not_a_directory() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("blocker"), b"").unwrap();
        let kernel = LinuxKernel::new();
        let err = ensure_directory_path(&kernel, &tmp.path().join("blocker/inner"), 0o700)
            .unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENOTDIR));
    }

    fn current_umask() -> u32 {
        let mask = nix::sys::stat::umask(nix::sys::stat::Mode::empty());
        let _ = nix::sys::stat::umask(mask);
        mask.bits()
    }
}
