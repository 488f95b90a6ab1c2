//! Failure reporting.
//!
//! The enforcer hands its first failure to an [`ErrorSink`] before returning
//! it. The sink is advisory: hosts replace it to route the message into
//! their own logging, and nothing depends on it succeeding.

use std::io::Write;

use cloister_common::constants::APP_NAME;
use cloister_common::error::CloisterError;
use cloister_common::types::Stage;

/// Receives the failure that aborted a policy application.
pub trait ErrorSink {
    /// Reports `err`. Must not panic.
    fn report(&self, err: &CloisterError);
}

/// Writes one line per failure to standard error.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrSink;

impl ErrorSink for StderrSink {
    fn report(&self, err: &CloisterError) {
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{}", format_report(err));
    }
}

/// Forwards failures to `tracing` at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn report(&self, err: &CloisterError) {
        tracing::error!(
            stage = %err.stage(),
            errno = err.raw_os_error(),
            error = %err,
            "sandbox policy failed"
        );
    }
}

impl<S: ErrorSink + ?Sized> ErrorSink for &S {
    fn report(&self, err: &CloisterError) {
        (**self).report(err);
    }
}

/// Human-readable line used by [`StderrSink`], e.g.
/// `cloister: jailing failed: jail setup failed during chroot at /tmp/sbx: ...`.
pub fn format_report(err: &CloisterError) -> String {
    match err.stage() {
        Stage::Unapplied => format!("{APP_NAME}: validation failed: {err}"),
        stage => format!("{APP_NAME}: {stage} failed: {err}"),
    }
}
