//! Exit-status resolution for launched children.
//!
//! Normal exit yields the exit code, death by signal yields
//! `128 + signal`, anything else yields `-1`.

use nix::errno::Errno;
use nix::unistd::Pid;
use tether_common::constants::{SIGNAL_EXIT_BASE, UNKNOWN_EXIT};

use crate::error::EngineError;

/// Normalizes a raw `waitpid(2)` status into an exit code.
#[must_use]
pub const fn decode_wait_status(status: i32) -> i32 {
    if libc::WIFEXITED(status) {
        libc::WEXITSTATUS(status)
    } else if libc::WIFSIGNALED(status) {
        SIGNAL_EXIT_BASE + libc::WTERMSIG(status)
    } else {
        UNKNOWN_EXIT
    }
}

/// Blocks until `pid` terminates and returns its normalized exit code.
///
/// Interrupted waits are retried. Waiting twice on the same pid is not
/// supported.
///
/// # Errors
///
/// Returns an error carrying the system code if `waitpid(2)` fails for any
/// reason other than interruption. The child may then be left unreaped.
pub fn wait_for_exit(pid: Pid) -> Result<i32, EngineError> {
    let mut status: libc::c_int = 0;
    loop {
        // SAFETY: `status` is a valid out-pointer for the duration of the call.
        let ret = unsafe { libc::waitpid(pid.as_raw(), &raw mut status, 0) };
        if ret >= 0 {
            break;
        }
        let errno = Errno::last();
        if errno != Errno::EINTR {
            tracing::warn!(pid = pid.as_raw(), %errno, "waitpid failed");
            return Err(EngineError::with_errno(errno, "waitpid failed"));
        }
    }
    let code = decode_wait_status(status);
    tracing::debug!(pid = pid.as_raw(), code, "child reaped");
    Ok(code)
}

/// Reaps a child on a failure path where its status is irrelevant.
pub fn reap(pid: Pid) {
    if let Err(err) = wait_for_exit(pid) {
        let report = err.into_report();
        tracing::debug!(pid = pid.as_raw(), error = %report.message, "reap failed");
    }
}
