//! Launch supervisor: runs the engine inside a forked child.
//!
//! The parent creates a sync pipe, forks, and blocks on the handshake. The
//! child closes the read end, picks its log sink, rewires its standard
//! streams, reports the outcome, and only then hands control to the engine.
//! The engine's result becomes the child's exit status.
//!
//! The parent never closes the caller's stream descriptors; they remain the
//! caller's to release.

use std::os::fd::{BorrowedFd, RawFd};
use std::panic::{AssertUnwindSafe, catch_unwind};

use nix::unistd::{ForkResult, Pid, fork};
use tether_common::constants::ENGINE_FAILURE_EXIT;
use tether_core::error::EngineError;
use tether_core::log::{EngineLog, LogSink, StderrSink};
use tether_core::relay::RelaySink;
use tether_core::stdio::{StdioFds, close_inherited, redirect_stdio};
use tether_core::sync_pipe::{Handshake, SETUP_COMPLETE, SyncPipe, SyncWriter};
use tether_core::wait::{reap, wait_for_exit};

use crate::context::LaunchContext;
use crate::definition::ContainerDefinition;
use crate::engine::{Engine, RunFlags};

/// Descriptors a launched child should use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaunchIo {
    /// Standard stream replacements.
    pub stdio: StdioFds,
    /// Write end of a log relay pipe; `None` logs to the inherited stderr.
    pub log: Option<RawFd>,
}

impl LaunchIo {
    /// Builds from raw descriptors where a negative value means "default".
    #[must_use]
    pub const fn from_raw(stdin: RawFd, stdout: RawFd, stderr: RawFd, log: RawFd) -> Self {
        Self {
            stdio: StdioFds::from_raw(stdin, stdout, stderr),
            log: if log < 0 { None } else { Some(log) },
        }
    }
}

/// A successfully launched child process.
///
/// Waiting consumes the handle, so a child cannot be reaped twice through it.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a launched child must be waited on"]
pub struct ChildHandle {
    pid: Pid,
}

impl ChildHandle {
    /// Process id of the child.
    #[must_use]
    pub const fn pid(&self) -> Pid {
        self.pid
    }

    /// Blocks until the child exits and returns its normalized exit code.
    ///
    /// # Errors
    ///
    /// Returns an error if `waitpid(2)` fails; the child is then considered
    /// lost.
    pub fn wait(self) -> Result<i32, EngineError> {
        wait_for_exit(self.pid)
    }
}

/// Forks a child that runs `definition` through `engine`.
///
/// Returns once the child has confirmed its stream setup.
///
/// # Errors
///
/// - pipe or fork failure, before any child exists;
/// - "child process setup failed" with the child's system error code when
///   stream redirection failed;
/// - "child process failed unexpectedly" when the child died before
///   reporting.
///
/// In both child failure cases the child has already been reaped.
pub fn launch(
    engine: &dyn Engine,
    ctx: &LaunchContext,
    definition: &ContainerDefinition,
    flags: RunFlags,
    io: &LaunchIo,
) -> Result<ChildHandle, EngineError> {
    let pipe =
        SyncPipe::new().map_err(|errno| EngineError::with_errno(errno, "cannot create sync pipe"))?;

    // SAFETY: the child branch never returns into the caller; it finishes
    // with `_exit` after running the engine.
    match unsafe { fork() } {
        Err(errno) => Err(EngineError::with_errno(errno, "fork failed")),
        Ok(ForkResult::Child) => {
            let sync = pipe.into_child();
            let code = catch_unwind(AssertUnwindSafe(|| {
                child_main(engine, ctx, definition, flags, io, sync)
            }))
            .unwrap_or(ENGINE_FAILURE_EXIT);
            // SAFETY: terminates the child without running the parent's
            // atexit handlers or destructors.
            unsafe { libc::_exit(code) }
        }
        Ok(ForkResult::Parent { child }) => match pipe.into_parent().wait() {
            Handshake::Ready => {
                tracing::debug!(pid = child.as_raw(), "child setup complete");
                Ok(ChildHandle { pid: child })
            }
            Handshake::SetupFailed(code) => {
                reap(child);
                tracing::warn!(pid = child.as_raw(), errno = code, "child setup failed");
                Err(EngineError::from_raw_errno(code, "child process setup failed"))
            }
            Handshake::Vanished => {
                reap(child);
                tracing::warn!(pid = child.as_raw(), "child exited before setup completed");
                Err(EngineError::new("child process failed unexpectedly"))
            }
        },
    }
}

fn child_main(
    engine: &dyn Engine,
    ctx: &LaunchContext,
    definition: &ContainerDefinition,
    flags: RunFlags,
    io: &LaunchIo,
    sync: SyncWriter,
) -> i32 {
    let relay;
    let stderr = StderrSink;
    let sink: &dyn LogSink = match io.log {
        Some(fd) => {
            // SAFETY: the caller keeps the log descriptor open for the
            // duration of the launch; in the child it lives until exit.
            relay = RelaySink::new(unsafe { BorrowedFd::borrow_raw(fd) });
            &relay
        }
        None => &stderr,
    };

    if let Err(errno) = redirect_stdio(&io.stdio) {
        sync.signal(errno as i32);
        return ENGINE_FAILURE_EXIT;
    }
    #[cfg(test)]
    if KILL_BEFORE_HANDSHAKE.with(std::cell::Cell::get) {
        // SAFETY: only the forked child is affected.
        let _ = unsafe { libc::raise(libc::SIGKILL) };
    }
    sync.signal(SETUP_COMPLETE);

    // The log pipe and the exec wait descriptor belong to the engine; every
    // other inherited descriptor is dropped.
    let keep: Vec<RawFd> = [io.log, ctx.exec_wait_fd()].into_iter().flatten().collect();
    close_inherited(&keep);

    let log = EngineLog::new(sink, ctx.verbosity());
    match engine.run(ctx, definition, flags, log) {
        Ok(code) if code >= 0 => code,
        Ok(_) => ENGINE_FAILURE_EXIT,
        Err(err) => {
            // Detail only reaches the parent through the log stream.
            let _ = err.into_report();
            ENGINE_FAILURE_EXIT
        }
    }
}

// Set on the launching thread; the forked child inherits the value.
#[cfg(test)]
thread_local! {
    static KILL_BEFORE_HANDSHAKE: std::cell::Cell<bool> = const { std::cell::Cell::new(false) };
}

#[cfg(test)]
mod tests {
    use tether_common::types::ContainerId;

    use super::*;

    struct Succeed;

    impl Engine for Succeed {
        fn run(
            &self,
            _ctx: &LaunchContext,
            _definition: &ContainerDefinition,
            _flags: RunFlags,
            _log: EngineLog<'_>,
        ) -> Result<i32, EngineError> {
            Ok(0)
        }
    }

    fn launch_succeed() -> Result<ChildHandle, EngineError> {
        let ctx = LaunchContext::default().for_container(&ContainerId::new("handshake"));
        let definition = ContainerDefinition::from_json(r#"{"process": {"args": ["true"]}}"#)
            .expect("definition");
        launch(&Succeed, &ctx, &definition, RunFlags::empty(), &LaunchIo::default())
    }

    #[test]
    fn child_killed_before_handshake_yields_no_handle() {
        KILL_BEFORE_HANDSHAKE.with(|flag| flag.set(true));
        let result = launch_succeed();
        KILL_BEFORE_HANDSHAKE.with(|flag| flag.set(false));

        let report = result.expect_err("launch must fail").into_report();
        assert_eq!(report.message, "child process failed unexpectedly");
        assert_eq!(report.status, 0);
    }

    #[test]
    fn launch_succeeds_once_hook_is_cleared() {
        let child = launch_succeed().expect("launch");
        assert_eq!(child.wait().expect("wait"), 0);
    }

    #[test]
    fn negative_descriptors_mean_default() {
        let io = LaunchIo::from_raw(-1, -1, 4, -1);
        assert_eq!(io.stdio.stderr, Some(4));
        assert!(io.stdio.stdin.is_none());
        assert!(io.log.is_none());
        assert_eq!(LaunchIo::from_raw(-1, -1, -1, 7).log, Some(7));
    }

    #[test]
    fn default_io_inherits_everything() {
        assert_eq!(LaunchIo::default(), LaunchIo::from_raw(-1, -1, -1, -1));
    }
}
