//! Integration tests for the fork-based launch path.
//!
//! Each test drives a small in-process engine through a real `fork(2)`:
//! 1. Exit codes and signal termination
//! 2. Standard stream redirection through pipes
//! 3. Setup handshake failures
//! 4. Engine log relay across the process boundary
//! 5. Concurrent launches

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::sync::{Arc, Mutex};

use nix::errno::Errno;
use nix::fcntl::OFlag;
use tether_common::config::RuntimeConfig;
use tether_common::error::TetherError;
use tether_common::types::{ContainerId, Verbosity};
use tether_core::error::EngineError;
use tether_core::log::{EngineLog, LogRecord};
use tether_runtime::context::LaunchContext;
use tether_runtime::definition::ContainerDefinition;
use tether_runtime::engine::{Engine, RunFlags};
use tether_runtime::io::{InputSource, IoConfig, OutputSink};
use tether_runtime::launch::{LaunchIo, launch};
use tether_runtime::registry::LogRegistry;
use tether_runtime::runtime::Runtime;

/// What the test engine does once the child has finished its setup.
#[derive(Debug, Clone, Copy)]
enum Behavior {
    Exit(i32),
    Negative,
    Fail,
    Signal(i32),
    /// Copies stdin to stdout, and writes a marker on stderr.
    Echo,
    /// Emits one warning, one error and one debug record, then succeeds.
    Chatter,
    /// Exits 0 if the context's exec wait descriptor is open, 9 otherwise.
    CheckExecWaitFd,
}

#[derive(Debug)]
struct TestEngine(Behavior);

fn raw_write(fd: i32, bytes: &[u8]) {
    // SAFETY: `bytes` is a valid buffer for its whole length.
    let _ = unsafe { libc::write(fd, bytes.as_ptr().cast(), bytes.len()) };
}

impl Engine for TestEngine {
    fn run(
        &self,
        ctx: &LaunchContext,
        _definition: &ContainerDefinition,
        _flags: RunFlags,
        log: EngineLog<'_>,
    ) -> Result<i32, EngineError> {
        match self.0 {
            Behavior::Exit(code) => Ok(code),
            Behavior::Negative => Ok(-5),
            Behavior::Fail => Err(EngineError::with_errno(Errno::ENOENT, "rootfs missing")),
            Behavior::Signal(sig) => {
                // SAFETY: raising a signal in the forked child only affects it.
                let _ = unsafe { libc::raise(sig) };
                Ok(0)
            }
            Behavior::Echo => {
                let mut buf = [0_u8; 256];
                loop {
                    // SAFETY: `buf` is valid for writes of its length.
                    let n = unsafe { libc::read(0, buf.as_mut_ptr().cast(), buf.len()) };
                    if n <= 0 {
                        break;
                    }
                    raw_write(1, &buf[..n.unsigned_abs()]);
                }
                raw_write(2, b"done\n");
                Ok(0)
            }
            Behavior::Chatter => {
                log.warning("cgroup v1 detected");
                log.error(Some(Errno::EACCES), "cannot set hostname");
                log.debug("dropped below threshold");
                Ok(3)
            }
            Behavior::CheckExecWaitFd => {
                let open = ctx.exec_wait_fd().is_some_and(|fd| {
                    // SAFETY: F_GETFD only queries the descriptor flags.
                    unsafe { libc::fcntl(fd, libc::F_GETFD) >= 0 }
                });
                Ok(if open { 0 } else { 9 })
            }
        }
    }
}

fn definition() -> ContainerDefinition {
    ContainerDefinition::from_json(r#"{"process": {"args": ["true"]}}"#).expect("definition")
}

fn start(behavior: Behavior, io: &LaunchIo) -> Result<i32, EngineError> {
    let ctx = LaunchContext::default().for_container(&ContainerId::new("launch-test"));
    let child = launch(&TestEngine(behavior), &ctx, &definition(), RunFlags::empty(), io)?;
    child.wait()
}

fn runtime(behavior: Behavior, registry: &Arc<LogRegistry>) -> Runtime {
    let config = RuntimeConfig {
        verbosity: Verbosity::Warning,
        ..RuntimeConfig::default()
    };
    Runtime::new(TestEngine(behavior), &config).with_registry(Arc::clone(registry))
}

/// A writer whose contents can be inspected after a pump thread is done.
#[derive(Debug, Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).expect("utf8 output")
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

// ── Exit status ──────────────────────────────────────────────────────

#[test]
fn launch_reports_engine_exit_code() {
    assert_eq!(start(Behavior::Exit(7), &LaunchIo::default()).expect("wait"), 7);
    assert_eq!(start(Behavior::Exit(0), &LaunchIo::default()).expect("wait"), 0);
}

#[test]
fn launch_maps_engine_failure_to_one() {
    assert_eq!(start(Behavior::Fail, &LaunchIo::default()).expect("wait"), 1);
}

#[test]
fn launch_maps_negative_result_to_one() {
    assert_eq!(start(Behavior::Negative, &LaunchIo::default()).expect("wait"), 1);
}

#[test]
fn launch_reports_signal_death_as_128_plus_signal() {
    let code = start(Behavior::Signal(libc::SIGKILL), &LaunchIo::default()).expect("wait");
    assert_eq!(code, 128 + libc::SIGKILL);
}

// ── Stream redirection ───────────────────────────────────────────────

#[test]
fn launch_redirects_streams_to_caller_pipes() {
    let (in_read, in_write) = nix::unistd::pipe2(OFlag::O_CLOEXEC).expect("stdin pipe");
    let (out_read, out_write) = nix::unistd::pipe2(OFlag::O_CLOEXEC).expect("stdout pipe");
    let (err_read, err_write) = nix::unistd::pipe2(OFlag::O_CLOEXEC).expect("stderr pipe");
    let io = LaunchIo::from_raw(
        in_read.as_raw_fd(),
        out_write.as_raw_fd(),
        err_write.as_raw_fd(),
        -1,
    );

    let ctx = LaunchContext::default().for_container(&ContainerId::new("echo"));
    let child = launch(&TestEngine(Behavior::Echo), &ctx, &definition(), RunFlags::empty(), &io)
        .expect("launch");
    drop((in_read, out_write, err_write));

    let mut stdin = std::fs::File::from(in_write);
    stdin.write_all(b"hello through the pipe").expect("write stdin");
    drop(stdin);

    let mut out = String::new();
    let _ = std::fs::File::from(out_read).read_to_string(&mut out).expect("read stdout");
    let mut err = String::new();
    let _ = std::fs::File::from(err_read).read_to_string(&mut err).expect("read stderr");

    assert_eq!(child.wait().expect("wait"), 0);
    assert_eq!(out, "hello through the pipe");
    assert_eq!(err, "done\n");
}

#[test]
fn launch_without_stdin_reads_null_device() {
    let (out_read, out_write) = nix::unistd::pipe2(OFlag::O_CLOEXEC).expect("stdout pipe");
    let io = LaunchIo::from_raw(-1, out_write.as_raw_fd(), -1, -1);

    let ctx = LaunchContext::default().for_container(&ContainerId::new("null-stdin"));
    let child = launch(&TestEngine(Behavior::Echo), &ctx, &definition(), RunFlags::empty(), &io)
        .expect("launch");
    drop(out_write);

    let mut out = Vec::new();
    let _ = std::fs::File::from(out_read).read_to_end(&mut out).expect("read stdout");
    assert_eq!(child.wait().expect("wait"), 0);
    assert!(out.is_empty());
}

// ── Setup failures ───────────────────────────────────────────────────

#[test]
fn launch_with_bad_stdin_descriptor_fails_setup() {
    let io = LaunchIo::from_raw(4000, -1, -1, -1);
    let err = start(Behavior::Exit(0), &io).expect_err("setup must fail");
    let report = err.into_report();
    assert!(report.message.starts_with("child process setup failed"));
    assert_eq!(report.status, libc::EBADF);
}

#[test]
fn setup_failure_converts_to_workspace_error() {
    let io = LaunchIo::from_raw(-1, 4001, -1, -1);
    let err: TetherError = start(Behavior::Exit(0), &io).expect_err("setup must fail").into();
    assert_eq!(err.status(), Some(libc::EBADF));
    assert!(err.to_string().contains("child process setup failed"));
}

#[test]
fn exec_wait_descriptor_stays_open_for_engine() {
    let (_read, write) = nix::unistd::pipe2(OFlag::O_CLOEXEC).expect("exec wait pipe");
    let ctx = LaunchContext::default()
        .for_container(&ContainerId::new("exec-wait"))
        .with_exec_wait_fd(write.as_raw_fd());
    let child = launch(
        &TestEngine(Behavior::CheckExecWaitFd),
        &ctx,
        &definition(),
        RunFlags::empty(),
        &LaunchIo::default(),
    )
    .expect("launch");
    assert_eq!(child.wait().expect("wait"), 0);
}

// ── Log relay ────────────────────────────────────────────────────────

#[test]
fn launch_relays_engine_records_over_log_pipe() {
    let (log_read, log_write) = nix::unistd::pipe2(OFlag::O_CLOEXEC).expect("log pipe");
    let io = LaunchIo::from_raw(-1, -1, -1, log_write.as_raw_fd());
    let ctx = LaunchContext::default()
        .for_container(&ContainerId::new("chatter"))
        .with_verbosity(Verbosity::Warning);

    let child = launch(&TestEngine(Behavior::Chatter), &ctx, &definition(), RunFlags::empty(), &io)
        .expect("launch");
    drop(log_write);

    let records: Vec<LogRecord> =
        tether_core::relay::RelayReader::new(std::fs::File::from(log_read)).collect();
    assert_eq!(child.wait().expect("wait"), 3);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].level(), Verbosity::Warning);
    assert_eq!(records[0].message_lossy(), "cgroup v1 detected");
    assert_eq!(records[1].errno, libc::EACCES);
    assert_eq!(records[1].message_lossy(), "cannot set hostname");
}

#[test]
fn run_with_io_delivers_child_records_to_callback() {
    let registry = Arc::new(LogRegistry::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _ = registry.register(move |record: &LogRecord| {
        sink.lock().unwrap().push(record.message_lossy().into_owned());
    });

    let rt = runtime(Behavior::Chatter, &registry);
    let result = rt
        .run_with_io(&ContainerId::new("relayed"), &definition(), IoConfig::new())
        .expect("launch");
    assert_eq!(result.wait().expect("wait"), 3);

    let seen = seen.lock().unwrap();
    assert_eq!(
        *seen,
        vec!["cgroup v1 detected".to_string(), "cannot set hostname".to_string()]
    );
}

// ── Piped runs ───────────────────────────────────────────────────────

#[test]
fn run_with_io_pumps_all_streams() {
    let registry = Arc::new(LogRegistry::new());
    let rt = runtime(Behavior::Echo, &registry);
    let stdout = SharedBuf::default();
    let stderr = SharedBuf::default();
    let io = IoConfig::new()
        .stdin(InputSource::reader(&b"line one\nline two\n"[..]))
        .stdout(OutputSink::writer(stdout.clone()))
        .stderr(OutputSink::writer(stderr.clone()));

    let id = ContainerId::new("pumped");
    let result = rt.run_with_io(&id, &definition(), io).expect("launch");
    assert_eq!(result.container().id(), &id);
    assert!(result.pid().as_raw() > 0);
    assert_eq!(result.wait().expect("wait"), 0);

    assert_eq!(stdout.contents(), "line one\nline two\n");
    assert_eq!(stderr.contents(), "done\n");
}

#[test]
fn concurrent_piped_runs_do_not_interfere() {
    let registry = Arc::new(LogRegistry::new());
    let rt = runtime(Behavior::Echo, &registry);

    let outputs: Vec<_> = (0..4)
        .map(|i| {
            let stdout = SharedBuf::default();
            let io = IoConfig::new()
                .stdin(InputSource::reader(std::io::Cursor::new(format!("run {i}"))))
                .stdout(OutputSink::writer(stdout.clone()))
                .stderr(OutputSink::discard());
            let result = rt
                .run_with_io(&ContainerId::new(format!("c{i}")), &definition(), io)
                .expect("launch");
            (i, stdout, result)
        })
        .collect();

    for (i, stdout, result) in outputs {
        assert_eq!(result.wait().expect("wait"), 0);
        assert_eq!(stdout.contents(), format!("run {i}"));
    }
}
