//! Container lifecycle tests against the host-process engine.
//!
//! Every test uses its own temporary state root and log registry, so they
//! can run in parallel with each other and with the launch tests.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use nix::fcntl::OFlag;
use serde_json::json;
use tether_common::config::RuntimeConfig;
use tether_common::error::EngineErrorKind;
use tether_common::types::{ContainerId, ContainerStatus, Signal, Verbosity};
use tether_core::log::LogRecord;
use tether_runtime::container::{Container, ExecOptions};
use tether_runtime::context::LaunchContext;
use tether_runtime::definition::{ContainerDefinition, DefinitionBuilder, ProcessSpec};
use tether_runtime::engine::{CreateFlags, RunFlags};
use tether_runtime::host::HostEngine;
use tether_runtime::io::{IoConfig, OutputSink};
use tether_runtime::launch::{LaunchIo, launch};
use tether_runtime::registry::LogRegistry;
use tether_runtime::runtime::Runtime;

fn config(root: &Path) -> RuntimeConfig {
    RuntimeConfig {
        state_root: Some(root.join("state")),
        verbosity: Verbosity::Debug,
        ..RuntimeConfig::default()
    }
}

fn runtime(config: &RuntimeConfig) -> Runtime {
    Runtime::new(HostEngine::new(), config).with_registry(Arc::new(LogRegistry::new()))
}

fn shell(script: &str) -> ContainerDefinition {
    DefinitionBuilder::from_template(json!({}))
        .args(["/bin/sh", "-c", script])
        .env("PATH", "/usr/bin:/bin")
        .annotation("org.example.suite", "host")
        .build()
        .expect("definition")
}

fn sleeper() -> ContainerDefinition {
    DefinitionBuilder::from_template(json!({}))
        .args(["/bin/sleep", "30"])
        .build()
        .expect("definition")
}

fn wait_until_stopped(container: &Container<'_>) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while container.is_running().expect("is_running") {
        assert!(Instant::now() < deadline, "container did not stop");
        std::thread::sleep(Duration::from_millis(20));
    }
}

fn wait_until_gone(pid: i32) {
    let proc_dir = format!("/proc/{pid}");
    let deadline = Instant::now() + Duration::from_secs(5);
    while Path::new(&proc_dir).exists() {
        assert!(Instant::now() < deadline, "pid {pid} was not reaped");
        std::thread::sleep(Duration::from_millis(20));
    }
}

#[derive(Debug, Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

// ── Runs ─────────────────────────────────────────────────────────────

#[test]
fn host_run_with_io_captures_output_and_exit_code() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let rt = runtime(&config(tmp.path()));
    let out = SharedBuf::default();
    let io = IoConfig::new()
        .stdout(OutputSink::writer(out.clone()))
        .stderr(OutputSink::discard());

    let result = rt
        .run_with_io(&ContainerId::new("hello"), &shell("echo hello; exit 4"), io)
        .expect("launch");
    assert_eq!(result.wait().expect("wait"), 4);
    assert_eq!(out.0.lock().unwrap().as_slice(), b"hello\n");

    // Non-detached runs clean their state up.
    assert!(rt.list_ids().expect("list").is_empty());
}

#[test]
fn host_run_in_process_returns_exit_code() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let rt = runtime(&config(tmp.path()));
    let code = rt
        .run(&ContainerId::new("inline"), &shell("exit 9"), RunFlags::empty())
        .expect("run");
    assert_eq!(code, 9);
}

#[test]
fn host_detached_run_leaves_container_running() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let pid_file = tmp.path().join("init.pid");
    let cfg = RuntimeConfig {
        detach: true,
        pid_file: Some(pid_file.clone()),
        ..config(tmp.path())
    };
    let rt = runtime(&cfg);
    let id = ContainerId::new("detached");

    assert_eq!(rt.run(&id, &sleeper(), RunFlags::empty()).expect("run"), 0);
    let state = rt.get(&id).state().expect("state");
    assert_eq!(state.status, ContainerStatus::Running);
    let written = std::fs::read_to_string(&pid_file).expect("pid file");
    assert_eq!(written, state.pid.to_string());

    rt.get(&id).delete(true).expect("force delete");
    assert!(rt.list_ids().expect("list").is_empty());
}

#[test]
fn host_run_notifies_exec_wait_descriptor_from_launched_child() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let (read, write) = nix::unistd::pipe2(OFlag::O_CLOEXEC).expect("exec wait pipe");
    let ctx = LaunchContext::from_config(&config(tmp.path()))
        .for_container(&ContainerId::new("notified"))
        .with_exec_wait_fd(write.as_raw_fd());

    let child = launch(
        &HostEngine::new(),
        &ctx,
        &shell("exit 0"),
        RunFlags::empty(),
        &LaunchIo::default(),
    )
    .expect("launch");
    drop(write);

    let mut notified = Vec::new();
    let _ = std::fs::File::from(read)
        .read_to_end(&mut notified)
        .expect("read exec wait pipe");
    assert_eq!(child.wait().expect("wait"), 0);
    assert_eq!(notified, [0]);
}

// ── Lifecycle ────────────────────────────────────────────────────────

#[test]
fn host_lifecycle_create_start_pause_kill_delete() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let rt = runtime(&config(tmp.path()));
    let id = ContainerId::new("lifecycle");

    let container = rt.create(&id, &sleeper(), CreateFlags::empty()).expect("create");
    let state = container.state().expect("state");
    assert_eq!(state.status, ContainerStatus::Created);
    assert_eq!(state.pid, 0);
    assert!(!container.is_running().expect("is_running"));
    assert!(container.pids(false).expect("pids").is_empty());

    container.start().expect("start");
    let state = container.state().expect("state");
    assert_eq!(state.status, ContainerStatus::Running);
    assert!(state.pid > 0);
    assert!(container.pids(true).expect("pids").contains(&state.pid));

    let err = container.start().expect_err("second start");
    assert_eq!(err.status(), Some(libc::EBUSY));

    container.pause().expect("pause");
    assert_eq!(container.state().expect("state").status, ContainerStatus::Paused);
    container.unpause().expect("unpause");
    assert_eq!(container.state().expect("state").status, ContainerStatus::Running);

    let err = container.delete(false).expect_err("delete while running");
    assert_eq!(err.kind(), Some(EngineErrorKind::ContainerRunning));

    container.kill(Signal::Kill).expect("kill");
    wait_until_stopped(&container);
    assert_eq!(container.state().expect("state").status, ContainerStatus::Stopped);

    container.delete(false).expect("delete");
    let err = container.state().expect_err("state after delete");
    assert!(err.is_not_found());
}

#[test]
fn host_exec_runs_inside_running_container() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let rt = runtime(&config(tmp.path()));
    let container = rt
        .create(&ContainerId::new("exec"), &sleeper(), CreateFlags::empty())
        .expect("create");

    let process = ProcessSpec::new(["/bin/sh", "-c", "exit 5"]);
    let err = container
        .exec(&process, &ExecOptions::default())
        .expect_err("exec before start");
    assert_eq!(err.kind(), Some(EngineErrorKind::ContainerNotRunning));

    container.start().expect("start");
    let code = container
        .exec(&process, &ExecOptions { cwd: Some("/tmp".into()), ..ExecOptions::default() })
        .expect("exec");
    assert_eq!(code, 5);

    container.kill_all(Signal::Term).expect("kill_all");
    wait_until_stopped(&container);
    container.delete(false).expect("delete");
}

#[test]
fn host_list_is_sorted_and_complete() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let rt = runtime(&config(tmp.path()));
    assert!(rt.list().expect("empty list").is_empty());

    for name in ["zeta", "alpha", "mid"] {
        let _ = rt
            .create(&ContainerId::new(name), &sleeper(), CreateFlags::empty())
            .expect("create");
    }
    assert_eq!(rt.list_ids().expect("list"), ["alpha", "mid", "zeta"]);
    let handles = rt.list().expect("list");
    assert_eq!(handles.len(), 3);
    assert_eq!(handles[0].id().as_str(), "alpha");
}

#[test]
fn host_reaps_exited_init_when_state_is_read() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let rt = runtime(&config(tmp.path()));
    let container = rt
        .create(&ContainerId::new("reaped"), &sleeper(), CreateFlags::empty())
        .expect("create");
    container.start().expect("start");
    let pid = container.state().expect("state").pid;

    container.kill(Signal::Kill).expect("kill");
    wait_until_stopped(&container);
    wait_until_gone(pid);
    container.delete(false).expect("delete");
}

#[test]
fn host_force_delete_reaps_init() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let rt = runtime(&config(tmp.path()));
    let container = rt
        .create(&ContainerId::new("forced"), &sleeper(), CreateFlags::empty())
        .expect("create");
    container.start().expect("start");
    let pid = container.state().expect("state").pid;

    container.delete(true).expect("force delete");
    wait_until_gone(pid);
}

// ── Failures ─────────────────────────────────────────────────────────

#[test]
fn host_duplicate_create_is_reported_and_logged() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let registry = Arc::new(LogRegistry::new());
    let seen = Arc::new(Mutex::new(Vec::<LogRecord>::new()));
    let sink = Arc::clone(&seen);
    let _ = registry.register(move |record: &LogRecord| sink.lock().unwrap().push(record.clone()));
    let rt = Runtime::new(HostEngine::new(), &config(tmp.path())).with_registry(registry);

    let id = ContainerId::new("twice");
    let _ = rt.create(&id, &sleeper(), CreateFlags::empty()).expect("first create");
    let err = rt
        .create(&id, &sleeper(), CreateFlags::empty())
        .expect_err("second create");
    assert_eq!(err.kind(), Some(EngineErrorKind::AlreadyExists));
    assert_eq!(err.status(), Some(libc::EEXIST));

    let seen = seen.lock().unwrap();
    let last = seen.last().expect("error record");
    assert_eq!(last.level(), Verbosity::Error);
    assert_eq!(last.errno, libc::EEXIST);
    assert!(last.message_lossy().contains("already exists"));
}

#[test]
fn host_rejects_definition_without_process() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let rt = runtime(&config(tmp.path()));
    let definition = ContainerDefinition::from_json(r#"{"hostname": "none"}"#).expect("parse");
    let err = rt
        .create(&ContainerId::new("empty"), &definition, CreateFlags::empty())
        .expect_err("create");
    assert_eq!(err.kind(), Some(EngineErrorKind::InvalidSpec));
}

#[test]
fn host_unknown_container_is_not_found() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let rt = runtime(&config(tmp.path()));
    let err = rt.is_running(&ContainerId::new("ghost")).expect_err("missing");
    assert!(err.is_not_found());
    assert_eq!(err.status(), Some(libc::ENOENT));
}

#[test]
fn host_update_is_not_supported() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let rt = runtime(&config(tmp.path()));
    let container = rt
        .create(&ContainerId::new("limits"), &sleeper(), CreateFlags::empty())
        .expect("create");
    let err = container
        .update_resources(&json!({"memory": {"limit": 1_048_576}}))
        .expect_err("update");
    assert_eq!(err.status(), Some(libc::ENOTSUP));
}

// ── Templates ────────────────────────────────────────────────────────

#[test]
fn host_template_seeds_a_usable_builder() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let rt = runtime(&config(tmp.path()));
    let definition = rt
        .new_definition(false)
        .expect("template")
        .args(["/bin/true"])
        .hostname("box")
        .memory_limit(64 << 20)
        .build()
        .expect("build");

    let process = definition.process().expect("process");
    assert_eq!(process.args, ["/bin/true"]);
    assert!(process.env.iter().any(|e| e.starts_with("PATH=")));
    assert_eq!(definition.document()["hostname"], "box");
    assert_eq!(
        definition.document()["linux"]["resources"]["memory"]["limit"],
        64 << 20
    );

    let code = rt
        .run(&ContainerId::new("templated"), &definition, RunFlags::empty())
        .expect("run");
    assert_eq!(code, 0);
}
