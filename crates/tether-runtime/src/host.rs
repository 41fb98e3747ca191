//! Host-process reference engine.
//!
//! Runs a definition's process directly on the host, without namespaces,
//! cgroups or a root filesystem switch. Useful for development and for
//! exercising the launch path end to end.
//!
//! Each container gets `<state_root>/<id>/state.json`. Processes are started
//! in their own process group, so group-wide operations use the init PID as
//! the group id.
//!
//! Started processes are children of whichever process called `run` or
//! `start`. An exited init is reaped the next time its record is loaded in
//! that process, or when it is deleted.
//!
//! This engine logs only through the [`EngineLog`] it is handed: `run` may
//! execute inside a forked child where other logging facilities are unsafe.

use std::fs;
use std::io::ErrorKind;
use std::os::fd::BorrowedFd;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{self, Signal as NixSignal};
use nix::sys::wait::{WaitPidFlag, waitpid};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tether_common::constants::{OCI_VERSION, STATE_FILE_NAME};
use tether_common::types::{ContainerState, ContainerStatus, Signal};
use tether_core::error::EngineError;
use tether_core::log::EngineLog;
use tether_core::wait::decode_wait_status;

use crate::context::LaunchContext;
use crate::definition::{ContainerDefinition, ProcessSpec};
use crate::engine::{CreateFlags, Engine, ListEntry, RunFlags};

const KILL_REAP_ATTEMPTS: u32 = 50;
const KILL_REAP_INTERVAL: Duration = Duration::from_millis(10);

const DEFAULT_PATH: &str = "PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Engine that runs container processes as plain host processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostEngine;

impl HostEngine {
    /// Creates the engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// On-disk record of one container.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Record {
    #[serde(flatten)]
    state: ContainerState,
    process: ProcessSpec,
}

impl Record {
    fn pid(&self) -> Pid {
        Pid::from_raw(self.state.pid)
    }

    /// Demotes a running or paused record whose init has gone away.
    fn refresh(&mut self) {
        let active = matches!(
            self.state.status,
            ContainerStatus::Running | ContainerStatus::Paused
        );
        if active && !alive(self.state.pid) {
            self.state.status = ContainerStatus::Stopped;
            reap_zombie(self.state.pid);
        }
    }

    fn is_active(&self) -> bool {
        matches!(
            self.state.status,
            ContainerStatus::Running | ContainerStatus::Paused
        )
    }
}

fn failure(log: EngineLog<'_>, errno: Option<Errno>, message: String) -> EngineError {
    log.error(errno, &message);
    match errno {
        Some(errno) => EngineError::with_errno(errno, message),
        None => EngineError::new(message),
    }
}

fn io_failure(log: EngineLog<'_>, err: &std::io::Error, message: String) -> EngineError {
    failure(log, err.raw_os_error().map(Errno::from_raw), message)
}

fn container_dir(ctx: &LaunchContext, id: &str) -> PathBuf {
    ctx.state_root().join(id)
}

fn load(ctx: &LaunchContext, id: &str, log: EngineLog<'_>) -> Result<Record, EngineError> {
    let path = container_dir(ctx, id).join(STATE_FILE_NAME);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(failure(
                log,
                Some(Errno::ENOENT),
                format!("container `{id}` does not exist"),
            ));
        }
        Err(e) => return Err(io_failure(log, &e, format!("cannot read `{}`", path.display()))),
    };
    let mut record: Record = serde_json::from_str(&content)
        .map_err(|e| failure(log, None, format!("cannot parse state of `{id}`: {e}")))?;
    record.refresh();
    Ok(record)
}

fn save(ctx: &LaunchContext, record: &Record, log: EngineLog<'_>) -> Result<(), EngineError> {
    let dir = container_dir(ctx, &record.state.id);
    let content = serde_json::to_vec_pretty(record)
        .map_err(|e| failure(log, None, format!("cannot serialize state: {e}")))?;
    let tmp = dir.join(format!(".{STATE_FILE_NAME}.tmp"));
    let path = dir.join(STATE_FILE_NAME);
    fs::write(&tmp, content)
        .and_then(|()| fs::rename(&tmp, &path))
        .map_err(|e| io_failure(log, &e, format!("cannot write `{}`", path.display())))
}

/// Creates the state directory and the initial `created` record.
fn register(
    ctx: &LaunchContext,
    definition: &ContainerDefinition,
    log: EngineLog<'_>,
) -> Result<Record, EngineError> {
    let Some(id) = ctx.id() else {
        return Err(failure(
            log,
            Some(Errno::EINVAL),
            "invalid context: no container id".into(),
        ));
    };
    let Some(process) = definition.process() else {
        return Err(failure(
            log,
            None,
            "invalid definition: missing process section".into(),
        ));
    };
    if process.args.is_empty() {
        return Err(failure(
            log,
            Some(Errno::EINVAL),
            "invalid definition: process args are empty".into(),
        ));
    }

    let root = ctx.state_root();
    fs::create_dir_all(root)
        .map_err(|e| io_failure(log, &e, format!("cannot create `{}`", root.display())))?;
    let dir = container_dir(ctx, id.as_str());
    match fs::create_dir(&dir) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Err(failure(
                log,
                Some(Errno::EEXIST),
                format!("container `{id}` already exists"),
            ));
        }
        Err(e) => return Err(io_failure(log, &e, format!("cannot create `{}`", dir.display()))),
    }

    let bundle = fs::canonicalize(ctx.bundle()).unwrap_or_else(|_| ctx.bundle().to_path_buf());
    let record = Record {
        state: ContainerState {
            oci_version: OCI_VERSION.into(),
            id: id.to_string(),
            status: ContainerStatus::Created,
            pid: 0,
            bundle: bundle.display().to_string(),
            annotations: definition.annotations(),
            created: Some(chrono::Utc::now()),
        },
        process: process.clone(),
    };
    if let Err(err) = save(ctx, &record, log) {
        let _ = fs::remove_dir_all(&dir);
        return Err(err);
    }
    log.debug(&format!("container `{id}` created"));
    Ok(record)
}

fn spawn(process: &ProcessSpec, bundle: &Path, log: EngineLog<'_>) -> Result<Child, EngineError> {
    let Some((program, args)) = process.args.split_first() else {
        return Err(failure(
            log,
            Some(Errno::EINVAL),
            "invalid process: args are empty".into(),
        ));
    };
    let cwd = Path::new(&process.cwd);
    let cwd = if cwd.is_absolute() {
        cwd.to_path_buf()
    } else {
        bundle.join(cwd)
    };
    let mut command = Command::new(program);
    let _ = command
        .args(args)
        .env_clear()
        .envs(process.env_pairs())
        .current_dir(&cwd)
        .process_group(0);
    command
        .spawn()
        .map_err(|e| io_failure(log, &e, format!("cannot execute `{program}`")))
}

fn child_pid(child: &Child) -> Result<i32, EngineError> {
    i32::try_from(child.id()).map_err(|_| EngineError::with_errno(Errno::ERANGE, "pid out of range"))
}

fn wait_child(mut child: Child, log: EngineLog<'_>) -> Result<i32, EngineError> {
    child
        .wait()
        .map(|status| decode_wait_status(status.into_raw()))
        .map_err(|e| io_failure(log, &e, "waitpid failed".into()))
}

/// Records the running init and honors the context's pid file.
fn mark_running(
    ctx: &LaunchContext,
    record: &mut Record,
    pid: i32,
    log: EngineLog<'_>,
) -> Result<(), EngineError> {
    record.state.status = ContainerStatus::Running;
    record.state.pid = pid;
    save(ctx, record, log)?;
    if let Some(pid_file) = ctx.pid_file() {
        fs::write(pid_file, pid.to_string())
            .map_err(|e| io_failure(log, &e, format!("cannot write `{}`", pid_file.display())))?;
    }
    log.debug(&format!("container `{}` running as pid {pid}", record.state.id));
    Ok(())
}

fn require_active(record: &Record, log: EngineLog<'_>) -> Result<(), EngineError> {
    if record.is_active() {
        Ok(())
    } else {
        Err(failure(
            log,
            None,
            format!("container `{}` is not running", record.state.id),
        ))
    }
}

fn to_nix(signal: Signal, log: EngineLog<'_>) -> Result<NixSignal, EngineError> {
    NixSignal::try_from(signal.as_raw())
        .map_err(|errno| failure(log, Some(errno), format!("unsupported signal {signal}")))
}

fn signal_group(record: &Record, signal: NixSignal, log: EngineLog<'_>) -> Result<(), EngineError> {
    signal::killpg(record.pid(), signal).map_err(|errno| {
        failure(
            log,
            Some(errno),
            format!("cannot signal container `{}`", record.state.id),
        )
    })
}

struct ProcStat {
    state: char,
    pgrp: i32,
}

/// Reads the state letter and process group from `/proc/<pid>/stat`.
fn proc_stat(pid: i32) -> Option<ProcStat> {
    let content = fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    parse_stat(&content)
}

fn parse_stat(content: &str) -> Option<ProcStat> {
    // The command name may contain spaces and parentheses; fields resume
    // after the last ')'.
    let rest = content.get(content.rfind(')')? + 1..)?;
    let mut fields = rest.split_whitespace();
    let state = fields.next()?.chars().next()?;
    let _ppid = fields.next()?;
    let pgrp = fields.next()?.parse().ok()?;
    Some(ProcStat { state, pgrp })
}

/// Collects `pid` if it is a zombie child of this process.
///
/// Only a zombie is waited for: its pid cannot have been reused, so the
/// wait never steals the status of an unrelated child. Non-children yield
/// ECHILD, which is ignored.
fn reap_zombie(pid: i32) {
    if pid > 0 && proc_stat(pid).is_some_and(|stat| stat.state == 'Z') {
        let _ = waitpid(Pid::from_raw(pid), Some(WaitPidFlag::WNOHANG));
    }
}

/// Waits briefly for a SIGKILLed init to turn into a zombie, then reaps it.
fn reap_killed(pid: i32) {
    for _ in 0..KILL_REAP_ATTEMPTS {
        match proc_stat(pid) {
            None => return,
            Some(stat) if stat.state == 'Z' => {
                reap_zombie(pid);
                return;
            }
            Some(_) => std::thread::sleep(KILL_REAP_INTERVAL),
        }
    }
}

/// Writes the exec notification byte to the context's wait descriptor.
fn notify_exec(ctx: &LaunchContext) {
    if let Some(fd) = ctx.exec_wait_fd() {
        // SAFETY: the context's owner keeps the descriptor open while the
        // engine runs.
        let fd = unsafe { BorrowedFd::borrow_raw(fd) };
        let _ = nix::unistd::write(fd, &[0]);
    }
}

fn alive(pid: i32) -> bool {
    pid > 0 && proc_stat(pid).is_some_and(|stat| !matches!(stat.state, 'Z' | 'X' | 'x'))
}

fn group_members(pgid: i32) -> Vec<Pid> {
    let Ok(entries) = fs::read_dir("/proc") else {
        return Vec::new();
    };
    let mut pids: Vec<Pid> = entries
        .filter_map(|entry| entry.ok()?.file_name().to_str()?.parse::<i32>().ok())
        .filter(|&pid| {
            proc_stat(pid).is_some_and(|stat| stat.pgrp == pgid && !matches!(stat.state, 'Z' | 'X'))
        })
        .map(Pid::from_raw)
        .collect();
    pids.sort_unstable();
    pids
}

/// Baseline definition template.
fn template(rootless: bool) -> Value {
    let mut namespaces = vec![
        json!({"type": "pid"}),
        json!({"type": "ipc"}),
        json!({"type": "uts"}),
        json!({"type": "mount"}),
        json!({"type": "cgroup"}),
    ];
    let sys_mount = if rootless {
        namespaces.push(json!({"type": "user"}));
        json!({
            "destination": "/sys",
            "type": "none",
            "source": "/sys",
            "options": ["rbind", "nosuid", "noexec", "nodev", "ro"]
        })
    } else {
        namespaces.insert(1, json!({"type": "network"}));
        json!({
            "destination": "/sys",
            "type": "sysfs",
            "source": "sysfs",
            "options": ["nosuid", "noexec", "nodev", "ro"]
        })
    };

    let mut spec = json!({
        "ociVersion": OCI_VERSION,
        "process": {
            "terminal": false,
            "user": {"uid": 0, "gid": 0},
            "args": ["sh"],
            "env": [DEFAULT_PATH, "TERM=xterm"],
            "cwd": "/",
            "capabilities": {
                "bounding": ["CAP_AUDIT_WRITE", "CAP_KILL", "CAP_NET_BIND_SERVICE"],
                "effective": ["CAP_AUDIT_WRITE", "CAP_KILL", "CAP_NET_BIND_SERVICE"],
                "permitted": ["CAP_AUDIT_WRITE", "CAP_KILL", "CAP_NET_BIND_SERVICE"]
            },
            "rlimits": [{"type": "RLIMIT_NOFILE", "hard": 1024, "soft": 1024}],
            "noNewPrivileges": true
        },
        "root": {"path": "rootfs", "readonly": true},
        "hostname": "tether",
        "mounts": [
            {"destination": "/proc", "type": "proc", "source": "proc"},
            {
                "destination": "/dev",
                "type": "tmpfs",
                "source": "tmpfs",
                "options": ["nosuid", "strictatime", "mode=755", "size=65536k"]
            },
            {
                "destination": "/dev/pts",
                "type": "devpts",
                "source": "devpts",
                "options": ["nosuid", "noexec", "newinstance", "ptmxmode=0666", "mode=0620"]
            },
            {
                "destination": "/dev/shm",
                "type": "tmpfs",
                "source": "shm",
                "options": ["nosuid", "noexec", "nodev", "mode=1777", "size=65536k"]
            },
            sys_mount
        ],
        "linux": {
            "resources": {"devices": [{"allow": false, "access": "rwm"}]},
            "namespaces": namespaces,
            "maskedPaths": [
                "/proc/acpi", "/proc/kcore", "/proc/keys", "/proc/latency_stats",
                "/proc/timer_list", "/proc/timer_stats", "/proc/sched_debug",
                "/sys/firmware", "/proc/scsi"
            ],
            "readonlyPaths": [
                "/proc/asound", "/proc/bus", "/proc/fs", "/proc/irq",
                "/proc/sys", "/proc/sysrq-trigger"
            ]
        }
    });

    if rootless {
        // SAFETY: geteuid and getegid cannot fail and have no side effects.
        let (uid, gid) = unsafe { (libc::geteuid(), libc::getegid()) };
        spec["linux"]["uidMappings"] = json!([{"containerID": 0, "hostID": uid, "size": 1}]);
        spec["linux"]["gidMappings"] = json!([{"containerID": 0, "hostID": gid, "size": 1}]);
    }
    spec
}

impl Engine for HostEngine {
    fn run(
        &self,
        ctx: &LaunchContext,
        definition: &ContainerDefinition,
        _flags: RunFlags,
        log: EngineLog<'_>,
    ) -> Result<i32, EngineError> {
        let mut record = register(ctx, definition, log)?;
        let dir = container_dir(ctx, &record.state.id);
        let child = match spawn(&record.process, ctx.bundle(), log) {
            Ok(child) => child,
            Err(err) => {
                let _ = fs::remove_dir_all(&dir);
                return Err(err);
            }
        };
        let pid = child_pid(&child)?;
        mark_running(ctx, &mut record, pid, log)?;
        notify_exec(ctx);
        if ctx.detach() {
            return Ok(0);
        }

        let code = wait_child(child, log)?;
        log.debug(&format!("container `{}` exited with code {code}", record.state.id));
        if let Err(e) = fs::remove_dir_all(&dir) {
            log.warning(&format!("cannot remove `{}`: {e}", dir.display()));
        }
        Ok(code)
    }

    fn create(
        &self,
        ctx: &LaunchContext,
        definition: &ContainerDefinition,
        _flags: CreateFlags,
        log: EngineLog<'_>,
    ) -> Result<i32, EngineError> {
        let _ = register(ctx, definition, log)?;
        Ok(0)
    }

    fn start(&self, ctx: &LaunchContext, id: &str, log: EngineLog<'_>) -> Result<(), EngineError> {
        let mut record = load(ctx, id, log)?;
        match record.state.status {
            ContainerStatus::Created => {}
            ContainerStatus::Running | ContainerStatus::Paused => {
                return Err(failure(
                    log,
                    Some(Errno::EBUSY),
                    format!("container `{id}` is already running"),
                ));
            }
            ContainerStatus::Creating | ContainerStatus::Stopped => {
                return Err(failure(
                    log,
                    Some(Errno::EINVAL),
                    format!("container `{id}` cannot be started from state {}", record.state.status),
                ));
            }
        }
        let child = spawn(&record.process, ctx.bundle(), log)?;
        let pid = child_pid(&child)?;
        mark_running(ctx, &mut record, pid, log)?;
        notify_exec(ctx);
        Ok(())
    }

    fn kill(
        &self,
        ctx: &LaunchContext,
        id: &str,
        signal: Signal,
        log: EngineLog<'_>,
    ) -> Result<(), EngineError> {
        let record = load(ctx, id, log)?;
        require_active(&record, log)?;
        let signal = to_nix(signal, log)?;
        signal::kill(record.pid(), signal)
            .map_err(|errno| failure(log, Some(errno), format!("cannot signal container `{id}`")))
    }

    fn kill_all(
        &self,
        ctx: &LaunchContext,
        id: &str,
        signal: Signal,
        log: EngineLog<'_>,
    ) -> Result<(), EngineError> {
        let record = load(ctx, id, log)?;
        require_active(&record, log)?;
        signal_group(&record, to_nix(signal, log)?, log)
    }

    fn delete(
        &self,
        ctx: &LaunchContext,
        id: &str,
        force: bool,
        log: EngineLog<'_>,
    ) -> Result<(), EngineError> {
        let record = load(ctx, id, log)?;
        if record.is_active() {
            if !force {
                return Err(failure(
                    log,
                    Some(Errno::EBUSY),
                    format!("container `{id}` is still running"),
                ));
            }
            match signal::killpg(record.pid(), NixSignal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(errno) => {
                    return Err(failure(
                        log,
                        Some(errno),
                        format!("cannot kill container `{id}`"),
                    ));
                }
            }
            reap_killed(record.state.pid);
        }
        let dir = container_dir(ctx, id);
        fs::remove_dir_all(&dir)
            .map_err(|e| io_failure(log, &e, format!("cannot remove `{}`", dir.display())))?;
        log.debug(&format!("container `{id}` deleted"));
        Ok(())
    }

    fn state(&self, ctx: &LaunchContext, id: &str, log: EngineLog<'_>) -> Result<String, EngineError> {
        let record = load(ctx, id, log)?;
        serde_json::to_string(&record.state)
            .map_err(|e| failure(log, None, format!("cannot serialize state: {e}")))
    }

    fn exec(
        &self,
        ctx: &LaunchContext,
        id: &str,
        process: &ProcessSpec,
        log: EngineLog<'_>,
    ) -> Result<i32, EngineError> {
        let record = load(ctx, id, log)?;
        require_active(&record, log)?;
        let child = spawn(process, ctx.bundle(), log)?;
        wait_child(child, log)
    }

    fn pause(&self, ctx: &LaunchContext, id: &str, log: EngineLog<'_>) -> Result<(), EngineError> {
        let mut record = load(ctx, id, log)?;
        if record.state.status != ContainerStatus::Running {
            return Err(failure(log, None, format!("container `{id}` is not running")));
        }
        signal_group(&record, NixSignal::SIGSTOP, log)?;
        record.state.status = ContainerStatus::Paused;
        save(ctx, &record, log)
    }

    fn unpause(&self, ctx: &LaunchContext, id: &str, log: EngineLog<'_>) -> Result<(), EngineError> {
        let mut record = load(ctx, id, log)?;
        if record.state.status != ContainerStatus::Paused {
            return Err(failure(
                log,
                Some(Errno::EINVAL),
                format!("container `{id}` is not paused"),
            ));
        }
        signal_group(&record, NixSignal::SIGCONT, log)?;
        record.state.status = ContainerStatus::Running;
        save(ctx, &record, log)
    }

    fn is_running(&self, ctx: &LaunchContext, id: &str, log: EngineLog<'_>) -> Result<bool, EngineError> {
        Ok(load(ctx, id, log)?.is_active())
    }

    fn list(&self, state_root: &Path, log: EngineLog<'_>) -> Result<Vec<ListEntry>, EngineError> {
        let entries = match fs::read_dir(state_root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(io_failure(
                    log,
                    &e,
                    format!("cannot read `{}`", state_root.display()),
                ));
            }
        };
        let mut names: Vec<ListEntry> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.path().join(STATE_FILE_NAME).is_file())
            .map(|entry| ListEntry {
                name: entry.file_name().into_string().ok(),
            })
            .collect();
        names.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(names)
    }

    fn read_pids(
        &self,
        ctx: &LaunchContext,
        id: &str,
        _recurse: bool,
        log: EngineLog<'_>,
    ) -> Result<Vec<Pid>, EngineError> {
        let record = load(ctx, id, log)?;
        if !record.is_active() {
            return Ok(Vec::new());
        }
        Ok(group_members(record.state.pid))
    }

    fn spec(&self, rootless: bool, log: EngineLog<'_>) -> Result<String, EngineError> {
        serde_json::to_string_pretty(&template(rootless))
            .map_err(|e| failure(log, None, format!("cannot serialize template: {e}")))
    }
}
