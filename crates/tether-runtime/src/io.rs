//! Piped standard streams for containers launched in a forked child.

use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::{AsRawFd, OwnedFd};
use std::thread::{self, JoinHandle};

use nix::fcntl::OFlag;
use nix::unistd::Pid;
use tether_common::error::Result;
use tether_common::types::ContainerId;
use tether_core::error::EngineError;
use tether_core::relay;
use tether_core::stdio::StdioFds;

use crate::container::Container;
use crate::definition::ContainerDefinition;
use crate::engine::RunFlags;
use crate::launch::{ChildHandle, LaunchIo, launch};
use crate::registry::ActiveSink;
use crate::runtime::Runtime;

/// Where the container's stdin comes from.
#[derive(Default)]
pub enum InputSource {
    /// The null device: the first read sees end-of-input.
    #[default]
    Null,
    /// Bytes pumped from a reader until it is exhausted.
    Reader(Box<dyn Read + Send>),
}

impl InputSource {
    /// Pumps `reader` into the container's stdin.
    pub fn reader(reader: impl Read + Send + 'static) -> Self {
        Self::Reader(Box::new(reader))
    }
}

/// Where one of the container's output streams goes.
#[derive(Default)]
pub enum OutputSink {
    /// The caller's own descriptor is inherited.
    #[default]
    Inherit,
    /// Output is pumped into a writer.
    Writer(Box<dyn Write + Send>),
}

impl OutputSink {
    /// Pumps the stream into `writer`.
    pub fn writer(writer: impl Write + Send + 'static) -> Self {
        Self::Writer(Box::new(writer))
    }

    /// Reads and drops everything.
    #[must_use]
    pub fn discard() -> Self {
        Self::writer(std::io::sink())
    }
}

/// Stream configuration for [`Runtime::run_with_io`].
#[derive(Default)]
pub struct IoConfig {
    /// Container stdin.
    pub stdin: InputSource,
    /// Container stdout.
    pub stdout: OutputSink,
    /// Container stderr.
    pub stderr: OutputSink,
}

impl IoConfig {
    /// Null stdin, inherited stdout and stderr.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets stdin.
    #[must_use]
    pub fn stdin(mut self, stdin: InputSource) -> Self {
        self.stdin = stdin;
        self
    }

    /// Sets stdout.
    #[must_use]
    pub fn stdout(mut self, stdout: OutputSink) -> Self {
        self.stdout = stdout;
        self
    }

    /// Sets stderr.
    #[must_use]
    pub fn stderr(mut self, stderr: OutputSink) -> Self {
        self.stderr = stderr;
        self
    }
}

impl std::fmt::Debug for InputSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

impl std::fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inherit => f.write_str("Inherit"),
            Self::Writer(_) => f.write_str("Writer(..)"),
        }
    }
}

impl std::fmt::Debug for IoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoConfig")
            .field("stdin", &self.stdin)
            .field("stdout", &self.stdout)
            .field("stderr", &self.stderr)
            .finish()
    }
}

/// A container running in a forked child.
#[derive(Debug)]
#[must_use = "the container must be waited on"]
pub struct RunResult<'rt> {
    container: Container<'rt>,
    child: ChildHandle,
    pumps: Vec<JoinHandle<()>>,
}

impl<'rt> RunResult<'rt> {
    /// Handle to the running container.
    #[must_use]
    pub const fn container(&self) -> &Container<'rt> {
        &self.container
    }

    /// Container id.
    #[must_use]
    pub const fn id(&self) -> &ContainerId {
        self.container.id()
    }

    /// PID of the supervising child.
    #[must_use]
    pub const fn pid(&self) -> Pid {
        self.child.pid()
    }

    /// Blocks until the container exits, then drains its output and log
    /// streams.
    ///
    /// The stdin pump is not waited for; it stops on its own once the
    /// reader is exhausted or the container closes its end.
    ///
    /// # Errors
    ///
    /// Returns an error if the child cannot be reaped.
    pub fn wait(self) -> Result<i32> {
        let code = self.child.wait()?;
        for pump in self.pumps {
            let _ = pump.join();
        }
        tracing::info!(id = %self.container.id(), code, "container exited");
        Ok(code)
    }
}

struct Pipe {
    read: OwnedFd,
    write: OwnedFd,
}

fn pipe() -> std::result::Result<Pipe, EngineError> {
    let (read, write) = nix::unistd::pipe2(OFlag::O_CLOEXEC)
        .map_err(|errno| EngineError::with_errno(errno, "cannot create pipe"))?;
    Ok(Pipe { read, write })
}

pub(crate) fn run_with_io<'rt>(
    runtime: &'rt Runtime,
    id: &ContainerId,
    definition: &ContainerDefinition,
    config: IoConfig,
) -> Result<RunResult<'rt>> {
    let IoConfig {
        stdin,
        stdout,
        stderr,
    } = config;
    let stdin = match stdin {
        InputSource::Null => None,
        InputSource::Reader(reader) => Some((reader, pipe()?)),
    };
    let stdout = match stdout {
        OutputSink::Inherit => None,
        OutputSink::Writer(writer) => Some((writer, pipe()?)),
    };
    let stderr = match stderr {
        OutputSink::Inherit => None,
        OutputSink::Writer(writer) => Some((writer, pipe()?)),
    };
    let log = match runtime.registry().callback() {
        None => None,
        Some(callback) => Some((callback, pipe()?)),
    };

    let io = LaunchIo {
        stdio: StdioFds {
            stdin: stdin.as_ref().map(|(_, p)| p.read.as_raw_fd()),
            stdout: stdout.as_ref().map(|(_, p)| p.write.as_raw_fd()),
            stderr: stderr.as_ref().map(|(_, p)| p.write.as_raw_fd()),
        },
        log: log.as_ref().map(|(_, p)| p.write.as_raw_fd()),
    };
    let ctx = runtime.context().for_container(id);
    let launched = launch(runtime.engine(), &ctx, definition, RunFlags::empty(), &io);

    // The child holds its own copies now; keep only the parent's ends so
    // the output pumps see end-of-stream when the child exits.
    let stdin = stdin.map(|(reader, p)| (reader, p.write));
    let stdout = stdout.map(|(writer, p)| (writer, p.read));
    let stderr = stderr.map(|(writer, p)| (writer, p.read));
    let log = log.map(|(callback, p)| (callback, p.read));
    let child = launched?;

    if let Some((mut reader, fd)) = stdin {
        drop(thread::spawn(move || {
            let mut pipe = File::from(fd);
            let _ = std::io::copy(&mut reader, &mut pipe);
        }));
    }
    let mut pumps = Vec::new();
    if let Some((writer, fd)) = stdout {
        pumps.push(pump_output(fd, writer));
    }
    if let Some((writer, fd)) = stderr {
        pumps.push(pump_output(fd, writer));
    }
    if let Some((callback, fd)) = log {
        pumps.push(thread::spawn(move || {
            let sink = ActiveSink::Callback(callback);
            let records = relay::forward(File::from(fd), &sink);
            tracing::trace!(records, "log relay drained");
        }));
    }

    tracing::info!(id = %id, pid = child.pid().as_raw(), "container launched");
    Ok(RunResult {
        container: runtime.get(id),
        child,
        pumps,
    })
}

fn pump_output(fd: OwnedFd, mut writer: Box<dyn Write + Send>) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut pipe = File::from(fd);
        let _ = std::io::copy(&mut pipe, &mut writer);
        let _ = writer.flush();
    })
}
