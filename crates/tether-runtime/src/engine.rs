//! The engine seam: whatever actually performs container setup.
//!
//! Implementors only have to provide [`Engine::run`]. Every other operation
//! defaults to an "operation not supported" error so partial engines stay
//! usable.

use std::ops::BitOr;
use std::path::Path;

use nix::errno::Errno;
use nix::unistd::Pid;
use serde_json::Value;
use tether_common::types::Signal;
use tether_core::error::EngineError;
use tether_core::log::EngineLog;

use crate::context::LaunchContext;
use crate::definition::{ContainerDefinition, ProcessSpec};

/// Flags accepted by [`Engine::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RunFlags(u32);

impl RunFlags {
    /// Fork the container init before loading the full configuration.
    pub const PREFORK: Self = Self(1 << 0);

    /// No flags.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Raw bit pattern.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns `true` if every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for RunFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Flags accepted by [`Engine::create`]; a separate set from [`RunFlags`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CreateFlags(u32);

impl CreateFlags {
    /// Fork the container init before loading the full configuration.
    pub const PREFORK: Self = Self(1 << 0);

    /// No flags.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Raw bit pattern.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns `true` if every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for CreateFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// One item of the engine's container enumeration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListEntry {
    /// Container name; `None` if the engine could not represent it.
    pub name: Option<String>,
}

impl ListEntry {
    /// Creates an entry with a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }
}

fn unsupported(operation: &str) -> EngineError {
    EngineError::with_errno(Errno::ENOTSUP, format!("{operation} is not supported by this engine"))
}

/// A container engine.
///
/// Every method receives the [`EngineLog`] it must log through; the caller
/// decides where those records go. Implementations must not assume they run
/// in the caller's process: [`Engine::run`] is also invoked inside a forked
/// child by the launch supervisor.
pub trait Engine: Send + Sync {
    /// Creates and starts a container, returning its result code.
    ///
    /// Unless the context is detached, this blocks until the container
    /// exits and returns its exit code.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be set up.
    fn run(
        &self,
        ctx: &LaunchContext,
        definition: &ContainerDefinition,
        flags: RunFlags,
        log: EngineLog<'_>,
    ) -> Result<i32, EngineError>;

    /// Creates a container without starting it.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be created.
    fn create(
        &self,
        ctx: &LaunchContext,
        definition: &ContainerDefinition,
        flags: CreateFlags,
        log: EngineLog<'_>,
    ) -> Result<i32, EngineError> {
        let _ = (ctx, definition, flags, log);
        Err(unsupported("create"))
    }

    /// Starts a created container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container does not exist or cannot start.
    fn start(&self, ctx: &LaunchContext, id: &str, log: EngineLog<'_>) -> Result<(), EngineError> {
        let _ = (ctx, id, log);
        Err(unsupported("start"))
    }

    /// Sends `signal` to the container's init process.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is not running.
    fn kill(
        &self,
        ctx: &LaunchContext,
        id: &str,
        signal: Signal,
        log: EngineLog<'_>,
    ) -> Result<(), EngineError> {
        let _ = (ctx, id, signal, log);
        Err(unsupported("kill"))
    }

    /// Sends `signal` to every process of the container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is not running.
    fn kill_all(
        &self,
        ctx: &LaunchContext,
        id: &str,
        signal: Signal,
        log: EngineLog<'_>,
    ) -> Result<(), EngineError> {
        let _ = (ctx, id, signal, log);
        Err(unsupported("kill_all"))
    }

    /// Removes a container, killing it first when `force` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the container does not exist or is still
    /// running without `force`.
    fn delete(
        &self,
        ctx: &LaunchContext,
        id: &str,
        force: bool,
        log: EngineLog<'_>,
    ) -> Result<(), EngineError> {
        let _ = (ctx, id, force, log);
        Err(unsupported("delete"))
    }

    /// Returns the container's state document as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the container does not exist.
    fn state(&self, ctx: &LaunchContext, id: &str, log: EngineLog<'_>) -> Result<String, EngineError> {
        let _ = (ctx, id, log);
        Err(unsupported("state"))
    }

    /// Runs an additional process in a running container and returns its
    /// exit code.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is not running or the process
    /// cannot be started.
    fn exec(
        &self,
        ctx: &LaunchContext,
        id: &str,
        process: &ProcessSpec,
        log: EngineLog<'_>,
    ) -> Result<i32, EngineError> {
        let _ = (ctx, id, process, log);
        Err(unsupported("exec"))
    }

    /// Applies new resource limits.
    ///
    /// # Errors
    ///
    /// Returns an error if the limits cannot be applied.
    fn update(
        &self,
        ctx: &LaunchContext,
        id: &str,
        resources: &Value,
        log: EngineLog<'_>,
    ) -> Result<(), EngineError> {
        let _ = (ctx, id, resources, log);
        Err(unsupported("update"))
    }

    /// Freezes every process of the container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is not running.
    fn pause(&self, ctx: &LaunchContext, id: &str, log: EngineLog<'_>) -> Result<(), EngineError> {
        let _ = (ctx, id, log);
        Err(unsupported("pause"))
    }

    /// Thaws a paused container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is not paused.
    fn unpause(&self, ctx: &LaunchContext, id: &str, log: EngineLog<'_>) -> Result<(), EngineError> {
        let _ = (ctx, id, log);
        Err(unsupported("unpause"))
    }

    /// Returns whether the container's init process is alive.
    ///
    /// # Errors
    ///
    /// Returns an error if the container state cannot be read.
    fn is_running(&self, ctx: &LaunchContext, id: &str, log: EngineLog<'_>) -> Result<bool, EngineError> {
        let _ = (ctx, id, log);
        Err(unsupported("is_running"))
    }

    /// Enumerates the containers under `state_root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the state root cannot be read.
    fn list(&self, state_root: &Path, log: EngineLog<'_>) -> Result<Vec<ListEntry>, EngineError> {
        let _ = (state_root, log);
        Err(unsupported("list"))
    }

    /// Returns the processes belonging to the container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container does not exist.
    fn read_pids(
        &self,
        ctx: &LaunchContext,
        id: &str,
        recurse: bool,
        log: EngineLog<'_>,
    ) -> Result<Vec<Pid>, EngineError> {
        let _ = (ctx, id, recurse, log);
        Err(unsupported("read_pids"))
    }

    /// Returns a baseline definition template as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the template cannot be produced.
    fn spec(&self, rootless: bool, log: EngineLog<'_>) -> Result<String, EngineError> {
        let _ = (rootless, log);
        Err(unsupported("spec"))
    }
}
