//! Handle to a single container; every method forwards to the engine.

use serde_json::Value;
use tether_common::error::Result;
use tether_common::types::{ContainerId, ContainerState, Signal};

use crate::definition::ProcessSpec;
use crate::list;
use crate::runtime::Runtime;

/// Adjustments applied to a process before it is exec'd.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOptions {
    /// Allocate a terminal.
    pub terminal: bool,
    /// Override the working directory.
    pub cwd: Option<String>,
}

impl ExecOptions {
    fn apply(&self, process: &ProcessSpec) -> ProcessSpec {
        let mut process = process.clone();
        if self.terminal {
            process.terminal = true;
        }
        if let Some(cwd) = &self.cwd {
            process.cwd.clone_from(cwd);
        }
        process
    }
}

/// A container known to a [`Runtime`].
#[derive(Debug, Clone)]
pub struct Container<'rt> {
    id: ContainerId,
    runtime: &'rt Runtime,
}

impl<'rt> Container<'rt> {
    pub(crate) const fn new(id: ContainerId, runtime: &'rt Runtime) -> Self {
        Self { id, runtime }
    }

    /// Container id.
    #[must_use]
    pub const fn id(&self) -> &ContainerId {
        &self.id
    }

    /// Starts a created container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container does not exist or was already
    /// started.
    pub fn start(&self) -> Result<()> {
        self.runtime.call("start", self.runtime.context(), |engine, ctx, log| {
            engine.start(ctx, self.id.as_str(), log)
        })
    }

    /// Sends `signal` to the init process.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is not running.
    pub fn kill(&self, signal: Signal) -> Result<()> {
        self.runtime.call("kill", self.runtime.context(), |engine, ctx, log| {
            engine.kill(ctx, self.id.as_str(), signal, log)
        })
    }

    /// Sends `signal` to every process of the container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is not running.
    pub fn kill_all(&self, signal: Signal) -> Result<()> {
        self.runtime.call("kill_all", self.runtime.context(), |engine, ctx, log| {
            engine.kill_all(ctx, self.id.as_str(), signal, log)
        })
    }

    /// Removes the container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container does not exist, or is running and
    /// `force` is not set.
    pub fn delete(&self, force: bool) -> Result<()> {
        self.runtime.call("delete", self.runtime.context(), |engine, ctx, log| {
            engine.delete(ctx, self.id.as_str(), force, log)
        })
    }

    /// Returns the parsed state document.
    ///
    /// # Errors
    ///
    /// Returns an error if the container does not exist or the engine's
    /// document cannot be parsed.
    pub fn state(&self) -> Result<ContainerState> {
        let json = self.state_json()?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Returns the raw state document.
    ///
    /// # Errors
    ///
    /// Returns an error if the container does not exist.
    pub fn state_json(&self) -> Result<String> {
        self.runtime.call("state", self.runtime.context(), |engine, ctx, log| {
            engine.state(ctx, self.id.as_str(), log)
        })
    }

    /// Runs an additional process and returns its exit code.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is not running or the process
    /// cannot be started.
    pub fn exec(&self, process: &ProcessSpec, options: &ExecOptions) -> Result<i32> {
        let process = options.apply(process);
        self.runtime.call("exec", self.runtime.context(), |engine, ctx, log| {
            engine.exec(ctx, self.id.as_str(), &process, log)
        })
    }

    /// Applies new resource limits.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the limits.
    pub fn update_resources(&self, resources: &Value) -> Result<()> {
        self.runtime.call("update", self.runtime.context(), |engine, ctx, log| {
            engine.update(ctx, self.id.as_str(), resources, log)
        })
    }

    /// Freezes the container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is not running.
    pub fn pause(&self) -> Result<()> {
        self.runtime.call("pause", self.runtime.context(), |engine, ctx, log| {
            engine.pause(ctx, self.id.as_str(), log)
        })
    }

    /// Thaws a paused container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is not paused.
    pub fn unpause(&self) -> Result<()> {
        self.runtime.call("unpause", self.runtime.context(), |engine, ctx, log| {
            engine.unpause(ctx, self.id.as_str(), log)
        })
    }

    /// Returns whether the init process is alive.
    ///
    /// # Errors
    ///
    /// Returns an error if the container does not exist.
    pub fn is_running(&self) -> Result<bool> {
        self.runtime.call("is_running", self.runtime.context(), |engine, ctx, log| {
            engine.is_running(ctx, self.id.as_str(), log)
        })
    }

    /// Returns the container's process ids.
    ///
    /// # Errors
    ///
    /// Returns an error if the container does not exist.
    pub fn pids(&self, recurse: bool) -> Result<Vec<i32>> {
        self.runtime.call("read_pids", self.runtime.context(), |engine, ctx, log| {
            list::pid_list(engine.read_pids(ctx, self.id.as_str(), recurse, log)?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_options_override_process() {
        let process = ProcessSpec::new(["ls"]);
        let options = ExecOptions {
            terminal: true,
            cwd: Some("/tmp".into()),
        };
        let applied = options.apply(&process);
        assert!(applied.terminal);
        assert_eq!(applied.cwd, "/tmp");
        assert_eq!(applied.args, process.args);
    }

    #[test]
    fn default_exec_options_keep_process() {
        let process = ProcessSpec::new(["ls"]);
        assert_eq!(ExecOptions::default().apply(&process), process);
    }
}
