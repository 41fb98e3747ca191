//! Caller-facing runtime: an engine, a context and a log registry.

use std::sync::Arc;

use tether_common::config::RuntimeConfig;
use tether_common::error::{Result, TetherError};
use tether_common::types::ContainerId;
use tether_core::error::EngineError;
use tether_core::log::EngineLog;

use crate::container::Container;
use crate::context::LaunchContext;
use crate::definition::{ContainerDefinition, DefinitionBuilder};
use crate::engine::{CreateFlags, Engine, RunFlags};
use crate::io::{IoConfig, RunResult};
use crate::list;
use crate::registry::LogRegistry;

/// Entry point for running and managing containers.
///
/// Synchronous engine calls log through the registry's current sink.
/// [`Runtime::run_with_io`] forks instead and relays the child's records
/// through a pipe.
pub struct Runtime {
    engine: Box<dyn Engine>,
    context: LaunchContext,
    registry: Arc<LogRegistry>,
}

impl Runtime {
    /// Creates a runtime over `engine` using the process-wide log registry.
    pub fn new(engine: impl Engine + 'static, config: &RuntimeConfig) -> Self {
        Self {
            engine: Box::new(engine),
            context: LaunchContext::from_config(config),
            registry: LogRegistry::global(),
        }
    }

    /// Replaces the log registry.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<LogRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// The base launch context.
    #[must_use]
    pub const fn context(&self) -> &LaunchContext {
        &self.context
    }

    /// The log registry in use.
    #[must_use]
    pub fn registry(&self) -> &LogRegistry {
        &self.registry
    }

    /// The engine.
    #[must_use]
    pub fn engine(&self) -> &dyn Engine {
        self.engine.as_ref()
    }

    /// Invokes the engine synchronously with a log handle bound to the
    /// registry's current sink.
    pub(crate) fn call<T>(
        &self,
        operation: &'static str,
        ctx: &LaunchContext,
        f: impl FnOnce(&dyn Engine, &LaunchContext, EngineLog<'_>) -> std::result::Result<T, EngineError>,
    ) -> Result<T> {
        let sink = self.registry.sink();
        let log = EngineLog::new(&sink, ctx.verbosity());
        f(self.engine.as_ref(), ctx, log).map_err(|err| {
            let err = TetherError::from(err);
            tracing::debug!(operation, error = %err, "engine call failed");
            err
        })
    }

    /// Creates and starts a container in this process, returning the
    /// engine's result code.
    ///
    /// Unless the context is detached this blocks until the container
    /// exits. The container's streams are this process's streams.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails to set the container up.
    pub fn run(
        &self,
        id: &ContainerId,
        definition: &ContainerDefinition,
        flags: RunFlags,
    ) -> Result<i32> {
        let ctx = self.context.for_container(id);
        let code = self.call("run", &ctx, |engine, ctx, log| {
            engine.run(ctx, definition, flags, log)
        })?;
        tracing::info!(id = %id, code, "container run finished");
        Ok(code)
    }

    /// Creates a container without starting it.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails to create the container.
    pub fn create(
        &self,
        id: &ContainerId,
        definition: &ContainerDefinition,
        flags: CreateFlags,
    ) -> Result<Container<'_>> {
        let ctx = self.context.for_container(id);
        let _ = self.call("create", &ctx, |engine, ctx, log| {
            engine.create(ctx, definition, flags, log)
        })?;
        tracing::info!(id = %id, "container created");
        Ok(self.get(id))
    }

    /// Runs a container in a forked child with piped standard streams.
    ///
    /// Uses pipes, not a terminal: definitions should not request one.
    /// Each call gets its own pipes, so any number of containers can run
    /// concurrently. If a log callback is registered, the child's engine
    /// records are relayed to it.
    ///
    /// # Errors
    ///
    /// Returns an error if a pipe cannot be created or the child fails
    /// before completing its stream setup.
    pub fn run_with_io(
        &self,
        id: &ContainerId,
        definition: &ContainerDefinition,
        io: IoConfig,
    ) -> Result<RunResult<'_>> {
        crate::io::run_with_io(self, id, definition, io)
    }

    /// Returns handles for every container under the state root.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot enumerate containers.
    pub fn list(&self) -> Result<Vec<Container<'_>>> {
        Ok(self
            .list_ids()?
            .into_iter()
            .map(|id| self.get(&ContainerId::new(id)))
            .collect())
    }

    /// Returns the ids of every container under the state root.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot enumerate containers.
    pub fn list_ids(&self) -> Result<Vec<String>> {
        let root = self.context.state_root().to_path_buf();
        self.call("list", &self.context, |engine, _, log| {
            list::container_names(engine.list(&root, log)?)
        })
    }

    /// Returns a handle for an existing container.
    ///
    /// Existence is not checked; the first operation reports it.
    #[must_use]
    pub fn get(&self, id: &ContainerId) -> Container<'_> {
        Container::new(id.clone(), self)
    }

    /// Returns the engine's baseline definition template.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot produce a template.
    pub fn spec(&self, rootless: bool) -> Result<String> {
        self.call("spec", &self.context, |engine, _, log| engine.spec(rootless, log))
    }

    /// Returns a builder seeded with the engine's template.
    ///
    /// # Errors
    ///
    /// Returns an error if the template cannot be produced or parsed.
    pub fn new_definition(&self, rootless: bool) -> Result<DefinitionBuilder> {
        let template = self.spec(rootless)?;
        Ok(DefinitionBuilder::from_json(&template)?)
    }

    /// Returns whether the container's init process is alive.
    ///
    /// # Errors
    ///
    /// Returns an error if the container does not exist.
    pub fn is_running(&self, id: &ContainerId) -> Result<bool> {
        self.get(id).is_running()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("context", &self.context)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
