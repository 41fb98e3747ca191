//! CLI command definitions and dispatch.

pub mod create;
pub mod delete;
pub mod kill;
pub mod list;
pub mod pause;
pub mod ps;
pub mod resume;
pub mod run;
pub mod spec;
pub mod start;
pub mod state;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tether_common::config::RuntimeConfig;
use tether_common::types::Verbosity;
use tether_core::log::LogRecord;
use tether_runtime::host::HostEngine;
use tether_runtime::registry::LogRegistry;
use tether_runtime::runtime::Runtime;

/// Tether: launch and supervise containers.
#[derive(Parser, Debug)]
#[command(name = "tether", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Directory holding per-container state.
    #[arg(long, global = true, env = "TETHER_ROOT")]
    pub root: Option<PathBuf>,

    /// JSON runtime configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log debug output, including the engine's debug records.
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print or write a baseline container definition.
    Spec(spec::SpecArgs),
    /// Create and start a container, waiting for it to exit.
    Run(run::RunArgs),
    /// Create a container without starting it.
    Create(create::CreateArgs),
    /// Start a created container.
    Start(start::StartArgs),
    /// Print a container's state document.
    State(state::StateArgs),
    /// List containers.
    List(list::ListArgs),
    /// Send a signal to a container.
    Kill(kill::KillArgs),
    /// Remove a container.
    Delete(delete::DeleteArgs),
    /// Freeze every process of a container.
    Pause(pause::PauseArgs),
    /// Thaw a paused container.
    Resume(resume::ResumeArgs),
    /// List the processes of a container.
    Ps(ps::PsArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or the command
/// fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let _ = LogRegistry::global().register(bridge);

    match cli.command {
        Command::Spec(args) => spec::execute(args, config),
        Command::Run(args) => run::execute(args, config),
        Command::Create(args) => create::execute(args, config),
        Command::Start(args) => start::execute(args, config),
        Command::State(args) => state::execute(args, config),
        Command::List(args) => list::execute(args, config),
        Command::Kill(args) => kill::execute(args, config),
        Command::Delete(args) => delete::execute(args, config),
        Command::Pause(args) => pause::execute(args, config),
        Command::Resume(args) => resume::execute(args, config),
        Command::Ps(args) => ps::execute(args, config),
    }
}

/// Builds a runtime over the host engine.
pub fn runtime(config: &RuntimeConfig) -> Runtime {
    Runtime::new(HostEngine::new(), config)
}

fn load_config(cli: &Cli) -> anyhow::Result<RuntimeConfig> {
    let mut config = match &cli.config {
        Some(path) => RuntimeConfig::from_file(path)?,
        None => RuntimeConfig::default(),
    };
    if let Some(root) = &cli.root {
        config.state_root = Some(root.clone());
    }
    if cli.debug {
        config.verbosity = Verbosity::Debug;
    }
    tracing::debug!(state_root = %config.effective_state_root().display(), "configuration loaded");
    Ok(config)
}

/// Forwards engine records into the subscriber.
fn bridge(record: &LogRecord) {
    let message = record.message_lossy();
    match record.level() {
        Verbosity::Error if record.errno != 0 => {
            tracing::error!(target: "tether::engine", errno = record.errno, "{message}");
        }
        Verbosity::Error => tracing::error!(target: "tether::engine", "{message}"),
        Verbosity::Warning => tracing::warn!(target: "tether::engine", "{message}"),
        Verbosity::Debug => tracing::debug!(target: "tether::engine", "{message}"),
    }
}
