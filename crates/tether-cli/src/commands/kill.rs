//! `tether kill`: Send a signal to a container.

use clap::Args;
use tether_common::config::RuntimeConfig;
use tether_common::types::{ContainerId, Signal};

/// Arguments for the `kill` command.
#[derive(Args, Debug)]
pub struct KillArgs {
    /// Container id.
    pub id: String,

    /// Signal name or number.
    #[arg(default_value = "SIGTERM")]
    pub signal: Signal,

    /// Signal every process of the container, not just init.
    #[arg(short, long)]
    pub all: bool,
}

/// Executes the `kill` command.
///
/// # Errors
///
/// Returns an error if the container is not running.
pub fn execute(args: KillArgs, config: RuntimeConfig) -> anyhow::Result<()> {
    let rt = super::runtime(&config);
    let container = rt.get(&ContainerId::new(args.id));
    if args.all {
        container.kill_all(args.signal)?;
    } else {
        container.kill(args.signal)?;
    }
    tracing::debug!(id = %container.id(), signal = %args.signal, all = args.all, "signal sent");
    Ok(())
}
