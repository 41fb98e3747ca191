//! `tether pause`: Freeze every process of a container.

use clap::Args;
use tether_common::config::RuntimeConfig;
use tether_common::types::ContainerId;

/// Arguments for the `pause` command.
#[derive(Args, Debug)]
pub struct PauseArgs {
    /// Container id.
    pub id: String,
}

/// Executes the `pause` command.
///
/// # Errors
///
/// Returns an error if the container is not running.
pub fn execute(args: PauseArgs, config: RuntimeConfig) -> anyhow::Result<()> {
    super::runtime(&config).get(&ContainerId::new(args.id)).pause()?;
    Ok(())
}
