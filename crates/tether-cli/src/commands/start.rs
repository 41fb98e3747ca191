//! `tether start`: Start a created container.

use clap::Args;
use tether_common::config::RuntimeConfig;
use tether_common::types::ContainerId;

/// Arguments for the `start` command.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Container id.
    pub id: String,
}

/// Executes the `start` command.
///
/// # Errors
///
/// Returns an error if the container does not exist or is not in the
/// created state.
pub fn execute(args: StartArgs, config: RuntimeConfig) -> anyhow::Result<()> {
    let rt = super::runtime(&config);
    rt.get(&ContainerId::new(args.id)).start()?;
    Ok(())
}
