//! `tether state`: Print a container's state document.

use clap::Args;
use tether_common::config::RuntimeConfig;
use tether_common::types::ContainerId;

/// Arguments for the `state` command.
#[derive(Args, Debug)]
pub struct StateArgs {
    /// Container id.
    pub id: String,
}

/// Executes the `state` command.
///
/// # Errors
///
/// Returns an error if the container does not exist.
pub fn execute(args: StateArgs, config: RuntimeConfig) -> anyhow::Result<()> {
    let rt = super::runtime(&config);
    let state = rt.get(&ContainerId::new(args.id)).state()?;
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}
