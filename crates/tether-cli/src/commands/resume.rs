//! `tether resume`: Thaw a paused container.

use clap::Args;
use tether_common::config::RuntimeConfig;
use tether_common::types::ContainerId;

/// Arguments for the `resume` command.
#[derive(Args, Debug)]
pub struct ResumeArgs {
    /// Container id.
    pub id: String,
}

/// Executes the `resume` command.
///
/// # Errors
///
/// Returns an error if the container is not paused.
pub fn execute(args: ResumeArgs, config: RuntimeConfig) -> anyhow::Result<()> {
    super::runtime(&config).get(&ContainerId::new(args.id)).unpause()?;
    Ok(())
}
