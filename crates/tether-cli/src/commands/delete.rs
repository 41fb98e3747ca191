//! `tether delete`: Remove a container.

use clap::Args;
use tether_common::config::RuntimeConfig;
use tether_common::types::ContainerId;

/// Arguments for the `delete` command.
#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Container ids.
    #[arg(required = true)]
    pub ids: Vec<String>,

    /// Kill running containers first.
    #[arg(short, long)]
    pub force: bool,
}

/// Executes the `delete` command.
///
/// Every id is attempted; the first failure is reported after the rest
/// have been processed.
///
/// # Errors
///
/// Returns an error if any container could not be deleted.
pub fn execute(args: DeleteArgs, config: RuntimeConfig) -> anyhow::Result<()> {
    let rt = super::runtime(&config);
    let mut first_error = None;
    for id in args.ids {
        if let Err(err) = rt.get(&ContainerId::new(id.as_str())).delete(args.force) {
            tracing::error!(id = %id, error = %err, "delete failed");
            let _ = first_error.get_or_insert(err);
        }
    }
    match first_error {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}
