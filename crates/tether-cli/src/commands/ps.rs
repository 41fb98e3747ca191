//! `tether ps`: List the processes of a container.

use clap::Args;
use tether_common::config::RuntimeConfig;
use tether_common::types::ContainerId;

/// Arguments for the `ps` command.
#[derive(Args, Debug)]
pub struct PsArgs {
    /// Container id.
    pub id: String,

    /// Include processes in nested groups.
    #[arg(short, long)]
    pub recurse: bool,

    /// Print a JSON array.
    #[arg(long)]
    pub json: bool,
}

/// Executes the `ps` command.
///
/// # Errors
///
/// Returns an error if the container does not exist.
pub fn execute(args: PsArgs, config: RuntimeConfig) -> anyhow::Result<()> {
    let rt = super::runtime(&config);
    let pids = rt.get(&ContainerId::new(args.id)).pids(args.recurse)?;
    if args.json {
        println!("{}", serde_json::to_string(&pids)?);
    } else {
        println!("PID");
        for pid in pids {
            println!("{pid}");
        }
    }
    Ok(())
}
