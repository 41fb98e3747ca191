//! `tether list`: List containers.

use clap::Args;
use tether_common::config::RuntimeConfig;

/// Arguments for the `list` command.
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Print ids only.
    #[arg(short, long)]
    pub quiet: bool,
}

/// Executes the `list` command.
///
/// Containers whose state cannot be read are still listed, with `-` in
/// place of the missing columns.
///
/// # Errors
///
/// Returns an error if the state root cannot be enumerated.
pub fn execute(args: ListArgs, config: RuntimeConfig) -> anyhow::Result<()> {
    let rt = super::runtime(&config);
    let containers = rt.list()?;

    if args.quiet {
        for container in &containers {
            println!("{}", container.id().as_str());
        }
        return Ok(());
    }

    println!("{:<32} {:<10} {:<8} {:<26} BUNDLE", "ID", "STATUS", "PID", "CREATED");
    for container in &containers {
        match container.state() {
            Ok(state) => println!(
                "{:<32} {:<10} {:<8} {:<26} {}",
                container.id().as_str(),
                state.status.to_string(),
                state.pid,
                state
                    .created
                    .map_or_else(|| "-".to_string(), |t| t.to_rfc3339()),
                state.bundle,
            ),
            Err(err) => {
                tracing::warn!(id = %container.id(), error = %err, "cannot read state");
                println!(
                    "{:<32} {:<10} {:<8} {:<26} -",
                    container.id().as_str(),
                    "-",
                    "-",
                    "-"
                );
            }
        }
    }
    Ok(())
}
