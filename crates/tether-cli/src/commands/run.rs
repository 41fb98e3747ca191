//! `tether run`: Create and start a container, waiting for it to exit.

use std::path::PathBuf;

use clap::Args;
use tether_common::config::RuntimeConfig;
use tether_common::types::ContainerId;
use tether_runtime::engine::RunFlags;
use tether_runtime::io::{InputSource, IoConfig};

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Container id; generated when omitted.
    pub id: Option<String>,

    /// Bundle directory holding `config.json`.
    #[arg(short, long, default_value = tether_common::constants::DEFAULT_BUNDLE)]
    pub bundle: PathBuf,

    /// Return as soon as the container is started.
    #[arg(short, long)]
    pub detach: bool,

    /// File to write the init PID to.
    #[arg(long)]
    pub pid_file: Option<PathBuf>,
}

/// Executes the `run` command.
///
/// Attached runs fork a supervising child whose standard streams are this
/// process's streams, then exit with the container's exit code.
///
/// # Errors
///
/// Returns an error if the definition cannot be loaded or the container
/// cannot be launched.
pub fn execute(args: RunArgs, mut config: RuntimeConfig) -> anyhow::Result<()> {
    config.bundle = args.bundle;
    config.detach = args.detach;
    config.pid_file = args.pid_file;
    let definition = super::create::load_definition(&config)?;
    let id = args.id.map_or_else(ContainerId::generate, ContainerId::new);
    let rt = super::runtime(&config);

    if args.detach {
        let _ = rt.run(&id, &definition, RunFlags::empty())?;
        println!("{id}");
        return Ok(());
    }

    let io = IoConfig::new().stdin(InputSource::reader(std::io::stdin()));
    let code = rt.run_with_io(&id, &definition, io)?.wait()?;
    tracing::debug!(id = %id, code, "run finished");
    if code != 0 {
        std::process::exit(code.clamp(1, 255));
    }
    Ok(())
}
