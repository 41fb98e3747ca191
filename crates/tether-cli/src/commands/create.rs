//! `tether create`: Create a container without starting it.

use std::path::PathBuf;

use clap::Args;
use tether_common::config::RuntimeConfig;
use tether_common::constants::CONFIG_FILE_NAME;
use tether_common::types::ContainerId;
use tether_runtime::definition::ContainerDefinition;
use tether_runtime::engine::CreateFlags;

/// Arguments for the `create` command.
#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Container id.
    pub id: String,

    /// Bundle directory holding `config.json`.
    #[arg(short, long, default_value = tether_common::constants::DEFAULT_BUNDLE)]
    pub bundle: PathBuf,

    /// File to write the init PID to once started.
    #[arg(long)]
    pub pid_file: Option<PathBuf>,
}

/// Executes the `create` command.
///
/// # Errors
///
/// Returns an error if the definition cannot be loaded or the container
/// already exists.
pub fn execute(args: CreateArgs, mut config: RuntimeConfig) -> anyhow::Result<()> {
    config.bundle = args.bundle;
    config.pid_file = args.pid_file;
    let definition = load_definition(&config)?;
    let rt = super::runtime(&config);
    let container = rt.create(&ContainerId::new(args.id), &definition, CreateFlags::empty())?;
    tracing::info!(id = %container.id(), "created");
    Ok(())
}

/// Reads `config.json` from the configured bundle.
///
/// # Errors
///
/// Returns an error if the file is missing or malformed.
pub fn load_definition(config: &RuntimeConfig) -> anyhow::Result<ContainerDefinition> {
    let path = config.bundle.join(CONFIG_FILE_NAME);
    ContainerDefinition::from_file(&path).map_err(|err| {
        let report = err.into_report();
        anyhow::anyhow!(report.message)
    })
}
