//! `tether spec`: Print or write a baseline container definition.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use tether_common::config::RuntimeConfig;
use tether_common::constants::CONFIG_FILE_NAME;

/// Arguments for the `spec` command.
#[derive(Args, Debug)]
pub struct SpecArgs {
    /// Generate a template for an unprivileged user.
    #[arg(long)]
    pub rootless: bool,

    /// Write `config.json` into this bundle instead of printing.
    #[arg(short, long)]
    pub bundle: Option<PathBuf>,
}

/// Executes the `spec` command.
///
/// # Errors
///
/// Returns an error if the template cannot be produced, or if the bundle
/// already holds a definition.
pub fn execute(args: SpecArgs, config: RuntimeConfig) -> anyhow::Result<()> {
    let template = super::runtime(&config).spec(args.rootless)?;
    let Some(bundle) = args.bundle else {
        println!("{template}");
        return Ok(());
    };

    let path = bundle.join(CONFIG_FILE_NAME);
    anyhow::ensure!(!path.exists(), "`{}` already exists", path.display());
    std::fs::write(&path, template)
        .with_context(|| format!("cannot write `{}`", path.display()))?;
    tracing::info!(path = %path.display(), rootless = args.rootless, "definition written");
    Ok(())
}
