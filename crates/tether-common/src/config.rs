//! Runtime configuration model.
//!
//! A [`RuntimeConfig`] carries everything the engine needs besides the
//! container definition itself. It is turned into a launch context by
//! `tether-runtime`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TetherError};
use crate::types::Verbosity;

/// Configuration for a runtime instance.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RuntimeConfig {
    /// Container id bound to the context, if any.
    pub id: Option<String>,
    /// Bundle directory holding the container definition.
    pub bundle: PathBuf,
    /// Directory where the engine keeps per-container state.
    pub state_root: Option<PathBuf>,
    /// Unix socket receiving the terminal master, if a console is wanted.
    pub console_socket: Option<PathBuf>,
    /// File the init PID is written to after creation.
    pub pid_file: Option<PathBuf>,
    /// Socket forwarded to the container for readiness notification.
    pub notify_socket: Option<PathBuf>,
    /// Name of an alternate execution handler.
    pub handler: Option<String>,
    /// Delegate cgroup management to systemd.
    pub systemd_cgroup: bool,
    /// Do not wait for the container process.
    pub detach: bool,
    /// Do not create a new session keyring.
    pub no_new_keyring: bool,
    /// Skip cgroup setup entirely.
    pub force_no_cgroup: bool,
    /// Use `chroot` instead of `pivot_root`.
    pub no_pivot: bool,
    /// Threshold for engine log records.
    pub verbosity: Verbosity,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            id: None,
            bundle: PathBuf::from(crate::constants::DEFAULT_BUNDLE),
            state_root: None,
            console_socket: None,
            pid_file: None,
            notify_socket: None,
            handler: None,
            systemd_cgroup: false,
            detach: false,
            no_new_keyring: false,
            force_no_cgroup: false,
            no_pivot: false,
            verbosity: Verbosity::Error,
        }
    }
}

impl RuntimeConfig {
    /// Loads a configuration from a JSON file.
    ///
    /// Missing fields take their default values.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| TetherError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&content)?;
        validate(&config)?;
        Ok(config)
    }

    /// Returns the configured state root or the session default.
    #[must_use]
    pub fn effective_state_root(&self) -> PathBuf {
        self.state_root
            .clone()
            .unwrap_or_else(|| crate::constants::default_state_root().clone())
    }
}

fn validate(config: &RuntimeConfig) -> Result<()> {
    if config.bundle.as_os_str().is_empty() {
        return Err(TetherError::Config {
            message: "bundle path must not be empty".into(),
        });
    }
    if config.id.as_deref().is_some_and(str::is_empty) {
        return Err(TetherError::Config {
            message: "container id must not be empty".into(),
        });
    }
    Ok(())
}
