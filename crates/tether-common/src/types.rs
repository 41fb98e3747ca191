//! Domain primitive types used across the Tether workspace.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TetherError;

/// Unique identifier for a container instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerId(String);

impl ContainerId {
    /// Creates a new container ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random container ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Severity of an engine log record.
///
/// The numeric values travel on the wire; records whose level is above the
/// configured threshold are dropped before they reach a sink.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    /// Errors only.
    #[default]
    Error = 0,
    /// Errors and warnings.
    Warning = 1,
    /// Everything, including debug chatter.
    Debug = 2,
}

impl Verbosity {
    /// Converts a raw wire value into a verbosity.
    ///
    /// Values above the known range map to [`Verbosity::Debug`], negative
    /// values to [`Verbosity::Error`].
    #[must_use]
    pub const fn from_raw(raw: i32) -> Self {
        match raw {
            i32::MIN..=0 => Self::Error,
            1 => Self::Warning,
            _ => Self::Debug,
        }
    }

    /// Returns the raw wire value.
    #[must_use]
    pub const fn as_raw(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Debug => write!(f, "debug"),
        }
    }
}

/// Signals accepted by kill operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    /// Graceful termination request.
    #[serde(rename = "SIGTERM")]
    Term,
    /// Forced termination.
    #[serde(rename = "SIGKILL")]
    Kill,
    /// Interrupt.
    #[serde(rename = "SIGINT")]
    Int,
    /// Hang-up.
    #[serde(rename = "SIGHUP")]
    Hup,
    /// User-defined signal 1.
    #[serde(rename = "SIGUSR1")]
    Usr1,
    /// User-defined signal 2.
    #[serde(rename = "SIGUSR2")]
    Usr2,
    /// Stop (freeze) the process.
    #[serde(rename = "SIGSTOP")]
    Stop,
    /// Continue a stopped process.
    #[serde(rename = "SIGCONT")]
    Cont,
}

impl Signal {
    const ALL: [Self; 8] = [
        Self::Term,
        Self::Kill,
        Self::Int,
        Self::Hup,
        Self::Usr1,
        Self::Usr2,
        Self::Stop,
        Self::Cont,
    ];

    /// Returns the canonical `SIG`-prefixed name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Term => "SIGTERM",
            Self::Kill => "SIGKILL",
            Self::Int => "SIGINT",
            Self::Hup => "SIGHUP",
            Self::Usr1 => "SIGUSR1",
            Self::Usr2 => "SIGUSR2",
            Self::Stop => "SIGSTOP",
            Self::Cont => "SIGCONT",
        }
    }

    /// Returns the platform signal number.
    #[must_use]
    pub const fn as_raw(self) -> i32 {
        match self {
            Self::Term => libc::SIGTERM,
            Self::Kill => libc::SIGKILL,
            Self::Int => libc::SIGINT,
            Self::Hup => libc::SIGHUP,
            Self::Usr1 => libc::SIGUSR1,
            Self::Usr2 => libc::SIGUSR2,
            Self::Stop => libc::SIGSTOP,
            Self::Cont => libc::SIGCONT,
        }
    }
}

impl FromStr for Signal {
    type Err = TetherError;

    /// Parses `SIGTERM`, `TERM`, `term`, or a signal number such as `15`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(num) = trimmed.parse::<i32>() {
            return Self::ALL
                .into_iter()
                .find(|sig| sig.as_raw() == num)
                .ok_or_else(|| TetherError::Config {
                    message: format!("unsupported signal number: {num}"),
                });
        }
        let upper = trimmed.to_ascii_uppercase();
        let name = upper.strip_prefix("SIG").unwrap_or(&upper);
        Self::ALL
            .into_iter()
            .find(|sig| &sig.name()[3..] == name)
            .ok_or_else(|| TetherError::Config {
                message: format!("unknown signal: {s}"),
            })
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle status of a container as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    /// The engine is still setting the container up.
    Creating,
    /// Created but not yet started.
    Created,
    /// The init process is running.
    Running,
    /// The init process has exited.
    Stopped,
    /// All processes are frozen.
    Paused,
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Creating => write!(f, "creating"),
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Paused => write!(f, "paused"),
        }
    }
}

/// State document returned by the engine for a single container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerState {
    /// OCI runtime specification version.
    pub oci_version: String,
    /// Container identifier.
    pub id: String,
    /// Current lifecycle status.
    pub status: ContainerStatus,
    /// PID of the init process, `0` when none is running.
    #[serde(default)]
    pub pid: i32,
    /// Absolute path of the bundle directory.
    pub bundle: String,
    /// Free-form annotations copied from the definition.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Creation timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_from_raw_clamps() {
        assert_eq!(Verbosity::from_raw(-3), Verbosity::Error);
        assert_eq!(Verbosity::from_raw(0), Verbosity::Error);
        assert_eq!(Verbosity::from_raw(1), Verbosity::Warning);
        assert_eq!(Verbosity::from_raw(2), Verbosity::Debug);
        assert_eq!(Verbosity::from_raw(9), Verbosity::Debug);
    }

    #[test]
    fn verbosity_orders_by_chattiness() {
        assert!(Verbosity::Error < Verbosity::Warning);
        assert!(Verbosity::Warning < Verbosity::Debug);
    }

    #[test]
    fn signal_parses_names_and_numbers() {
        assert_eq!("SIGTERM".parse::<Signal>().expect("parse"), Signal::Term);
        assert_eq!("kill".parse::<Signal>().expect("parse"), Signal::Kill);
        assert_eq!("9".parse::<Signal>().expect("parse"), Signal::Kill);
        assert_eq!(" hup ".parse::<Signal>().expect("parse"), Signal::Hup);
        assert!("SIGWINCH".parse::<Signal>().is_err());
        assert!("4242".parse::<Signal>().is_err());
    }

    #[test]
    fn signal_display_is_canonical_name() {
        assert_eq!(Signal::Usr1.to_string(), "SIGUSR1");
        assert_eq!(Signal::Cont.as_raw(), libc::SIGCONT);
    }

    #[test]
    fn container_state_deserializes_engine_json() {
        let json = r#"{
            "ociVersion": "1.0.2",
            "id": "web",
            "status": "running",
            "pid": 4242,
            "bundle": "/srv/web",
            "annotations": {"org.example/owner": "ops"},
            "created": "2025-01-02T03:04:05Z"
        }"#;
        let state: ContainerState = serde_json::from_str(json).expect("deserialize");
        assert_eq!(state.id, "web");
        assert_eq!(state.status, ContainerStatus::Running);
        assert_eq!(state.pid, 4242);
        assert_eq!(
            state.annotations.get("org.example/owner").map(String::as_str),
            Some("ops")
        );
        assert!(state.created.is_some());
    }

    #[test]
    fn container_state_tolerates_missing_optional_fields() {
        let json = r#"{"ociVersion":"1.0.2","id":"a","status":"stopped","bundle":"/b"}"#;
        let state: ContainerState = serde_json::from_str(json).expect("deserialize");
        assert_eq!(state.pid, 0);
        assert!(state.annotations.is_empty());
        assert!(state.created.is_none());
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(ContainerId::generate(), ContainerId::generate());
    }
}
