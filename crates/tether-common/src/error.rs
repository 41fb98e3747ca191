//! Unified error types for the Tether workspace.
//!
//! Engine failures reach callers as [`TetherError::Engine`] after they have
//! been marshaled into a message and a status code; the raw engine error
//! value never leaves `tether-core`.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum TetherError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// The container engine (or the launch supervisor) reported a failure.
    #[error("{message}")]
    Engine {
        /// Classification derived from the message and status.
        kind: EngineErrorKind,
        /// Marshaled message, with the system error description appended
        /// when a status was present.
        message: String,
        /// System error code, `0` when none was attached.
        status: i32,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl TetherError {
    /// Builds an engine error from an already marshaled message and status.
    #[must_use]
    pub fn engine(message: impl Into<String>, status: i32) -> Self {
        let message = message.into();
        Self::Engine {
            kind: EngineErrorKind::classify(&message, status),
            message,
            status,
        }
    }

    /// Returns the engine error classification, or `None` for errors that
    /// did not originate from the engine.
    #[must_use]
    pub const fn kind(&self) -> Option<EngineErrorKind> {
        match self {
            Self::Engine { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Returns the system error code attached to an engine error.
    #[must_use]
    pub const fn status(&self) -> Option<i32> {
        match self {
            Self::Engine { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns `true` if the engine reported a missing container or
    /// resource.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self.kind(), Some(EngineErrorKind::NotFound))
    }
}

/// Coarse classification of engine failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineErrorKind {
    /// No more specific classification applies.
    Unknown,
    /// The container or one of its resources does not exist.
    NotFound,
    /// A container with the same id already exists.
    AlreadyExists,
    /// The container definition could not be parsed or is invalid.
    InvalidSpec,
    /// The operation was refused by the kernel or the engine.
    PermissionDenied,
    /// The operation requires a stopped container.
    ContainerRunning,
    /// The operation requires a running container.
    ContainerNotRunning,
}

impl EngineErrorKind {
    /// Derives a classification from a marshaled message and its status.
    ///
    /// Rules are checked in order; the first match wins.
    #[must_use]
    pub fn classify(message: &str, status: i32) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("not found") || lower.contains("does not exist") {
            Self::NotFound
        } else if lower.contains("already exists") {
            Self::AlreadyExists
        } else if lower.contains("invalid") || lower.contains("parse") {
            Self::InvalidSpec
        } else if lower.contains("permission") || status == libc::EPERM || status == libc::EACCES
        {
            Self::PermissionDenied
        } else if lower.contains("not running") {
            Self::ContainerNotRunning
        } else if lower.contains("running") {
            Self::ContainerRunning
        } else {
            Self::Unknown
        }
    }
}

impl fmt::Display for EngineErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::NotFound => "not found",
            Self::AlreadyExists => "already exists",
            Self::InvalidSpec => "invalid spec",
            Self::PermissionDenied => "permission denied",
            Self::ContainerRunning => "container running",
            Self::ContainerNotRunning => "container not running",
        };
        f.write_str(s)
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, TetherError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_not_found_variants() {
        assert_eq!(
            EngineErrorKind::classify("container `web` not found", 0),
            EngineErrorKind::NotFound
        );
        assert_eq!(
            EngineErrorKind::classify("state file does not exist", 2),
            EngineErrorKind::NotFound
        );
    }

    #[test]
    fn classify_already_exists() {
        assert_eq!(
            EngineErrorKind::classify("container `web` already exists", 17),
            EngineErrorKind::AlreadyExists
        );
    }

    #[test]
    fn classify_invalid_spec() {
        assert_eq!(
            EngineErrorKind::classify("cannot parse process: missing args", 0),
            EngineErrorKind::InvalidSpec
        );
    }

    #[test]
    fn classify_permission_by_status() {
        assert_eq!(
            EngineErrorKind::classify("mount failed", libc::EPERM),
            EngineErrorKind::PermissionDenied
        );
        assert_eq!(
            EngineErrorKind::classify("open failed", libc::EACCES),
            EngineErrorKind::PermissionDenied
        );
    }

    #[test]
    fn classify_running_states_checks_not_running_first() {
        assert_eq!(
            EngineErrorKind::classify("container is not running", 0),
            EngineErrorKind::ContainerNotRunning
        );
        assert_eq!(
            EngineErrorKind::classify("container is running", 0),
            EngineErrorKind::ContainerRunning
        );
    }

    #[test]
    fn classify_unknown_fallback() {
        assert_eq!(
            EngineErrorKind::classify("something odd", 0),
            EngineErrorKind::Unknown
        );
    }

    #[test]
    fn engine_error_exposes_kind_and_status() {
        let err = TetherError::engine("container `x` not found", 2);
        assert_eq!(err.kind(), Some(EngineErrorKind::NotFound));
        assert_eq!(err.status(), Some(2));
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "container `x` not found");
    }

    #[test]
    fn non_engine_errors_have_no_kind() {
        let err = TetherError::Config {
            message: "bad".into(),
        };
        assert!(err.kind().is_none());
        assert!(!err.is_not_found());
    }

    #[test]
    fn only_engine_not_found_is_not_found() {
        assert!(TetherError::engine("state file does not exist", libc::ENOENT).is_not_found());
        assert!(!TetherError::engine("container `x` already exists", libc::EEXIST).is_not_found());
        let io = TetherError::Io {
            path: "/missing".into(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(!io.is_not_found());
    }
}
