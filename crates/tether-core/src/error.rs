//! Engine error values and their one-way conversion into reports.
//!
//! An [`EngineError`] is produced by the engine or by the launch supervisor
//! and must be converted exactly once. It deliberately implements neither
//! `Clone` nor `Display`: the consuming [`EngineError::into_report`] is the
//! only way to read it, so a second use does not compile.

use nix::errno::Errno;
use tether_common::error::TetherError;

/// A failure reported by the engine or the launch supervisor.
#[derive(Debug)]
#[must_use = "engine errors must be converted with `into_report`"]
pub struct EngineError {
    message: String,
    errno: Option<i32>,
}

impl EngineError {
    /// Creates an error carrying no system error code.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            errno: None,
        }
    }

    /// Creates an error carrying a system error code.
    pub fn with_errno(errno: Errno, message: impl Into<String>) -> Self {
        Self::from_raw_errno(errno as i32, message)
    }

    /// Creates an error from a raw system error code; `0` means none.
    pub fn from_raw_errno(errno: i32, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            errno: (errno != 0).then_some(errno),
        }
    }

    /// Creates an error from the calling thread's current `errno`.
    pub fn last_os(message: impl Into<String>) -> Self {
        Self::with_errno(Errno::last(), message)
    }

    /// Creates an error from a `std::io::Error`, keeping its OS code.
    pub fn from_io(err: &std::io::Error, message: impl Into<String>) -> Self {
        Self::from_raw_errno(err.raw_os_error().unwrap_or(0), message)
    }

    /// Returns the raw system error code, if any.
    #[must_use]
    pub const fn errno(&self) -> Option<i32> {
        self.errno
    }

    /// Consumes the error and produces its final message and status.
    ///
    /// The message is verbatim when no system code is attached, otherwise
    /// `"<message>: <system error description>"`. The status is the system
    /// code or `0`.
    #[must_use]
    pub fn into_report(self) -> ErrorReport {
        match self.errno {
            None => ErrorReport {
                message: self.message,
                status: 0,
            },
            Some(code) => ErrorReport {
                message: format!("{}: {}", self.message, Errno::from_raw(code).desc()),
                status: code,
            },
        }
    }
}

/// Final, owned form of an [`EngineError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    /// Descriptive message, with the system error description appended.
    pub message: String,
    /// System error code, `0` when none was attached.
    pub status: i32,
}

/// Converts an optional engine error into a message and status.
///
/// An absent error yields no message and status `0`.
pub fn marshal(err: Option<EngineError>) -> (Option<String>, i32) {
    match err {
        None => (None, 0),
        Some(err) => {
            let report = err.into_report();
            (Some(report.message), report.status)
        }
    }
}

impl From<EngineError> for TetherError {
    fn from(err: EngineError) -> Self {
        let report = err.into_report();
        Self::engine(report.message, report.status)
    }
}
