//! Engine log records and the sinks that receive them.
//!
//! The engine never decides where its log records end up. It is handed an
//! [`EngineLog`] wrapping whichever [`LogSink`] the caller installed: a
//! callback on the synchronous path, a [`crate::relay::RelaySink`] or a
//! [`StderrSink`] inside a forked child.

use std::borrow::Cow;

use nix::errno::Errno;
use tether_common::types::Verbosity;

/// A single structured log message produced by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// System error code associated with the message, `0` if none.
    pub errno: i32,
    /// Raw verbosity level (see [`Verbosity`]).
    pub verbosity: i32,
    /// Message bytes; usually UTF-8 but not required to be.
    pub message: Vec<u8>,
}

impl LogRecord {
    /// Creates a record from its parts.
    pub fn new(errno: i32, verbosity: Verbosity, message: impl Into<Vec<u8>>) -> Self {
        Self {
            errno,
            verbosity: verbosity.as_raw(),
            message: message.into(),
        }
    }

    /// Returns the verbosity level of this record.
    #[must_use]
    pub const fn level(&self) -> Verbosity {
        Verbosity::from_raw(self.verbosity)
    }

    /// Returns the message as text, replacing invalid UTF-8 sequences.
    #[must_use]
    pub fn message_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.message)
    }

    /// Renders the record the way the stderr sink prints it, including the
    /// trailing newline.
    #[must_use]
    pub fn render_line(&self) -> Vec<u8> {
        let mut line = self.message.clone();
        if self.errno != 0 {
            line.extend_from_slice(b": ");
            line.extend_from_slice(Errno::from_raw(self.errno).desc().as_bytes());
        }
        line.push(b'\n');
        line
    }
}

/// Destination for engine log records.
pub trait LogSink: Send + Sync {
    /// Delivers one record. Delivery is best-effort and must not block the
    /// caller for long.
    fn emit(&self, record: &LogRecord);
}

impl<F> LogSink for F
where
    F: Fn(&LogRecord) + Send + Sync,
{
    fn emit(&self, record: &LogRecord) {
        self(record);
    }
}

/// Writes records to the process's standard error descriptor.
///
/// Uses a single raw `write(2)` per record and takes no locks, so it is
/// usable inside a forked child.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrSink;

impl LogSink for StderrSink {
    fn emit(&self, record: &LogRecord) {
        let line = record.render_line();
        let _ = nix::unistd::write(std::io::stderr(), &line);
    }
}

/// Logging handle passed to every engine operation.
///
/// Records more verbose than the threshold are dropped before reaching the
/// sink; errors always pass.
#[derive(Clone, Copy)]
pub struct EngineLog<'a> {
    sink: &'a dyn LogSink,
    threshold: Verbosity,
}

impl<'a> EngineLog<'a> {
    /// Creates a handle delivering to `sink` up to `threshold`.
    #[must_use]
    pub const fn new(sink: &'a dyn LogSink, threshold: Verbosity) -> Self {
        Self { sink, threshold }
    }

    /// Returns the verbosity threshold.
    #[must_use]
    pub const fn threshold(&self) -> Verbosity {
        self.threshold
    }

    /// Returns `true` if records at `level` would be delivered.
    #[must_use]
    pub fn enabled(&self, level: Verbosity) -> bool {
        level <= self.threshold
    }

    /// Emits a record at `level` with an optional raw error code.
    pub fn log(&self, errno: i32, level: Verbosity, message: &str) {
        if self.enabled(level) {
            self.sink.emit(&LogRecord::new(errno, level, message));
        }
    }

    /// Emits an error record.
    pub fn error(&self, errno: Option<Errno>, message: &str) {
        self.log(errno.map_or(0, |e| e as i32), Verbosity::Error, message);
    }

    /// Emits a warning record.
    pub fn warning(&self, message: &str) {
        self.log(0, Verbosity::Warning, message);
    }

    /// Emits a debug record.
    pub fn debug(&self, message: &str) {
        self.log(0, Verbosity::Debug, message);
    }
}

impl std::fmt::Debug for EngineLog<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineLog")
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}
