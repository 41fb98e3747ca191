//! Routing of engine log records on the synchronous path.
//!
//! A [`LogRegistry`] holds at most one caller callback. It serves engine
//! calls made in this process only: a callback cannot cross into a forked
//! child, which logs through the wire relay instead.
//!
//! The registry is single-writer: `register` and `reset` are expected from
//! one owner at a time, while any number of readers may take a
//! [`ActiveSink`] snapshot concurrently.

use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use tether_core::log::{LogRecord, LogSink, StderrSink};

/// A caller-provided log callback.
pub type LogCallback = Arc<dyn Fn(&LogRecord) + Send + Sync>;

/// Token identifying a registered callback. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackHandle(NonZeroU64);

impl CallbackHandle {
    /// Raw token value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }

    /// Raw token of an optional handle; `0` means "no handle registered".
    #[must_use]
    pub const fn raw(handle: Option<Self>) -> u64 {
        match handle {
            Some(handle) => handle.get(),
            None => 0,
        }
    }
}

/// The sink in effect at the time of a snapshot.
#[derive(Clone)]
pub enum ActiveSink {
    /// A registered callback.
    Callback(LogCallback),
    /// The default: standard error.
    Stderr(StderrSink),
}

impl ActiveSink {
    /// Returns the callback if one was registered.
    #[must_use]
    pub fn callback(&self) -> Option<&LogCallback> {
        match self {
            Self::Callback(callback) => Some(callback),
            Self::Stderr(_) => None,
        }
    }
}

impl LogSink for ActiveSink {
    fn emit(&self, record: &LogRecord) {
        match self {
            Self::Callback(callback) => callback(record),
            Self::Stderr(sink) => sink.emit(record),
        }
    }
}

impl std::fmt::Debug for ActiveSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Callback(_) => f.write_str("ActiveSink::Callback"),
            Self::Stderr(_) => f.write_str("ActiveSink::Stderr"),
        }
    }
}

#[derive(Default)]
struct Slot {
    handle: Option<CallbackHandle>,
    callback: Option<LogCallback>,
}

/// Single-slot callback registry.
pub struct LogRegistry {
    slot: RwLock<Slot>,
    next: AtomicU64,
}

impl LogRegistry {
    /// Creates an empty registry whose sink is standard error.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(Slot::default()),
            next: AtomicU64::new(1),
        }
    }

    /// The process-wide registry.
    #[must_use]
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<LogRegistry>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Self::new())))
    }

    /// Installs `callback`, replacing any previous one, and returns its
    /// handle.
    pub fn register<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(&LogRecord) + Send + Sync + 'static,
    {
        let handle = self.next_handle();
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        slot.handle = Some(handle);
        slot.callback = Some(Arc::new(callback));
        tracing::debug!(handle = handle.get(), "log callback registered");
        handle
    }

    /// Drops the current callback; records go to standard error again.
    pub fn reset(&self) {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = slot.handle.take() {
            tracing::debug!(handle = handle.get(), "log callback released");
        }
        slot.callback = None;
    }

    /// Handle of the current callback, if any.
    #[must_use]
    pub fn handle(&self) -> Option<CallbackHandle> {
        self.slot.read().unwrap_or_else(PoisonError::into_inner).handle
    }

    /// The current callback, if any.
    #[must_use]
    pub fn callback(&self) -> Option<LogCallback> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .callback
            .clone()
    }

    /// Snapshot of the sink currently in effect. Never empty.
    #[must_use]
    pub fn sink(&self) -> ActiveSink {
        self.callback()
            .map_or(ActiveSink::Stderr(StderrSink), ActiveSink::Callback)
    }

    fn next_handle(&self) -> CallbackHandle {
        loop {
            let raw = self.next.fetch_add(1, Ordering::Relaxed);
            if let Some(value) = NonZeroU64::new(raw) {
                return CallbackHandle(value);
            }
        }
    }
}

impl Default for LogRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LogRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogRegistry")
            .field("handle", &self.handle())
            .finish_non_exhaustive()
    }
}
