//! One-shot setup handshake between a launching parent and its child.
//!
//! The child writes a single native-endian `i32`: `0` once its setup is
//! complete, or the local `errno` of the step that failed. The parent reads
//! it exactly once. If the child dies first, the parent sees a short read.

use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::OwnedFd;

use nix::errno::Errno;
use nix::fcntl::OFlag;

/// Handshake value signalling a successful child setup.
pub const SETUP_COMPLETE: i32 = 0;

/// Both ends of a freshly created handshake pipe.
///
/// Created per launch; split with [`SyncPipe::into_parent`] or
/// [`SyncPipe::into_child`] right after `fork(2)` so each process only holds
/// the end it uses.
#[derive(Debug)]
pub struct SyncPipe {
    read: OwnedFd,
    write: OwnedFd,
}

impl SyncPipe {
    /// Creates the pipe with both ends marked close-on-exec.
    ///
    /// # Errors
    ///
    /// Returns the system error if `pipe2(2)` fails.
    pub fn new() -> Result<Self, Errno> {
        let (read, write) = nix::unistd::pipe2(OFlag::O_CLOEXEC)?;
        Ok(Self { read, write })
    }

    /// Keeps the read end and closes the write end. Parent side.
    #[must_use]
    pub fn into_parent(self) -> SyncReader {
        drop(self.write);
        SyncReader {
            file: File::from(self.read),
        }
    }

    /// Keeps the write end and closes the read end. Child side.
    #[must_use]
    pub fn into_child(self) -> SyncWriter {
        drop(self.read);
        SyncWriter {
            file: File::from(self.write),
        }
    }
}

/// Child-side end of the handshake.
#[derive(Debug)]
pub struct SyncWriter {
    file: File,
}

impl SyncWriter {
    /// Sends the handshake value and closes the pipe.
    ///
    /// The write is attempted once; failures are ignored because the parent
    /// treats a missing value as an abnormal child exit anyway.
    pub fn signal(mut self, code: i32) {
        let _ = self.file.write(&code.to_ne_bytes());
    }
}

/// Outcome of the handshake as observed by the parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handshake {
    /// The child reported a completed setup.
    Ready,
    /// The child reported a failed setup step with this system error code.
    SetupFailed(i32),
    /// The child went away without sending a complete value.
    Vanished,
}

/// Parent-side end of the handshake.
#[derive(Debug)]
pub struct SyncReader {
    file: File,
}

impl SyncReader {
    /// Blocks until the child sends its value or closes the pipe, then
    /// closes the read end.
    #[must_use]
    pub fn wait(mut self) -> Handshake {
        let mut buf = [0u8; 4];
        match self.file.read_exact(&mut buf) {
            Ok(()) => match i32::from_ne_bytes(buf) {
                SETUP_COMPLETE => Handshake::Ready,
                code => Handshake::SetupFailed(code),
            },
            Err(_) => Handshake::Vanished,
        }
    }
}
