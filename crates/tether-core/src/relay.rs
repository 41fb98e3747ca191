//! Wire log relay: framed log records over a unidirectional pipe.
//!
//! Frame layout, native byte order:
//!
//! ```text
//! +-----------+-----------+-----------+------------------+
//! | errno i32 | level i32 | len u32   | message[len]     |
//! +-----------+-----------+-----------+------------------+
//! ```
//!
//! There is no record delimiter. The writer never retries; the reader stops
//! at the first incomplete frame.

use std::io::Read;
use std::os::fd::BorrowedFd;

use crate::log::{LogRecord, LogSink};

/// Size of the fixed frame header in bytes.
pub const FRAME_HEADER_LEN: usize = 12;

/// Encodes one record into a standalone frame.
///
/// Messages longer than `u32::MAX` bytes are truncated.
#[must_use]
pub fn encode(record: &LogRecord) -> Vec<u8> {
    let len = u32::try_from(record.message.len()).unwrap_or(u32::MAX);
    let body = &record.message[..len as usize];
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + body.len());
    frame.extend_from_slice(&record.errno.to_ne_bytes());
    frame.extend_from_slice(&record.verbosity.to_ne_bytes());
    frame.extend_from_slice(&len.to_ne_bytes());
    frame.extend_from_slice(body);
    frame
}

/// Child-side sink that writes each record as one frame.
///
/// Writes are best-effort: failures and partial writes are ignored so a
/// slow or absent reader never stalls the supervised child.
#[derive(Debug, Clone, Copy)]
pub struct RelaySink<'fd> {
    fd: BorrowedFd<'fd>,
}

impl<'fd> RelaySink<'fd> {
    /// Creates a sink writing to `fd`.
    #[must_use]
    pub const fn new(fd: BorrowedFd<'fd>) -> Self {
        Self { fd }
    }
}

impl LogSink for RelaySink<'_> {
    fn emit(&self, record: &LogRecord) {
        let frame = encode(record);
        let _ = nix::unistd::write(self.fd, &frame);
    }
}

/// Parent-side reader reconstructing records from a relay stream.
///
/// Iteration ends at end-of-stream, at a truncated frame, or on a read
/// error. A finished reader keeps returning `None`.
#[derive(Debug)]
pub struct RelayReader<R> {
    inner: R,
    finished: bool,
}

impl<R: Read> RelayReader<R> {
    /// Wraps a byte stream.
    pub const fn new(inner: R) -> Self {
        Self {
            inner,
            finished: false,
        }
    }

    /// Returns the underlying stream.
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn read_frame(&mut self) -> Option<LogRecord> {
        let mut header = [0u8; FRAME_HEADER_LEN];
        self.inner.read_exact(&mut header).ok()?;
        let errno = i32::from_ne_bytes([header[0], header[1], header[2], header[3]]);
        let verbosity = i32::from_ne_bytes([header[4], header[5], header[6], header[7]]);
        let len = u32::from_ne_bytes([header[8], header[9], header[10], header[11]]);

        // Bounded by what the stream actually delivers, not by the header.
        let mut message = Vec::new();
        let _ = self
            .inner
            .by_ref()
            .take(u64::from(len))
            .read_to_end(&mut message)
            .ok()?;
        if message.len() != len as usize {
            return None;
        }
        Some(LogRecord {
            errno,
            verbosity,
            message,
        })
    }
}

impl<R: Read> Iterator for RelayReader<R> {
    type Item = LogRecord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let record = self.read_frame();
        if record.is_none() {
            self.finished = true;
        }
        record
    }
}

/// Drains a relay stream, handing each complete record to `sink`.
///
/// Returns the number of records delivered.
pub fn forward<R: Read>(reader: R, sink: &dyn LogSink) -> usize {
    let mut count = 0;
    for record in RelayReader::new(reader) {
        sink.emit(&record);
        count += 1;
    }
    count
}
