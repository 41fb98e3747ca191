//! Standard stream redirection performed inside a forked child.

use std::fs::File;
use std::os::fd::{AsRawFd, RawFd};

use nix::errno::Errno;
use tether_common::constants::NULL_DEVICE;

/// Caller-supplied descriptors for the child's standard streams.
///
/// `None` keeps the default: stdin reads from the null device, stdout and
/// stderr are inherited. The descriptors stay owned by the caller; only the
/// child's copies are closed after duplication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StdioFds {
    /// Descriptor to install as stdin.
    pub stdin: Option<RawFd>,
    /// Descriptor to install as stdout.
    pub stdout: Option<RawFd>,
    /// Descriptor to install as stderr.
    pub stderr: Option<RawFd>,
}

impl StdioFds {
    /// Builds from raw descriptors where a negative value means "default".
    #[must_use]
    pub const fn from_raw(stdin: RawFd, stdout: RawFd, stderr: RawFd) -> Self {
        Self {
            stdin: non_negative(stdin),
            stdout: non_negative(stdout),
            stderr: non_negative(stderr),
        }
    }
}

const fn non_negative(fd: RawFd) -> Option<RawFd> {
    if fd < 0 { None } else { Some(fd) }
}

/// Installs the requested descriptors on fds 0, 1 and 2, in that order.
///
/// Child-side only: it closes the source descriptors and rewires the
/// process's standard streams. A missing stdin is replaced with the null
/// device opened read-only; if that device cannot be opened the inherited
/// stdin is kept.
///
/// # Errors
///
/// Returns the `errno` of the first `dup2(2)` that fails. Steps after the
/// failing one are not attempted.
pub fn redirect_stdio(fds: &StdioFds) -> Result<(), Errno> {
    match fds.stdin {
        Some(fd) => install(fd, libc::STDIN_FILENO)?,
        None => attach_null_stdin(),
    }
    if let Some(fd) = fds.stdout {
        install(fd, libc::STDOUT_FILENO)?;
    }
    if let Some(fd) = fds.stderr {
        install(fd, libc::STDERR_FILENO)?;
    }
    Ok(())
}

fn install(source: RawFd, target: RawFd) -> Result<(), Errno> {
    // dup2 onto itself is a no-op and the source must survive.
    if source == target {
        return Ok(());
    }
    // SAFETY: dup2 only manipulates the descriptor table; an invalid source
    // is reported through errno.
    if unsafe { libc::dup2(source, target) } < 0 {
        return Err(Errno::last());
    }
    // SAFETY: the source is a descriptor this process inherited and no Rust
    // object owns it in the child.
    let _ = unsafe { libc::close(source) };
    Ok(())
}

fn attach_null_stdin() {
    if let Ok(null) = File::open(NULL_DEVICE) {
        // SAFETY: `null` is open for the duration of the call.
        let _ = unsafe { libc::dup2(null.as_raw_fd(), libc::STDIN_FILENO) };
    }
}

/// Closes every descriptor above stderr except those listed in `keep`.
///
/// Child-side only. A forked child inherits the parent's pipe ends for
/// every other launch in flight; holding them would delay end-of-stream on
/// those pipes until this child exits.
pub fn close_inherited(keep: &[RawFd]) {
    let Ok(entries) = std::fs::read_dir("/proc/self/fd") else {
        return;
    };
    let open: Vec<RawFd> = entries
        .filter_map(|entry| entry.ok()?.file_name().to_str()?.parse().ok())
        .collect();
    for fd in open {
        if fd > libc::STDERR_FILENO && !keep.contains(&fd) {
            // SAFETY: nothing in the child uses these descriptors after this
            // point; the directory handle is already closed and yields EBADF.
            let _ = unsafe { libc::close(fd) };
        }
    }
}
