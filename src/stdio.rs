//! Boundary around the process-wide standard stream slots.
//!
//! In fd terms a "slot" is descriptor 0, 1 or 2. Everything else in the
//! crate treats slots through `save` and `install`; no other module touches
//! raw descriptors.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

/// One of the three process-wide standard stream slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdStream {
    Stdout,
    Stderr,
    Stdin,
}

impl StdStream {
    /// Lowercase name used in log events and error messages.
    pub fn name(self) -> &'static str {
        match self {
            StdStream::Stdout => "stdout",
            StdStream::Stderr => "stderr",
            StdStream::Stdin => "stdin",
        }
    }

    fn fd(self) -> RawFd {
        match self {
            StdStream::Stdout => libc::STDOUT_FILENO,
            StdStream::Stderr => libc::STDERR_FILENO,
            StdStream::Stdin => libc::STDIN_FILENO,
        }
    }
}

/// Duplicates the current handle in `stream`'s slot so it can be
/// reinstalled later. The duplicate is owned by the caller; dropping it
/// closes it.
pub fn save(stream: StdStream) -> io::Result<OwnedFd> {
    let fd = unsafe { libc::dup(stream.fd()) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    // Just allocated by dup, so uniquely owned.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Points `stream`'s slot at `handle`.
///
/// The slot receives its own duplicate of `handle`; the caller keeps
/// ownership of `handle` itself. Whatever the slot previously held is
/// closed by the kernel as part of the dup2.
pub fn install(stream: StdStream, handle: &impl AsRawFd) -> io::Result<()> {
    if unsafe { libc::dup2(handle.as_raw_fd(), stream.fd()) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
