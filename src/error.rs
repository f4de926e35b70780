//! Error type reported by a faking session.

use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Errors produced while faking or capturing standard streams.
///
/// The controller follows a sticky-first-error policy: the first failure is
/// stored and handed back from every later call, so the type is `Clone`
/// (I/O sources are wrapped in `Arc`).
#[derive(Debug, Clone, Error)]
pub enum FakeIoError {
    /// Creating the pipe that backs a faked stream failed.
    #[error("cannot create {stream} pipe: {source}")]
    CreatePipe {
        /// Which stream the pipe was being created for.
        stream: &'static str,
        #[source]
        source: Arc<io::Error>,
    },

    /// Saving or replacing a process-wide stream handle failed.
    #[error("cannot redirect {stream}: {source}")]
    Redirect {
        /// Which stream slot was being swapped.
        stream: &'static str,
        #[source]
        source: Arc<io::Error>,
    },

    /// Writing injected bytes into the faked stdin pipe failed.
    #[error("cannot write to piped stdin: {0}")]
    StdinWrite(#[source] Arc<io::Error>),

    /// Draining the captured output pipe failed.
    #[error("cannot read captured output: {0}")]
    ReadOutput(#[source] Arc<io::Error>),

    /// An output accessor was called but neither stdout nor stderr was faked.
    #[error("neither stdout nor stderr was faked")]
    NothingFaked,

    /// `close_stdin` was called before stdin was faked.
    #[error("cannot close stdin before faking it")]
    StdinNotFaked,
}

impl From<FakeIoError> for io::Error {
    fn from(err: FakeIoError) -> Self {
        io::Error::other(err)
    }
}
