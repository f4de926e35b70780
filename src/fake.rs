//! The faking session controller.
//!
//! One [`FakeIo`] value owns everything a session touches: the saved
//! original descriptors, the substitute pipes, the cached capture and the
//! sticky error. All configuration calls mutate in place and return
//! `&mut Self` so fakes can be chained.

use std::io::{self, Read, Write};
use std::os::fd::OwnedFd;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use os_pipe::{PipeReader, PipeWriter};
use tracing::{debug, warn};

use crate::error::FakeIoError;
use crate::stdio::{self, StdStream};

/// Controller for one stdio faking session.
///
/// While a stream is faked, anything in the process that writes to stdout or
/// stderr (or reads stdin) at the descriptor level talks to pipes owned by
/// this controller instead of the real streams. [`FakeIo::restore`] puts the
/// originals back; it also runs from `Drop`, so an early return or panic in
/// the caller cannot leave the process streams swapped.
///
/// Stdout and stderr share a single capture pipe: faking both interleaves
/// their writes into one byte sequence in write order.
///
/// A controller is single-session: once output has been materialized with
/// [`FakeIo::bytes`] the result is cached for the controller's lifetime, and
/// a fresh controller is needed for a fresh capture.
#[derive(Debug, Default)]
pub struct FakeIo {
    saved_stdout: Option<OwnedFd>,
    saved_stderr: Option<OwnedFd>,
    saved_stdin: Option<OwnedFd>,
    out_reader: Option<PipeReader>,
    out_writer: Option<PipeWriter>,
    stdin_writer: Option<PipeWriter>,
    result: Option<Vec<u8>>,
    err: Option<FakeIoError>,
}

impl FakeIo {
    /// Creates an empty controller with nothing faked.
    pub fn new() -> Self {
        Self::default()
    }

    /// Redirects stdout into the shared capture pipe.
    ///
    /// Idempotent: repeat calls while stdout is already faked change
    /// nothing, and the pipe is shared with [`FakeIo::fake_stderr`] rather
    /// than created twice. Once output has been materialized the controller
    /// is done capturing and further fake calls are no-ops. On failure the
    /// slot is left untouched and the error is stored; see [`FakeIo::err`].
    pub fn fake_stdout(&mut self) -> &mut Self {
        if self.saved_stdout.is_none() {
            self.fake_output(StdStream::Stdout);
        }
        self
    }

    /// Redirects stderr into the shared capture pipe.
    ///
    /// Same contract as [`FakeIo::fake_stdout`].
    pub fn fake_stderr(&mut self) -> &mut Self {
        if self.saved_stderr.is_none() {
            self.fake_output(StdStream::Stderr);
        }
        self
    }

    fn fake_output(&mut self, stream: StdStream) {
        // A materialized controller is done capturing: refaking here would
        // feed a fresh pipe whose contents can never surface past the cache.
        if self.err.is_some() || self.result.is_some() {
            return;
        }
        if self.out_writer.is_none() {
            let (reader, writer) = match os_pipe::pipe() {
                Ok(pair) => pair,
                Err(e) => {
                    self.err = Some(FakeIoError::CreatePipe {
                        stream: stream.name(),
                        source: Arc::new(e),
                    });
                    return;
                }
            };
            self.out_reader = Some(reader);
            self.out_writer = Some(writer);
        }
        let saved = match stdio::save(stream) {
            Ok(fd) => fd,
            Err(e) => {
                self.err = Some(FakeIoError::Redirect {
                    stream: stream.name(),
                    source: Arc::new(e),
                });
                return;
            }
        };
        let Some(writer) = &self.out_writer else {
            // Unreachable: the pipe was created above.
            return;
        };
        if let Err(e) = stdio::install(stream, writer) {
            // `saved` drops here; the slot was never swapped.
            self.err = Some(FakeIoError::Redirect {
                stream: stream.name(),
                source: Arc::new(e),
            });
            return;
        }
        match stream {
            StdStream::Stdout => self.saved_stdout = Some(saved),
            StdStream::Stderr => self.saved_stderr = Some(saved),
            StdStream::Stdin => self.saved_stdin = Some(saved),
        }
        debug!(stream = stream.name(), "redirected into capture pipe");
    }

    /// Redirects stdin to an input pipe and appends `data` to it.
    ///
    /// The first call creates the pipe and swaps the stdin slot; later calls
    /// only append, so multi-line input can be built up incrementally.
    ///
    /// The write is synchronous: if the injected data outgrows the kernel
    /// pipe buffer and nothing is reading stdin, this call blocks until
    /// something drains it. Size injected input to what the code under test
    /// will consume.
    pub fn fake_stdin_bytes(&mut self, data: &[u8]) -> &mut Self {
        if self.err.is_some() {
            return self;
        }
        if self.saved_stdin.is_some() {
            self.write_stdin(data);
            return self;
        }
        let (reader, writer) = match os_pipe::pipe() {
            Ok(pair) => pair,
            Err(e) => {
                self.err = Some(FakeIoError::CreatePipe {
                    stream: StdStream::Stdin.name(),
                    source: Arc::new(e),
                });
                return self;
            }
        };
        let saved = match stdio::save(StdStream::Stdin) {
            Ok(fd) => fd,
            Err(e) => {
                self.err = Some(FakeIoError::Redirect {
                    stream: StdStream::Stdin.name(),
                    source: Arc::new(e),
                });
                return self;
            }
        };
        if let Err(e) = stdio::install(StdStream::Stdin, &reader) {
            self.err = Some(FakeIoError::Redirect {
                stream: StdStream::Stdin.name(),
                source: Arc::new(e),
            });
            return self;
        }
        // The stdin slot now holds its own duplicate of the read end, so the
        // controller's copy can go; end-of-input is signalled purely by
        // closing the write end.
        drop(reader);
        self.saved_stdin = Some(saved);
        self.stdin_writer = Some(writer);
        debug!("redirected stdin to input pipe");
        self.write_stdin(data);
        self
    }

    /// Redirects stdin and appends `text`. Convenience wrapper over
    /// [`FakeIo::fake_stdin_bytes`].
    pub fn fake_stdin(&mut self, text: &str) -> &mut Self {
        self.fake_stdin_bytes(text.as_bytes())
    }

    fn write_stdin(&mut self, data: &[u8]) {
        let Some(writer) = self.stdin_writer.as_mut() else {
            self.err = Some(FakeIoError::StdinWrite(Arc::new(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "stdin pipe already closed",
            ))));
            return;
        };
        if let Err(e) = writer.write_all(data) {
            self.err = Some(FakeIoError::StdinWrite(Arc::new(e)));
        }
    }

    /// Closes the input pipe's write end, signalling end-of-input to a
    /// blocking reader.
    ///
    /// Errors with [`FakeIoError::StdinNotFaked`] if stdin was never faked.
    /// Closing an already-closed input pipe is a no-op.
    pub fn close_stdin(&mut self) -> &mut Self {
        if self.err.is_some() {
            return self;
        }
        if self.saved_stdin.is_none() {
            self.err = Some(FakeIoError::StdinNotFaked);
            return self;
        }
        // Dropping the writer is the close.
        self.stdin_writer = None;
        self
    }

    /// Reads captured bytes directly off the pipe.
    ///
    /// Low-level primitive: unlike [`FakeIo::bytes`] it does not close the
    /// write side first, so reading to end-of-stream through this alone
    /// blocks while any write end is still open.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, FakeIoError> {
        if let Some(err) = &self.err {
            return Err(err.clone());
        }
        let Some(reader) = self.out_reader.as_mut() else {
            return Err(FakeIoError::NothingFaked);
        };
        reader
            .read(buf)
            .map_err(|e| FakeIoError::ReadOutput(Arc::new(e)))
    }

    /// Materializes the captured output as bytes.
    ///
    /// The first call closes the capture pipe's write side (reinstalling the
    /// original stdout/stderr handles in the process), drains the pipe to
    /// end-of-stream and caches the result; later calls return the cache
    /// without touching the pipe. Errors with [`FakeIoError::NothingFaked`]
    /// if neither output stream was ever faked.
    pub fn bytes(&mut self) -> Result<&[u8], FakeIoError> {
        self.materialize()?;
        match &self.result {
            Some(bytes) => Ok(bytes.as_slice()),
            None => Err(FakeIoError::NothingFaked),
        }
    }

    /// Materializes the captured output as text (lossy UTF-8).
    pub fn string(&mut self) -> Result<String, FakeIoError> {
        let bytes = self.bytes()?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    fn materialize(&mut self) -> Result<(), FakeIoError> {
        if let Some(err) = &self.err {
            return Err(err.clone());
        }
        if self.result.is_some() {
            return Ok(());
        }
        if self.out_reader.is_none() {
            let err = FakeIoError::NothingFaked;
            self.err = Some(err.clone());
            return Err(err);
        }
        // Every duplicate of the write end has to go before the drain below
        // can see end-of-stream: the owned write end, and the copies sitting
        // in the stdout/stderr slots. Reinstalling the saved handles closes
        // the latter.
        self.out_writer = None;
        self.restore_stream(StdStream::Stdout);
        self.restore_stream(StdStream::Stderr);

        let mut buf = Vec::new();
        let Some(reader) = self.out_reader.as_mut() else {
            return Err(FakeIoError::NothingFaked);
        };
        if let Err(e) = reader.read_to_end(&mut buf) {
            let err = FakeIoError::ReadOutput(Arc::new(e));
            self.err = Some(err.clone());
            return Err(err);
        }
        debug!(len = buf.len(), "materialized captured output");
        self.result = Some(buf);
        Ok(())
    }

    /// Runs `f` with the current fakes in place, restores every faked
    /// stream, and returns the captured output as text.
    ///
    /// Restoration happens on both exit paths: after a normal return the
    /// output is materialized first and the restore follows; if `f` panics,
    /// the streams are restored before the panic is resumed, so a failing
    /// test still reports through the real stderr.
    pub fn run<F: FnOnce()>(&mut self, f: F) -> Result<String, FakeIoError> {
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(()) => {
                let out = self.string();
                self.restore();
                out
            }
            Err(payload) => {
                self.restore();
                panic::resume_unwind(payload);
            }
        }
    }

    /// Puts the original stream handles back and releases the pipes.
    ///
    /// Unconditional and repeatable: runs regardless of the sticky error,
    /// does nothing for streams that were never faked, and a second call
    /// finds every field already cleared. The cached capture and the sticky
    /// error survive, so [`FakeIo::bytes`] and [`FakeIo::err`] still answer
    /// after teardown (materialize before or during restore, not after).
    pub fn restore(&mut self) {
        self.out_writer = None;
        self.out_reader = None;
        self.stdin_writer = None;
        self.restore_stream(StdStream::Stdout);
        self.restore_stream(StdStream::Stderr);
        self.restore_stream(StdStream::Stdin);
    }

    fn restore_stream(&mut self, stream: StdStream) {
        let slot = match stream {
            StdStream::Stdout => &mut self.saved_stdout,
            StdStream::Stderr => &mut self.saved_stderr,
            StdStream::Stdin => &mut self.saved_stdin,
        };
        if let Some(saved) = slot.take() {
            match stdio::install(stream, &saved) {
                Ok(()) => debug!(stream = stream.name(), "restored original handle"),
                // Best effort: a leaked swap is worse than a noisy teardown.
                Err(e) => {
                    warn!(stream = stream.name(), error = %e, "failed to reinstall original handle");
                }
            }
            // Dropping `saved` closes the duplicate.
        }
    }

    /// Returns the sticky error, if any, without performing I/O.
    ///
    /// Once set, the same error short-circuits every later faking or
    /// materializing call on this controller.
    pub fn err(&self) -> Option<&FakeIoError> {
        self.err.as_ref()
    }
}

// Implemented for `&mut FakeIo` rather than `FakeIo`: the trait's provided
// `Read::bytes(self)` adapter would otherwise beat the inherent
// `bytes(&mut self)` accessor in method resolution whenever `Read` is in
// scope at a call site.
impl Read for &mut FakeIo {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        FakeIo::read(self, buf).map_err(io::Error::from)
    }
}

impl Drop for FakeIo {
    fn drop(&mut self) {
        self.restore();
    }
}

/// Starts faking stdout and returns the controller.
pub fn stdout() -> FakeIo {
    let mut fake = FakeIo::new();
    fake.fake_stdout();
    fake
}

/// Starts faking stderr and returns the controller.
pub fn stderr() -> FakeIo {
    let mut fake = FakeIo::new();
    fake.fake_stderr();
    fake
}

/// Starts faking stdin with `text` as the injected input.
pub fn stdin(text: &str) -> FakeIo {
    let mut fake = FakeIo::new();
    fake.fake_stdin(text);
    fake
}

/// Starts faking stdin with `data` as the injected input.
pub fn stdin_bytes(data: &[u8]) -> FakeIo {
    let mut fake = FakeIo::new();
    fake.fake_stdin_bytes(data);
    fake
}
