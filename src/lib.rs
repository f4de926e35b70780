//! fake-stdio - swap the standard streams for pipe-backed fakes in tests
//!
//! This library lets test code temporarily replace the process's stdout,
//! stderr and/or stdin with OS pipes, run code that talks to the real
//! standard streams, and get whatever it wrote back as bytes or text:
//! - Output capture: stdout and stderr funnel into one shared pipe, so a
//!   combined capture preserves write order across both streams
//! - Input injection: stdin reads from a pipe fed with caller-supplied
//!   bytes, built up incrementally across calls
//! - Guaranteed restore: the original handles go back on every exit path,
//!   including panics, via an explicit `restore()`, the scoped `run()`
//!   entry point, or `Drop` as the last resort
//!
//! The swap happens at the file descriptor level (`dup`/`dup2` on fds
//! 0/1/2), so it also intercepts code that bypasses `std::io` entirely.
//! Because the descriptors are process-global, only one controller may fake
//! a given stream at a time - serialize tests that use this crate.
//!
//! # Example
//!
//! ```no_run
//! use std::io::Write;
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut fake = fake_stdio::stdout();
//!
//!     // Code under test writes to the real stdout...
//!     write!(std::io::stdout(), "Hello")?;
//!     std::io::stdout().flush()?;
//!
//!     // ...and the capture sees it.
//!     let captured = fake.string()?;
//!     fake.restore();
//!     assert_eq!(captured, "Hello");
//!     Ok(())
//! }
//! ```

#[cfg(not(unix))]
compile_error!("fake-stdio only supports Unix platforms");

mod error;
mod fake;
mod stdio;

pub use error::FakeIoError;
pub use fake::{FakeIo, stderr, stdin, stdin_bytes, stdout};
