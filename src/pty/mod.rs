//! Pseudo-console session plumbing for Windows.
//!
//! The pieces compose bottom-up:
//!
//! - **pipe**: anonymous pipe pair connecting caller and console
//! - **console**: `CreatePseudoConsole` handle wrapper
//! - **process**: child launch glue (attribute list, environment block)
//! - **session**: [`TerminalSession`], owning all of the above
//!
//! # Architecture
//!
//! ```text
//! TerminalSession
//! ├── PipePair (input: caller → console, output: console → caller)
//! ├── PseudoConsole (owns the console-side pipe ends)
//! ├── ChildProcess (process/thread handles, exit status on demand)
//! └── InputStream / OutputStream (caller-side pipe ends)
//! ```

pub mod console;
pub mod pipe;
pub mod process;
pub mod session;

pub use console::{enable_virtual_terminal, PseudoConsole};
pub use process::{ChildProcess, WaitOutcome};
pub use session::{InputStream, OutputStream, StartOptions, TerminalSession};

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    /// Pipe or pseudo-console allocation failed; no process was spawned and
    /// nothing is left to release.
    #[error("failed to allocate console resources: {0}")]
    ResourceAllocation(#[source] windows::core::Error),

    /// The process launcher failed after pipes and console existed; both
    /// were released before this error was returned.
    #[error("failed to spawn child process: {0}")]
    ProcessSpawn(#[source] windows::core::Error),

    /// A lifecycle or query operation was invoked after `close()`.
    #[error("session has already been disposed")]
    SessionClosed,

    /// Waiting on the child or reading its exit code failed.
    #[error("failed to query child process: {0}")]
    ProcessQuery(#[source] windows::core::Error),

    /// Resizing the pseudo console failed.
    #[error("failed to resize pseudo console: {0}")]
    Resize(#[source] windows::core::Error),

    /// Releasing an owned handle failed during teardown. Only the first
    /// such error surfaces; later ones are logged.
    #[error("failed to release session resources: {0}")]
    Dispose(#[source] windows::core::Error),

    /// I/O fault on the input or output stream.
    #[error("stream fault: {0}")]
    Stream(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;
