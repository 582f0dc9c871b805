//! contty — run a child process under a Windows pseudo console and inspect
//! the bytes it writes.
//!
//! A [`TerminalSession`] wires a child process to a ConPTY instance and
//! exposes its raw I/O as two byte streams; the [`escape`] module strips or
//! humanizes the terminal escape sequences found in that stream.
//!
//! # Quick start
//!
//! ```no_run
//! # #[cfg(windows)] {
//! use std::io::Read;
//! use contty::{StartOptions, TerminalSession};
//!
//! let session = TerminalSession::start(&StartOptions::new("cmd.exe /c dir"))?;
//! let mut output = session.output();
//!
//! let mut buf = [0u8; 4096];
//! let mut text = String::new();
//! loop {
//!     match output.read(&mut buf)? {
//!         0 => break,
//!         n => text.push_str(&String::from_utf8_lossy(&buf[..n])),
//!     }
//! }
//! println!("{}", contty::escape::strip(&text));
//!
//! session.wait_for_exit(None)?;
//! println!("exit code {}", session.exit_code()?);
//! # }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! The session API is Windows-only; [`escape`] and [`config`] build
//! everywhere.

pub mod config;
pub mod escape;
#[cfg(windows)]
pub mod pty;

#[cfg(windows)]
pub use pty::{
    InputStream, OutputStream, SessionError, StartOptions, TerminalSession, WaitOutcome,
};
