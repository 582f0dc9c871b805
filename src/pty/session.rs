//! Terminal session lifecycle.
//!
//! A [`TerminalSession`] owns one pipe pair, one pseudo console, and one
//! child process, and hands the caller the two pipe ends the console does
//! not hold. Lifecycle operations (`start`, `kill_console`, `close`) belong
//! to a single owning thread; [`TerminalSession::wait_for_exit`] only
//! observes process state and may be called from any number of threads.

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use windows::Win32::Foundation::{
    ERROR_BROKEN_PIPE, ERROR_INVALID_HANDLE, ERROR_OPERATION_ABORTED, E_INVALIDARG,
};
use windows::Win32::Storage::FileSystem::{ReadFile, WriteFile};
use windows::Win32::System::IO::CancelIoEx;

use super::console::PseudoConsole;
use super::pipe::{PipeEnd, PipePair};
use super::process::{self, ChildProcess, WaitOutcome};
use super::{Result, SessionError};

/// Start parameters for a [`TerminalSession`].
///
/// One structure instead of a family of overloads. With `application` unset
/// the first token of `command_line` is resolved through the OS's normal
/// search rules; with `env_overrides` empty the child inherits the parent
/// environment unchanged.
#[derive(Debug, Clone)]
pub struct StartOptions {
    /// Command line; must begin with the program name even when
    /// `application` is set.
    pub command_line: String,
    /// Optional explicit executable path, bypassing the PATH search.
    pub application: Option<PathBuf>,
    /// Working directory for the child; `None` inherits the parent's.
    pub working_directory: Option<PathBuf>,
    /// Variables merged over the inherited environment; on a key collision
    /// the override wins.
    pub env_overrides: Vec<(String, String)>,
    /// Console grid width in character cells.
    pub width: i16,
    /// Console grid height in character cells.
    pub height: i16,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            command_line: String::new(),
            application: None,
            working_directory: None,
            env_overrides: Vec::new(),
            width: 80,
            height: 24,
        }
    }
}

impl StartOptions {
    pub fn new(command_line: impl Into<String>) -> Self {
        Self {
            command_line: command_line.into(),
            ..Self::default()
        }
    }
}

/// A live pseudo-console session around one child process.
///
/// Sessions are created running: [`TerminalSession::start`] either yields a
/// fully wired session or releases everything it had acquired and fails.
pub struct TerminalSession {
    console: PseudoConsole,
    process: ChildProcess,
    input: Arc<PipeEnd>,
    output: Arc<PipeEnd>,
    disposed: bool,
}

impl TerminalSession {
    /// Allocate a pipe pair and a pseudo console, then launch the command
    /// attached to it.
    ///
    /// Fails with [`SessionError::ResourceAllocation`] before any process is
    /// spawned when pipe or console creation fails (including a
    /// non-positive size), and with [`SessionError::ProcessSpawn`] when the
    /// launcher fails — in which case the console and pipes created so far
    /// are released before this returns.
    pub fn start(options: &StartOptions) -> Result<Self> {
        if options.command_line.trim().is_empty() {
            return Err(SessionError::ProcessSpawn(windows::core::Error::new(
                E_INVALIDARG,
                "command line must not be empty",
            )));
        }

        let pipes = PipePair::new()?;
        let console = PseudoConsole::create(
            &pipes.input.read,
            &pipes.output.write,
            options.width,
            options.height,
        )?;

        // The console duplicated the ends it was given; drop our copies so
        // the console side is their only remaining owner.
        pipes.input.read.close();
        pipes.output.write.close();

        let process = process::spawn(options, &console)?;

        Ok(Self {
            console,
            process,
            input: pipes.input.write,
            output: pipes.output.read,
            disposed: false,
        })
    }

    /// Write side of the session. One intended writer.
    pub fn input(&self) -> InputStream {
        InputStream {
            end: Arc::clone(&self.input),
        }
    }

    /// Read side of the session. One intended reader; a read blocked on a
    /// quiet child is released by the console side going away or by this
    /// session being closed, both observed as end-of-stream.
    pub fn output(&self) -> OutputStream {
        OutputStream {
            end: Arc::clone(&self.output),
        }
    }

    /// Child process id.
    pub fn pid(&self) -> u32 {
        self.process.process_id()
    }

    /// Tear down only the pseudo console. Idempotent.
    ///
    /// This does not terminate the child process: a child that keeps
    /// writing afterwards runs into a broken pipe, and readers of
    /// [`OutputStream`] drain whatever is buffered and then reach
    /// end-of-stream.
    pub fn kill_console(&mut self) {
        self.console.close();
    }

    /// Observe process termination. `None` waits forever; a zero timeout
    /// polls. Expiry yields [`WaitOutcome::StillRunning`], never an error,
    /// and any number of observers may wait at once.
    pub fn wait_for_exit(&self, timeout: Option<Duration>) -> Result<WaitOutcome> {
        if self.disposed {
            return Err(SessionError::SessionClosed);
        }
        self.process.wait(timeout)
    }

    /// Whether the child is still running.
    pub fn is_running(&self) -> bool {
        !self.disposed
            && matches!(
                self.process.wait(Some(Duration::ZERO)),
                Ok(WaitOutcome::StillRunning)
            )
    }

    /// Native 32-bit exit value as reported by the OS. While the child
    /// still runs this reports the `STILL_ACTIVE` sentinel; call
    /// [`TerminalSession::wait_for_exit`] first for a settled value.
    pub fn exit_code(&self) -> Result<u32> {
        if self.disposed {
            return Err(SessionError::SessionClosed);
        }
        self.process.exit_code()
    }

    /// Resize the console character grid.
    pub fn resize(&mut self, width: i16, height: i16) -> Result<()> {
        if self.disposed {
            return Err(SessionError::SessionClosed);
        }
        self.console.resize(width, height)
    }

    /// Release everything: the console first, then the process and thread
    /// handles, then both pipe ends and the streams built on them.
    ///
    /// Safe to call multiple times; only the first call does work. The
    /// first release error is returned, later ones are logged and never
    /// mask it.
    pub fn close(&mut self) -> Result<()> {
        if self.disposed {
            return Ok(());
        }
        self.disposed = true;

        self.console.close();

        let first_error = self.process.close().err();

        // Release a reader parked in a blocking read before its handle
        // goes away; it observes end-of-stream, not an error.
        unsafe {
            let _ = CancelIoEx(self.output.raw(), None);
        }
        self.input.close();
        self.output.close();

        match first_error {
            Some(e) => Err(SessionError::Dispose(e)),
            None => Ok(()),
        }
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("error during session teardown: {e}");
        }
    }
}

/// Write half handed to the caller; bytes land in the child's input.
pub struct InputStream {
    end: Arc<PipeEnd>,
}

impl Write for InputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.end.is_closed() {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "session input is closed",
            ));
        }
        let mut written = 0u32;
        unsafe {
            WriteFile(self.end.raw(), Some(buf), Some(&mut written), None)
                .map_err(|e| io::Error::from_raw_os_error(e.code().0))?;
        }
        Ok(written as usize)
    }

    // Anonymous pipes are unbuffered.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Read half handed to the caller; yields whatever the child writes,
/// escape sequences included.
pub struct OutputStream {
    end: Arc<PipeEnd>,
}

impl Read for OutputStream {
    /// Blocks until bytes arrive. `Ok(0)` means the stream has closed —
    /// either the console side went away or the session was disposed; the
    /// two are indistinguishable by design. Faults other than closure
    /// surface as errors.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.end.is_closed() {
            return Ok(0);
        }
        let mut read = 0u32;
        let result = unsafe { ReadFile(self.end.raw(), Some(buf), Some(&mut read), None) };
        match result {
            Ok(()) => Ok(read as usize),
            Err(e) if is_closed_condition(&e) || self.end.is_closed() => Ok(0),
            Err(e) => Err(io::Error::from_raw_os_error(e.code().0)),
        }
    }
}

/// Faults that signal ordinary closure rather than a genuine stream fault:
/// the console side hung up, the owner cancelled an in-flight read during
/// disposal, or the handle was already released.
fn is_closed_condition(e: &windows::core::Error) -> bool {
    e.code() == ERROR_BROKEN_PIPE.to_hresult()
        || e.code() == ERROR_OPERATION_ABORTED.to_hresult()
        || e.code() == ERROR_INVALID_HANDLE.to_hresult()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_rejects_non_positive_size() {
        let mut options = StartOptions::new("cmd.exe /c exit");
        options.width = 0;
        let err = TerminalSession::start(&options)
            .err()
            .expect("zero width must fail");
        assert!(matches!(err, SessionError::ResourceAllocation(_)));

        let mut options = StartOptions::new("cmd.exe /c exit");
        options.height = -3;
        let err = TerminalSession::start(&options)
            .err()
            .expect("negative height must fail");
        assert!(matches!(err, SessionError::ResourceAllocation(_)));
    }

    #[test]
    fn start_rejects_empty_command_line() {
        let err = TerminalSession::start(&StartOptions::new("  "))
            .err()
            .expect("empty command must fail");
        assert!(matches!(err, SessionError::ProcessSpawn(_)));
    }

    #[test]
    fn exit_code_reaches_the_caller() {
        let mut session =
            TerminalSession::start(&StartOptions::new("cmd.exe /c exit 42")).expect("start");
        assert_eq!(
            session.wait_for_exit(None).expect("wait"),
            WaitOutcome::Exited
        );
        assert_eq!(session.exit_code().expect("exit code"), 42);
        session.close().expect("close");
    }

    #[test]
    fn zero_timeout_reports_still_running() {
        let session = TerminalSession::start(&StartOptions::new("ping -n 2 localhost"))
            .expect("start");
        assert!(session.is_running());
        assert_eq!(
            session
                .wait_for_exit(Some(Duration::ZERO))
                .expect("poll wait"),
            WaitOutcome::StillRunning
        );
        assert_eq!(session.wait_for_exit(None).expect("wait"), WaitOutcome::Exited);
    }

    #[test]
    fn input_reaches_the_child() {
        let mut session = TerminalSession::start(&StartOptions::new("cmd.exe")).expect("start");
        let mut input = session.input();
        input.write_all(b"exit\r\n").expect("write");
        assert_eq!(
            session
                .wait_for_exit(Some(Duration::from_secs(30)))
                .expect("wait"),
            WaitOutcome::Exited
        );
        session.close().expect("close");
    }

    #[test]
    fn close_is_idempotent_and_blocks_further_operations() {
        let mut session =
            TerminalSession::start(&StartOptions::new("cmd.exe /c exit")).expect("start");
        session.wait_for_exit(None).expect("wait");
        session.close().expect("first close");
        session.close().expect("second close is a no-op");
        assert!(matches!(session.exit_code(), Err(SessionError::SessionClosed)));
        assert!(matches!(
            session.wait_for_exit(Some(Duration::ZERO)),
            Err(SessionError::SessionClosed)
        ));

        // The exposed streams are closed too: reads end, writes fault.
        let mut buf = [0u8; 16];
        assert_eq!(session.output().read(&mut buf).expect("read"), 0);
        assert!(session.input().write(b"x").is_err());
    }

    #[test]
    fn output_reaches_end_of_stream_after_kill_console() {
        let mut session =
            TerminalSession::start(&StartOptions::new("cmd.exe /c echo conpty-test")).expect("start");
        session.wait_for_exit(None).expect("wait");
        session.kill_console();
        session.kill_console(); // idempotent

        let mut output = session.output();
        let mut collected = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            match output.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => collected.extend_from_slice(&buf[..n]),
                Err(e) => panic!("unexpected stream fault: {e}"),
            }
        }
        let text = String::from_utf8_lossy(&collected);
        assert!(text.contains("conpty-test"));
    }

    #[test]
    fn environment_overrides_reach_the_child() {
        let mut options = StartOptions::new("cmd.exe /c echo %CONTTY_MARKER%");
        options.env_overrides = vec![("CONTTY_MARKER".into(), "marker-value".into())];
        let mut session = TerminalSession::start(&options).expect("start");
        session.wait_for_exit(None).expect("wait");
        session.kill_console();

        let mut output = session.output();
        let mut collected = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            match output.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => collected.extend_from_slice(&buf[..n]),
                Err(e) => panic!("unexpected stream fault: {e}"),
            }
        }
        assert!(String::from_utf8_lossy(&collected).contains("marker-value"));
    }
}
