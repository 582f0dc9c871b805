//! Pseudo console handle wrapper.

use windows::Win32::Foundation::E_INVALIDARG;
use windows::Win32::System::Console::{
    ClosePseudoConsole, CreatePseudoConsole, GetConsoleMode, GetStdHandle, ResizePseudoConsole,
    SetConsoleMode, COORD, CONSOLE_MODE, ENABLE_VIRTUAL_TERMINAL_PROCESSING, HPCON,
    STD_OUTPUT_HANDLE,
};

use super::pipe::PipeEnd;
use super::{Result, SessionError};

/// Owning wrapper around an `HPCON`.
///
/// `close` is idempotent; `Drop` releases the console through the same path,
/// so an explicit teardown makes the destructor a no-op.
pub struct PseudoConsole {
    hpc: HPCON,
    closed: bool,
}

// Safety: HPCON is an opaque kernel object reference; the wrapper releases
// it at most once.
unsafe impl Send for PseudoConsole {}

impl PseudoConsole {
    /// Create a console of `width`×`height` cells bound to the given pipe
    /// ends (its input source and output sink). Both dimensions must be
    /// positive; violations fail before any OS object is created.
    pub(crate) fn create(
        input_read: &PipeEnd,
        output_write: &PipeEnd,
        width: i16,
        height: i16,
    ) -> Result<Self> {
        if width <= 0 || height <= 0 {
            return Err(SessionError::ResourceAllocation(windows::core::Error::new(
                E_INVALIDARG,
                format!("console size must be positive, got {width}x{height}"),
            )));
        }

        let size = COORD {
            X: width,
            Y: height,
        };
        let hpc = unsafe {
            CreatePseudoConsole(size, input_read.raw(), output_write.raw(), 0)
                .map_err(SessionError::ResourceAllocation)?
        };

        Ok(Self { hpc, closed: false })
    }

    pub(crate) fn handle(&self) -> HPCON {
        self.hpc
    }

    /// Resize the character grid.
    pub(crate) fn resize(&self, width: i16, height: i16) -> Result<()> {
        if self.closed {
            return Err(SessionError::SessionClosed);
        }
        let size = COORD {
            X: width,
            Y: height,
        };
        unsafe {
            ResizePseudoConsole(self.hpc, size).map_err(SessionError::Resize)?;
        }
        Ok(())
    }

    /// Tear the console down. Only the first call does work.
    pub(crate) fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            unsafe { ClosePseudoConsole(self.hpc) };
        }
    }
}

impl Drop for PseudoConsole {
    fn drop(&mut self) {
        self.close();
    }
}

/// Switch the parent console's output to virtual-terminal processing so
/// mirrored escape sequences render instead of printing literally.
///
/// Fails when stdout is not a console (redirected to a file or pipe);
/// callers in that situation can ignore the error.
pub fn enable_virtual_terminal() -> windows::core::Result<()> {
    unsafe {
        let stdout = GetStdHandle(STD_OUTPUT_HANDLE)?;
        let mut mode = CONSOLE_MODE::default();
        GetConsoleMode(stdout, &mut mode)?;
        SetConsoleMode(stdout, mode | ENABLE_VIRTUAL_TERMINAL_PROCESSING)?;
    }
    Ok(())
}
