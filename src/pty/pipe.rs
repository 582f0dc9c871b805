//! Anonymous pipe pair connecting the caller and the pseudo console.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::System::Pipes::CreatePipe;

use super::{Result, SessionError};

/// One end of an anonymous pipe.
///
/// Owns the underlying handle: `close` flips an atomic flag and releases the
/// handle exactly once, and `Drop` routes through the same path. The flag is
/// atomic so a reader thread holding a shared end observes disposal started
/// by the session owner.
#[derive(Debug)]
pub struct PipeEnd {
    handle: HANDLE,
    closed: AtomicBool,
}

// Safety: the handle is released at most once (guarded by `closed`) and the
// kernel pipe object itself is thread-safe.
unsafe impl Send for PipeEnd {}
unsafe impl Sync for PipeEnd {}

impl PipeEnd {
    fn new(handle: HANDLE) -> Arc<Self> {
        Arc::new(Self {
            handle,
            closed: AtomicBool::new(false),
        })
    }

    pub(crate) fn raw(&self) -> HANDLE {
        self.handle
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Release the handle. Safe to call any number of times; only the first
    /// call does work.
    pub(crate) fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            unsafe {
                if let Err(e) = CloseHandle(self.handle) {
                    tracing::warn!("failed to close pipe handle: {e}");
                }
            }
        }
    }
}

impl Drop for PipeEnd {
    fn drop(&mut self) {
        self.close();
    }
}

/// A unidirectional byte channel with a read end and a write end.
pub struct Pipe {
    pub(crate) read: Arc<PipeEnd>,
    pub(crate) write: Arc<PipeEnd>,
}

impl Pipe {
    /// Allocate via the OS pipe capability. Neither end is marked
    /// inheritable: the pseudo console duplicates the ends handed to it, so
    /// no caller-side handle ever crosses a process boundary.
    fn new() -> Result<Self> {
        let mut read = HANDLE::default();
        let mut write = HANDLE::default();
        unsafe {
            CreatePipe(&mut read, &mut write, None, 0).map_err(SessionError::ResourceAllocation)?;
        }
        Ok(Self {
            read: PipeEnd::new(read),
            write: PipeEnd::new(write),
        })
    }
}

/// The two channels a session needs: `input` carries caller bytes to the
/// console, `output` carries everything the child writes back.
///
/// After the console is created it owns one end of each pipe and the session
/// exposes the other; the session drops its copies of the console-side ends
/// immediately, so no end ever has two owners.
pub struct PipePair {
    pub(crate) input: Pipe,
    pub(crate) output: Pipe,
}

impl PipePair {
    pub(crate) fn new() -> Result<Self> {
        Ok(Self {
            input: Pipe::new()?,
            output: Pipe::new()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_is_idempotent() {
        let pair = PipePair::new().expect("pipe allocation");
        pair.input.write.close();
        pair.input.write.close();
        assert!(pair.input.write.is_closed());
        assert!(!pair.input.read.is_closed());
    }
}
