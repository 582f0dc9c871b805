//! Child process launch glue and handle ownership.

use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;
use std::time::Duration;

use windows::core::{PCWSTR, PWSTR};
use windows::Win32::Foundation::{CloseHandle, WAIT_OBJECT_0, WAIT_TIMEOUT};
use windows::Win32::System::Console::HPCON;
use windows::Win32::System::Threading::{
    CreateProcessW, DeleteProcThreadAttributeList, GetExitCodeProcess,
    InitializeProcThreadAttributeList, UpdateProcThreadAttribute, WaitForSingleObject,
    CREATE_UNICODE_ENVIRONMENT, EXTENDED_STARTUPINFO_PRESENT, INFINITE,
    LPPROC_THREAD_ATTRIBUTE_LIST, PROCESS_INFORMATION, STARTUPINFOEXW,
};

use super::console::PseudoConsole;
use super::session::StartOptions;
use super::{Result, SessionError};

/// Attribute key designating the pseudo console a child attaches to.
const PROC_THREAD_ATTRIBUTE_PSEUDOCONSOLE: usize = 0x0002_0016;

/// Outcome of waiting on a child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The process has terminated; its exit code is settled.
    Exited,
    /// The wait expired while the process was still running.
    StillRunning,
}

/// Process and thread handles plus their identifiers.
///
/// Exit status is never cached; it is queried from the OS on demand. The
/// process's lifetime is independent of the console's: destroying the
/// console does not terminate the child.
pub struct ChildProcess {
    info: PROCESS_INFORMATION,
    closed: bool,
}

// Safety: the raw handles are owned here and released at most once.
unsafe impl Send for ChildProcess {}

impl ChildProcess {
    pub fn process_id(&self) -> u32 {
        self.info.dwProcessId
    }

    pub fn thread_id(&self) -> u32 {
        self.info.dwThreadId
    }

    /// Wait for termination via the read-only OS wait primitive. `None`
    /// waits forever; expiry is the `StillRunning` outcome, never an error.
    pub(crate) fn wait(&self, timeout: Option<Duration>) -> Result<WaitOutcome> {
        let millis = match timeout {
            Some(t) => u32::try_from(t.as_millis()).unwrap_or(INFINITE - 1),
            None => INFINITE,
        };
        let result = unsafe { WaitForSingleObject(self.info.hProcess, millis) };
        if result == WAIT_OBJECT_0 {
            Ok(WaitOutcome::Exited)
        } else if result == WAIT_TIMEOUT {
            Ok(WaitOutcome::StillRunning)
        } else {
            Err(SessionError::ProcessQuery(windows::core::Error::from_win32()))
        }
    }

    /// Native 32-bit exit value. Reports the `STILL_ACTIVE` sentinel while
    /// the process lives.
    pub(crate) fn exit_code(&self) -> Result<u32> {
        let mut code = 0u32;
        unsafe {
            GetExitCodeProcess(self.info.hProcess, &mut code)
                .map_err(SessionError::ProcessQuery)?;
        }
        Ok(code)
    }

    /// Release the process and thread handles. Only the first call does
    /// work; the first failure is returned, a second one is logged.
    pub(crate) fn close(&mut self) -> std::result::Result<(), windows::core::Error> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut first = None;
        unsafe {
            if let Err(e) = CloseHandle(self.info.hProcess) {
                first = Some(e);
            }
            if let Err(e) = CloseHandle(self.info.hThread) {
                if first.is_none() {
                    first = Some(e);
                } else {
                    tracing::warn!("failed to close thread handle: {e}");
                }
            }
        }
        match first {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for ChildProcess {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("failed to close process handles: {e}");
        }
    }
}

/// Launch `options.command_line` attached to `console`, following the
/// documented pseudo-console recipe: a one-entry proc-thread attribute list
/// carrying the console handle, then `CreateProcessW` with
/// `EXTENDED_STARTUPINFO_PRESENT`.
pub(crate) fn spawn(options: &StartOptions, console: &PseudoConsole) -> Result<ChildProcess> {
    // First call reports the required buffer size and is expected to fail.
    let mut attr_size: usize = 0;
    let _ = unsafe {
        InitializeProcThreadAttributeList(LPPROC_THREAD_ATTRIBUTE_LIST::default(), 1, 0, &mut attr_size)
    };
    if attr_size == 0 {
        return Err(SessionError::ProcessSpawn(windows::core::Error::from_win32()));
    }

    let mut attr_buffer = vec![0u8; attr_size];
    let attr_list = LPPROC_THREAD_ATTRIBUTE_LIST(attr_buffer.as_mut_ptr() as *mut _);
    unsafe {
        InitializeProcThreadAttributeList(attr_list, 1, 0, &mut attr_size)
            .map_err(SessionError::ProcessSpawn)?;
    }

    let launch = || -> Result<PROCESS_INFORMATION> {
        unsafe {
            UpdateProcThreadAttribute(
                attr_list,
                0,
                PROC_THREAD_ATTRIBUTE_PSEUDOCONSOLE,
                Some(console.handle().0 as *const _),
                std::mem::size_of::<HPCON>(),
                None,
                None,
            )
            .map_err(SessionError::ProcessSpawn)?;
        }

        let application_wide = options.application.as_deref().map(|p| wide(p.as_os_str()));
        let application_ptr = application_wide
            .as_ref()
            .map_or(PCWSTR::null(), |w| PCWSTR(w.as_ptr()));

        let mut command_wide: Vec<u16> = options
            .command_line
            .encode_utf16()
            .chain(std::iter::once(0))
            .collect();

        let cwd_wide = options
            .working_directory
            .as_deref()
            .map(|p| wide(p.as_os_str()));
        let cwd_ptr = cwd_wide.as_ref().map_or(PCWSTR::null(), |w| PCWSTR(w.as_ptr()));

        // No overrides means no explicit block: the child inherits the
        // parent environment unchanged.
        let env_block = if options.env_overrides.is_empty() {
            None
        } else {
            Some(build_environment_block(&merged_environment(
                &options.env_overrides,
            )))
        };
        let mut flags = EXTENDED_STARTUPINFO_PRESENT;
        if env_block.is_some() {
            flags |= CREATE_UNICODE_ENVIRONMENT;
        }

        let mut startup_info = STARTUPINFOEXW::default();
        startup_info.StartupInfo.cb = std::mem::size_of::<STARTUPINFOEXW>() as u32;
        startup_info.lpAttributeList = attr_list;

        let mut process_info = PROCESS_INFORMATION::default();
        unsafe {
            CreateProcessW(
                application_ptr,
                PWSTR(command_wide.as_mut_ptr()),
                None,
                None,
                false,
                flags,
                env_block.as_ref().map(|b| b.as_ptr() as *const _),
                cwd_ptr,
                &startup_info.StartupInfo,
                &mut process_info,
            )
            .map_err(SessionError::ProcessSpawn)?;
        }
        Ok(process_info)
    };

    let launched = launch();
    unsafe { DeleteProcThreadAttributeList(attr_list) };
    let info = launched?;

    tracing::debug!(
        pid = info.dwProcessId,
        tid = info.dwThreadId,
        "spawned child attached to pseudo console"
    );

    Ok(ChildProcess {
        info,
        closed: false,
    })
}

fn wide(s: &OsStr) -> Vec<u16> {
    s.encode_wide().chain(std::iter::once(0)).collect()
}

/// Merge overrides over a snapshot of the parent environment. Override wins
/// on exact-key collision; keys keep the case they were given, parent order
/// is retained, and new keys append.
fn merged_environment(overrides: &[(String, String)]) -> Vec<(String, String)> {
    let mut merged: Vec<(String, String)> = std::env::vars().collect();
    for (key, value) in overrides {
        match merged.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value.clone(),
            None => merged.push((key.clone(), value.clone())),
        }
    }
    merged
}

/// `KEY=VALUE` entries in UTF-16, each NUL-terminated, the whole block
/// terminated by one extra NUL — the layout `CreateProcessW` expects with
/// `CREATE_UNICODE_ENVIRONMENT`.
fn build_environment_block(vars: &[(String, String)]) -> Vec<u16> {
    let mut block: Vec<u16> = Vec::new();
    for (key, value) in vars {
        let entry = format!("{key}={value}");
        block.extend(entry.encode_utf16());
        block.push(0);
    }
    block.push(0);
    block
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_wins_and_appends() {
        let merged = merged_environment(&[
            ("CONTTY_TEST_KEY".into(), "first".into()),
            ("CONTTY_TEST_KEY".into(), "second".into()),
        ]);
        let hits: Vec<_> = merged
            .iter()
            .filter(|(k, _)| k == "CONTTY_TEST_KEY")
            .collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].1, "second");
    }

    #[test]
    fn override_key_case_is_preserved() {
        let merged = merged_environment(&[("ConTTY_MixedCase".into(), "v".into())]);
        assert!(merged.iter().any(|(k, _)| k == "ConTTY_MixedCase"));
    }

    #[test]
    fn block_entries_are_nul_separated_and_double_terminated() {
        let block = build_environment_block(&[("A".into(), "1".into()), ("B".into(), "2".into())]);
        let expected: Vec<u16> = "A=1\0B=2\0\0".encode_utf16().collect();
        assert_eq!(block, expected);
    }
}
