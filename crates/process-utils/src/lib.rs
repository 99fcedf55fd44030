//! Small process-related helpers shared across the workspace.

use std::ffi::OsStr;
use std::io;
use std::process::{Child, ExitStatus};
use std::time::Duration;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Default interval between `try_wait` polls in [`wait_or_kill`].
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self) -> &mut Self;
}

impl NoWindowExt for std::process::Command {
    fn no_window(&mut self) -> &mut Self {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.creation_flags(CREATE_NO_WINDOW);
        }
        self
    }
}

/// Create a `std::process::Command` with `CREATE_NO_WINDOW` applied on Windows.
pub fn std_command(program: impl AsRef<OsStr>) -> std::process::Command {
    let mut cmd = std::process::Command::new(program);
    cmd.no_window();
    cmd
}

/// How a supervised child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// The process exited on its own.
    Exited(ExitStatus),
    /// `should_stop` fired first and the process was killed.
    Killed,
}

/// Block until `child` exits, killing it as soon as `should_stop` returns true.
///
/// The predicate is checked once per `poll_interval`, so a stop request is
/// honoured within one interval. The killed child is always reaped.
pub fn wait_or_kill<F>(
    child: &mut Child,
    poll_interval: Duration,
    should_stop: F,
) -> io::Result<WaitResult>
where
    F: Fn() -> bool,
{
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(WaitResult::Exited(status));
        }

        if should_stop() {
            // The child may have exited between try_wait and kill.
            if let Err(e) = child.kill()
                && e.kind() != io::ErrorKind::InvalidInput
            {
                return Err(e);
            }
            let _ = child.wait()?;
            return Ok(WaitResult::Killed);
        }

        std::thread::sleep(poll_interval);
    }
}

/// Exit code of a finished process, normalised so that a child calling
/// `exit(-1)` reports `-1` on every platform.
///
/// Unix truncates exit codes to 8 bits, turning `-1` into `255`.
/// Returns `None` when the process was terminated by a signal.
pub fn exit_code_of(status: &ExitStatus) -> Option<i32> {
    status.code().map(|code| {
        if cfg!(unix) && code == 255 { -1 } else { code }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    fn sh(script: &str) -> Child {
        std_command("sh")
            .args(["-c", script])
            .spawn()
            .expect("failed to spawn sh")
    }

    #[cfg(unix)]
    #[test]
    fn test_wait_reports_exit_code() {
        let mut child = sh("exit 7");
        let result = wait_or_kill(&mut child, Duration::from_millis(10), || false).unwrap();
        match result {
            WaitResult::Exited(status) => assert_eq!(exit_code_of(&status), Some(7)),
            other => panic!("expected exit, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_minus_one_is_normalised() {
        let mut child = sh("exit 255");
        let WaitResult::Exited(status) =
            wait_or_kill(&mut child, Duration::from_millis(10), || false).unwrap()
        else {
            panic!("expected exit");
        };
        assert_eq!(exit_code_of(&status), Some(-1));
    }

    #[cfg(unix)]
    #[test]
    fn test_stop_kills_child() {
        let mut child = sh("sleep 30");
        let result = wait_or_kill(&mut child, Duration::from_millis(10), || true).unwrap();
        assert_eq!(result, WaitResult::Killed);
    }

    #[cfg(unix)]
    #[test]
    fn test_success_code() {
        let mut child = sh("exit 0");
        let WaitResult::Exited(status) =
            wait_or_kill(&mut child, DEFAULT_POLL_INTERVAL, || false).unwrap()
        else {
            panic!("expected exit");
        };
        assert!(status.success());
        assert_eq!(exit_code_of(&status), Some(0));
    }
}
