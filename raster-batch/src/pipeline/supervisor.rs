//! Child-process execution of a unit.
//!
//! Each unit is handed to a separate worker executable whose exit code is the
//! only status channel. The calling pool thread blocks until the child exits.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use process_utils::{DEFAULT_POLL_INTERVAL, WaitResult, exit_code_of, std_command, wait_or_kill};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::runner::{UnitOutcome, UnitRunner};
use crate::Error;
use crate::layout::WorkUnit;

/// Default name of the per-unit worker executable.
pub const DEFAULT_WORKER_PROGRAM: &str = "raster-unit";

/// Locate the worker executable.
///
/// Looks next to the running binary first (and, for binaries run out of
/// cargo's `target/<profile>/deps`, one directory up). Falls back to the bare
/// name, which the OS resolves through `PATH`.
pub fn default_worker_program() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| worker_beside(&exe))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_WORKER_PROGRAM))
}

fn worker_beside(exe: &Path) -> Option<PathBuf> {
    let file_name = format!("{DEFAULT_WORKER_PROGRAM}{}", std::env::consts::EXE_SUFFIX);
    let dir = exe.parent()?;

    let mut candidates = vec![dir.join(&file_name)];
    if dir.file_name().is_some_and(|name| name == "deps")
        && let Some(profile_dir) = dir.parent()
    {
        candidates.push(profile_dir.join(&file_name));
    }
    candidates.into_iter().find(|path| path.is_file())
}

/// Exit code a worker uses to report a failed unit.
pub const EXIT_FAILURE: i32 = -1;

/// Exit status of a worker process mapped onto the unit contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitOutcome {
    /// Exit code 0.
    Success,
    /// Exit code -1.
    Failure,
    /// Any other exit code, or `None` when the process died from a signal.
    UnknownError(Option<i32>),
}

impl ExitOutcome {
    pub fn from_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => ExitOutcome::Success,
            Some(EXIT_FAILURE) => ExitOutcome::Failure,
            other => ExitOutcome::UnknownError(other),
        }
    }
}

/// Launches `<program> <unit picture dir>` per unit and waits for it.
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    program: PathBuf,
    poll_interval: Duration,
    envs: Vec<(OsString, OsString)>,
}

impl ProcessSupervisor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            envs: Vec::new(),
        }
    }

    /// How often the child is polled for exit and the cancel token checked.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Set an environment variable for every worker process.
    pub fn with_env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.envs
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new(default_worker_program())
    }
}

impl UnitRunner for ProcessSupervisor {
    fn name(&self) -> &'static str {
        "ProcessSupervisor"
    }

    fn run(&self, unit: &WorkUnit, cancel: &CancellationToken) -> UnitOutcome {
        let unit_dir = unit.picture_dir();
        debug!(unit = %unit, program = %self.program.display(), "Spawning worker process");

        let mut child = match std_command(&self.program)
            .arg(&unit_dir)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(source) => {
                let err = Error::ProcessSpawn {
                    program: self.program.display().to_string(),
                    source,
                };
                error!(unit = %unit, error = %err, "Process spawn failed");
                return UnitOutcome::Failed(err.to_string());
            }
        };

        let pid = child.id();
        match wait_or_kill(&mut child, self.poll_interval, || cancel.is_cancelled()) {
            Ok(WaitResult::Exited(status)) => {
                let code = exit_code_of(&status);
                let outcome = ExitOutcome::from_code(code);
                match outcome {
                    ExitOutcome::Success => {
                        info!(unit = %unit, pid, exit_code = ?code, "Process done")
                    }
                    ExitOutcome::Failure => {
                        error!(unit = %unit, pid, exit_code = ?code, "Process error")
                    }
                    ExitOutcome::UnknownError(_) => {
                        warn!(unit = %unit, pid, exit_code = ?code, "Unknown error")
                    }
                }
                UnitOutcome::Exited(outcome)
            }
            Ok(WaitResult::Killed) => {
                warn!(unit = %unit, pid, "Worker process killed on cancellation");
                UnitOutcome::Cancelled
            }
            Err(e) => {
                let err = Error::ProcessExit {
                    unit: unit.name().to_string(),
                    reason: e.to_string(),
                };
                error!(unit = %unit, pid, error = %err, "Failed to wait for worker process");
                UnitOutcome::Failed(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_mapping() {
        assert_eq!(ExitOutcome::from_code(Some(0)), ExitOutcome::Success);
        assert_eq!(ExitOutcome::from_code(Some(-1)), ExitOutcome::Failure);
        assert_eq!(ExitOutcome::from_code(Some(7)), ExitOutcome::UnknownError(Some(7)));
        assert_eq!(ExitOutcome::from_code(None), ExitOutcome::UnknownError(None));
    }

    #[test]
    fn test_worker_found_beside_executable() {
        let tmp = tempfile::TempDir::new().unwrap();
        let worker = tmp
            .path()
            .join(format!("raster-unit{}", std::env::consts::EXE_SUFFIX));
        std::fs::write(&worker, b"").unwrap();

        let found = worker_beside(&tmp.path().join("raster-batch"));
        assert_eq!(found, Some(worker.clone()));

        let deps = tmp.path().join("deps");
        std::fs::create_dir(&deps).unwrap();
        assert_eq!(worker_beside(&deps.join("worker_pool_tests-1a2b")), Some(worker));
    }

    #[test]
    fn test_worker_missing_beside_executable() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert_eq!(worker_beside(&tmp.path().join("raster-batch")), None);
    }

    #[test]
    fn test_spawn_failure_is_failed_outcome() {
        let supervisor = ProcessSupervisor::new("/nonexistent/raster-unit");
        let unit = WorkUnit::new("/data", "Basin1");
        let outcome = supervisor.run(&unit, &CancellationToken::new());
        match outcome {
            UnitOutcome::Failed(reason) => assert!(reason.contains("/nonexistent/raster-unit")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_cancel_kills_child() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::TempDir::new().unwrap();
        let program = tmp.path().join("slow.sh");
        std::fs::write(&program, "#!/bin/sh\nsleep 30\n").unwrap();
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();

        let supervisor =
            ProcessSupervisor::new(&program).with_poll_interval(Duration::from_millis(10));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = supervisor.run(&WorkUnit::new(tmp.path(), "Basin1"), &cancel);
        assert!(matches!(outcome, UnitOutcome::Cancelled));
    }
}
