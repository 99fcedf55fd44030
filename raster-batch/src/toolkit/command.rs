//! Toolkit adapter that shells out to an external geoprocessing executable.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use process_utils::std_command;
use tracing::{debug, warn};

use super::{AggregatePolicy, RasterToolkit, ReclassifyPolicy};
use crate::{Error, Result};

/// Runs `<program> <operation> <input> <param> <output> [policy flags...]`
/// once per raster call. A zero exit status means the output was written.
#[derive(Debug, Clone)]
pub struct CommandToolkit {
    program: PathBuf,
}

impl CommandToolkit {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run<I, S>(&self, tool: &'static str, args: I, output: &Path) -> Result<PathBuf>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = std_command(&self.program);
        cmd.arg(tool)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(program = %self.program.display(), tool, "Invoking toolkit");

        let result = cmd.output().map_err(|source| Error::ProcessSpawn {
            program: self.program.display().to_string(),
            source,
        })?;

        for line in String::from_utf8_lossy(&result.stdout).lines() {
            debug!(tool, "stdout: {}", line);
        }

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
            warn!(tool, status = %result.status, "Toolkit call failed");
            return Err(Error::ToolFailed {
                tool,
                code: result.status.code(),
                stderr,
            });
        }

        Ok(output.to_path_buf())
    }
}

impl RasterToolkit for CommandToolkit {
    fn name(&self) -> &'static str {
        "CommandToolkit"
    }

    fn reclassify(
        &self,
        input: &Path,
        table: &Path,
        output: &Path,
        policy: &ReclassifyPolicy,
    ) -> Result<PathBuf> {
        self.run(
            "reclassify",
            [
                input.as_os_str(),
                table.as_os_str(),
                output.as_os_str(),
                OsStr::new("--from-field"),
                OsStr::new(policy.from_field),
                OsStr::new("--to-field"),
                OsStr::new(policy.to_field),
                OsStr::new("--out-field"),
                OsStr::new(policy.output_field),
                OsStr::new("--missing"),
                OsStr::new(policy.missing_values),
            ],
            output,
        )
    }

    fn aggregate(
        &self,
        input: &Path,
        cell_factor: u32,
        output: &Path,
        policy: &AggregatePolicy,
    ) -> Result<PathBuf> {
        let factor = cell_factor.to_string();
        self.run(
            "aggregate",
            [
                input.as_os_str(),
                OsStr::new(&factor),
                output.as_os_str(),
                OsStr::new("--type"),
                OsStr::new(policy.aggregation),
                OsStr::new("--extent"),
                OsStr::new(policy.extent),
                OsStr::new("--nodata"),
                OsStr::new(policy.nodata),
            ],
            output,
        )
    }

    fn divide(&self, input: &Path, divisor: f64, output: &Path) -> Result<PathBuf> {
        let divisor = divisor.to_string();
        self.run(
            "divide",
            [input.as_os_str(), OsStr::new(&divisor), output.as_os_str()],
            output,
        )
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("raster-tool.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_reclassify_passes_policy_flags() {
        let tmp = TempDir::new().unwrap();
        let log = tmp.path().join("args.txt");
        let tool = script(
            tmp.path(),
            &format!("echo \"$@\" > {}\ntouch \"$4\"", log.display()),
        );
        let toolkit = CommandToolkit::new(&tool);

        let out = tmp.path().join("Basin1_table01.tif");
        let produced = toolkit
            .reclassify(
                Path::new("in.tif"),
                Path::new("t1.txt"),
                &out,
                &ReclassifyPolicy::default(),
            )
            .unwrap();

        assert_eq!(produced, out);
        assert!(out.exists());
        let args = std::fs::read_to_string(&log).unwrap();
        assert!(args.starts_with("reclassify in.tif t1.txt"));
        assert!(args.contains("--from-field FROM --to-field TO --out-field OUT --missing DATA"));
    }

    #[test]
    fn test_divide_formats_divisor() {
        let tmp = TempDir::new().unwrap();
        let log = tmp.path().join("args.txt");
        let tool = script(tmp.path(), &format!("echo \"$@\" > {}", log.display()));
        let toolkit = CommandToolkit::new(&tool);

        toolkit
            .divide(Path::new("a_Agg.tif"), 3600.0, Path::new("a_Agg_Div.tif"))
            .unwrap();

        let args = std::fs::read_to_string(&log).unwrap();
        assert_eq!(args.trim(), "divide a_Agg.tif 3600 a_Agg_Div.tif");
    }

    #[test]
    fn test_non_zero_exit_is_tool_failure() {
        let tmp = TempDir::new().unwrap();
        let tool = script(tmp.path(), "echo 'cell size mismatch' >&2\nexit 3");
        let toolkit = CommandToolkit::new(&tool);

        let err = toolkit
            .aggregate(
                Path::new("in.tif"),
                60,
                Path::new("out.tif"),
                &AggregatePolicy::default(),
            )
            .unwrap_err();

        match err {
            Error::ToolFailed { tool, code, stderr } => {
                assert_eq!(tool, "aggregate");
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "cell size mismatch");
            }
            other => panic!("expected tool failure, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let toolkit = CommandToolkit::new("/nonexistent/raster-tool");
        let err = toolkit
            .divide(Path::new("a.tif"), 3600.0, Path::new("b.tif"))
            .unwrap_err();
        assert!(matches!(err, Error::ProcessSpawn { .. }));
    }
}
