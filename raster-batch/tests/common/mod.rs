//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use raster_batch::Result;
use raster_batch::toolkit::{AggregatePolicy, RasterToolkit, ReclassifyPolicy};
use tempfile::TempDir;

/// Initialize tracing for tests.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// A root folder laid out as `Picture/<unit>/*.tif` plus `table/*`.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn add_unit(&self, unit: &str, rasters: &[&str]) -> PathBuf {
        let dir = self.root().join("Picture").join(unit);
        std::fs::create_dir_all(&dir).unwrap();
        for raster in rasters {
            std::fs::write(dir.join(raster), b"raster").unwrap();
        }
        dir
    }

    pub fn add_tables(&self, tables: &[&str]) {
        let dir = self.root().join("table");
        std::fs::create_dir_all(&dir).unwrap();
        for table in tables {
            std::fs::write(dir.join(table), b"1 10\n2 20\n").unwrap();
        }
    }

    /// Sorted file names inside `<stage_dir>/<unit>`.
    pub fn outputs(&self, stage_dir: &str, unit: &str) -> Vec<String> {
        let dir = self.root().join(stage_dir).join(unit);
        let Ok(entries) = std::fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

/// One recorded toolkit call.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub op: &'static str,
    pub input: PathBuf,
    pub param: String,
    pub output: PathBuf,
}

/// Toolkit fake that writes its output file and records every call.
///
/// Calls whose output file name contains one of `fail_on` fail without
/// writing anything.
#[derive(Default)]
pub struct RecordingToolkit {
    calls: Mutex<Vec<Call>>,
    fail_on: Vec<String>,
}

impl RecordingToolkit {
    pub fn failing_on(patterns: &[&str]) -> Self {
        Self {
            calls: Mutex::default(),
            fail_on: patterns.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, op: &str) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.op == op).collect()
    }

    fn record(
        &self,
        op: &'static str,
        input: &Path,
        param: String,
        output: &Path,
    ) -> Result<PathBuf> {
        self.calls.lock().push(Call {
            op,
            input: input.to_path_buf(),
            param,
            output: output.to_path_buf(),
        });

        let name = output.file_name().unwrap().to_string_lossy();
        if self.fail_on.iter().any(|p| name.contains(p.as_str())) {
            return Err(raster_batch::Error::Other(format!("{op} rejected {name}")));
        }

        std::fs::write(output, b"raster").unwrap();
        Ok(output.to_path_buf())
    }
}

impl RasterToolkit for RecordingToolkit {
    fn name(&self) -> &'static str {
        "RecordingToolkit"
    }

    fn reclassify(
        &self,
        input: &Path,
        table: &Path,
        output: &Path,
        _policy: &ReclassifyPolicy,
    ) -> Result<PathBuf> {
        let table = table.file_name().unwrap().to_string_lossy().into_owned();
        self.record("reclassify", input, table, output)
    }

    fn aggregate(
        &self,
        input: &Path,
        cell_factor: u32,
        output: &Path,
        _policy: &AggregatePolicy,
    ) -> Result<PathBuf> {
        self.record("aggregate", input, cell_factor.to_string(), output)
    }

    fn divide(&self, input: &Path, divisor: f64, output: &Path) -> Result<PathBuf> {
        self.record("divide", input, divisor.to_string(), output)
    }
}

/// Write an executable shell script.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
