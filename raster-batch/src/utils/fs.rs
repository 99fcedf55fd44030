//! Filesystem helpers shared across modules.
//!
//! These helpers provide consistent error context (operation + path) and keep
//! directory listings deterministic (sorted by file name).

use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Extension of raster files picked up by every stage.
pub const RASTER_EXTENSION: &str = "tif";

/// Convert an IO error into an application error with operation + path context.
pub fn io_error(op: &'static str, path: &Path, source: std::io::Error) -> Error {
    Error::io_path(op, path, source)
}

/// Reject paths that can never name a directory.
pub fn validate_dir_path(path: &Path) -> Result<()> {
    let raw = path.to_string_lossy();
    if raw.trim().is_empty() || raw.contains('\0') {
        return Err(Error::InvalidPath(raw.into_owned()));
    }
    Ok(())
}

/// Ensure a directory exists, creating it (recursively) if needed.
pub fn ensure_dir_all(path: &Path) -> Result<()> {
    ensure_dir_all_with_op("creating directory", path)
}

/// Ensure a directory exists with a custom operation label.
pub fn ensure_dir_all_with_op(op: &'static str, path: &Path) -> Result<()> {
    validate_dir_path(path)?;
    std::fs::create_dir_all(path).map_err(|e| io_error(op, path, e))
}

/// Immediate subdirectories of `root`, sorted by name.
///
/// Fails with [`Error::Discovery`] when `root` is not an existing directory.
pub fn list_subdirs(root: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = read_entries(root, |path| path.is_dir())?;
    dirs.sort();
    Ok(dirs)
}

/// Regular files directly inside `dir`, sorted by name.
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = read_entries(dir, |path| path.is_file())?;
    files.sort();
    Ok(files)
}

/// Raster files (`*.tif`, case-insensitive) directly inside `dir`, sorted by name.
pub fn list_rasters(dir: &Path) -> Result<Vec<PathBuf>> {
    Ok(list_files(dir)?
        .into_iter()
        .filter(|path| is_raster(path))
        .collect())
}

/// Whether `path` carries the raster extension.
pub fn is_raster(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(RASTER_EXTENSION))
}

fn read_entries(dir: &Path, keep: impl Fn(&Path) -> bool) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::discovery(dir));
    }

    let entries = std::fs::read_dir(dir).map_err(|e| io_error("listing", dir, e))?;
    let mut out = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| io_error("listing", dir, e))?.path();
        if keep(&path) {
            out.push(path);
        }
    }
    Ok(out)
}
