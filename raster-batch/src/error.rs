//! Application-wide error types.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    /// A directory the run depends on (the root, `Picture` or `table`) is missing.
    #[error("Discovery error: {path} does not exist or is not a directory")]
    Discovery { path: PathBuf },

    #[error("Invalid path: {0:?}")]
    InvalidPath(String),

    #[error("Stage {stage} failed for {item}: {reason}")]
    StageOperation {
        stage: &'static str,
        item: String,
        reason: String,
    },

    #[error("Toolkit {tool} failed (exit code {code:?}): {stderr}")]
    ToolFailed {
        tool: &'static str,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Failed to spawn {program}: {source}")]
    ProcessSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Process for unit {unit} exited abnormally: {reason}")]
    ProcessExit { unit: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error while {op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn discovery(path: impl Into<PathBuf>) -> Self {
        Self::Discovery { path: path.into() }
    }

    pub fn io_path(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn stage(stage: &'static str, item: impl Into<String>, reason: impl ToString) -> Self {
        Self::StageOperation {
            stage,
            item: item.into(),
            reason: reason.to_string(),
        }
    }
}
