//! Working-directory layout: unit discovery, stage directories and output names.
//!
//! For a root `R` and unit `U`:
//!
//! ```text
//! R/Picture/U/*.tif          inputs
//! R/table/*                  remap tables (shared by every unit)
//! R/Reclass/U/U_tableNN.tif  reclassify output
//! R/Aggregate/U/{base}_Agg.tif
//! R/Result/U/{base}_Div.tif
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::utils::fs;
use crate::{Error, Result};

pub const PICTURE_DIR: &str = "Picture";
pub const TABLE_DIR: &str = "table";
pub const RECLASS_DIR: &str = "Reclass";
pub const AGGREGATE_DIR: &str = "Aggregate";
pub const RESULT_DIR: &str = "Result";

/// One subject directory processed through the full pipeline.
///
/// Units are created at discovery time and never mutated afterwards.
#[derive(Debug, PartialEq, Eq)]
pub struct WorkUnit {
    name: String,
    root: PathBuf,
}

impl WorkUnit {
    pub fn new(root: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
        }
    }

    /// Rebuild a unit from its picture directory (`R/Picture/U`).
    ///
    /// This is how the child worker receives its unit in process mode.
    pub fn from_unit_dir(dir: &Path) -> Result<Self> {
        let name = dir
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidPath(dir.display().to_string()))?;
        let root = dir
            .parent()
            .and_then(Path::parent)
            .ok_or_else(|| Error::InvalidPath(dir.display().to_string()))?;
        Ok(Self::new(root, name))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn picture_dir(&self) -> PathBuf {
        self.root.join(PICTURE_DIR).join(&self.name)
    }

    pub fn table_dir(&self) -> PathBuf {
        self.root.join(TABLE_DIR)
    }

    pub fn reclass_dir(&self) -> PathBuf {
        self.root.join(RECLASS_DIR).join(&self.name)
    }

    pub fn aggregate_dir(&self) -> PathBuf {
        self.root.join(AGGREGATE_DIR).join(&self.name)
    }

    pub fn result_dir(&self) -> PathBuf {
        self.root.join(RESULT_DIR).join(&self.name)
    }

    /// Reclassify output path for the 1-based table `index`.
    pub fn reclass_output(&self, index: usize) -> PathBuf {
        self.reclass_dir().join(reclass_file_name(&self.name, index))
    }
}

impl std::fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Discover one [`WorkUnit`] per immediate subdirectory of `root/Picture`.
///
/// Units come back in directory-name order, which is also the launch order.
pub fn discover_units(root: &Path) -> Result<Vec<WorkUnit>> {
    let picture = root.join(PICTURE_DIR);
    let units: Vec<WorkUnit> = fs::list_subdirs(&picture)?
        .into_iter()
        .filter_map(|dir| match dir.file_name().and_then(|name| name.to_str()) {
            Some(name) => Some(WorkUnit::new(root, name)),
            None => {
                warn!(dir = %dir.display(), "Skipping unit directory with a non UTF-8 name");
                None
            }
        })
        .collect();

    info!(root = %root.display(), count = units.len(), "Discovered work units");
    Ok(units)
}

/// `{unit}_table{NN}.tif`, with `index` 1-based and zero-padded to two digits.
pub fn reclass_file_name(unit: &str, index: usize) -> String {
    format!("{unit}_table{index:02}.{}", fs::RASTER_EXTENSION)
}

/// `{base}_Agg.tif`
pub fn aggregate_file_name(base: &str) -> String {
    format!("{base}_Agg.{}", fs::RASTER_EXTENSION)
}

/// `{base}_Div.tif`
pub fn divide_file_name(base: &str) -> String {
    format!("{base}_Div.{}", fs::RASTER_EXTENSION)
}

/// File name without its extension, as used for chaining stage outputs.
pub fn file_base(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Ordered, read-only list of remap tables found under `root/table`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemapTables {
    tables: Arc<[PathBuf]>,
}

impl RemapTables {
    /// Load every regular file in `root/table`, sorted by name.
    pub fn discover(root: &Path) -> Result<Self> {
        let dir = root.join(TABLE_DIR);
        let tables = fs::list_files(&dir)?;
        debug!(dir = %dir.display(), count = tables.len(), "Loaded remap tables");
        Ok(Self::from_paths(tables))
    }

    pub fn from_paths(tables: Vec<PathBuf>) -> Self {
        Self {
            tables: tables.into(),
        }
    }

    /// Tables paired with their 1-based index.
    pub fn indexed(&self) -> impl Iterator<Item = (usize, &Path)> {
        self.tables
            .iter()
            .enumerate()
            .map(|(i, path)| (i + 1, path.as_path()))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
