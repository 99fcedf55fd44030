//! Boundary to the external GIS toolkit that performs the raster math.
//!
//! The toolkit is opaque: every operation is a synchronous, blocking and
//! fallible call that reads one raster and writes another. Policies are the
//! fixed parameters the toolkit expects alongside the paths.

mod command;
mod license;

use std::path::{Path, PathBuf};

pub use command::CommandToolkit;
pub use license::{LicenseGuard, ToolkitLicense, UnlicensedToolkit};

use crate::Result;

/// Missing-value mode under which NoData cells still take part in the computation.
pub const NODATA_AS_DATA: &str = "DATA";

/// How reclassify reads the remap table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReclassifyPolicy {
    pub from_field: &'static str,
    pub to_field: &'static str,
    pub output_field: &'static str,
    pub missing_values: &'static str,
}

impl Default for ReclassifyPolicy {
    fn default() -> Self {
        Self {
            from_field: "FROM",
            to_field: "TO",
            output_field: "OUT",
            missing_values: NODATA_AS_DATA,
        }
    }
}

/// How aggregate combines cells: summed, partial edge blocks dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatePolicy {
    pub aggregation: &'static str,
    pub extent: &'static str,
    pub nodata: &'static str,
}

impl Default for AggregatePolicy {
    fn default() -> Self {
        Self {
            aggregation: "SUM",
            extent: "TRUNCATE",
            nodata: NODATA_AS_DATA,
        }
    }
}

/// The three raster operations the pipeline needs.
///
/// Each call returns the path of the raster it produced. Implementations
/// must be callable from many worker threads at once.
pub trait RasterToolkit: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    fn reclassify(
        &self,
        input: &Path,
        table: &Path,
        output: &Path,
        policy: &ReclassifyPolicy,
    ) -> Result<PathBuf>;

    fn aggregate(
        &self,
        input: &Path,
        cell_factor: u32,
        output: &Path,
        policy: &AggregatePolicy,
    ) -> Result<PathBuf>;

    fn divide(&self, input: &Path, divisor: f64, output: &Path) -> Result<PathBuf>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policies() {
        let reclass = ReclassifyPolicy::default();
        assert_eq!(reclass.from_field, "FROM");
        assert_eq!(reclass.to_field, "TO");
        assert_eq!(reclass.output_field, "OUT");
        assert_eq!(reclass.missing_values, "DATA");

        let agg = AggregatePolicy::default();
        assert_eq!(agg.aggregation, "SUM");
        assert_eq!(agg.extent, "TRUNCATE");
        assert_eq!(agg.nodata, "DATA");
    }
}
