//! The fixed reclassify → aggregate → normalize sequence for one work unit.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::layout::{self, RemapTables, WorkUnit};
use crate::toolkit::{AggregatePolicy, RasterToolkit, ReclassifyPolicy};
use crate::utils::fs;
use crate::{Error, Result};

/// Cells grouped per output cell in the aggregate stage.
pub const AGGREGATE_CELL_FACTOR: u32 = 60;

/// Constant every aggregated raster is divided by.
pub const NORMALIZE_DIVISOR: f64 = 3600.0;

/// Pause after each successful toolkit call.
pub const DEFAULT_CALL_DELAY: Duration = Duration::from_millis(500);

/// One of the three pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Reclassify,
    Aggregate,
    Normalize,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Reclassify => "reclassify",
            Stage::Aggregate => "aggregate",
            Stage::Normalize => "normalize",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a single toolkit invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Success(PathBuf),
    OperationFailed(String),
}

/// Per-stage tally. Failures keep the item label and the reason.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<(String, String)>,
}

impl StageReport {
    fn new(stage: Stage) -> Self {
        Self {
            stage,
            attempted: 0,
            succeeded: 0,
            failures: Vec::new(),
        }
    }

    fn record(&mut self, item: String, outcome: &ItemOutcome) {
        self.attempted += 1;
        match outcome {
            ItemOutcome::Success(_) => self.succeeded += 1,
            ItemOutcome::OperationFailed(reason) => self.failures.push((item, reason.clone())),
        }
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// What happened to a unit, stage by stage.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub unit: String,
    pub stages: Vec<StageReport>,
    pub cancelled: bool,
    pub duration_secs: f64,
}

impl PipelineReport {
    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    pub fn total_failed(&self) -> usize {
        self.stages.iter().map(StageReport::failed).sum()
    }

    /// Every attempted call succeeded and the run was not cancelled.
    pub fn is_clean(&self) -> bool {
        !self.cancelled && self.total_failed() == 0
    }
}

/// Runs the three stages for one unit against a shared toolkit and table set.
pub struct UnitPipeline {
    toolkit: Arc<dyn RasterToolkit>,
    tables: RemapTables,
    call_delay: Duration,
    reclassify_policy: ReclassifyPolicy,
    aggregate_policy: AggregatePolicy,
}

impl UnitPipeline {
    pub fn new(toolkit: Arc<dyn RasterToolkit>, tables: RemapTables) -> Self {
        Self {
            toolkit,
            tables,
            call_delay: DEFAULT_CALL_DELAY,
            reclassify_policy: ReclassifyPolicy::default(),
            aggregate_policy: AggregatePolicy::default(),
        }
    }

    /// Set the pause between successful toolkit calls.
    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = delay;
        self
    }

    /// Run every stage for `unit`.
    ///
    /// Never fails: individual toolkit errors are logged and recorded in the
    /// report, and each stage re-reads its inputs from disk so that a partial
    /// failure upstream only shrinks the work downstream.
    pub fn run(&self, unit: &WorkUnit, cancel: &CancellationToken) -> PipelineReport {
        let start = Instant::now();
        let mut stages = Vec::with_capacity(3);

        info!(unit = %unit, toolkit = self.toolkit.name(), "Unit pipeline started");

        for stage in [Stage::Reclassify, Stage::Aggregate, Stage::Normalize] {
            if cancel.is_cancelled() {
                warn!(unit = %unit, stage = %stage, "Cancelled before stage");
                break;
            }
            let report = match stage {
                Stage::Reclassify => self.reclassify_stage(unit, cancel),
                Stage::Aggregate => self.aggregate_stage(unit, cancel),
                Stage::Normalize => self.normalize_stage(unit, cancel),
            };
            stages.push(report);
        }

        let report = PipelineReport {
            unit: unit.name().to_string(),
            stages,
            cancelled: cancel.is_cancelled(),
            duration_secs: start.elapsed().as_secs_f64(),
        };

        info!(
            unit = %unit,
            failed = report.total_failed(),
            cancelled = report.cancelled,
            "Unit pipeline finished in {:.2}s",
            report.duration_secs
        );
        report
    }

    fn reclassify_stage(&self, unit: &WorkUnit, cancel: &CancellationToken) -> StageReport {
        let mut report = StageReport::new(Stage::Reclassify);
        let rasters =
            self.prepare_stage(unit, Stage::Reclassify, &unit.picture_dir(), &unit.reclass_dir());

        if self.tables.is_empty() {
            warn!(unit = %unit, "No remap tables, reclassify stage has nothing to do");
        }

        'rasters: for raster in &rasters {
            for (index, table) in self.tables.indexed() {
                if cancel.is_cancelled() {
                    break 'rasters;
                }
                let item = format!("{} table {:02}", layout::file_base(raster), index);
                let output = unit.reclass_output(index);
                info!(unit = %unit, table = index, "Reclassifying");
                let outcome = self.invoke(unit, Stage::Reclassify, &item, || {
                    self.toolkit
                        .reclassify(raster, table, &output, &self.reclassify_policy)
                });
                report.record(item, &outcome);
            }
        }

        report
    }

    fn aggregate_stage(&self, unit: &WorkUnit, cancel: &CancellationToken) -> StageReport {
        let mut report = StageReport::new(Stage::Aggregate);
        let rasters =
            self.prepare_stage(unit, Stage::Aggregate, &unit.reclass_dir(), &unit.aggregate_dir());

        for raster in &rasters {
            if cancel.is_cancelled() {
                break;
            }
            let base = layout::file_base(raster);
            let output = unit.aggregate_dir().join(layout::aggregate_file_name(&base));
            info!(unit = %unit, item = %base, "Aggregating");
            let outcome = self.invoke(unit, Stage::Aggregate, &base, || {
                self.toolkit
                    .aggregate(raster, AGGREGATE_CELL_FACTOR, &output, &self.aggregate_policy)
            });
            report.record(base, &outcome);
        }

        report
    }

    fn normalize_stage(&self, unit: &WorkUnit, cancel: &CancellationToken) -> StageReport {
        let mut report = StageReport::new(Stage::Normalize);
        let rasters =
            self.prepare_stage(unit, Stage::Normalize, &unit.aggregate_dir(), &unit.result_dir());

        for raster in &rasters {
            if cancel.is_cancelled() {
                break;
            }
            let base = layout::file_base(raster);
            let output = unit.result_dir().join(layout::divide_file_name(&base));
            info!(unit = %unit, item = %base, "Dividing by {}", NORMALIZE_DIVISOR);
            let outcome = self.invoke(unit, Stage::Normalize, &base, || {
                self.toolkit.divide(raster, NORMALIZE_DIVISOR, &output)
            });
            report.record(base, &outcome);
        }

        report
    }

    /// List the stage inputs and make sure the output directory exists.
    ///
    /// Neither step is fatal: a missing input directory means an empty stage,
    /// and a directory that cannot be created surfaces as per-item failures.
    fn prepare_stage(
        &self,
        unit: &WorkUnit,
        stage: Stage,
        input_dir: &Path,
        output_dir: &Path,
    ) -> Vec<PathBuf> {
        let rasters = match fs::list_rasters(input_dir) {
            Ok(rasters) => rasters,
            Err(Error::Discovery { path }) => {
                warn!(
                    unit = %unit,
                    stage = %stage,
                    dir = %path.display(),
                    "Input directory missing, stage is empty"
                );
                Vec::new()
            }
            Err(e) => {
                error!(unit = %unit, stage = %stage, error = %e, "Failed to list stage inputs");
                Vec::new()
            }
        };

        if let Err(e) = fs::ensure_dir_all(output_dir) {
            error!(unit = %unit, stage = %stage, error = %e, "Failed to prepare output directory");
        }

        debug!(unit = %unit, stage = %stage, inputs = rasters.len(), "Stage prepared");
        rasters
    }

    fn invoke(
        &self,
        unit: &WorkUnit,
        stage: Stage,
        item: &str,
        call: impl FnOnce() -> Result<PathBuf>,
    ) -> ItemOutcome {
        match call() {
            Ok(path) => {
                debug!(unit = %unit, stage = %stage, item, output = %path.display(), "Done");
                if !self.call_delay.is_zero() {
                    std::thread::sleep(self.call_delay);
                }
                ItemOutcome::Success(path)
            }
            Err(e) => {
                let err = Error::stage(stage.as_str(), item, &e);
                error!(unit = %unit, stage = %stage, item, "{}", err);
                ItemOutcome::OperationFailed(e.to_string())
            }
        }
    }
}
