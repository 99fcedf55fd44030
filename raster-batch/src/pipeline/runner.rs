//! Unit execution strategies plugged into the worker pool.

use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::supervisor::ExitOutcome;
use super::unit::{PipelineReport, UnitPipeline};
use crate::layout::WorkUnit;

/// How a unit ended, as seen by the pool.
#[derive(Debug, Clone)]
pub enum UnitOutcome {
    /// The in-process pipeline ran every stage.
    Completed(PipelineReport),
    /// A supervised child process exited.
    Exited(ExitOutcome),
    /// The unit could not run (spawn error, wait error, worker panic).
    Failed(String),
    /// Stopped by the cancellation token.
    Cancelled,
}

impl UnitOutcome {
    pub fn is_success(&self) -> bool {
        match self {
            UnitOutcome::Completed(report) => report.is_clean(),
            UnitOutcome::Exited(exit) => *exit == ExitOutcome::Success,
            UnitOutcome::Failed(_) | UnitOutcome::Cancelled => false,
        }
    }
}

/// Runs one unit to completion on the calling worker thread.
///
/// Implementations block for as long as the unit takes and must never panic
/// on ordinary failures; the pool turns a panic into a failed unit anyway.
pub trait UnitRunner: Send + Sync + 'static {
    /// Runner name used in logs.
    fn name(&self) -> &'static str;

    fn run(&self, unit: &WorkUnit, cancel: &CancellationToken) -> UnitOutcome;
}

/// Runs the pipeline inside the dispatcher process, one thread per unit.
pub struct InProcessRunner {
    pipeline: UnitPipeline,
}

impl InProcessRunner {
    pub fn new(pipeline: UnitPipeline) -> Self {
        Self { pipeline }
    }
}

impl UnitRunner for InProcessRunner {
    fn name(&self) -> &'static str {
        "InProcessRunner"
    }

    fn run(&self, unit: &WorkUnit, cancel: &CancellationToken) -> UnitOutcome {
        let report = self.pipeline.run(unit, cancel);
        if report.cancelled {
            warn!(unit = %unit, "Unit cancelled mid-pipeline");
            return UnitOutcome::Cancelled;
        }
        UnitOutcome::Completed(report)
    }
}
