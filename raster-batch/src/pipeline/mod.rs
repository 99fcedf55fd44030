//! Unit processing and the bounded pool that schedules it.

mod runner;
mod supervisor;
mod unit;
mod worker_pool;

pub use runner::{InProcessRunner, UnitOutcome, UnitRunner};
pub use supervisor::{
    DEFAULT_WORKER_PROGRAM, EXIT_FAILURE, ExitOutcome, ProcessSupervisor, default_worker_program,
};
pub use unit::{
    AGGREGATE_CELL_FACTOR, DEFAULT_CALL_DELAY, ItemOutcome, NORMALIZE_DIVISOR, PipelineReport,
    Stage, StageReport, UnitPipeline,
};
pub use worker_pool::{
    DEFAULT_POLL_INTERVAL_MS, PoolStats, SlotId, WorkerHandle, WorkerPool, WorkerPoolConfig,
};
