//! Bounded worker pool that drains a FIFO queue of work units.
//!
//! Pending units and in-flight slots live behind one mutex so that "is there
//! room?", "take the next unit" and "reserve a slot" happen as one step. A slot
//! is reserved before its worker thread exists and the worker installs its own
//! handle once running. When a worker finishes it frees its slot and backfills
//! the pool under the same lock acquisition.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::runner::{UnitOutcome, UnitRunner};
use crate::Result;
use crate::hardware;
use crate::layout::{self, WorkUnit};
use crate::panic_hook::payload_message;

/// Identifier of an in-flight slot, unique for the lifetime of a pool.
pub type SlotId = u64;

/// Default interval at which callers poll [`WorkerPool::is_done`].
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 200;

/// Configuration for a worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    /// Maximum number of units in flight at once.
    pub max_concurrency: usize,
    /// How often the driver polls for completion.
    pub poll_interval_ms: u64,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_concurrency: hardware::detect_max_concurrency(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl WorkerPoolConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Handle a running worker installs into its reserved slot.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    unit: String,
    thread: thread::Thread,
    started_at: Instant,
}

impl WorkerHandle {
    /// Handle for the calling thread working on `unit`.
    pub fn current(unit: &WorkUnit) -> Self {
        Self {
            unit: unit.name().to_string(),
            thread: thread::current(),
            started_at: Instant::now(),
        }
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn thread_name(&self) -> Option<&str> {
        self.thread.name()
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Counters describing a pool run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Units whose worker thread was spawned.
    pub launched: usize,
    /// Units finished, failed to spawn or dropped by cancellation.
    pub completed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Times the launch routine ran: once at start plus once per completion.
    pub launch_passes: usize,
    /// Highest number of simultaneously occupied slots.
    pub peak_in_flight: usize,
    pub pending: usize,
    pub in_flight: usize,
}

struct PoolState {
    pending: VecDeque<WorkUnit>,
    in_flight: HashMap<SlotId, Option<WorkerHandle>>,
    next_slot: SlotId,
    stats: PoolStats,
}

impl PoolState {
    fn is_done(&self) -> bool {
        self.pending.is_empty() && self.in_flight.is_empty()
    }

    fn record(&mut self, outcome: &UnitOutcome) {
        self.stats.completed += 1;
        match outcome {
            UnitOutcome::Cancelled => self.stats.cancelled += 1,
            o if o.is_success() => self.stats.succeeded += 1,
            _ => self.stats.failed += 1,
        }
    }
}

struct PoolShared {
    state: Mutex<PoolState>,
    idle: Condvar,
    max_concurrency: usize,
    runner: Arc<dyn UnitRunner>,
    cancel: CancellationToken,
}

impl PoolShared {
    /// Fill free slots from the head of the queue. Caller holds the lock.
    fn launch_locked(self: &Arc<Self>, state: &mut PoolState) -> usize {
        state.stats.launch_passes += 1;
        let mut launched = 0;

        while state.in_flight.len() < self.max_concurrency && !self.cancel.is_cancelled() {
            let Some(unit) = state.pending.pop_front() else {
                break;
            };

            let id = state.next_slot;
            state.next_slot += 1;
            state.in_flight.insert(id, None);
            state.stats.peak_in_flight = state.stats.peak_in_flight.max(state.in_flight.len());

            let unit_name = unit.name().to_string();
            match self.spawn_worker(id, unit) {
                Ok(()) => {
                    launched += 1;
                    state.stats.launched += 1;
                    debug!(slot = id, unit = %unit_name, "Worker launched");
                }
                Err(e) => {
                    state.in_flight.remove(&id);
                    state.record(&UnitOutcome::Failed(e.to_string()));
                    error!(
                        slot = id,
                        unit = %unit_name,
                        error = %e,
                        "Failed to spawn worker thread"
                    );
                }
            }
        }

        launched
    }

    fn spawn_worker(self: &Arc<Self>, id: SlotId, unit: WorkUnit) -> std::io::Result<()> {
        let shared = Arc::clone(self);
        thread::Builder::new()
            .name(format!("unit-{id}"))
            .spawn(move || shared.run_worker(id, unit))
            .map(|_| ())
    }

    fn run_worker(self: &Arc<Self>, id: SlotId, unit: WorkUnit) {
        self.on_worker_started(id, WorkerHandle::current(&unit));

        let outcome = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.runner.run(&unit, &self.cancel)
        })) {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = payload_message(payload.as_ref());
                error!(slot = id, unit = %unit, "Worker panicked: {}", message);
                UnitOutcome::Failed(format!("worker panicked: {message}"))
            }
        };

        self.on_worker_done(id, &unit, &outcome);
    }

    fn on_worker_started(&self, id: SlotId, handle: WorkerHandle) {
        let mut state = self.state.lock();
        match state.in_flight.get_mut(&id) {
            Some(Some(existing)) => {
                warn!(slot = id, unit = existing.unit(), "Slot already has a worker installed");
            }
            Some(slot) => {
                debug!(
                    slot = id,
                    unit = handle.unit(),
                    thread = ?handle.thread_name(),
                    "Worker started"
                );
                *slot = Some(handle);
            }
            None => error!(slot = id, unit = handle.unit(), "Worker started on an unreserved slot"),
        }
    }

    fn on_worker_done(self: &Arc<Self>, id: SlotId, unit: &WorkUnit, outcome: &UnitOutcome) {
        let mut state = self.state.lock();

        match state.in_flight.remove(&id) {
            Some(Some(handle)) => info!(
                slot = id,
                unit = %unit,
                success = outcome.is_success(),
                "Thread {} done in {:.2}s",
                id,
                handle.elapsed().as_secs_f64()
            ),
            Some(None) => info!(slot = id, unit = %unit, "Thread {} done", id),
            None => error!(slot = id, unit = %unit, "Done notification for an unknown slot"),
        }

        state.record(outcome);
        self.launch_locked(&mut state);

        if state.is_done() {
            info!(completed = state.stats.completed, "All units processed");
            self.idle.notify_all();
        }
    }
}

/// Runs work units with at most `max_concurrency` in flight.
///
/// Cloning yields another handle to the same pool.
#[derive(Clone)]
pub struct WorkerPool {
    shared: Arc<PoolShared>,
}

impl WorkerPool {
    /// Create a pool over an explicit list of units, kept in the given order.
    pub fn new(
        units: Vec<WorkUnit>,
        runner: Arc<dyn UnitRunner>,
        config: WorkerPoolConfig,
    ) -> Self {
        let max_concurrency = config.max_concurrency.max(1);
        info!(
            units = units.len(),
            max_concurrency,
            runner = runner.name(),
            "Worker pool initialized"
        );

        let state = PoolState {
            pending: units.into(),
            in_flight: HashMap::with_capacity(max_concurrency),
            next_slot: 0,
            stats: PoolStats::default(),
        };

        Self {
            shared: Arc::new(PoolShared {
                state: Mutex::new(state),
                idle: Condvar::new(),
                max_concurrency,
                runner,
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Discover units under `root` and queue them.
    ///
    /// Fails with a discovery error when `root/Picture` is missing, in which
    /// case nothing is queued.
    pub fn initialize(
        root: &Path,
        runner: Arc<dyn UnitRunner>,
        config: WorkerPoolConfig,
    ) -> Result<Self> {
        let units = layout::discover_units(root)?;
        Ok(Self::new(units, runner, config))
    }

    /// Launch as many pending units as there are free slots.
    ///
    /// Returns the number of workers spawned by this call.
    pub fn launch_waiting(&self) -> usize {
        let mut state = self.shared.state.lock();
        let launched = self.shared.launch_locked(&mut state);
        if state.is_done() {
            self.shared.idle.notify_all();
        }
        launched
    }

    /// True once the queue is drained and no slot is occupied.
    pub fn is_done(&self) -> bool {
        self.shared.state.lock().is_done()
    }

    /// Block until the pool is done. Never returns if nothing was launched.
    pub fn wait(&self) {
        let mut state = self.shared.state.lock();
        while !state.is_done() {
            self.shared.idle.wait(&mut state);
        }
    }

    /// Block until done or `timeout` elapses. Returns whether the pool is done.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while !state.is_done() {
            if self.shared.idle.wait_until(&mut state, deadline).timed_out() {
                return state.is_done();
            }
        }
        true
    }

    /// Stop launching, drop the pending queue and signal running workers.
    ///
    /// Running units see the token at their next checkpoint; their slots are
    /// freed through the normal done path.
    pub fn cancel(&self) {
        self.shared.cancel.cancel();

        let mut state = self.shared.state.lock();
        let dropped = state.pending.len();
        state.pending.clear();
        state.stats.cancelled += dropped;
        state.stats.completed += dropped;

        warn!(dropped, in_flight = state.in_flight.len(), "Worker pool cancelled");
        if state.is_done() {
            self.shared.idle.notify_all();
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        PoolStats {
            pending: state.pending.len(),
            in_flight: state.in_flight.len(),
            ..state.stats.clone()
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.shared.max_concurrency
    }

    pub fn pending_count(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.shared.state.lock().in_flight.len()
    }

    /// Units currently running, by installed handle.
    pub fn running_units(&self) -> Vec<String> {
        let state = self.shared.state.lock();
        let mut units: Vec<String> = state
            .in_flight
            .values()
            .flatten()
            .map(|h| h.unit().to_string())
            .collect();
        units.sort();
        units
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ExitOutcome;

    struct NoopRunner;

    impl UnitRunner for NoopRunner {
        fn name(&self) -> &'static str {
            "NoopRunner"
        }

        fn run(&self, _unit: &WorkUnit, _cancel: &CancellationToken) -> UnitOutcome {
            UnitOutcome::Exited(ExitOutcome::Success)
        }
    }

    struct PanicRunner;

    impl UnitRunner for PanicRunner {
        fn name(&self) -> &'static str {
            "PanicRunner"
        }

        fn run(&self, unit: &WorkUnit, _cancel: &CancellationToken) -> UnitOutcome {
            panic!("boom in {}", unit.name());
        }
    }

    fn units(n: usize) -> Vec<WorkUnit> {
        (0..n).map(|i| WorkUnit::new("/data", format!("U{i}"))).collect()
    }

    fn config(max: usize) -> WorkerPoolConfig {
        WorkerPoolConfig {
            max_concurrency: max,
            poll_interval_ms: 10,
        }
    }

    #[test]
    fn test_empty_pool_is_done() {
        let pool = WorkerPool::new(Vec::new(), Arc::new(NoopRunner), config(4));
        assert!(pool.is_done());
        assert_eq!(pool.launch_waiting(), 0);
        assert!(pool.wait_timeout(Duration::from_millis(10)));
        assert_eq!(pool.stats().launched, 0);
    }

    #[test]
    fn test_zero_concurrency_is_clamped() {
        let pool = WorkerPool::new(units(1), Arc::new(NoopRunner), config(0));
        assert_eq!(pool.max_concurrency(), 1);
    }

    #[test]
    fn test_all_units_complete() {
        let pool = WorkerPool::new(units(5), Arc::new(NoopRunner), config(2));
        assert!(!pool.is_done());

        pool.launch_waiting();
        assert!(pool.wait_timeout(Duration::from_secs(10)));

        let stats = pool.stats();
        assert_eq!(stats.launched, 5);
        assert_eq!(stats.completed, 5);
        assert_eq!(stats.succeeded, 5);
        assert_eq!(stats.launch_passes, 6);
        assert!(stats.peak_in_flight <= 2);
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.in_flight, 0);
    }

    #[test]
    fn test_panicking_worker_frees_slot() {
        let pool = WorkerPool::new(units(3), Arc::new(PanicRunner), config(1));
        pool.launch_waiting();
        assert!(pool.wait_timeout(Duration::from_secs(10)));

        let stats = pool.stats();
        assert_eq!(stats.completed, 3);
        assert_eq!(stats.failed, 3);
    }

    #[test]
    fn test_cancel_before_launch_drains_queue() {
        let pool = WorkerPool::new(units(3), Arc::new(NoopRunner), config(2));
        pool.cancel();

        assert!(pool.is_done());
        assert_eq!(pool.launch_waiting(), 0);
        let stats = pool.stats();
        assert_eq!(stats.cancelled, 3);
        assert_eq!(stats.launched, 0);
    }

    #[test]
    fn test_stats_serialize() {
        let stats = PoolStats {
            launched: 2,
            ..Default::default()
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["launched"], 2);
        assert_eq!(json["peak_in_flight"], 0);
    }
}
