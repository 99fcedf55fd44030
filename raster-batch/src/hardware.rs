//! Host CPU topology used to size the worker pool.

use sysinfo::{CpuRefreshKind, RefreshKind, System};
use tracing::{debug, warn};

/// Core counts reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTopology {
    pub physical: Option<usize>,
    pub logical: Option<usize>,
}

impl CpuTopology {
    pub fn detect() -> Self {
        let system =
            System::new_with_specifics(RefreshKind::nothing().with_cpu(CpuRefreshKind::nothing()));
        let logical = match system.cpus().len() {
            0 => std::thread::available_parallelism().ok().map(|n| n.get()),
            n => Some(n),
        };

        Self {
            physical: System::physical_core_count().filter(|&n| n > 0),
            logical,
        }
    }

    /// Physical cores when known, else logical CPUs, never less than 1.
    pub fn max_concurrency(&self) -> usize {
        self.physical.or(self.logical).unwrap_or(1).max(1)
    }
}

/// Concurrency ceiling for this host: one unit per physical core.
pub fn detect_max_concurrency() -> usize {
    let topology = CpuTopology::detect();
    if topology.physical.is_none() {
        warn!(
            logical = ?topology.logical,
            "Physical core count unavailable, falling back to logical CPUs"
        );
    }
    let max = topology.max_concurrency();
    debug!(
        physical = ?topology.physical,
        logical = ?topology.logical,
        max,
        "Detected CPU topology"
    );
    max
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefers_physical_cores() {
        let topology = CpuTopology {
            physical: Some(4),
            logical: Some(8),
        };
        assert_eq!(topology.max_concurrency(), 4);
    }

    #[test]
    fn test_falls_back_to_logical_then_one() {
        let logical_only = CpuTopology {
            physical: None,
            logical: Some(6),
        };
        assert_eq!(logical_only.max_concurrency(), 6);

        let unknown = CpuTopology {
            physical: None,
            logical: None,
        };
        assert_eq!(unknown.max_concurrency(), 1);
    }

    #[test]
    fn test_detect_is_at_least_one() {
        assert!(detect_max_concurrency() >= 1);
    }
}
