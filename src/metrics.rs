//! Sort cost accounting.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Accumulated I/O and CPU cost counters.
///
/// Zeroed by the caller (via [`Default`]), incremented by the engine while a
/// sort runs, and read back afterwards for reporting. The engine never bases
/// control decisions on these values. On failure the counters reflect the
/// work performed up to the failure point.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortMetrics {
    /// Pages read from storage.
    pub reads: u64,
    /// Pages written to storage.
    pub writes: u64,
    /// Record relocations (in-memory copies).
    pub copies: u64,
    /// Comparator invocations.
    pub comparisons: u64,
    /// Sorted runs emitted by run generation.
    pub runs: u64,
    /// Wall-clock time of the whole sort.
    pub elapsed: Duration,
    /// Wall-clock time of the run generation phase alone.
    pub run_generation_elapsed: Duration,
}

impl SortMetrics {
    /// Total page I/O operations.
    pub fn io_total(&self) -> u64 {
        self.reads + self.writes
    }
}
