//! Point-in-time memory statistics.
//!
//! Every snapshot here is a deep copy, never an alias of live tracker
//! state, so consumers may format or inspect them concurrently with
//! further allocation activity.

use ember_env::{ProcessMemoryStats, SystemMemoryStats};

use crate::tracking::header::MemoryHeader;
use crate::tracking::tags::MemoryTag;
use crate::tracking::tracker::MemoryTracker;

/// A value paired with the highest value it has ever reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HighWaterMark {
    value: i64,
    peak: i64,
}

impl HighWaterMark {
    pub fn add(&mut self, amount: i64) {
        self.value += amount;
        self.peak = self.peak.max(self.value);
    }

    pub fn sub(&mut self, amount: i64) {
        self.value -= amount;
    }

    #[inline]
    pub fn value(&self) -> i64 {
        self.value
    }

    #[inline]
    pub fn peak(&self) -> i64 {
        self.peak
    }
}

/// Per-tag usage table, indexed by [`MemoryTag::index`].
pub type UsagePerTag = [HighWaterMark; MemoryTag::COUNT];

/// Snapshot of the tracker's aggregate counters.
#[derive(Debug, Clone, Default)]
pub struct MemoryAllocationStats {
    /// The total used memory in bytes.
    pub used_memory: i64,

    /// The highest peak of memory usage.
    pub max_used_memory: i64,

    /// The current number of allocations that are still allocated.
    pub num_alive_allocations: usize,

    /// The total number of allocations since tracking started.
    pub num_total_allocations: u64,

    /// The memory usage per memory tag.
    pub usage_per_tag: UsagePerTag,
}

/// Snapshot including every live allocation header. Good for debugging
/// individual allocations after the fact and tracking down leaks.
#[derive(Debug, Clone, Default)]
pub struct MemoryTrackingStats {
    pub tracking_stats: MemoryAllocationStats,
    pub allocation_headers: Vec<MemoryHeader>,
}

/// Combined engine, system and process view.
#[derive(Debug, Clone, Default)]
pub struct MemoryStats {
    pub mem_tracking_stats: MemoryAllocationStats,
    pub system_mem_stats: SystemMemoryStats,
    pub process_mem_stats: ProcessMemoryStats,
}

pub fn query_mem_tracking_stats(tracker: &MemoryTracker) -> MemoryAllocationStats {
    tracker.current_tracking_stats()
}

pub fn query_all_memory_stats(tracker: &MemoryTracker) -> MemoryStats {
    MemoryStats {
        mem_tracking_stats: tracker.current_tracking_stats(),
        system_mem_stats: ember_env::query_system_mem_stats(),
        process_mem_stats: ember_env::query_process_mem_stats(),
    }
}

/// Logs a one-shot overview of tracked, process and system memory usage.
pub fn debug_log_mem_usage(tracker: &MemoryTracker) {
    let stats = query_all_memory_stats(tracker);
    tracing::debug!(
        used = stats.mem_tracking_stats.used_memory,
        peak = stats.mem_tracking_stats.max_used_memory,
        alive = stats.mem_tracking_stats.num_alive_allocations,
        "tracked memory"
    );
    tracing::debug!(
        used_physical = stats.process_mem_stats.used_physical_mem,
        peak_physical = stats.process_mem_stats.peak_physical_mem,
        page_faults = stats.process_mem_stats.num_page_faults,
        "process memory"
    );
    tracing::debug!(
        total_physical = stats.system_mem_stats.total_physical_mem,
        avail_physical = stats.system_mem_stats.avail_physical_mem,
        page_size = stats.system_mem_stats.page_size,
        "system memory"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_water_mark_tracks_peak() {
        let mut mark = HighWaterMark::default();
        mark.add(100);
        mark.add(50);
        mark.sub(120);
        assert_eq!(mark.value(), 30);
        assert_eq!(mark.peak(), 150);

        mark.add(10);
        assert_eq!(mark.peak(), 150, "peak only moves on new highs");
    }
}
