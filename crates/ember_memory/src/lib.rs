//! Ember Engine Memory Subsystem
//!
//! Special-purpose heap allocators layered under a global allocation tracker:
//! - Fixed-block, ring (scratch) and single-frame (temp) allocators
//! - A process-wide [`MemorySystem`] facade that routes allocations
//! - A [`MemoryTracker`] that attributes every live allocation to a
//!   subsystem tag and a call site, and renders leak/usage reports
//!
//! The tracker's own bookkeeping goes through a separate untracked debug
//! heap so the tracker never tracks itself.

pub mod allocators;
pub mod stats;
pub mod system;
pub mod tracking;

pub use allocators::block::BlockAllocator;
pub use allocators::ring::RingAllocator;
pub use allocators::stack::SingleFrameAllocator;
pub use stats::{HighWaterMark, MemoryAllocationStats, MemoryStats, MemoryTrackingStats};
pub use system::{BootHeapSizes, MemorySystem};
pub use tracking::callstack::{BacktraceProvider, CallStack, NullStackProvider, StackProvider};
pub use tracking::header::{MemoryHeader, FRAME_INIT, FRAME_PRE_INIT};
pub use tracking::report::ReportError;
pub use tracking::tags::{MemoryTag, MemoryTagScope};
pub use tracking::tracker::{AllocationCallStack, AllocationInfo, MemoryTracker};

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
