//! The global allocation tracker.
//!
//! A process-wide object (constructed once, early, and passed by reference
//! to the subsystems that need it) that records every live tracked
//! allocation, aggregates usage per call site and per tag, and produces
//! deep-copied stats snapshots for cross-thread reporting.

use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

use crate::stats::{HighWaterMark, MemoryAllocationStats, MemoryStats, MemoryTrackingStats, UsagePerTag};
use crate::tracking::callstack::{CallStack, StackProvider};
use crate::tracking::header::{MemoryHeader, FRAME_INIT, FRAME_PRE_INIT};
use crate::tracking::tags::{self, MemoryTag};

/// Running byte total and allocation count for one allocating call site.
#[derive(Debug, Clone)]
pub struct AllocationCallStack {
    callstack: CallStack,
    size: i64,
    alloc_count: u32,
}

impl AllocationCallStack {
    fn new(callstack: CallStack, size: i64) -> Self {
        Self {
            callstack,
            size,
            alloc_count: 1,
        }
    }

    fn add_size(&mut self, size: i64) {
        self.size += size;
        self.alloc_count += 1;
    }

    fn sub_size(&mut self, size: i64) {
        self.size -= size;
    }

    #[inline]
    pub fn callstack(&self) -> &CallStack {
        &self.callstack
    }

    #[inline]
    pub fn size(&self) -> i64 {
        self.size
    }

    #[inline]
    pub fn alloc_count(&self) -> u32 {
        self.alloc_count
    }
}

/// Where an allocation site's memory came from, plus every distinct call
/// site that has freed memory allocated there. A site that frees memory it
/// didn't allocate ("allocated in A, freed in B") shows up in the deleter
/// list.
#[derive(Debug, Clone)]
pub struct AllocationInfo {
    allocation_callstack: AllocationCallStack,
    deleter_callstacks: Vec<CallStack>,
}

impl AllocationInfo {
    #[inline]
    pub fn allocation_callstack(&self) -> &AllocationCallStack {
        &self.allocation_callstack
    }

    #[inline]
    pub fn deleter_callstacks(&self) -> &[CallStack] {
        &self.deleter_callstacks
    }
}

#[derive(Default)]
struct TrackerState {
    /// Live allocation headers, in allocation order.
    allocation_headers: Vec<MemoryHeader>,
    allocation_info: HashMap<CallStack, AllocationInfo>,
    mem_usage: HighWaterMark,
    usage_per_tag: UsagePerTag,
    num_total_allocations: u64,
    max_mem_budget: i64,
    stats_on_startup: Option<MemoryStats>,
}

pub struct MemoryTracker {
    state: Mutex<TrackerState>,
    stacks: Arc<dyn StackProvider>,
    frame_index: AtomicI32,
}

impl MemoryTracker {
    pub fn new(stacks: Arc<dyn StackProvider>) -> Self {
        let state = TrackerState {
            max_mem_budget: i64::MAX,
            ..TrackerState::default()
        };
        Self {
            state: Mutex::new(state),
            stacks,
            frame_index: AtomicI32::new(FRAME_PRE_INIT),
        }
    }

    /// Sets the soft memory budget and captures a baseline OS snapshot.
    ///
    /// The OS has an allocation overhead for the process itself (page file
    /// usage, page faults, a few MBs on startup), so a very low budget
    /// could fall below it. The baseline lets reporting subtract that
    /// startup overhead and consider runtime allocations only.
    ///
    /// Moves the frame index from the pre-init sentinel to the init frame;
    /// allocations from here until the first frame advance are "init-time".
    pub fn initialize(&self, max_mem_usage: i64, baseline: MemoryStats) {
        let mut state = self.lock_state();
        state.max_mem_budget = max_mem_usage;
        state.stats_on_startup = Some(baseline);
        drop(state);

        self.frame_index.store(FRAME_INIT, Ordering::Release);
        tracing::debug!(budget_bytes = max_mem_usage, "memory tracker initialized");
    }

    /// Records a new allocation: reads the current thread's tag, captures
    /// a call stack, aggregates it under the tracker mutex and appends the
    /// header to the live table. Returns a copy of the recorded header.
    pub fn track_alloc(&self, ptr: NonNull<u8>, size: usize) -> MemoryHeader {
        let tag = tags::current_tag();
        let thread_id = std::thread::current().id();
        let frame_idx = self.frame_index.load(Ordering::Acquire);
        let callstack = self.stacks.capture();

        let header = MemoryHeader::new(
            tag,
            ptr.as_ptr() as usize,
            size,
            thread_id,
            frame_idx,
            callstack,
        );

        let mut state = self.lock_state();
        state
            .allocation_info
            .entry(callstack)
            .and_modify(|info| info.allocation_callstack.add_size(size as i64))
            .or_insert_with(|| AllocationInfo {
                allocation_callstack: AllocationCallStack::new(callstack, size as i64),
                deleter_callstacks: Vec::new(),
            });

        let was_within_budget = state.mem_usage.value() <= state.max_mem_budget;
        state.num_total_allocations += 1;
        state.mem_usage.add(size as i64);
        state.usage_per_tag[tag.index()].add(size as i64);
        state.allocation_headers.push(header.clone());

        // Soft limit: exceeding the budget is reported, not enforced.
        if was_within_budget && state.mem_usage.value() > state.max_mem_budget {
            tracing::warn!(
                used = state.mem_usage.value(),
                budget = state.max_mem_budget,
                "tracked memory usage exceeded the configured budget"
            );
        }

        header
    }

    /// Records a deallocation. Fatal if `ptr` does not match a live header
    /// previously returned by [`track_alloc`](Self::track_alloc) on this
    /// tracker (double free or cross-tracker free).
    pub fn track_dealloc(&self, ptr: NonNull<u8>) {
        let deleter = self.stacks.capture();
        let addr = ptr.as_ptr() as usize;

        let mut state = self.lock_state();
        let pos = state
            .allocation_headers
            .iter()
            .position(|header| header.ptr() == addr);
        let pos = pos.expect("trying to remove a memory header that wasn't tracked");
        let header = state.allocation_headers.remove(pos);

        state.mem_usage.sub(header.size() as i64);
        assert!(state.mem_usage.value() >= 0, "mem usage below 0");
        state.usage_per_tag[header.tag().index()].sub(header.size() as i64);

        let info = state
            .allocation_info
            .get_mut(header.callstack())
            .expect("tracking a deallocation whose allocation didn't get tracked");
        info.allocation_callstack.sub_size(header.size() as i64);
        if !info.deleter_callstacks.contains(&deleter) {
            info.deleter_callstacks.push(deleter);
        }
        if info.allocation_callstack.size() == 0 {
            state.allocation_info.remove(header.callstack());
        }
    }

    pub fn push_tag(&self, tag: MemoryTag) {
        tags::push_tag(tag);
    }

    pub fn pop_tag(&self) {
        tags::pop_tag();
    }

    pub fn current_tag(&self) -> MemoryTag {
        tags::current_tag()
    }

    /// Advances the frame index at the frame boundary.
    pub fn advance_frame(&self) -> i32 {
        self.frame_index.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn frame_index(&self) -> i32 {
        self.frame_index.load(Ordering::Acquire)
    }

    /// Aggregate counters only; cheap.
    pub fn current_tracking_stats(&self) -> MemoryAllocationStats {
        let state = self.lock_state();
        MemoryAllocationStats {
            used_memory: state.mem_usage.value(),
            max_used_memory: state.mem_usage.peak(),
            num_alive_allocations: state.allocation_info.len(),
            num_total_allocations: state.num_total_allocations,
            usage_per_tag: state.usage_per_tag,
        }
    }

    /// Aggregate counters plus a deep copy of every live header. The copy
    /// is deliberate so consumers can iterate without racing the tracker.
    pub fn current_allocation_stats(&self) -> MemoryTrackingStats {
        let state = self.lock_state();
        MemoryTrackingStats {
            tracking_stats: MemoryAllocationStats {
                used_memory: state.mem_usage.value(),
                max_used_memory: state.mem_usage.peak(),
                num_alive_allocations: state.allocation_info.len(),
                num_total_allocations: state.num_total_allocations,
                usage_per_tag: state.usage_per_tag,
            },
            allocation_headers: state.allocation_headers.clone(),
        }
    }

    /// Live allocations made before the tracker was initialized.
    pub fn pre_init_stats(&self) -> MemoryTrackingStats {
        self.stats_for_frame(FRAME_PRE_INIT)
    }

    /// Live allocations made during engine initialization.
    pub fn init_stats(&self) -> MemoryTrackingStats {
        self.stats_for_frame(FRAME_INIT)
    }

    /// Live allocations whose recorded frame index equals `idx`. The live
    /// list is in allocation order, so iteration stops early once past the
    /// requested frame.
    pub fn stats_for_frame(&self, idx: i32) -> MemoryTrackingStats {
        let headers = {
            let state = self.lock_state();
            state.allocation_headers.clone()
        };

        let mut stats = MemoryTrackingStats::default();
        for header in headers {
            if header.frame_index() == idx {
                stats.tracking_stats.used_memory += header.size() as i64;
                stats.tracking_stats.usage_per_tag[header.tag().index()].add(header.size() as i64);
                stats.allocation_headers.push(header);
            } else if header.frame_index() > idx {
                break;
            }
        }
        stats.tracking_stats.num_alive_allocations = stats.allocation_headers.len();
        stats
    }

    /// Deep copy of the per-call-site table, for report rendering.
    pub fn callsite_snapshot(&self) -> Vec<AllocationInfo> {
        let state = self.lock_state();
        state.allocation_info.values().cloned().collect()
    }

    /// The OS snapshot captured at [`initialize`](Self::initialize) time.
    pub fn stats_on_startup(&self) -> Option<MemoryStats> {
        self.lock_state().stats_on_startup.clone()
    }

    pub(crate) fn stack_provider(&self) -> &dyn StackProvider {
        self.stacks.as_ref()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, TrackerState> {
        // A panic while holding the tracker mutex is already fatal;
        // recover the state rather than poisoning every later caller.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::tags::MemoryTagScope;
    use std::alloc::Layout;
    use std::sync::atomic::AtomicUsize;

    /// Deterministic provider: captures whatever "site" the test selected.
    pub(crate) struct ScriptedStacks {
        site: AtomicUsize,
    }

    impl ScriptedStacks {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self {
                site: AtomicUsize::new(1),
            })
        }

        pub(crate) fn set_site(&self, site: usize) {
            self.site.store(site, Ordering::Relaxed);
        }
    }

    impl StackProvider for ScriptedStacks {
        fn capture(&self) -> CallStack {
            CallStack::from_frames(&[self.site.load(Ordering::Relaxed)])
        }

        fn resolve(&self, stack: &CallStack) -> Vec<String> {
            stack
                .frames()
                .iter()
                .map(|site| format!("site_{site}"))
                .collect()
        }
    }

    struct TestAlloc {
        ptrs: Vec<(NonNull<u8>, Layout)>,
    }

    impl TestAlloc {
        fn new() -> Self {
            Self { ptrs: Vec::new() }
        }

        fn alloc(&mut self, size: usize) -> NonNull<u8> {
            let layout = Layout::from_size_align(size, 8).unwrap();
            let ptr = crate::allocators::BackendAllocator.allocate(layout);
            self.ptrs.push((ptr, layout));
            ptr
        }
    }

    impl Drop for TestAlloc {
        fn drop(&mut self) {
            for (ptr, layout) in self.ptrs.drain(..) {
                unsafe { crate::allocators::BackendAllocator.deallocate(ptr, layout) };
            }
        }
    }

    #[test]
    fn usage_matches_unmatched_allocations() {
        let stacks = ScriptedStacks::new();
        let tracker = MemoryTracker::new(stacks);
        let mut mem = TestAlloc::new();

        let a = mem.alloc(100);
        let b = mem.alloc(200);
        let c = mem.alloc(50);
        tracker.track_alloc(a, 100);
        tracker.track_alloc(b, 200);
        tracker.track_alloc(c, 50);
        tracker.track_dealloc(b);

        let stats = tracker.current_tracking_stats();
        assert_eq!(stats.used_memory, 150);
        assert_eq!(stats.max_used_memory, 350);
        assert_eq!(stats.num_total_allocations, 3);

        let live = tracker.current_allocation_stats();
        assert_eq!(live.allocation_headers.len(), 2);

        tracker.track_dealloc(a);
        tracker.track_dealloc(c);
        assert_eq!(tracker.current_tracking_stats().used_memory, 0);
    }

    #[test]
    fn per_tag_usage_sums_to_total() {
        let stacks = ScriptedStacks::new();
        let tracker = MemoryTracker::new(stacks);
        let mut mem = TestAlloc::new();

        let a = mem.alloc(64);
        let b = mem.alloc(32);
        {
            let _scope = MemoryTagScope::new(MemoryTag::Rendering);
            tracker.track_alloc(a, 64);
        }
        {
            let _scope = MemoryTagScope::new(MemoryTag::Audio);
            tracker.track_alloc(b, 32);
        }

        let stats = tracker.current_tracking_stats();
        let tag_sum: i64 = stats.usage_per_tag.iter().map(|mark| mark.value()).sum();
        assert_eq!(tag_sum, stats.used_memory);
        assert_eq!(stats.usage_per_tag[MemoryTag::Rendering.index()].value(), 64);
        assert_eq!(stats.usage_per_tag[MemoryTag::Audio.index()].value(), 32);
    }

    #[test]
    fn leak_report_groups_by_call_site() {
        let stacks = ScriptedStacks::new();
        let tracker = MemoryTracker::new(Arc::clone(&stacks) as Arc<dyn StackProvider>);
        let mut mem = TestAlloc::new();

        stacks.set_site(0xa);
        for _ in 0..3 {
            let p = mem.alloc(100);
            tracker.track_alloc(p, 100);
        }
        stacks.set_site(0xb);
        let p = mem.alloc(50);
        tracker.track_alloc(p, 50);

        let mut sites = tracker.callsite_snapshot();
        sites.sort_by_key(|info| info.allocation_callstack().size());
        assert_eq!(sites.len(), 2);

        assert_eq!(sites[0].allocation_callstack().size(), 50);
        assert_eq!(sites[0].allocation_callstack().alloc_count(), 1);
        assert!(sites[0].deleter_callstacks().is_empty());

        assert_eq!(sites[1].allocation_callstack().size(), 300);
        assert_eq!(sites[1].allocation_callstack().alloc_count(), 3);
        assert!(sites[1].deleter_callstacks().is_empty());
    }

    #[test]
    fn deleters_are_deduplicated_and_sites_retire_at_zero() {
        let stacks = ScriptedStacks::new();
        let tracker = MemoryTracker::new(Arc::clone(&stacks) as Arc<dyn StackProvider>);
        let mut mem = TestAlloc::new();

        stacks.set_site(0xa);
        let p1 = mem.alloc(10);
        let p2 = mem.alloc(10);
        tracker.track_alloc(p1, 10);
        tracker.track_alloc(p2, 10);

        stacks.set_site(0xdead);
        tracker.track_dealloc(p1);

        let sites = tracker.callsite_snapshot();
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].deleter_callstacks().len(), 1);

        tracker.track_dealloc(p2);
        assert!(tracker.callsite_snapshot().is_empty(), "site retires at zero size");
    }

    #[test]
    fn frame_filtering() {
        let stacks = ScriptedStacks::new();
        let tracker = MemoryTracker::new(stacks);
        let mut mem = TestAlloc::new();

        // Pre-init allocation.
        let pre = mem.alloc(8);
        tracker.track_alloc(pre, 8);

        tracker.initialize(i64::MAX, MemoryStats::default());
        let init = mem.alloc(16);
        tracker.track_alloc(init, 16);

        tracker.advance_frame();
        let frame1 = mem.alloc(32);
        tracker.track_alloc(frame1, 32);

        assert_eq!(tracker.pre_init_stats().allocation_headers.len(), 1);
        assert_eq!(tracker.pre_init_stats().tracking_stats.used_memory, 8);
        assert_eq!(tracker.init_stats().tracking_stats.used_memory, 16);
        assert_eq!(tracker.stats_for_frame(1).tracking_stats.used_memory, 32);
        assert_eq!(tracker.stats_for_frame(2).allocation_headers.len(), 0);
    }

    #[test]
    #[should_panic(expected = "wasn't tracked")]
    fn untracked_dealloc_is_fatal() {
        let stacks = ScriptedStacks::new();
        let tracker = MemoryTracker::new(stacks);
        let mut mem = TestAlloc::new();
        let p = mem.alloc(8);
        tracker.track_dealloc(p);
    }

    #[test]
    #[should_panic(expected = "wasn't tracked")]
    fn double_dealloc_is_fatal() {
        let stacks = ScriptedStacks::new();
        let tracker = MemoryTracker::new(stacks);
        let mut mem = TestAlloc::new();
        let p = mem.alloc(8);
        tracker.track_alloc(p, 8);
        tracker.track_dealloc(p);
        tracker.track_dealloc(p);
    }
}
