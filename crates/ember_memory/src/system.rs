//! The engine-wide memory facade.
//!
//! [`MemorySystem`] is an explicit process-wide context object: constructed
//! once at process start and passed by reference to the subsystems that
//! need it, instead of hiding behind function-local statics.
//!
//! Init ordering:
//! 1. [`MemorySystem::bootstrap`] — before configuration exists. Installs
//!    the tracker, the untracked debug heap and a minimal placeholder
//!    scratch ring so allocations during the boot window still succeed.
//! 2. [`MemorySystem::commit_boot_heaps`] — once the boot settings are
//!    read. Replaces the placeholder with the configured scratch ring and
//!    installs the single-frame heap.
//! 3. [`MemorySystem::initialize_tracker`] — once the full settings system
//!    is available. Sets the tracked-memory budget.
//!
//! Teardown is the reverse: drop the system after every subsystem that
//! allocates through it.

use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::allocators::backend::BackendAllocator;
use crate::allocators::debug::DebugAllocator;
use crate::allocators::ring::RingAllocator;
use crate::allocators::stack::SingleFrameAllocator;
use crate::stats;
use crate::tracking::callstack::{BacktraceProvider, StackProvider};
use crate::tracking::tags::{MemoryTag, MemoryTagScope};
use crate::tracking::tracker::MemoryTracker;

/// Size of the placeholder scratch ring used between `bootstrap` and
/// `commit_boot_heaps`.
pub const MINIMAL_SCRATCH_SIZE: usize = 1024;

/// Heap sizes read from the boot settings file.
#[derive(Debug, Clone, Copy)]
pub struct BootHeapSizes {
    pub single_frame_heap_size: usize,
    pub scratch_heap_size: usize,
}

pub struct MemorySystem {
    backend: BackendAllocator,
    debug_heap: DebugAllocator,
    tracker: MemoryTracker,
    scratch: Mutex<RingAllocator>,
    single_frame: Mutex<Option<SingleFrameAllocator>>,
}

impl MemorySystem {
    /// Brings up the memory system before any other engine subsystem
    /// exists, including the logger and the frame concept.
    pub fn bootstrap() -> Self {
        Self::with_stack_provider(Arc::new(BacktraceProvider))
    }

    pub fn with_stack_provider(stacks: Arc<dyn StackProvider>) -> Self {
        tracing::debug!(
            size = MINIMAL_SCRATCH_SIZE,
            "creating a minimal scratch allocator for early startup"
        );
        Self {
            backend: BackendAllocator,
            debug_heap: DebugAllocator::new(),
            tracker: MemoryTracker::new(stacks),
            scratch: Mutex::new(RingAllocator::new(MINIMAL_SCRATCH_SIZE)),
            single_frame: Mutex::new(None),
        }
    }

    /// Installs the real boot-time heaps. Fatal if either configured size
    /// is zero (missing or invalid `[heaps]` settings).
    pub fn commit_boot_heaps(&self, sizes: BootHeapSizes) {
        assert!(
            sizes.single_frame_heap_size > 0,
            "single frame heap setting indicates 0 size. The setting is either missing or 0. \
             Please add a setting to \"heaps\" with name \"single_frame_heap_size\""
        );
        assert!(
            sizes.scratch_heap_size > 0,
            "scratch heap setting indicates 0 size. The setting is either missing or 0. \
             Please add a setting to \"heaps\" with name \"scratch_heap_size\""
        );

        // Scratch allocations are short-lived by contract; anything handed
        // out by the placeholder ring must not outlive this call.
        *self.lock_scratch() = RingAllocator::new(sizes.scratch_heap_size);
        *self.lock_single_frame() = Some(SingleFrameAllocator::new(sizes.single_frame_heap_size));

        tracing::debug!(
            scratch = sizes.scratch_heap_size,
            single_frame = sizes.single_frame_heap_size,
            "boot heaps committed"
        );
    }

    /// Sets the tracker's soft budget and captures the OS baseline.
    pub fn initialize_tracker(&self, max_mem_usage: i64) {
        let baseline = stats::query_all_memory_stats(&self.tracker);
        self.tracker.initialize(max_mem_usage, baseline);
    }

    // ------------------------------------------------------------------
    // Tracked general-purpose allocations
    // ------------------------------------------------------------------

    /// Allocations that last until they get deallocated.
    pub fn alloc(&self, layout: Layout) -> NonNull<u8> {
        let ptr = self.backend.allocate(layout);
        self.tracker.track_alloc(ptr, layout.size());
        ptr
    }

    /// # Safety
    ///
    /// `ptr` must have been returned by [`alloc`](Self::alloc) on this
    /// system with the same `layout`, and must not be used afterwards.
    pub unsafe fn dealloc(&self, ptr: NonNull<u8>, layout: Layout) {
        self.tracker.track_dealloc(ptr);
        unsafe { self.backend.deallocate(ptr, layout) };
    }

    /// # Safety
    ///
    /// Same contract as [`dealloc`](Self::dealloc) for `ptr`/`old_layout`.
    pub unsafe fn realloc(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_size: usize,
    ) -> NonNull<u8> {
        let new_layout = Layout::from_size_align(new_size, old_layout.align())
            .expect("realloc layout overflow");
        let new_ptr = self.alloc(new_layout);
        unsafe {
            std::ptr::copy_nonoverlapping(
                ptr.as_ptr(),
                new_ptr.as_ptr(),
                old_layout.size().min(new_size),
            );
            self.dealloc(ptr, old_layout);
        }
        new_ptr
    }

    // ------------------------------------------------------------------
    // Untracked debug allocations
    // ------------------------------------------------------------------

    /// Diagnostic-only allocations with a separate budget; never counted
    /// in the tracked application usage.
    pub fn debug_alloc(&self, layout: Layout) -> NonNull<u8> {
        self.debug_heap.allocate(layout)
    }

    /// # Safety
    ///
    /// `ptr` must have come from [`debug_alloc`](Self::debug_alloc) with
    /// the same `layout`.
    pub unsafe fn debug_dealloc(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { self.debug_heap.deallocate(ptr, layout) };
    }

    /// # Safety
    ///
    /// Same contract as [`debug_dealloc`](Self::debug_dealloc) for
    /// `ptr`/`old_layout`.
    pub unsafe fn debug_realloc(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_size: usize,
    ) -> NonNull<u8> {
        let new_layout = Layout::from_size_align(new_size, old_layout.align())
            .expect("realloc layout overflow");
        let new_ptr = self.debug_alloc(new_layout);
        unsafe {
            std::ptr::copy_nonoverlapping(
                ptr.as_ptr(),
                new_ptr.as_ptr(),
                old_layout.size().min(new_size),
            );
            self.debug_dealloc(ptr, old_layout);
        }
        new_ptr
    }

    pub fn debug_used_bytes(&self) -> i64 {
        self.debug_heap.used_bytes()
    }

    // ------------------------------------------------------------------
    // Scratch (ring) allocations
    // ------------------------------------------------------------------

    /// Allocations whose lifetime isn't well determined; served from the
    /// scratch ring and never individually reclaimed.
    pub fn scratch_alloc(&self, size: usize, alignment: usize) -> NonNull<u8> {
        self.lock_scratch().allocate(size, alignment)
    }

    pub fn scratch_dealloc(&self, ptr: NonNull<u8>, size: usize) {
        self.lock_scratch().deallocate(ptr, size);
    }

    /// Grows a scratch allocation by bumping a fresh range and copying.
    /// The old range is not reclaimed (ring contract).
    ///
    /// # Safety
    ///
    /// `ptr` must point at `old_size` readable bytes from a previous
    /// [`scratch_alloc`](Self::scratch_alloc) that the ring has not yet
    /// wrapped past.
    pub unsafe fn scratch_realloc(
        &self,
        ptr: NonNull<u8>,
        old_size: usize,
        new_size: usize,
        alignment: usize,
    ) -> NonNull<u8> {
        let new_ptr = self.scratch_alloc(new_size, alignment);
        unsafe {
            std::ptr::copy(ptr.as_ptr(), new_ptr.as_ptr(), old_size.min(new_size));
        }
        new_ptr
    }

    pub fn is_scratch_alloc(&self, ptr: *const u8) -> bool {
        self.lock_scratch().has_allocated_ptr(ptr)
    }

    // ------------------------------------------------------------------
    // Single-frame (temp) allocations
    // ------------------------------------------------------------------

    /// Allocations that only last the current frame. Fatal before
    /// [`commit_boot_heaps`](Self::commit_boot_heaps).
    pub fn temp_alloc(&self, size: usize, alignment: usize) -> NonNull<u8> {
        self.with_single_frame(|heap| heap.allocate(size, alignment))
    }

    pub fn temp_dealloc(&self, ptr: NonNull<u8>, size: usize) {
        self.with_single_frame(|heap| heap.deallocate(ptr, size));
    }

    /// # Safety
    ///
    /// `ptr` must point at `old_size` readable bytes from a previous
    /// [`temp_alloc`](Self::temp_alloc) in the current frame.
    pub unsafe fn temp_realloc(
        &self,
        ptr: NonNull<u8>,
        old_size: usize,
        new_size: usize,
        alignment: usize,
    ) -> NonNull<u8> {
        let new_ptr = self.temp_alloc(new_size, alignment);
        unsafe {
            std::ptr::copy(ptr.as_ptr(), new_ptr.as_ptr(), old_size.min(new_size));
        }
        new_ptr
    }

    pub fn is_temp_alloc(&self, ptr: *const u8) -> bool {
        self.with_single_frame(|heap| heap.has_allocated_ptr(ptr))
    }

    pub fn temp_capacity(&self) -> usize {
        self.with_single_frame(|heap| heap.capacity())
    }

    /// Frame boundary: resets the single-frame heap and advances the
    /// tracker's frame index.
    pub fn end_frame(&self) {
        if let Some(heap) = self.lock_single_frame().as_mut() {
            heap.reset();
        }
        self.tracker.advance_frame();
    }

    // ------------------------------------------------------------------

    pub fn tracker(&self) -> &MemoryTracker {
        &self.tracker
    }

    /// Convenience for `MemoryTagScope::new`.
    pub fn tag_scope(&self, tag: MemoryTag) -> MemoryTagScope {
        MemoryTagScope::new(tag)
    }

    fn with_single_frame<R>(&self, f: impl FnOnce(&mut SingleFrameAllocator) -> R) -> R {
        let mut guard = self.lock_single_frame();
        let heap = guard
            .as_mut()
            .expect("single-frame heap is not initialized; commit the boot heaps first");
        f(heap)
    }

    fn lock_scratch(&self) -> MutexGuard<'_, RingAllocator> {
        match self.scratch.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_single_frame(&self) -> MutexGuard<'_, Option<SingleFrameAllocator>> {
        match self.single_frame.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::callstack::NullStackProvider;

    fn system() -> MemorySystem {
        MemorySystem::with_stack_provider(Arc::new(NullStackProvider))
    }

    #[test]
    fn scratch_works_before_commit() {
        let sys = system();
        let p = sys.scratch_alloc(64, 8);
        assert!(sys.is_scratch_alloc(p.as_ptr()));
    }

    #[test]
    #[should_panic(expected = "single-frame heap is not initialized")]
    fn temp_alloc_before_commit_is_fatal() {
        let sys = system();
        let _ = sys.temp_alloc(16, 8);
    }

    #[test]
    #[should_panic(expected = "single_frame_heap_size")]
    fn zero_single_frame_heap_is_fatal() {
        let sys = system();
        sys.commit_boot_heaps(BootHeapSizes {
            single_frame_heap_size: 0,
            scratch_heap_size: 4096,
        });
    }

    #[test]
    fn end_frame_resets_the_temp_heap() {
        let sys = system();
        sys.commit_boot_heaps(BootHeapSizes {
            single_frame_heap_size: 128,
            scratch_heap_size: 4096,
        });

        let first = sys.temp_alloc(100, 1);
        sys.end_frame();
        let second = sys.temp_alloc(100, 1);
        assert_eq!(first, second);
        assert!(sys.is_temp_alloc(second.as_ptr()));
    }

    #[test]
    fn tracked_alloc_round_trip() {
        let sys = system();
        let layout = Layout::from_size_align(256, 16).unwrap();

        let ptr = sys.alloc(layout);
        assert_eq!(sys.tracker().current_tracking_stats().used_memory, 256);

        unsafe { sys.dealloc(ptr, layout) };
        let stats = sys.tracker().current_tracking_stats();
        assert_eq!(stats.used_memory, 0);
        assert_eq!(stats.max_used_memory, 256);
        assert_eq!(stats.num_total_allocations, 1);
    }

    #[test]
    fn realloc_preserves_contents() {
        let sys = system();
        let layout = Layout::from_size_align(8, 8).unwrap();

        let ptr = sys.alloc(layout);
        unsafe { ptr.cast::<u64>().as_ptr().write(0xfeed) };

        let grown = unsafe { sys.realloc(ptr, layout, 64) };
        unsafe { assert_eq!(grown.cast::<u64>().as_ptr().read(), 0xfeed) };
        assert_eq!(sys.tracker().current_tracking_stats().used_memory, 64);

        let grown_layout = Layout::from_size_align(64, 8).unwrap();
        unsafe { sys.dealloc(grown, grown_layout) };
    }

    #[test]
    fn debug_heap_does_not_touch_tracked_usage() {
        let sys = system();
        let layout = Layout::from_size_align(512, 8).unwrap();

        let ptr = sys.debug_alloc(layout);
        assert_eq!(sys.debug_used_bytes(), 512);
        assert_eq!(
            sys.tracker().current_tracking_stats().used_memory,
            0,
            "debug allocations never enter the tracked budget"
        );
        unsafe { sys.debug_dealloc(ptr, layout) };
        assert_eq!(sys.debug_used_bytes(), 0);
    }

    #[test]
    fn tag_scope_routes_attribution() {
        let sys = system();
        let layout = Layout::from_size_align(32, 8).unwrap();

        let ptr = {
            let _scope = sys.tag_scope(MemoryTag::StringPool);
            sys.alloc(layout)
        };

        let stats = sys.tracker().current_tracking_stats();
        assert_eq!(stats.usage_per_tag[MemoryTag::StringPool.index()].value(), 32);

        unsafe { sys.dealloc(ptr, layout) };
    }
}
