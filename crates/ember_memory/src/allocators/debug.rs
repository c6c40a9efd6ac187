//! Untracked debug allocator.
//!
//! Diagnostic-only memory (the tracker's own headers, debug UI scratch)
//! comes from here so it never competes with or is counted in the tracked
//! application budget. That separation is what keeps the tracker from
//! tracking itself.

use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::allocators::backend::BackendAllocator;

#[derive(Debug, Default)]
pub struct DebugAllocator {
    backend: BackendAllocator,
    used: AtomicI64,
    peak: AtomicI64,
}

impl DebugAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&self, layout: Layout) -> NonNull<u8> {
        let ptr = self.backend.allocate(layout);
        let used = self.used.fetch_add(layout.size() as i64, Ordering::Relaxed)
            + layout.size() as i64;
        self.peak.fetch_max(used, Ordering::Relaxed);
        ptr
    }

    /// # Safety
    ///
    /// `ptr` must have come from [`allocate`](Self::allocate) on this
    /// allocator with the same `layout`.
    pub unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.used.fetch_sub(layout.size() as i64, Ordering::Relaxed);
        unsafe { self.backend.deallocate(ptr, layout) };
    }

    /// Bytes currently handed out. Diagnostic accounting only; not part of
    /// the tracked budget.
    pub fn used_bytes(&self) -> i64 {
        self.used.load(Ordering::Relaxed)
    }

    pub fn peak_bytes(&self) -> i64 {
        self.peak.load(Ordering::Relaxed)
    }
}
