//! Backend allocator: thin pass-through to the operating system's allocator.
//!
//! This is the single true source of memory. Every arena and every tracked
//! general-purpose allocation bottoms out here.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

/// Alignment guaranteed by every arena base pointer. Requests for a larger
/// alignment are a programmer error.
pub const ARENA_ALIGN: usize = 16;

/// Pass-through to `std::alloc`. Stateless and freely copyable.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackendAllocator;

impl BackendAllocator {
    pub fn allocate(&self, layout: Layout) -> NonNull<u8> {
        assert!(layout.size() > 0, "zero-sized backend allocation");
        // SAFETY: layout has non-zero size.
        let ptr = unsafe { alloc::alloc(layout) };
        match NonNull::new(ptr) {
            Some(ptr) => ptr,
            None => alloc::handle_alloc_error(layout),
        }
    }

    /// # Safety
    ///
    /// `ptr` must have been returned by [`allocate`](Self::allocate) on this
    /// backend with the same `layout`, and must not be used afterwards.
    pub unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { alloc::dealloc(ptr.as_ptr(), layout) };
    }
}

/// One contiguous backend allocation from which an allocator carves smaller
/// allocations. Owns its memory and returns it to the backend on drop.
#[derive(Debug)]
pub struct Arena {
    base: NonNull<u8>,
    layout: Layout,
}

impl Arena {
    pub fn new(backend: BackendAllocator, size: usize) -> Self {
        assert!(size > 0, "arena size must be bigger than 0");
        let layout = Layout::from_size_align(size, ARENA_ALIGN)
            .expect("arena layout overflow");
        let base = backend.allocate(layout);
        Self { base, layout }
    }

    #[inline]
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.layout.size()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.layout.size() == 0
    }

    /// Pointer to the given byte offset inside the arena.
    #[inline]
    pub fn at(&self, offset: usize) -> NonNull<u8> {
        debug_assert!(offset < self.len());
        // SAFETY: offset is within the allocation.
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset)) }
    }

    /// Range check: does `ptr` point into this arena?
    #[inline]
    pub fn contains(&self, ptr: *const u8) -> bool {
        let base = self.base.as_ptr() as usize;
        let addr = ptr as usize;
        addr >= base && addr < base + self.len()
    }

    /// Byte offset of `ptr` from the arena base. Fatal if `ptr` is not
    /// inside the arena.
    #[inline]
    pub fn offset_of(&self, ptr: *const u8) -> usize {
        assert!(
            self.contains(ptr),
            "pointer {ptr:p} does not belong to this arena"
        );
        ptr as usize - self.base.as_ptr() as usize
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        // SAFETY: base/layout came from BackendAllocator::allocate.
        unsafe { BackendAllocator.deallocate(self.base, self.layout) };
    }
}

// SAFETY: the arena exclusively owns its allocation; the raw base pointer
// carries no thread affinity.
unsafe impl Send for Arena {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_round_trip() {
        let arena = Arena::new(BackendAllocator, 256);
        assert_eq!(arena.len(), 256);
        assert!(arena.contains(arena.base().as_ptr()));
        assert!(arena.contains(arena.at(255).as_ptr()));
        assert_eq!(arena.offset_of(arena.at(100).as_ptr()), 100);
    }

    #[test]
    fn arena_rejects_foreign_pointer() {
        let arena = Arena::new(BackendAllocator, 64);
        let other = Arena::new(BackendAllocator, 64);
        assert!(!arena.contains(other.base().as_ptr()));
    }

    #[test]
    #[should_panic]
    fn offset_of_foreign_pointer_is_fatal() {
        let arena = Arena::new(BackendAllocator, 64);
        let other = Arena::new(BackendAllocator, 64);
        arena.offset_of(other.base().as_ptr());
    }
}
