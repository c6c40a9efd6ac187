//! Ring (circular) allocator.
//!
//! Monotonic bump allocator over a fixed arena. When the tail can't fit a
//! request the cursor wraps to the arena base, deliberately wasting the
//! unused tail. Individual allocations are never reclaimed; callers must
//! not assume memory survives once the cursor wraps past it.

use std::ptr::NonNull;

use crate::allocators::backend::{Arena, BackendAllocator, ARENA_ALIGN};

#[inline]
fn align_up(offset: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (offset + alignment - 1) & !(alignment - 1)
}

pub struct RingAllocator {
    arena: Arena,
    cursor: usize,
}

impl RingAllocator {
    pub fn new(size: usize) -> Self {
        Self {
            arena: Arena::new(BackendAllocator, size),
            cursor: 0,
        }
    }

    /// Bumps the cursor, wrapping to the arena base when the tail is too
    /// small. Fatal only when `size` exceeds the entire arena, which no
    /// amount of wrapping could satisfy.
    pub fn allocate(&mut self, size: usize, alignment: usize) -> NonNull<u8> {
        assert!(
            size <= self.arena.len(),
            "allocating more data than the circular buffer holds. \
             alloc size: {size} buffer size: {}",
            self.arena.len()
        );
        assert!(
            alignment <= ARENA_ALIGN,
            "circular allocator cannot align to {alignment} (arena alignment is {ARENA_ALIGN})"
        );

        // Aligning the cursor can push it past the arena end, so compare
        // against the end rather than subtracting from the length.
        let mut current = align_up(self.cursor, alignment);
        if current + size > self.arena.len() {
            // Wrap to the front and waste the tail. Worse for memory usage,
            // better for performance: the allocation stays contiguous and
            // cache friendly.
            current = 0;
        }

        let result = self.arena.at(current);
        self.cursor = current + size;
        result
    }

    /// Individual allocations are never reclaimed; the arena resets as a
    /// unit via wraparound.
    pub fn deallocate(&mut self, _ptr: NonNull<u8>, _size: usize) {}

    pub fn has_allocated_ptr(&self, ptr: *const u8) -> bool {
        self.arena.contains(ptr)
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.arena.len()
    }
}

impl PartialEq for RingAllocator {
    fn eq(&self, other: &Self) -> bool {
        self.arena.base() == other.arena.base()
    }
}

impl Eq for RingAllocator {}
