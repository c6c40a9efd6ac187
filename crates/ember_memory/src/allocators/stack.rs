//! Single-frame (stack) allocator.
//!
//! Same bump contract as the ring allocator but with no wraparound: the
//! cursor is reset exactly once per frame boundary by the engine's
//! frame-advance call. Allocating past capacity before the next reset is
//! fatal. Used for data whose lifetime never outlives the current frame,
//! e.g. temporary formatting buffers.

use std::ptr::NonNull;

use crate::allocators::backend::{Arena, BackendAllocator, ARENA_ALIGN};

#[inline]
fn align_up(offset: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (offset + alignment - 1) & !(alignment - 1)
}

pub struct SingleFrameAllocator {
    arena: Arena,
    cursor: usize,
}

impl SingleFrameAllocator {
    pub fn new(size: usize) -> Self {
        Self {
            arena: Arena::new(BackendAllocator, size),
            cursor: 0,
        }
    }

    pub fn allocate(&mut self, size: usize, alignment: usize) -> NonNull<u8> {
        assert!(
            alignment <= ARENA_ALIGN,
            "single frame allocator cannot align to {alignment} (arena alignment is {ARENA_ALIGN})"
        );
        let current = align_up(self.cursor, alignment);
        let end = current.checked_add(size);
        assert!(
            end.is_some_and(|end| end <= self.arena.len()),
            "single frame allocator exhausted before the frame boundary. \
             alloc size: {size} used: {current} capacity: {}",
            self.arena.len()
        );

        let result = self.arena.at(current);
        self.cursor = current + size;
        result
    }

    pub fn deallocate(&mut self, _ptr: NonNull<u8>, _size: usize) {}

    /// Returns the cursor to the arena base. Called once per frame.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    pub fn has_allocated_ptr(&self, ptr: *const u8) -> bool {
        self.arena.contains(ptr)
    }

    #[inline]
    pub fn used(&self) -> usize {
        self.cursor
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.arena.len()
    }
}
