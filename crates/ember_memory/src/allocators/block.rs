//! Fixed-block allocator.
//!
//! Splits one backend arena into uniform blocks linked through an
//! index-based free list, so allocation and deallocation are O(1) with no
//! lookup. Blocks never split or merge.
//!
//! ```text
//! +---------------------------------------------------------------+
//! | [hdr|block] -> [hdr|block] -> [hdr|block] -> [hdr|block]      |
//! +---------------------------------------------------------------+
//! ```
//!
//! Bookkeeping lives out-of-band in a slot table rather than as intrusive
//! pointers inside the arena, which lets `deallocate` detect double frees
//! and pointers that never came from this allocator.

use std::ptr::NonNull;

use crate::allocators::backend::{Arena, BackendAllocator};

/// Per-block header space reserved in the arena stride. Kept in the carve
/// formula so the block count matches `total / (header + block_size)`.
pub const BLOCK_HEADER_SIZE: usize = std::mem::size_of::<usize>();

const NO_BLOCK: u32 = u32::MAX;

/// Out-of-band state for one block.
#[derive(Debug, Clone, Copy)]
struct Slot {
    next_free: u32,
    live: bool,
}

#[derive(Debug)]
pub struct BlockAllocator {
    arena: Arena,
    block_size: usize,
    stride: usize,
    slots: Box<[Slot]>,
    free_head: u32,
}

impl BlockAllocator {
    /// Carves `size` bytes into `size / (header + block_size)` blocks and
    /// chains them into the free list. Remainder bytes that don't fit a
    /// whole block are discarded with a warning.
    pub fn new(size: usize, block_size: usize) -> Self {
        assert!(block_size > 0, "block size should always be bigger than 0");

        let stride = BLOCK_HEADER_SIZE + block_size;
        let num_blocks = size / stride;
        assert!(
            num_blocks > 0,
            "block allocator of {size} bytes cannot fit a single block of {block_size} bytes"
        );

        let rem = size % stride;
        if rem > 0 {
            tracing::warn!(
                remainder = rem,
                "block size is not a good denominator for block allocator. \
                 increase by {rem} bytes to be perfectly matched"
            );
        }

        let mut slots = vec![
            Slot {
                next_free: NO_BLOCK,
                live: false
            };
            num_blocks
        ]
        .into_boxed_slice();
        for (i, slot) in slots.iter_mut().enumerate() {
            slot.next_free = if i + 1 < num_blocks {
                (i + 1) as u32
            } else {
                NO_BLOCK
            };
        }

        Self {
            arena: Arena::new(BackendAllocator, size),
            block_size,
            stride,
            slots,
            free_head: 0,
        }
    }

    /// Pops the head of the free list. The requested size must fit the
    /// fixed block size; alignment beyond the block layout is not honored.
    /// Fatal when the free list is empty.
    pub fn allocate(&mut self, size: usize, _alignment: usize) -> NonNull<u8> {
        assert!(
            size <= self.block_size,
            "trying to allocate something that's bigger than the block size \
             of a block allocator. alloc size: {size} block size: {}",
            self.block_size
        );
        assert!(
            self.free_head != NO_BLOCK,
            "ran out of memory in the free list of the block allocator. total size: {}",
            self.arena.len()
        );

        let idx = self.free_head as usize;
        let slot = &mut self.slots[idx];
        self.free_head = slot.next_free;
        slot.next_free = NO_BLOCK;
        slot.live = true;

        self.payload_ptr(idx)
    }

    /// Returns a block to the free list. Fatal if `ptr` is not a live block
    /// of this allocator (double free or foreign pointer).
    pub fn deallocate(&mut self, ptr: NonNull<u8>, _size: usize) {
        let idx = self.block_index(ptr);
        let slot = &mut self.slots[idx];
        assert!(
            slot.live,
            "deallocating block {idx} that is not live (double free?)"
        );

        slot.live = false;
        slot.next_free = self.free_head;
        self.free_head = idx as u32;
    }

    /// Number of blocks carved out of the arena.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn has_allocated_ptr(&self, ptr: *const u8) -> bool {
        self.arena.contains(ptr)
    }

    fn payload_ptr(&self, idx: usize) -> NonNull<u8> {
        self.arena.at(idx * self.stride + BLOCK_HEADER_SIZE)
    }

    /// Recovers the block index from a user pointer. Fatal if the pointer
    /// is outside the arena or not on a block payload boundary.
    fn block_index(&self, ptr: NonNull<u8>) -> usize {
        let offset = self.arena.offset_of(ptr.as_ptr());
        assert!(
            offset >= BLOCK_HEADER_SIZE && (offset - BLOCK_HEADER_SIZE) % self.stride == 0,
            "pointer at arena offset {offset} is not a block payload"
        );
        let idx = (offset - BLOCK_HEADER_SIZE) / self.stride;
        assert!(idx < self.slots.len(), "block index {idx} out of range");
        idx
    }
}

/// Two block allocators are equal iff they share the same backing arena.
/// Generic containers use this to decide whether moving data between them
/// requires reallocation.
impl PartialEq for BlockAllocator {
    fn eq(&self, other: &Self) -> bool {
        self.arena.base() == other.arena.base()
    }
}

impl Eq for BlockAllocator {}
