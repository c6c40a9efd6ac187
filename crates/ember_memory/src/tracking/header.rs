//! Per-allocation metadata.

use std::thread::ThreadId;

use crate::tracking::callstack::CallStack;
use crate::tracking::tags::MemoryTag;

/// Frame index recorded for allocations made before the tracker is
/// initialized (static init, pre-main).
pub const FRAME_PRE_INIT: i32 = -1;

/// Frame index recorded for allocations made during engine initialization,
/// before the first real frame.
pub const FRAME_INIT: i32 = 0;

/// Metadata recorded for each tracked allocation. Stored out-of-band in the
/// tracker's live table (never inside the user allocation) and owned
/// exclusively by that table until the matching deallocation.
#[derive(Debug, Clone)]
pub struct MemoryHeader {
    tag: MemoryTag,
    ptr: usize,
    size: usize,
    thread_id: ThreadId,
    frame_index: i32,
    callstack: CallStack,
}

impl MemoryHeader {
    pub fn new(
        tag: MemoryTag,
        ptr: usize,
        size: usize,
        thread_id: ThreadId,
        frame_index: i32,
        callstack: CallStack,
    ) -> Self {
        Self {
            tag,
            ptr,
            size,
            thread_id,
            frame_index,
            callstack,
        }
    }

    #[inline]
    pub fn tag(&self) -> MemoryTag {
        self.tag
    }

    /// Address of the user allocation this header describes.
    #[inline]
    pub fn ptr(&self) -> usize {
        self.ptr
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    #[inline]
    pub fn frame_index(&self) -> i32 {
        self.frame_index
    }

    #[inline]
    pub fn callstack(&self) -> &CallStack {
        &self.callstack
    }
}
