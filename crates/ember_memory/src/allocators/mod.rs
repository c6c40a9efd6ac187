//! Engine allocators.
//!
//! Each allocator carves its memory out of a single backend arena. None of
//! the arena allocators is thread-safe; an instance has one logical owner
//! (e.g. "the scratch heap") and concurrent use requires an external lock,
//! which is the caller's responsibility.

pub mod backend;
pub mod block;
pub mod debug;
pub mod ring;
pub mod stack;

pub use backend::{Arena, BackendAllocator, ARENA_ALIGN};
pub use debug::DebugAllocator;
