//! Memory tags and the thread-local tag stack.
//!
//! A tag labels which engine subsystem an allocation belongs to. Tags are
//! attribution only; they never affect allocation behavior. The current
//! tag lives on a bounded per-thread stack so reading it needs no locking.

use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;

/// Subsystem identifier for allocation attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum MemoryTag {
    Global,
    Engine,
    FileIo,
    StringPool,
    Rendering,
    Audio,
    Scripting,
    Assets,
    Ui,
    Network,
}

impl MemoryTag {
    pub const COUNT: usize = 10;

    pub const ALL: [MemoryTag; Self::COUNT] = [
        MemoryTag::Global,
        MemoryTag::Engine,
        MemoryTag::FileIo,
        MemoryTag::StringPool,
        MemoryTag::Rendering,
        MemoryTag::Audio,
        MemoryTag::Scripting,
        MemoryTag::Assets,
        MemoryTag::Ui,
        MemoryTag::Network,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            MemoryTag::Global => "Global",
            MemoryTag::Engine => "Engine",
            MemoryTag::FileIo => "FileIo",
            MemoryTag::StringPool => "StringPool",
            MemoryTag::Rendering => "Rendering",
            MemoryTag::Audio => "Audio",
            MemoryTag::Scripting => "Scripting",
            MemoryTag::Assets => "Assets",
            MemoryTag::Ui => "Ui",
            MemoryTag::Network => "Network",
        }
    }
}

impl fmt::Display for MemoryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Maximum nesting depth of tag scopes on one thread.
pub const MAX_TAG_DEPTH: usize = 100;

/// Bounded tag stack with a checked push. Overflow is a defect, not a
/// recoverable condition.
struct TagStack {
    stack: [MemoryTag; MAX_TAG_DEPTH],
    depth: usize,
}

impl TagStack {
    const fn new() -> Self {
        Self {
            stack: [MemoryTag::Global; MAX_TAG_DEPTH],
            depth: 0,
        }
    }

    fn push(&mut self, tag: MemoryTag) {
        assert!(
            self.depth + 1 < MAX_TAG_DEPTH,
            "memory tag stack overflow (max depth {MAX_TAG_DEPTH})"
        );
        self.depth += 1;
        self.stack[self.depth] = tag;
    }

    fn pop(&mut self) {
        assert!(self.depth > 0, "memory tag stack underflow");
        self.depth -= 1;
    }

    fn current(&self) -> MemoryTag {
        self.stack[self.depth]
    }
}

thread_local! {
    static TAG_STACK: RefCell<TagStack> = const { RefCell::new(TagStack::new()) };
}

pub fn push_tag(tag: MemoryTag) {
    TAG_STACK.with(|stack| stack.borrow_mut().push(tag));
}

pub fn pop_tag() {
    TAG_STACK.with(|stack| stack.borrow_mut().pop());
}

/// The innermost active tag on this thread; `Global` when no scope is open.
pub fn current_tag() -> MemoryTag {
    TAG_STACK.with(|stack| stack.borrow().current())
}

/// RAII guard: pushes a tag onto the current thread's tag stack on
/// construction and pops it unconditionally on drop, restoring the
/// previous tag.
pub struct MemoryTagScope {
    // Tag stacks are per-thread; keep the guard on the thread it was
    // opened on.
    _not_send: PhantomData<*const ()>,
}

impl MemoryTagScope {
    pub fn new(tag: MemoryTag) -> Self {
        push_tag(tag);
        Self {
            _not_send: PhantomData,
        }
    }
}

impl Drop for MemoryTagScope {
    fn drop(&mut self) {
        pop_tag();
    }
}

/// Tags all allocations in the enclosing scope.
///
/// ```ignore
/// mem_tag_scope!(MemoryTag::Assets);
/// let blob = system.alloc(layout); // attributed to Assets
/// ```
#[macro_export]
macro_rules! mem_tag_scope {
    ($tag:expr) => {
        let _mem_tag_scope = $crate::tracking::tags::MemoryTagScope::new($tag);
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tag_is_global() {
        assert_eq!(current_tag(), MemoryTag::Global);
    }

    #[test]
    fn nested_scopes_restore_lifo() {
        assert_eq!(current_tag(), MemoryTag::Global);
        {
            let _outer = MemoryTagScope::new(MemoryTag::Rendering);
            assert_eq!(current_tag(), MemoryTag::Rendering);
            {
                let _inner = MemoryTagScope::new(MemoryTag::Audio);
                assert_eq!(current_tag(), MemoryTag::Audio);
            }
            assert_eq!(current_tag(), MemoryTag::Rendering);
        }
        assert_eq!(current_tag(), MemoryTag::Global);
    }

    #[test]
    fn scope_macro_pops_at_end_of_block() {
        {
            mem_tag_scope!(MemoryTag::StringPool);
            assert_eq!(current_tag(), MemoryTag::StringPool);
        }
        assert_eq!(current_tag(), MemoryTag::Global);
    }

    #[test]
    fn pop_runs_even_on_unwind() {
        let result = std::panic::catch_unwind(|| {
            let _scope = MemoryTagScope::new(MemoryTag::Scripting);
            panic!("scope body failed");
        });
        assert!(result.is_err());
        assert_eq!(current_tag(), MemoryTag::Global);
    }

    #[test]
    #[should_panic(expected = "tag stack overflow")]
    fn overflow_is_fatal() {
        for _ in 0..MAX_TAG_DEPTH {
            push_tag(MemoryTag::Engine);
        }
    }

    #[test]
    fn tag_indices_cover_all() {
        for (i, tag) in MemoryTag::ALL.iter().enumerate() {
            assert_eq!(tag.index(), i);
        }
    }
}
