//! Call-stack capture.
//!
//! A [`CallStack`] is a fixed-capacity value type used as the grouping key
//! for leak/usage reports. Capture and symbol resolution sit behind the
//! [`StackProvider`] trait so the tracker's aggregation logic stays
//! platform-independent and testable with a deterministic provider.

use std::fmt;

/// Maximum number of return addresses captured per allocation.
pub const MAX_STACK_FRAMES: usize = 20;

/// Fixed-capacity ordered sequence of return addresses. Hashable and
/// equality-comparable as a value; unused frames stay zero so derived
/// `Hash`/`Eq` see a canonical representation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CallStack {
    frames: [usize; MAX_STACK_FRAMES],
    depth: usize,
}

impl CallStack {
    pub fn from_frames(frames: &[usize]) -> Self {
        let depth = frames.len().min(MAX_STACK_FRAMES);
        let mut stack = Self::default();
        stack.frames[..depth].copy_from_slice(&frames[..depth]);
        stack.depth = depth;
        stack
    }

    #[inline]
    pub fn frames(&self) -> &[usize] {
        &self.frames[..self.depth]
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.depth == 0
    }
}

impl fmt::Debug for CallStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.frames().iter().map(|a| format!("{a:#x}")))
            .finish()
    }
}

/// Platform capability injected into the tracker: capture the current call
/// stack and resolve one to human-readable frames.
pub trait StackProvider: Send + Sync {
    fn capture(&self) -> CallStack;

    /// One line per resolved frame, in capture order.
    fn resolve(&self, stack: &CallStack) -> Vec<String>;
}

/// Real provider backed by the `backtrace` crate.
#[derive(Debug, Default)]
pub struct BacktraceProvider;

// Frames belonging to the capture machinery itself; skipping them keeps the
// allocating call site at the top of the stored stack.
const CAPTURE_SKIP: usize = 2;

impl StackProvider for BacktraceProvider {
    fn capture(&self) -> CallStack {
        let mut frames = [0usize; MAX_STACK_FRAMES];
        let mut depth = 0;
        let mut seen = 0;
        backtrace::trace(|frame| {
            seen += 1;
            if seen <= CAPTURE_SKIP {
                return true;
            }
            frames[depth] = frame.ip() as usize;
            depth += 1;
            depth < MAX_STACK_FRAMES
        });

        let mut stack = CallStack::default();
        stack.frames = frames;
        stack.depth = depth;
        stack
    }

    fn resolve(&self, stack: &CallStack) -> Vec<String> {
        let mut lines = Vec::with_capacity(stack.frames().len());
        for &addr in stack.frames() {
            let mut line = None;
            backtrace::resolve(addr as *mut std::ffi::c_void, |symbol| {
                if line.is_some() {
                    return;
                }
                let name = symbol
                    .name()
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| String::from("<unknown>"));
                line = Some(match (symbol.filename(), symbol.lineno()) {
                    (Some(file), Some(no)) => {
                        format!("{name} ({}:{no})", file.display())
                    }
                    _ => name,
                });
            });
            lines.push(line.unwrap_or_else(|| format!("{addr:#x} <unresolved>")));
        }
        lines
    }
}

/// Provider that captures nothing. For ship builds where per-allocation
/// capture cost is unwanted; every allocation then groups under the empty
/// call site.
#[derive(Debug, Default)]
pub struct NullStackProvider;

impl StackProvider for NullStackProvider {
    fn capture(&self) -> CallStack {
        CallStack::default()
    }

    fn resolve(&self, _stack: &CallStack) -> Vec<String> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn hash_of(stack: &CallStack) -> u64 {
        let mut hasher = DefaultHasher::new();
        stack.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn equal_frames_hash_equal() {
        let a = CallStack::from_frames(&[0x10, 0x20, 0x30]);
        let b = CallStack::from_frames(&[0x10, 0x20, 0x30]);
        let c = CallStack::from_frames(&[0x10, 0x20, 0x31]);

        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_ne!(a, c);
    }

    #[test]
    fn capture_truncates_to_capacity() {
        let frames: Vec<usize> = (1..=40).collect();
        let stack = CallStack::from_frames(&frames);
        assert_eq!(stack.frames().len(), MAX_STACK_FRAMES);
        assert_eq!(stack.frames()[0], 1);
    }

    #[test]
    fn backtrace_provider_captures_something() {
        let provider = BacktraceProvider;
        let stack = provider.capture();
        assert!(!stack.is_empty());
    }

    #[test]
    fn null_provider_is_empty() {
        let provider = NullStackProvider;
        assert!(provider.capture().is_empty());
        assert!(provider.resolve(&CallStack::default()).is_empty());
    }
}
