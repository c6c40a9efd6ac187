//! Ember Environment Layer
//!
//! Cross-platform queries about the host: system-wide and per-process
//! memory statistics. Falls back to conservative defaults when a value is
//! unavailable on the current platform.

mod memory;

pub use memory::{query_process_mem_stats, query_system_mem_stats, ProcessMemoryStats, SystemMemoryStats};
