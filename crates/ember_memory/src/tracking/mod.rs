//! Allocation tracking: call-stack capture, subsystem tags, per-allocation
//! headers, the process-wide tracker and its report writer.

pub mod callstack;
pub mod header;
pub mod report;
pub mod tags;
pub mod tracker;
