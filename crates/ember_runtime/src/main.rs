//! Ember Engine Runtime
//!
//! Minimal binary that boots the memory subsystem: bootstrap, load boot
//! settings, commit the heaps, run a few frames and dump a usage report.

use std::alloc::Layout;
use std::path::Path;

use anyhow::Result;
use ember_memory::{mem_tag_scope, BootHeapSizes, MemorySystem, MemoryTag};
use ember_services::load_engine_settings;

fn main() -> Result<()> {
    // The memory system must exist before the logger: the subscriber
    // allocates during init.
    let memory = MemorySystem::bootstrap();

    tracing_subscriber::fmt::init();
    tracing::info!("Ember Engine v{}", ember_memory::VERSION);

    let settings = load_engine_settings(Path::new("config/boot.toml"));
    memory.commit_boot_heaps(BootHeapSizes {
        single_frame_heap_size: settings.heaps.single_frame_heap_size,
        scratch_heap_size: settings.heaps.scratch_heap_size,
    });
    memory.initialize_tracker((settings.memory.max_memory_mib * 1024 * 1024) as i64);

    // A handful of tagged allocations standing in for real subsystems.
    let string_pool = {
        mem_tag_scope!(MemoryTag::StringPool);
        memory.alloc(Layout::from_size_align(4096, 16)?)
    };
    let asset_blob = {
        mem_tag_scope!(MemoryTag::Assets);
        memory.alloc(Layout::from_size_align(64 * 1024, 16)?)
    };

    for frame in 0..3 {
        // Per-frame transient data goes through the single-frame heap.
        let _scratch_line = memory.temp_alloc(256, 16);
        tracing::debug!(frame, "frame complete");
        memory.end_frame();
    }

    let stats = memory.tracker().current_tracking_stats();
    tracing::info!(
        used = stats.used_memory,
        peak = stats.max_used_memory,
        alive = stats.num_alive_allocations,
        "tracked memory after warmup"
    );
    ember_memory::stats::debug_log_mem_usage(memory.tracker());

    let report = memory
        .tracker()
        .dump_stats_to_file(Path::new("logs"), "mem_report.txt")?;
    tracing::info!(path = %report.display(), "memory report");

    unsafe {
        memory.dealloc(asset_blob, Layout::from_size_align(64 * 1024, 16)?);
        memory.dealloc(string_pool, Layout::from_size_align(4096, 16)?);
    }

    Ok(())
}
