use ember_env::{query_process_mem_stats, query_system_mem_stats};

fn main() {
    let start_mem_collect = std::time::Instant::now();
    let system = query_system_mem_stats();
    let process = query_process_mem_stats();
    let mem_collect_duration = start_mem_collect.elapsed().as_micros() as u64;

    println!("System memory:");
    println!("  Total physical: {} bytes", system.total_physical_mem);
    println!("  Avail physical: {} bytes", system.avail_physical_mem);
    println!("  Total virtual: {} bytes", system.total_virtual_mem);
    println!("  Avail virtual: {} bytes", system.avail_virtual_mem);
    println!("  Page size: {} bytes", system.page_size);
    println!("Process memory:");
    println!("  Used physical: {} bytes", process.used_physical_mem);
    println!("  Peak physical: {} bytes", process.peak_physical_mem);
    println!("  Used virtual: {} bytes", process.used_virtual_mem);
    println!("  Peak virtual: {} bytes", process.peak_virtual_mem);
    println!("  Page faults: {}", process.num_page_faults);
    println!("Memory stats collected in {} microseconds", mem_collect_duration);
}
