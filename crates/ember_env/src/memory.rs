// memory.rs
//! Cross-platform helpers to query system and process memory statistics.
//! Falls back to zeroed defaults when unavailable.

/// Memory stats about the system itself, independent of the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemMemoryStats {
    /// Total physical memory in the system, in bytes.
    pub total_physical_mem: u64,
    /// Physical memory that isn't allocated yet, in bytes.
    pub avail_physical_mem: u64,
    /// Total virtual memory in the system, in bytes.
    pub total_virtual_mem: u64,
    /// Virtual memory that isn't allocated yet, in bytes.
    pub avail_virtual_mem: u64,
    /// Page size of the current system, in bytes.
    pub page_size: u64,
}

/// Memory stats coming from the operating system about the current process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessMemoryStats {
    /// Physical memory currently used by the process, in bytes.
    pub used_physical_mem: u64,
    /// Peak physical memory usage of the process, in bytes.
    pub peak_physical_mem: u64,
    /// Virtual memory currently used by the process, in bytes.
    pub used_virtual_mem: u64,
    /// Peak virtual memory usage of the process, in bytes.
    pub peak_virtual_mem: u64,
    /// Page faults that have occurred. Doesn't differentiate between hard
    /// and soft faults, so a high count isn't necessarily bad.
    pub num_page_faults: u64,
}

pub fn query_system_mem_stats() -> SystemMemoryStats {
    SystemMemoryStats {
        total_physical_mem: total_physical().unwrap_or(0),
        avail_physical_mem: avail_physical().unwrap_or(0),
        total_virtual_mem: total_virtual().unwrap_or(0),
        avail_virtual_mem: avail_virtual().unwrap_or(0),
        page_size: page_size().unwrap_or(4096),
    }
}

pub fn query_process_mem_stats() -> ProcessMemoryStats {
    process_stats().unwrap_or_default()
}

/* --------------------- Linux / Android --------------------- */

#[cfg(any(target_os = "linux", target_os = "android"))]
fn meminfo_field(name: &str) -> Option<u64> {
    // /proc/meminfo: "MemTotal:  16367168 kB"
    let text = std::fs::read_to_string("/proc/meminfo").ok()?;
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix(name) {
            let kb: u64 = rest
                .trim_start_matches(':')
                .split_whitespace()
                .next()?
                .parse()
                .ok()?;
            return Some(kb * 1024);
        }
    }
    None
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn total_physical() -> Option<u64> {
    meminfo_field("MemTotal")
}
#[cfg(any(target_os = "linux", target_os = "android"))]
fn avail_physical() -> Option<u64> {
    meminfo_field("MemAvailable")
}
#[cfg(any(target_os = "linux", target_os = "android"))]
fn total_virtual() -> Option<u64> {
    // Physical plus swap is the closest portable notion of "total virtual".
    Some(meminfo_field("MemTotal")? + meminfo_field("SwapTotal").unwrap_or(0))
}
#[cfg(any(target_os = "linux", target_os = "android"))]
fn avail_virtual() -> Option<u64> {
    Some(meminfo_field("MemAvailable")? + meminfo_field("SwapFree").unwrap_or(0))
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn process_stats() -> Option<ProcessMemoryStats> {
    // /proc/self/status: "VmRSS:      1234 kB"
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let field = |name: &str| -> u64 {
        for line in status.lines() {
            if let Some(rest) = line.strip_prefix(name) {
                if let Some(kb) = rest
                    .trim_start_matches(':')
                    .split_whitespace()
                    .next()
                    .and_then(|v| v.parse::<u64>().ok())
                {
                    return kb * 1024;
                }
            }
        }
        0
    };

    Some(ProcessMemoryStats {
        used_physical_mem: field("VmRSS"),
        peak_physical_mem: field("VmHWM"),
        used_virtual_mem: field("VmSize"),
        peak_virtual_mem: field("VmPeak"),
        num_page_faults: page_fault_count().unwrap_or(0),
    })
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn page_fault_count() -> Option<u64> {
    // getrusage reports minor + major faults for the whole process.
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut usage) };
    if rc == 0 {
        Some(usage.ru_minflt as u64 + usage.ru_majflt as u64)
    } else {
        None
    }
}

/* --------------------- macOS / iOS (Darwin) --------------------- */

#[cfg(any(target_os = "macos", target_os = "ios"))]
fn sysctl_u64(name: &str) -> Option<u64> {
    use libc::{c_void, size_t, sysctlbyname};
    let cname = std::ffi::CString::new(name).ok()?;
    let mut val: u64 = 0;
    let mut len: size_t = std::mem::size_of::<u64>() as _;
    let rc = unsafe {
        sysctlbyname(
            cname.as_ptr(),
            &mut val as *mut _ as *mut c_void,
            &mut len,
            std::ptr::null_mut(),
            0,
        )
    };
    if rc == 0 && val != 0 {
        Some(val)
    } else {
        None
    }
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
fn total_physical() -> Option<u64> {
    sysctl_u64("hw.memsize")
}
#[cfg(any(target_os = "macos", target_os = "ios"))]
fn avail_physical() -> Option<u64> {
    None // would need host_statistics64; callers treat 0 as unknown
}
#[cfg(any(target_os = "macos", target_os = "ios"))]
fn total_virtual() -> Option<u64> {
    sysctl_u64("hw.memsize")
}
#[cfg(any(target_os = "macos", target_os = "ios"))]
fn avail_virtual() -> Option<u64> {
    None
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
fn process_stats() -> Option<ProcessMemoryStats> {
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut usage) };
    if rc != 0 {
        return None;
    }
    // ru_maxrss is in bytes on Darwin.
    Some(ProcessMemoryStats {
        used_physical_mem: usage.ru_maxrss as u64,
        peak_physical_mem: usage.ru_maxrss as u64,
        used_virtual_mem: 0,
        peak_virtual_mem: 0,
        num_page_faults: usage.ru_minflt as u64 + usage.ru_majflt as u64,
    })
}

/* -------------------------- Windows -------------------------- */

#[cfg(target_os = "windows")]
fn memory_status() -> Option<windows_sys::Win32::System::SystemInformation::MEMORYSTATUSEX> {
    use windows_sys::Win32::System::SystemInformation::{GlobalMemoryStatusEx, MEMORYSTATUSEX};
    unsafe {
        let mut st: MEMORYSTATUSEX = std::mem::zeroed();
        st.dwLength = std::mem::size_of::<MEMORYSTATUSEX>() as u32;
        if GlobalMemoryStatusEx(&mut st) != 0 {
            Some(st)
        } else {
            None
        }
    }
}

#[cfg(target_os = "windows")]
fn total_physical() -> Option<u64> {
    memory_status().map(|st| st.ullTotalPhys)
}
#[cfg(target_os = "windows")]
fn avail_physical() -> Option<u64> {
    memory_status().map(|st| st.ullAvailPhys)
}
#[cfg(target_os = "windows")]
fn total_virtual() -> Option<u64> {
    memory_status().map(|st| st.ullTotalPageFile)
}
#[cfg(target_os = "windows")]
fn avail_virtual() -> Option<u64> {
    memory_status().map(|st| st.ullAvailPageFile)
}

#[cfg(target_os = "windows")]
fn process_stats() -> Option<ProcessMemoryStats> {
    use windows_sys::Win32::System::ProcessStatus::{
        K32GetProcessMemoryInfo, PROCESS_MEMORY_COUNTERS,
    };
    use windows_sys::Win32::System::Threading::GetCurrentProcess;
    unsafe {
        let mut counters: PROCESS_MEMORY_COUNTERS = std::mem::zeroed();
        counters.cb = std::mem::size_of::<PROCESS_MEMORY_COUNTERS>() as u32;
        if K32GetProcessMemoryInfo(GetCurrentProcess(), &mut counters, counters.cb) == 0 {
            return None;
        }
        Some(ProcessMemoryStats {
            used_physical_mem: counters.WorkingSetSize as u64,
            peak_physical_mem: counters.PeakWorkingSetSize as u64,
            used_virtual_mem: counters.PagefileUsage as u64,
            peak_virtual_mem: counters.PeakPagefileUsage as u64,
            num_page_faults: counters.PageFaultCount as u64,
        })
    }
}

/* --------------------- Page size --------------------- */

#[cfg(unix)]
fn page_size() -> Option<u64> {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        Some(size as u64)
    } else {
        None
    }
}

#[cfg(target_os = "windows")]
fn page_size() -> Option<u64> {
    use windows_sys::Win32::System::SystemInformation::{GetSystemInfo, SYSTEM_INFO};
    unsafe {
        let mut info: SYSTEM_INFO = std::mem::zeroed();
        GetSystemInfo(&mut info);
        Some(info.dwPageSize as u64)
    }
}

/* --------------------- Other / WASM / Fallbacks --------------------- */

#[cfg(not(any(
    target_os = "windows",
    target_os = "macos",
    target_os = "ios",
    target_os = "linux",
    target_os = "android"
)))]
mod fallback {
    use super::ProcessMemoryStats;
    pub(super) fn total_physical() -> Option<u64> {
        None
    }
    pub(super) fn avail_physical() -> Option<u64> {
        None
    }
    pub(super) fn total_virtual() -> Option<u64> {
        None
    }
    pub(super) fn avail_virtual() -> Option<u64> {
        None
    }
    pub(super) fn process_stats() -> Option<ProcessMemoryStats> {
        None
    }
}
#[cfg(not(any(
    target_os = "windows",
    target_os = "macos",
    target_os = "ios",
    target_os = "linux",
    target_os = "android"
)))]
use fallback::{avail_physical, avail_virtual, process_stats, total_physical, total_virtual};

#[cfg(not(any(unix, target_os = "windows")))]
fn page_size() -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_stats_are_sane() {
        let stats = query_system_mem_stats();
        assert!(stats.page_size > 0);
        // Total can be 0 on exotic targets; when present it must cover
        // what's available.
        if stats.total_physical_mem > 0 {
            assert!(stats.avail_physical_mem <= stats.total_physical_mem);
        }
    }

    #[test]
    fn process_stats_do_not_shrink_peak() {
        let stats = query_process_mem_stats();
        assert!(stats.peak_physical_mem >= stats.used_physical_mem || stats.peak_physical_mem == 0);
    }
}
