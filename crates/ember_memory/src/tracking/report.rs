//! Leak/usage report rendering.
//!
//! Renders per-tag totals followed by one block per unique allocating call
//! site and writes the result to a timestamped file under the engine's
//! logs directory.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::tracking::tracker::MemoryTracker;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write memory report to {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Renders the report body from deep-copied tracker state.
pub fn render_stats(tracker: &MemoryTracker) -> String {
    let stats = tracker.current_tracking_stats();
    let sites = tracker.callsite_snapshot();

    let mut out = String::new();
    for (tag, usage) in crate::MemoryTag::ALL.iter().zip(stats.usage_per_tag.iter()) {
        let _ = writeln!(out, "{tag}: {} bytes", usage.value());
    }

    out.push_str("----------------------------\n");
    let _ = writeln!(out, "Number of unique callstacks: {}", sites.len());
    out.push_str(
        "All sizes reported are inclusive. Meaning the size reported is the \
         combined size of all the allocations using a particular callstack\n\n",
    );

    for info in &sites {
        let site = info.allocation_callstack();
        let _ = writeln!(out, "Count: {}", site.alloc_count());
        let _ = writeln!(out, "Size: {} bytes", site.size());
        let _ = writeln!(out, "Known Deleters: {}", info.deleter_callstacks().len());
        for frame in tracker.stack_provider().resolve(site.callstack()) {
            let _ = writeln!(out, "{frame}");
        }
        out.push('\n');
    }

    out
}

/// Writes the rendered report to `<logs_dir>/<date>_<time>_<file_name>`.
/// The date/time prefix sorts lexicographically; `:` and `/` are replaced
/// so the name stays a valid path component.
pub fn dump_stats_to_file(
    tracker: &MemoryTracker,
    logs_dir: &Path,
    file_name: &str,
) -> Result<PathBuf, ReportError> {
    let content = render_stats(tracker);

    let stamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
    let dated_name: String = format!("{stamp}_{file_name}")
        .chars()
        .map(|c| if c == ':' || c == '/' { '_' } else { c })
        .collect();
    let path = logs_dir.join(dated_name);

    std::fs::create_dir_all(logs_dir).map_err(|source| ReportError::Io {
        path: logs_dir.to_path_buf(),
        source,
    })?;
    std::fs::write(&path, content).map_err(|source| ReportError::Io {
        path: path.clone(),
        source,
    })?;

    tracing::info!(path = %path.display(), "memory report written");
    Ok(path)
}

impl MemoryTracker {
    /// See [`dump_stats_to_file`].
    pub fn dump_stats_to_file(
        &self,
        logs_dir: &Path,
        file_name: &str,
    ) -> Result<PathBuf, ReportError> {
        dump_stats_to_file(self, logs_dir, file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::callstack::{CallStack, StackProvider};
    use std::alloc::Layout;
    use std::sync::Arc;

    struct OneSite;

    impl StackProvider for OneSite {
        fn capture(&self) -> CallStack {
            CallStack::from_frames(&[0x1234])
        }

        fn resolve(&self, _stack: &CallStack) -> Vec<String> {
            vec![String::from("game::spawn_enemy (enemy.rs:42)")]
        }
    }

    #[test]
    fn report_contains_tags_separator_and_sites() {
        let tracker = MemoryTracker::new(Arc::new(OneSite));
        let layout = Layout::from_size_align(128, 8).unwrap();
        let ptr = crate::allocators::BackendAllocator.allocate(layout);
        tracker.track_alloc(ptr, 128);

        let report = render_stats(&tracker);
        assert!(report.contains("Global: 128 bytes"));
        assert!(report.contains("----------------------------"));
        assert!(report.contains("Number of unique callstacks: 1"));
        assert!(report.contains("Count: 1"));
        assert!(report.contains("Size: 128 bytes"));
        assert!(report.contains("Known Deleters: 0"));
        assert!(report.contains("game::spawn_enemy (enemy.rs:42)"));

        tracker.track_dealloc(ptr);
        unsafe { crate::allocators::BackendAllocator.deallocate(ptr, layout) };
    }

    #[test]
    fn dump_writes_timestamped_file() {
        let tracker = MemoryTracker::new(Arc::new(OneSite));
        let dir = tempfile::tempdir().unwrap();

        let path = dump_stats_to_file(&tracker, dir.path(), "mem_report.txt").unwrap();
        assert!(path.exists());

        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.ends_with("_mem_report.txt"));
        assert!(!name.contains(':'));
        assert!(!name.contains('/'));

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("Number of unique callstacks: 0"));
    }
}
