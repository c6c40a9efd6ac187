//! Settings management
//!
//! Boot-time configuration is an INI-style file with a `[heaps]` section
//! for the boot heap sizes and a `[memory]` section for the tracker
//! budget. A missing file is not an error: the engine falls back to
//! compiled-in defaults. A malformed file logs a warning and falls back
//! the same way.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Engine settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub heaps: HeapSettings,
    pub memory: MemorySettings,
}

/// Sizes of the boot-time heaps, in bytes. Both must be positive for the
/// boot sequence to succeed; the memory system asserts on commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeapSettings {
    pub single_frame_heap_size: usize,
    pub scratch_heap_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySettings {
    /// Soft budget for tracked memory, in MiB. Exceeding it is reported,
    /// not enforced.
    pub max_memory_mib: u64,
}

impl Default for HeapSettings {
    fn default() -> Self {
        Self {
            single_frame_heap_size: 4096,
            scratch_heap_size: 4096,
        }
    }
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self { max_memory_mib: 256 }
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file")]
    Read(#[from] std::io::Error),
    #[error("failed to parse settings file")]
    Parse(#[from] toml::de::Error),
}

/// Strict parse, for callers that want to surface config problems.
pub fn parse_engine_settings(text: &str) -> Result<EngineSettings, SettingsError> {
    Ok(toml::from_str(text)?)
}

/// Loads the boot settings, falling back to defaults when the file is
/// missing or malformed.
pub fn load_engine_settings(path: &Path) -> EngineSettings {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no settings file, using compiled-in defaults");
        return EngineSettings::default();
    }

    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "failed to read settings, using defaults");
            return EngineSettings::default();
        }
    };

    match parse_engine_settings(&text) {
        Ok(settings) => settings,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "malformed settings, using defaults");
            EngineSettings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_heap_section() {
        let settings = parse_engine_settings(
            "[heaps]\n\
             single_frame_heap_size = 8192\n\
             scratch_heap_size = 16384\n\
             \n\
             [memory]\n\
             max_memory_mib = 512\n",
        )
        .unwrap();

        assert_eq!(settings.heaps.single_frame_heap_size, 8192);
        assert_eq!(settings.heaps.scratch_heap_size, 16384);
        assert_eq!(settings.memory.max_memory_mib, 512);
    }

    #[test]
    fn missing_sections_use_defaults() {
        let settings = parse_engine_settings("[heaps]\nscratch_heap_size = 1024\n").unwrap();
        assert_eq!(settings.heaps.scratch_heap_size, 1024);
        assert_eq!(settings.heaps.single_frame_heap_size, 4096);
        assert_eq!(settings.memory.max_memory_mib, 256);
    }

    #[test]
    fn missing_file_is_not_fatal() {
        let settings = load_engine_settings(Path::new("/definitely/not/here/boot.toml"));
        assert_eq!(settings.heaps.scratch_heap_size, 4096);
    }

    #[test]
    fn malformed_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boot.toml");
        std::fs::write(&path, "[heaps\nnot toml at all").unwrap();

        let settings = load_engine_settings(&path);
        assert_eq!(settings.heaps.single_frame_heap_size, 4096);
    }

    #[test]
    fn round_trips_through_toml() {
        let settings = EngineSettings::default();
        let text = toml::to_string(&settings).unwrap();
        let parsed = parse_engine_settings(&text).unwrap();
        assert_eq!(
            parsed.heaps.single_frame_heap_size,
            settings.heaps.single_frame_heap_size
        );
    }
}
