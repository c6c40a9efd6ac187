//! Ember Services Layer
//!
//! Platform abstraction for boot-time configuration and settings.

pub mod settings;

pub use settings::{load_engine_settings, EngineSettings, HeapSettings, MemorySettings};
