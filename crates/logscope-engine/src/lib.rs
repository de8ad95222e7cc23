//! Watch coordination for logscope
//!
//! This crate owns the set of live watches, wires the glob watcher to the
//! content reader and filter pipeline, and emits deduplicated change events.

mod manager;

pub use manager::{EngineError, WatchManager, WatchState};

// Re-export types used in our public API
pub use logscope_types::{WatchConfig, WatchEvent, WatchEventKind, WatchId};
