//! Filesystem side of logscope
//!
//! This crate resolves glob patterns against the filesystem: template-variable
//! substitution, compiled match predicates, pruned directory walks, the
//! dual-cadence poll watcher, incremental offset reads, and text decoding.

mod decode;
mod matcher;
mod pattern;
mod reader;
mod walker;
mod watcher;

pub use decode::DecoderPool;
pub use matcher::{CompiledPattern, NameMatcher, PathMatcher, PatternError, SegmentMatcher};
pub use pattern::{ResolveContext, ResolvedPattern, resolve_pattern};
pub use reader::{ReadResult, read_content, tail};
pub use walker::{WalkedFile, walk_all, walk_pattern};
pub use watcher::{GlobNotification, GlobWatcher};

// Re-export types used in our public API
pub use logscope_types::WatchOptions;
