//! Log processing for logscope
//!
//! This crate provides multi-format line parsing, the retention and
//! formatting filter pipeline, and severity statistics.

mod filter;
mod parser;

pub use filter::{LogFilter, severity_counts};
pub use parser::{LogFormat, LogParser};

// Re-export types used in our public API
pub use logscope_types::{FilterOptions, LogLine, Severity, SeverityCounts};
