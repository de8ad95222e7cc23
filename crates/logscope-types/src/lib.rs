//! Shared types for logscope
//!
//! This crate contains data structures used across multiple logscope crates.

use serde::{Deserialize, Deserializer, Serialize};

// ============================================================================
// Severity
// ============================================================================

/// Severity of a parsed log line, ordered least to most severe.
///
/// This is the user-facing filter axis. Engine diagnostics use
/// `tracing::Level` and the two are never mixed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl Severity {
    /// Map level text from a log line onto a severity bucket.
    ///
    /// FATAL folds into the error bucket, WARNING into warn. Unrecognized
    /// or empty level text defaults to info.
    pub fn from_level_str(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "trace" | "trc" => Self::Trace,
            "debug" | "dbg" => Self::Debug,
            "warn" | "warning" | "wrn" => Self::Warn,
            "error" | "err" | "fatal" | "critical" | "panic" => Self::Error,
            _ => Self::Info,
        }
    }

    /// Display string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

/// Minimum-severity threshold for the filter pipeline.
///
/// `All` is a synthetic bound below trace: every parsed line is retained.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MinSeverity {
    #[default]
    All,
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl MinSeverity {
    /// Whether a line of the given severity passes this threshold.
    pub fn retains(self, severity: Severity) -> bool {
        severity >= self.floor()
    }

    fn floor(self) -> Severity {
        match self {
            Self::All | Self::Trace => Severity::Trace,
            Self::Debug => Severity::Debug,
            Self::Info => Severity::Info,
            Self::Warn => Severity::Warn,
            Self::Error => Severity::Error,
        }
    }
}

// ============================================================================
// Log lines & statistics
// ============================================================================

/// One raw line successfully matched against a line format.
///
/// Recomputed per line per filter pass, never persisted. Fields a format
/// does not carry are empty strings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogLine {
    pub timestamp: String,
    pub severity: Severity,
    pub source: String,
    pub message: String,
    /// Original raw line, retained for full-line search and formatting
    pub raw: String,
}

/// Line counts per severity bucket
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SeverityCounts {
    pub trace: usize,
    pub debug: usize,
    pub info: usize,
    pub warn: usize,
    pub error: usize,
    /// Lines no format matched
    pub unparsed: usize,
}

impl SeverityCounts {
    /// Record one line; `None` means unparsed.
    pub fn record(&mut self, severity: Option<Severity>) {
        match severity {
            Some(Severity::Trace) => self.trace += 1,
            Some(Severity::Debug) => self.debug += 1,
            Some(Severity::Info) => self.info += 1,
            Some(Severity::Warn) => self.warn += 1,
            Some(Severity::Error) => self.error += 1,
            None => self.unparsed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.trace + self.debug + self.info + self.warn + self.error + self.unparsed
    }
}

// ============================================================================
// Watch configuration
// ============================================================================

/// Stable identity of a watch across configuration reloads.
pub type WatchId = u32;

/// One logical subscription to "the newest file matching these patterns".
#[derive(Clone, Debug, Deserialize)]
pub struct WatchDefinition {
    pub id: WatchId,

    /// Display title; the first pattern stands in when absent
    #[serde(default)]
    pub title: Option<String>,

    /// Glob patterns; the newest file across all of them is tracked.
    /// Accepts a single `pattern` string or a `patterns` list.
    #[serde(alias = "pattern", deserialize_with = "one_or_many")]
    pub patterns: Vec<String>,

    /// Workspace-scoping name for `${workspaceFolder}` resolution
    #[serde(default)]
    pub workspace: Option<String>,

    /// Per-watch overrides applied on top of the global options
    #[serde(default)]
    pub options: Option<WatchOptionsPatch>,
}

impl WatchDefinition {
    pub fn title(&self) -> &str {
        self.title
            .as_deref()
            .or_else(|| self.patterns.first().map(String::as_str))
            .unwrap_or("")
    }
}

/// Named, purely organizational container of watches and nested groups.
#[derive(Clone, Debug, Deserialize)]
pub struct WatchGroup {
    pub name: String,
    #[serde(default)]
    pub entries: Vec<WatchEntry>,
}

/// Configuration entry: either a watch or a group of entries.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum WatchEntry {
    Group(WatchGroup),
    Watch(WatchDefinition),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(pattern) => vec![pattern],
        OneOrMany::Many(patterns) => patterns,
    })
}

// ============================================================================
// Options
// ============================================================================

/// Polling and decoding options for a watch.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    /// How often the currently tracked file is stat-polled (ms)
    pub file_check_interval_ms: u64,

    /// How often the directory tree is re-walked for a newer match (ms)
    pub file_list_interval_ms: u64,

    /// Glob applied to file and directory basenames during the walk;
    /// matching entries are skipped entirely
    pub ignore_pattern: Option<String>,

    /// Text encoding label; absent means byte-for-byte UTF-8
    pub encoding: Option<String>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            file_check_interval_ms: 500,
            file_list_interval_ms: 2000,
            ignore_pattern: None,
            encoding: None,
        }
    }
}

impl WatchOptions {
    /// Apply a per-watch patch on top of these options.
    pub fn merged(&self, patch: Option<&WatchOptionsPatch>) -> WatchOptions {
        let mut options = self.clone();
        if let Some(patch) = patch {
            if let Some(ms) = patch.file_check_interval_ms {
                options.file_check_interval_ms = ms;
            }
            if let Some(ms) = patch.file_list_interval_ms {
                options.file_list_interval_ms = ms;
            }
            if let Some(pattern) = &patch.ignore_pattern {
                options.ignore_pattern = Some(pattern.clone());
            }
            if let Some(encoding) = &patch.encoding {
                options.encoding = Some(encoding.clone());
            }
        }
        options
    }
}

/// Partial [`WatchOptions`] for override layers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WatchOptionsPatch {
    pub file_check_interval_ms: Option<u64>,
    pub file_list_interval_ms: Option<u64>,
    pub ignore_pattern: Option<String>,
    pub encoding: Option<String>,
}

/// Per-line retention and formatting options.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FilterOptions {
    /// Minimum severity a parsed line must have to be retained
    pub min_severity: MinSeverity,

    /// Free-text search; a line survives only if it matches
    pub search: Option<String>,

    /// Treat `search` as a regular expression instead of a substring
    pub search_regex: bool,

    /// Substrings that drop a line when found in message or raw text.
    /// Checked before the include list.
    pub exclude: Vec<String>,

    /// Allow-list: when non-empty, only lines containing at least one
    /// of these substrings survive
    pub include: Vec<String>,

    /// Emit the message body only, discarding timestamp/level/source.
    /// Unparsed lines have no message and are dropped in this mode.
    pub clean_format: bool,
}

impl FilterOptions {
    /// True when every criterion is at its neutral default, so filtering
    /// can return input unchanged without parsing a single line.
    pub fn is_neutral(&self) -> bool {
        self.min_severity == MinSeverity::All
            && self.search.is_none()
            && self.exclude.is_empty()
            && self.include.is_empty()
            && !self.clean_format
    }
}

/// The wholesale configuration unit, re-read on every reload.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub watches: Vec<WatchEntry>,
    pub options: WatchOptions,
    pub filter: FilterOptions,

    /// Keep only the last N decoded lines per read; zero or negative
    /// means no bound
    pub tail_lines: i64,
}

impl WatchConfig {
    /// All watch definitions in configuration order, groups flattened.
    pub fn definitions(&self) -> Vec<&WatchDefinition> {
        let mut out = Vec::new();
        collect_definitions(&self.watches, &mut out);
        out
    }

    pub fn definition(&self, id: WatchId) -> Option<&WatchDefinition> {
        self.definitions().into_iter().find(|d| d.id == id)
    }

    pub fn watch_ids(&self) -> Vec<WatchId> {
        self.definitions().iter().map(|d| d.id).collect()
    }
}

fn collect_definitions<'a>(entries: &'a [WatchEntry], out: &mut Vec<&'a WatchDefinition>) {
    for entry in entries {
        match entry {
            WatchEntry::Watch(def) => out.push(def),
            WatchEntry::Group(group) => collect_definitions(&group.entries, out),
        }
    }
}

// ============================================================================
// Events
// ============================================================================

/// Externally visible change notification for one watch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WatchEvent {
    pub id: WatchId,
    pub kind: WatchEventKind,
}

/// Reason a [`WatchEvent`] was emitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WatchEventKind {
    Started,
    Stopped,
    /// The tracked file itself changed (including to or from "no match")
    FileChanged,
    /// The tracked file's filtered content changed
    ContentChanged,
}
