//! Log line parsing against an ordered list of line formats.

use regex::Regex;

use logscope_types::{LogLine, Severity};

/// A named line format: a matching pattern plus the capture-group index
/// of each semantic field, or `None` when the format has no such field.
#[derive(Clone, Debug)]
pub struct LogFormat {
    name: String,
    pattern: Regex,
    timestamp: Option<usize>,
    level: Option<usize>,
    source: Option<usize>,
    message: Option<usize>,
}

impl LogFormat {
    pub fn new(
        name: &str,
        pattern: &str,
        timestamp: Option<usize>,
        level: Option<usize>,
        source: Option<usize>,
        message: Option<usize>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.to_string(),
            pattern: Regex::new(pattern)?,
            timestamp,
            level,
            source,
            message,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, line: &str) -> Option<LogLine> {
        let caps = self.pattern.captures(line)?;
        let field = |group: Option<usize>| {
            group
                .and_then(|i| caps.get(i))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default()
        };
        let severity = match self.level.and_then(|i| caps.get(i)) {
            Some(m) => Severity::from_level_str(m.as_str()),
            // formats without a level field default to info
            None => Severity::Info,
        };

        Some(LogLine {
            timestamp: field(self.timestamp),
            severity,
            source: field(self.source),
            message: field(self.message),
            raw: line.to_string(),
        })
    }
}

/// Tries each format in priority order; the first match wins.
///
/// Caller-supplied formats are tried before the built-ins. The parser
/// owns its compiled formats; there is no process-wide format registry.
pub struct LogParser {
    formats: Vec<LogFormat>,
}

impl LogParser {
    pub fn new() -> Self {
        Self {
            formats: builtin_formats(),
        }
    }

    /// A parser that tries `custom` formats before the built-ins.
    pub fn with_custom(custom: Vec<LogFormat>) -> Self {
        let mut formats = custom;
        formats.extend(builtin_formats());
        Self { formats }
    }

    /// Parse one raw line. `None` means no format matched; the raw line
    /// is still available to the caller for display and search.
    pub fn parse(&self, line: &str) -> Option<LogLine> {
        self.formats.iter().find_map(|format| format.apply(line))
    }
}

impl Default for LogParser {
    fn default() -> Self {
        Self::new()
    }
}

const ISO_TIMESTAMP: &str = r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}";

/// Built-in formats, most structured first, generic level fallback last.
fn builtin_formats() -> Vec<LogFormat> {
    let formats = [
        // 13.02.2026 16:04:23.089 *INFO* [FelixLogListener] message
        LogFormat::new(
            "starred",
            r"^\[?(\d{2}\.\d{2}\.\d{4} \d{2}:\d{2}:\d{2}[.,]\d{3})\]?\s+\*([A-Za-z]+)\*\s+(?:\[([^\]]+)\]\s*)?(.*)$",
            Some(1),
            Some(2),
            Some(3),
            Some(4),
        ),
        // 2026-02-13T16:04:23Z INFO [server] message
        LogFormat::new(
            "iso-level-bracket",
            &format!(
                r"^({ISO_TIMESTAMP}(?:[.,]\d+)?(?:Z|[+-]\d{{2}}:?\d{{2}})?)\s+([A-Za-z]+)\s+\[([^\]]+)\]:?\s+(.*)$"
            ),
            Some(1),
            Some(2),
            Some(3),
            Some(4),
        ),
        // 2026-02-13 16:04:23,089 - app.module - INFO - message
        LogFormat::new(
            "iso-dashed",
            &format!(r"^({ISO_TIMESTAMP}(?:[.,]\d+)?)\s+-\s+([\w.$-]+)\s+-\s+([A-Za-z]+)\s+-\s+(.*)$"),
            Some(1),
            Some(3),
            Some(2),
            Some(4),
        ),
        // 2026-02-13 16:04:23.089 [main] INFO message
        LogFormat::new(
            "logback",
            &format!(r"^({ISO_TIMESTAMP}[.,]\d{{3}})\s+\[([^\]]+)\]\s+([A-Za-z]+)\s+(.*)$"),
            Some(1),
            Some(3),
            Some(2),
            Some(4),
        ),
        // Feb 13 16:04:23 host process[123]: message (no level field)
        LogFormat::new(
            "syslog",
            r"^([A-Z][a-z]{2} [ \d]\d \d{2}:\d{2}:\d{2})\s+(\S+)\s+([^:\s\[]+)(?:\[\d+\])?:\s+(.*)$",
            Some(1),
            None,
            Some(3),
            Some(4),
        ),
        // [ERROR] message / WARN: message, no timestamp or source
        LogFormat::new(
            "level-only",
            r"(?i)^\[?(ERROR|ERR|FATAL|CRITICAL|WARN|WARNING|INFO|DEBUG|TRACE)\]?[:\s-]+(.*)$",
            None,
            Some(1),
            None,
            Some(2),
        ),
    ];

    formats
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
        .expect("built-in format patterns are valid")
}
