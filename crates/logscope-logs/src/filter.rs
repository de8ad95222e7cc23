//! Line retention, output formatting, and severity statistics.

use regex::Regex;
use tracing::warn;

use logscope_types::{FilterOptions, LogLine, SeverityCounts};

use crate::parser::LogParser;

enum SearchMatcher {
    /// Case-insensitive substring, held lowercased
    Text(String),
    /// Case sensitivity governed by the pattern's own flags
    Pattern(Regex),
}

/// Compiled filter applying [`FilterOptions`] to blocks of content.
pub struct LogFilter {
    options: FilterOptions,
    search: Option<SearchMatcher>,
}

impl LogFilter {
    /// Compile the options once. An invalid search regex is downgraded to
    /// a literal text search rather than failing the filter.
    pub fn new(options: FilterOptions) -> Self {
        let search = options.search.as_ref().map(|pattern| {
            if options.search_regex {
                match Regex::new(pattern) {
                    Ok(re) => SearchMatcher::Pattern(re),
                    Err(error) => {
                        warn!(pattern, %error, "invalid search pattern, matching it as plain text");
                        SearchMatcher::Text(pattern.to_lowercase())
                    }
                }
            } else {
                SearchMatcher::Text(pattern.to_lowercase())
            }
        });
        Self { options, search }
    }

    pub fn options(&self) -> &FilterOptions {
        &self.options
    }

    /// Filter and format a block of content line by line.
    ///
    /// With every criterion at its neutral default the input is returned
    /// unchanged, without parsing a single line.
    pub fn apply(&self, parser: &LogParser, content: &str) -> String {
        if self.options.is_neutral() {
            return content.to_string();
        }

        let mut out: Vec<String> = Vec::new();
        for raw in content.split('\n') {
            if raw.trim().is_empty() {
                continue;
            }
            let line = raw.strip_suffix('\r').unwrap_or(raw);
            let parsed = parser.parse(line);
            if !self.retains(parsed.as_ref(), raw) {
                continue;
            }
            if self.options.clean_format {
                if let Some(parsed) = parsed {
                    out.push(parsed.message);
                }
            } else {
                out.push(raw.to_string());
            }
        }
        out.join("\n")
    }

    /// All active criteria are conjunctive; excludes run before includes.
    fn retains(&self, parsed: Option<&LogLine>, raw: &str) -> bool {
        match parsed {
            Some(line) => {
                if !self.options.min_severity.retains(line.severity) {
                    return false;
                }
            }
            // clean format cannot render a line without a message field
            None => {
                if self.options.clean_format {
                    return false;
                }
            }
        }

        let message = parsed.map(|l| l.message.as_str()).unwrap_or("");

        for pattern in &self.options.exclude {
            if message.contains(pattern.as_str()) || raw.contains(pattern.as_str()) {
                return false;
            }
        }

        if !self.options.include.is_empty()
            && !self
                .options
                .include
                .iter()
                .any(|p| message.contains(p.as_str()) || raw.contains(p.as_str()))
        {
            return false;
        }

        if let Some(search) = &self.search {
            let hit = match search {
                SearchMatcher::Text(needle) => {
                    message.to_lowercase().contains(needle) || raw.to_lowercase().contains(needle)
                }
                SearchMatcher::Pattern(re) => re.is_match(message) || re.is_match(raw),
            };
            if !hit {
                return false;
            }
        }

        true
    }
}

/// Count lines per severity bucket in a block of content, independent of
/// any active filter. Lines no format matches land in the unparsed bucket.
pub fn severity_counts(parser: &LogParser, content: &str) -> SeverityCounts {
    let mut counts = SeverityCounts::default();
    for raw in content.split('\n') {
        if raw.trim().is_empty() {
            continue;
        }
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        counts.record(parser.parse(line).map(|l| l.severity));
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use logscope_types::MinSeverity;

    fn filter(options: FilterOptions) -> LogFilter {
        LogFilter::new(options)
    }

    #[test]
    fn test_neutral_filter_is_identity() {
        let content = "2026-02-13T16:04:23Z INFO [a] one\n\n  \ngarbage\ntrailing";
        let out = filter(FilterOptions::default()).apply(&LogParser::new(), content);
        assert_eq!(out, content);
    }

    #[test]
    fn test_severity_threshold_monotonicity() {
        let parser = LogParser::new();
        let content = "2026-02-13T16:04:23Z ERROR [a] bad\n2026-02-13T16:04:24Z INFO [a] fine";
        let options = FilterOptions {
            min_severity: MinSeverity::Warn,
            ..FilterOptions::default()
        };
        let out = filter(options).apply(&parser, content);
        assert_eq!(out, "2026-02-13T16:04:23Z ERROR [a] bad");
    }

    #[test]
    fn test_min_level_error_keeps_raw_text() {
        let parser = LogParser::new();
        let content = "[INFO] all good\n[ERROR] exploded";
        let options = FilterOptions {
            min_severity: MinSeverity::Error,
            ..FilterOptions::default()
        };
        let out = filter(options).apply(&parser, content);
        assert_eq!(out, "[ERROR] exploded");
    }

    #[test]
    fn test_clean_format_emits_message_only() {
        let parser = LogParser::new();
        let options = FilterOptions {
            clean_format: true,
            ..FilterOptions::default()
        };
        let out = filter(options).apply(
            &parser,
            "13.02.2026 16:04:23.089 *INFO* [FelixLogListener] Events.Service UNREGISTERING",
        );
        assert_eq!(out, "Events.Service UNREGISTERING");
    }

    #[test]
    fn test_unparsed_lines_survive_unless_clean_format() {
        let parser = LogParser::new();
        let options = FilterOptions {
            min_severity: MinSeverity::All,
            search: Some("garbage".to_string()),
            ..FilterOptions::default()
        };
        let out = filter(options).apply(&parser, "garbage text");
        assert_eq!(out, "garbage text");

        let options = FilterOptions {
            clean_format: true,
            ..FilterOptions::default()
        };
        let out = filter(options).apply(&parser, "garbage text");
        assert_eq!(out, "");
    }

    #[test]
    fn test_exclude_runs_before_include() {
        let parser = LogParser::new();
        let options = FilterOptions {
            exclude: vec!["heartbeat".to_string()],
            include: vec!["heartbeat".to_string(), "request".to_string()],
            ..FilterOptions::default()
        };
        let content = "[INFO] heartbeat ok\n[INFO] request served\n[INFO] idle";
        let out = filter(options).apply(&parser, content);
        assert_eq!(out, "[INFO] request served");
    }

    #[test]
    fn test_text_search_is_case_insensitive() {
        let parser = LogParser::new();
        let options = FilterOptions {
            search: Some("TIMEOUT".to_string()),
            ..FilterOptions::default()
        };
        let content = "[WARN] upstream timeout\n[WARN] connection reset";
        let out = filter(options).apply(&parser, content);
        assert_eq!(out, "[WARN] upstream timeout");
    }

    #[test]
    fn test_regex_search() {
        let parser = LogParser::new();
        let options = FilterOptions {
            search: Some(r"user=\d+".to_string()),
            search_regex: true,
            ..FilterOptions::default()
        };
        let content = "[INFO] login user=42\n[INFO] login user=admin";
        let out = filter(options).apply(&parser, content);
        assert_eq!(out, "[INFO] login user=42");
    }

    #[test]
    fn test_invalid_regex_degrades_to_text_search() {
        let parser = LogParser::new();
        let options = FilterOptions {
            search: Some("[".to_string()),
            search_regex: true,
            ..FilterOptions::default()
        };
        let content = "[INFO] bracketed\nplain info line";
        let out = filter(options).apply(&parser, content);
        assert_eq!(out, "[INFO] bracketed");
    }

    #[test]
    fn test_criteria_are_conjunctive() {
        let parser = LogParser::new();
        let options = FilterOptions {
            min_severity: MinSeverity::Warn,
            search: Some("disk".to_string()),
            ..FilterOptions::default()
        };
        let content = "[ERROR] disk full\n[ERROR] cpu pegged\n[INFO] disk fine";
        let out = filter(options).apply(&parser, content);
        assert_eq!(out, "[ERROR] disk full");
    }

    #[test]
    fn test_blank_lines_are_skipped_when_filtering() {
        let parser = LogParser::new();
        let options = FilterOptions {
            min_severity: MinSeverity::Trace,
            ..FilterOptions::default()
        };
        let out = filter(options).apply(&parser, "[INFO] a\n\n\n[INFO] b\n");
        assert_eq!(out, "[INFO] a\n[INFO] b");
    }

    #[test]
    fn test_severity_counts() {
        let parser = LogParser::new();
        let content = "[ERROR] a\n[ERROR] b\n[WARN] c\n[INFO] d\nnot a log line\n\n";
        let counts = severity_counts(&parser, content);
        assert_eq!(counts.error, 2);
        assert_eq!(counts.warn, 1);
        assert_eq!(counts.info, 1);
        assert_eq!(counts.unparsed, 1);
        assert_eq!(counts.total(), 5);
    }
}
