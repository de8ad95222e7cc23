//! Compiled glob predicates.

use std::path::Path;

use globset::{GlobBuilder, GlobMatcher};
use thiserror::Error;

use crate::pattern::{ResolveContext, ResolvedPattern, resolve_pattern};

/// A glob pattern that cannot be compiled into a usable matcher.
#[derive(Debug, Error)]
#[error("invalid glob pattern `{pattern}`: {source}")]
pub struct PatternError {
    pub pattern: String,
    #[source]
    source: globset::Error,
}

fn compile(pattern: &str) -> Result<GlobMatcher, PatternError> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|source| PatternError {
            pattern: pattern.to_string(),
            source,
        })
}

/// Full-path predicate deciding final inclusion of a candidate.
///
/// `*` never crosses a separator, `**` matches any depth including zero
/// directories, and dotfiles are matched like any other name.
#[derive(Clone, Debug)]
pub struct PathMatcher {
    matcher: GlobMatcher,
}

impl PathMatcher {
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        Ok(Self {
            matcher: compile(pattern)?,
        })
    }

    /// Match a full candidate path, separators normalized for comparison.
    pub fn is_match(&self, path: &Path) -> bool {
        let normalized = path.to_string_lossy().replace('\\', "/");
        // candidates walked from a "." base carry a ./ prefix the
        // relative pattern does not have
        let normalized = normalized.strip_prefix("./").unwrap_or(&normalized);
        self.matcher.is_match(Path::new(normalized))
    }
}

/// Single-segment predicate tested against one directory-entry name.
#[derive(Clone, Debug)]
pub struct SegmentMatcher {
    matcher: GlobMatcher,
}

impl SegmentMatcher {
    pub fn new(segment: &str) -> Result<Self, PatternError> {
        Ok(Self {
            matcher: compile(segment)?,
        })
    }

    pub fn is_match(&self, name: &str) -> bool {
        self.matcher.is_match(Path::new(name))
    }
}

/// Ignore predicate applied to entry basenames during the walk,
/// independent of the match pattern.
#[derive(Clone, Debug, Default)]
pub struct NameMatcher {
    matcher: Option<GlobMatcher>,
}

impl NameMatcher {
    pub fn new(pattern: Option<&str>) -> Result<Self, PatternError> {
        let matcher = match pattern {
            Some(p) if !p.is_empty() => Some(compile(p)?),
            _ => None,
        };
        Ok(Self { matcher })
    }

    /// Matches nothing; every entry is visited.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_ignored(&self, name: &str) -> bool {
        self.matcher
            .as_ref()
            .is_some_and(|m| m.is_match(Path::new(name)))
    }
}

/// One watch pattern compiled into everything the walker needs.
#[derive(Clone, Debug)]
pub struct CompiledPattern {
    pub resolved: ResolvedPattern,
    pub full: PathMatcher,
    pub lead: Vec<SegmentMatcher>,
}

impl CompiledPattern {
    pub fn compile(raw: &str, ctx: &ResolveContext) -> Result<Self, PatternError> {
        let resolved = resolve_pattern(raw, ctx);
        let full = PathMatcher::new(&resolved.pattern)?;
        let lead = resolved
            .lead_segments
            .iter()
            .map(|segment| SegmentMatcher::new(segment))
            .collect::<Result<_, _>>()?;
        Ok(Self {
            resolved,
            full,
            lead,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_does_not_cross_separators() {
        let matcher = PathMatcher::new("/logs/*.log").unwrap();
        assert!(matcher.is_match(Path::new("/logs/app.log")));
        assert!(!matcher.is_match(Path::new("/logs/nested/app.log")));
    }

    #[test]
    fn test_globstar_matches_any_depth_including_zero() {
        let matcher = PathMatcher::new("/logs/**/*.log").unwrap();
        assert!(matcher.is_match(Path::new("/logs/app.log")));
        assert!(matcher.is_match(Path::new("/logs/a/app.log")));
        assert!(matcher.is_match(Path::new("/logs/a/b/c/app.log")));
        assert!(!matcher.is_match(Path::new("/other/app.log")));
    }

    #[test]
    fn test_question_mark_and_classes() {
        let matcher = PathMatcher::new("/logs/app-?.log").unwrap();
        assert!(matcher.is_match(Path::new("/logs/app-1.log")));
        assert!(!matcher.is_match(Path::new("/logs/app-12.log")));

        let matcher = PathMatcher::new("/logs/app-[0-9].log").unwrap();
        assert!(matcher.is_match(Path::new("/logs/app-7.log")));
        assert!(!matcher.is_match(Path::new("/logs/app-x.log")));
    }

    #[test]
    fn test_brace_alternation() {
        let matcher = PathMatcher::new("/logs/{error,access}.log").unwrap();
        assert!(matcher.is_match(Path::new("/logs/error.log")));
        assert!(matcher.is_match(Path::new("/logs/access.log")));
        assert!(!matcher.is_match(Path::new("/logs/debug.log")));
    }

    #[test]
    fn test_dotfiles_are_matched() {
        let matcher = PathMatcher::new("/logs/*.log").unwrap();
        assert!(matcher.is_match(Path::new("/logs/.hidden.log")));
    }

    #[test]
    fn test_name_matcher_ignores_basenames() {
        let ignore = NameMatcher::new(Some("node_modules")).unwrap();
        assert!(ignore.is_ignored("node_modules"));
        assert!(!ignore.is_ignored("src"));

        let ignore = NameMatcher::new(Some("*.bak")).unwrap();
        assert!(ignore.is_ignored("app.log.bak"));
        assert!(!ignore.is_ignored("app.log"));

        assert!(!NameMatcher::empty().is_ignored("anything"));
    }

    #[test]
    fn test_invalid_pattern_reports_error() {
        let err = PathMatcher::new("/logs/[").unwrap_err();
        assert!(err.to_string().contains("/logs/["));
    }

    #[test]
    fn test_segment_matcher() {
        let segment = SegmentMatcher::new("app-*").unwrap();
        assert!(segment.is_match("app-prod"));
        assert!(!segment.is_match("db-prod"));
    }
}
