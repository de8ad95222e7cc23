//! Glob pattern resolution: variable substitution and base-directory splitting.

use std::collections::HashMap;
use std::path::{MAIN_SEPARATOR_STR, PathBuf};

/// Everything needed to resolve template variables inside a pattern.
#[derive(Clone, Debug, Default)]
pub struct ResolveContext {
    pub home: Option<PathBuf>,
    /// Directory substituted for `${workspaceFolder}`; relative patterns
    /// are anchored here as well
    pub workspace: Option<PathBuf>,
    /// Named workspace directories selectable per watch
    pub workspaces: HashMap<String, PathBuf>,
    pub env: HashMap<String, String>,
}

impl ResolveContext {
    /// Build a context from the process environment.
    pub fn from_process() -> Self {
        Self {
            home: dirs::home_dir(),
            workspace: None,
            workspaces: HashMap::new(),
            env: std::env::vars().collect(),
        }
    }

    pub fn with_workspace(mut self, dir: PathBuf) -> Self {
        self.workspace = Some(dir);
        self
    }

    /// Context scoped to a named workspace, when one is configured under
    /// that name; otherwise the default workspace stays in effect.
    pub fn for_workspace(&self, name: Option<&str>) -> ResolveContext {
        let mut ctx = self.clone();
        if let Some(dir) = name.and_then(|n| self.workspaces.get(n)) {
            ctx.workspace = Some(dir.clone());
        }
        ctx
    }
}

/// A pattern split into its literal prefix and match expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedPattern {
    /// Full pattern after substitution, separators normalized to `/`
    pub pattern: String,

    /// Longest prefix free of match metacharacters, native separators
    pub base_dir: PathBuf,

    /// Match segments between the base directory and the first `**`
    /// segment, used to prune the walk level by level
    pub lead_segments: Vec<String>,

    /// Whether any `**` segment is present
    pub has_globstar: bool,
}

/// Substitute template variables and split `raw` into a literal base
/// directory plus match segments.
///
/// Unresolvable variables are left verbatim rather than erroring, so a
/// pattern that references a missing workspace simply never matches.
pub fn resolve_pattern(raw: &str, ctx: &ResolveContext) -> ResolvedPattern {
    let substituted = substitute_variables(raw, ctx);
    let mut normalized = substituted.replace('\\', "/");

    if is_relative(&normalized) {
        if let Some(workspace) = &ctx.workspace {
            let anchor = workspace.to_string_lossy().replace('\\', "/");
            normalized = format!("{}/{}", anchor.trim_end_matches('/'), normalized);
        }
    }

    let segments: Vec<&str> = normalized.split('/').collect();
    let mut base_dir = PathBuf::new();
    let mut literal_len = 0;
    for (i, segment) in segments.iter().enumerate() {
        if has_meta(segment) {
            break;
        }
        if i == 0 && segment.is_empty() {
            base_dir.push(MAIN_SEPARATOR_STR);
        } else {
            base_dir.push(segment);
        }
        literal_len = i + 1;
    }
    if base_dir.as_os_str().is_empty() {
        base_dir.push(".");
    }

    let remainder: Vec<String> = segments[literal_len..]
        .iter()
        .filter(|s| !s.is_empty())
        .map(|s| (*s).to_string())
        .collect();
    let has_globstar = remainder.iter().any(|s| s.contains("**"));
    let lead_segments = remainder
        .iter()
        .take_while(|s| !s.contains("**"))
        .cloned()
        .collect();

    ResolvedPattern {
        pattern: normalized,
        base_dir,
        lead_segments,
        has_globstar,
    }
}

fn substitute_variables(raw: &str, ctx: &ResolveContext) -> String {
    let mut out = raw.to_string();

    if let Some(home) = &ctx.home {
        let home = home.to_string_lossy();
        if out == "~" || out.starts_with("~/") || out.starts_with("~\\") {
            out = format!("{}{}", home, &out[1..]);
        }
        out = out.replace("${userHome}", &home);
        out = out.replace("$HOME", &home);
    }

    if let Some(workspace) = &ctx.workspace {
        out = out.replace("${workspaceFolder}", &workspace.to_string_lossy());
        if let Some(name) = workspace.file_name() {
            out = out.replace("${workspaceFolderBasename}", &name.to_string_lossy());
        }
    }

    substitute_env(&out, &ctx.env)
}

fn substitute_env(input: &str, env: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find("${env:") {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos + 6..];
        match tail.find('}') {
            Some(end) => {
                match env.get(&tail[..end]) {
                    Some(value) => out.push_str(value),
                    // unknown variables stay verbatim
                    None => out.push_str(&rest[pos..pos + 6 + end + 1]),
                }
                rest = &tail[end + 1..];
            }
            None => {
                out.push_str(&rest[pos..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn has_meta(segment: &str) -> bool {
    segment
        .chars()
        .any(|c| matches!(c, '*' | '?' | '[' | '{'))
}

fn is_relative(pattern: &str) -> bool {
    if pattern.starts_with('/') {
        return false;
    }
    // windows drive prefix, e.g. C:/
    let mut chars = pattern.chars();
    !(matches!(chars.next(), Some(c) if c.is_ascii_alphabetic()) && chars.next() == Some(':'))
}
