//! Pruned directory walking.

use std::path::PathBuf;
use std::time::SystemTime;

use futures::future::join_all;
use tracing::{debug, trace};

use crate::matcher::{CompiledPattern, NameMatcher};

/// A filesystem entry that satisfied a full-path matcher.
#[derive(Clone, Debug)]
pub struct WalkedFile {
    pub path: PathBuf,
    pub modified: SystemTime,
    pub size: u64,
}

/// Enumerate every file under the pattern's base directory that satisfies
/// its full-path matcher.
///
/// Directory levels are pruned against the pre-globstar segments; once a
/// `**` segment is reached all descendants are visited and filtered only
/// by the full matcher. Entries are stat'd (symlinks resolved) before
/// classification. Per-entry failures are logged and never abort siblings.
pub async fn walk_pattern(pattern: &CompiledPattern, ignore: &NameMatcher) -> Vec<WalkedFile> {
    let mut found = Vec::new();
    let base = &pattern.resolved.base_dir;

    let base_meta = match tokio::fs::metadata(base).await {
        Ok(meta) => meta,
        Err(error) => {
            trace!(path = %base.display(), %error, "base directory unavailable");
            return found;
        }
    };

    // a fully literal pattern names the file itself
    if base_meta.is_file() {
        if pattern.full.is_match(base) {
            found.push(WalkedFile {
                path: base.clone(),
                modified: base_meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                size: base_meta.len(),
            });
        }
        return found;
    }

    let mut stack: Vec<(PathBuf, usize)> = vec![(base.clone(), 0)];
    while let Some((dir, depth)) = stack.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(error) => {
                debug!(path = %dir.display(), %error, "cannot read directory");
                continue;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(error) => {
                    debug!(path = %dir.display(), %error, "directory enumeration failed");
                    break;
                }
            };

            let name = entry.file_name().to_string_lossy().into_owned();
            if ignore.is_ignored(&name) {
                continue;
            }
            if depth < pattern.lead.len() && !pattern.lead[depth].is_match(&name) {
                continue;
            }

            let path = entry.path();
            let meta = match tokio::fs::metadata(&path).await {
                Ok(meta) => meta,
                Err(error) => {
                    debug!(path = %path.display(), %error, "cannot stat entry");
                    continue;
                }
            };

            if meta.is_dir() {
                if pattern.resolved.has_globstar || depth + 1 < pattern.lead.len() {
                    stack.push((path, depth + 1));
                }
            } else if meta.is_file() {
                // without a globstar only the final segment can name a file
                if !pattern.resolved.has_globstar && depth + 1 != pattern.lead.len() {
                    continue;
                }
                if pattern.full.is_match(&path) {
                    found.push(WalkedFile {
                        path,
                        modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                        size: meta.len(),
                    });
                }
            }
        }
    }

    found
}

/// Walk several patterns concurrently and aggregate their candidates.
///
/// All walks complete before the result is returned.
pub async fn walk_all(patterns: &[CompiledPattern], ignore: &NameMatcher) -> Vec<WalkedFile> {
    let walks = patterns.iter().map(|pattern| walk_pattern(pattern, ignore));
    join_all(walks).await.into_iter().flatten().collect()
}
