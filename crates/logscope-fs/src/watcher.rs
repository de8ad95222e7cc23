//! Per-watch polling state machine.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use logscope_types::WatchOptions;

use crate::matcher::{CompiledPattern, NameMatcher};
use crate::pattern::ResolveContext;
use crate::walker::{WalkedFile, walk_all};

/// Change notification from a [`GlobWatcher`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GlobNotification {
    /// The selected file changed, including to or from "no match"
    FileChanged { path: Option<PathBuf> },
    /// The selected file's modification time or size changed
    ContentChanged { path: PathBuf },
}

#[derive(Default)]
struct Selection {
    path: Option<PathBuf>,
    modified: Option<SystemTime>,
    size: u64,
}

/// Polls the filesystem for the newest file matching a set of patterns.
///
/// Two independent self-rescheduling loops run until disposal: the list
/// loop re-walks the tree and re-selects the newest match, the file loop
/// stats the current selection for growth, shrink, or removal. Each loop
/// sleeps only after its tick body completes, so a slow walk never causes
/// overlapping ticks.
pub struct GlobWatcher {
    cancel: CancellationToken,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl GlobWatcher {
    /// Compile the patterns and start both polls.
    ///
    /// Unusable patterns are logged and skipped; a watch whose every
    /// pattern is unusable keeps polling and simply never matches.
    pub fn start(
        patterns: &[String],
        ctx: &ResolveContext,
        options: &WatchOptions,
        tx: mpsc::UnboundedSender<GlobNotification>,
    ) -> Self {
        let compiled: Vec<CompiledPattern> = patterns
            .iter()
            .filter_map(|raw| match CompiledPattern::compile(raw, ctx) {
                Ok(pattern) => Some(pattern),
                Err(error) => {
                    warn!(%error, "skipping unusable glob pattern");
                    None
                }
            })
            .collect();

        let ignore = match NameMatcher::new(options.ignore_pattern.as_deref()) {
            Ok(matcher) => matcher,
            Err(error) => {
                warn!(%error, "skipping unusable ignore pattern");
                NameMatcher::empty()
            }
        };

        let cancel = CancellationToken::new();
        let selection = Arc::new(Mutex::new(Selection::default()));

        let list_task = tokio::spawn(list_loop(
            compiled,
            ignore,
            Arc::clone(&selection),
            tx.clone(),
            Duration::from_millis(options.file_list_interval_ms),
            cancel.clone(),
        ));
        let file_task = tokio::spawn(file_loop(
            selection,
            tx,
            Duration::from_millis(options.file_check_interval_ms),
            cancel.clone(),
        ));

        Self {
            cancel,
            tasks: vec![list_task, file_task],
        }
    }

    /// Stop both polls. No notifications are emitted after this returns.
    pub fn dispose(&self) {
        self.cancel.cancel();
    }
}

impl Drop for GlobWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

/// Re-walk and re-select the newest matching file.
async fn list_loop(
    patterns: Vec<CompiledPattern>,
    ignore: NameMatcher,
    selection: Arc<Mutex<Selection>>,
    tx: mpsc::UnboundedSender<GlobNotification>,
    interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        let files = walk_all(&patterns, &ignore).await;
        if cancel.is_cancelled() {
            break;
        }

        let newest = newest_file(files);
        let changed = {
            let mut sel = selection.lock();
            let new_path = newest.as_ref().map(|f| f.path.clone());
            if sel.path != new_path {
                sel.path = new_path.clone();
                sel.modified = newest.as_ref().map(|f| f.modified);
                sel.size = newest.as_ref().map(|f| f.size).unwrap_or(0);
                Some(new_path)
            } else {
                None
            }
        };
        if let Some(path) = changed {
            let _ = tx.send(GlobNotification::FileChanged { path });
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

/// Ties on modification time keep the first candidate seen, which is
/// stable within one walk but otherwise unspecified.
fn newest_file(files: Vec<WalkedFile>) -> Option<WalkedFile> {
    files
        .into_iter()
        .reduce(|best, file| if file.modified > best.modified { file } else { best })
}

/// Stat the current selection for growth, shrink, or removal.
async fn file_loop(
    selection: Arc<Mutex<Selection>>,
    tx: mpsc::UnboundedSender<GlobNotification>,
    interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        let current = selection.lock().path.clone();
        if let Some(path) = current {
            match tokio::fs::metadata(&path).await {
                Ok(meta) => {
                    let modified = meta.modified().ok();
                    let size = meta.len();
                    if cancel.is_cancelled() {
                        break;
                    }
                    let notify = {
                        let mut sel = selection.lock();
                        // the list loop may have reselected while we were stat'ing
                        if sel.path.as_deref() == Some(path.as_path())
                            && (sel.modified != modified || sel.size != size)
                        {
                            sel.modified = modified;
                            sel.size = size;
                            true
                        } else {
                            false
                        }
                    };
                    if notify {
                        let _ = tx.send(GlobNotification::ContentChanged { path });
                    }
                }
                Err(error) => {
                    debug!(path = %path.display(), %error, "selected file no longer readable");
                    if cancel.is_cancelled() {
                        break;
                    }
                    let notify = {
                        let mut sel = selection.lock();
                        if sel.path.as_deref() == Some(path.as_path()) {
                            sel.path = None;
                            sel.modified = None;
                            sel.size = 0;
                            true
                        } else {
                            false
                        }
                    };
                    if notify {
                        let _ = tx.send(GlobNotification::FileChanged { path: None });
                    }
                }
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use std::path::Path;

    fn fast_options() -> WatchOptions {
        WatchOptions {
            file_check_interval_ms: 25,
            file_list_interval_ms: 50,
            ..WatchOptions::default()
        }
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<GlobNotification>) -> GlobNotification {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for a notification")
            .expect("watcher channel closed")
    }

    fn pattern_for(dir: &Path) -> Vec<String> {
        vec![format!("{}/*.log", dir.to_string_lossy())]
    }

    #[tokio::test]
    async fn test_selects_newest_and_tracks_growth() {
        let tmp = tempfile::tempdir().unwrap();
        let one = tmp.path().join("one.log");
        fs::write(&one, "a\n").unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let watcher = GlobWatcher::start(
            &pattern_for(tmp.path()),
            &ResolveContext::default(),
            &fast_options(),
            tx,
        );

        assert_eq!(
            next(&mut rx).await,
            GlobNotification::FileChanged { path: Some(one.clone()) }
        );

        // growth is reported as a content change on the same file
        tokio::time::sleep(Duration::from_millis(30)).await;
        let mut file = fs::OpenOptions::new().append(true).open(&one).unwrap();
        file.write_all(b"b\n").unwrap();
        drop(file);

        assert_eq!(
            next(&mut rx).await,
            GlobNotification::ContentChanged { path: one.clone() }
        );

        // a newer matching file takes over the selection
        tokio::time::sleep(Duration::from_millis(30)).await;
        let two = tmp.path().join("two.log");
        fs::write(&two, "x\n").unwrap();

        assert_eq!(
            next(&mut rx).await,
            GlobNotification::FileChanged { path: Some(two.clone()) }
        );

        watcher.dispose();
    }

    #[tokio::test]
    async fn test_removal_clears_the_selection() {
        let tmp = tempfile::tempdir().unwrap();
        let only = tmp.path().join("only.log");
        fs::write(&only, "a\n").unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let watcher = GlobWatcher::start(
            &pattern_for(tmp.path()),
            &ResolveContext::default(),
            &fast_options(),
            tx,
        );

        assert_eq!(
            next(&mut rx).await,
            GlobNotification::FileChanged { path: Some(only.clone()) }
        );

        fs::remove_file(&only).unwrap();
        assert_eq!(next(&mut rx).await, GlobNotification::FileChanged { path: None });

        watcher.dispose();
    }

    #[tokio::test]
    async fn test_unusable_patterns_stay_in_no_match_state() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let watcher = GlobWatcher::start(
            &["/tmp/[".to_string()],
            &ResolveContext::default(),
            &fast_options(),
            tx,
        );

        let quiet = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(quiet.is_err(), "no notifications expected without a usable pattern");

        watcher.dispose();
    }
}
