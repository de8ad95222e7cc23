//! The watch coordinator.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use logscope_fs::{DecoderPool, GlobNotification, GlobWatcher, ResolveContext, read_content};
use logscope_logs::{LogFilter, LogParser, severity_counts};
use logscope_types::{
    SeverityCounts, WatchConfig, WatchEvent, WatchEventKind, WatchId, WatchOptions,
};

/// Caller-visible misuse of the coordinator.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("watch {0} is not in the current configuration")]
    UnknownWatch(WatchId),
    #[error("watch {0} has not been started")]
    NotStarted(WatchId),
}

/// Snapshot of one watch's runtime state.
#[derive(Clone, Debug)]
pub struct WatchState {
    pub running: bool,
    pub matched_file: Option<PathBuf>,
    pub raw: String,
    pub filtered: String,
    pub created_at: DateTime<Utc>,
    pub last_changed_at: DateTime<Utc>,
}

#[derive(Default)]
struct RuntimeState {
    file: Option<PathBuf>,
    /// Byte offset reads start from; reset to zero when the file changes
    offset: u64,
    /// Last-read decoded bytes from the current offset
    raw: String,
    /// Filter output of `raw` under the current filter options
    filtered: String,
    last_changed_at: Option<DateTime<Utc>>,
}

struct RunningWatch {
    watcher: GlobWatcher,
    alive: CancellationToken,
    pump: tokio::task::JoinHandle<()>,
}

struct WatchRuntime {
    state: Arc<Mutex<RuntimeState>>,
    options: WatchOptions,
    created_at: DateTime<Utc>,
    running: Option<RunningWatch>,
}

struct Shared {
    ctx: ResolveContext,
    decoders: DecoderPool,
    parser: LogParser,
    config: RwLock<WatchConfig>,
    filter: RwLock<Arc<LogFilter>>,
    watches: Mutex<HashMap<WatchId, WatchRuntime>>,
    events: mpsc::UnboundedSender<WatchEvent>,
}

/// Owns every live watch, wires glob notifications through the content
/// reader and filter pipeline, and emits an event only when the filtered
/// bytes actually changed.
pub struct WatchManager {
    shared: Arc<Shared>,
}

impl WatchManager {
    /// Create a manager and the receiving end of its event stream.
    pub fn new(config: WatchConfig, ctx: ResolveContext) -> (Self, mpsc::UnboundedReceiver<WatchEvent>) {
        Self::with_parser(config, ctx, LogParser::new())
    }

    /// Like [`WatchManager::new`] with caller-supplied line formats.
    pub fn with_parser(
        config: WatchConfig,
        ctx: ResolveContext,
        parser: LogParser,
    ) -> (Self, mpsc::UnboundedReceiver<WatchEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let filter = Arc::new(LogFilter::new(config.filter.clone()));
        let shared = Arc::new(Shared {
            ctx,
            decoders: DecoderPool::new(),
            parser,
            config: RwLock::new(config),
            filter: RwLock::new(filter),
            watches: Mutex::new(HashMap::new()),
            events,
        });
        (Self { shared }, rx)
    }

    /// Identities present in the current configuration.
    pub fn watch_ids(&self) -> Vec<WatchId> {
        self.shared.config.read().watch_ids()
    }

    /// Start a watch, or return its state when it is already running.
    ///
    /// Must be called from within a tokio runtime; the polls run as
    /// spawned tasks.
    pub fn start_watch(&self, id: WatchId) -> Result<WatchState, EngineError> {
        let (patterns, workspace, options) = {
            let config = self.shared.config.read();
            let def = config.definition(id).ok_or(EngineError::UnknownWatch(id))?;
            (
                def.patterns.clone(),
                def.workspace.clone(),
                config.options.merged(def.options.as_ref()),
            )
        };

        let mut watches = self.shared.watches.lock();
        if let Some(runtime) = watches.get(&id) {
            if runtime.running.is_some() {
                return Ok(snapshot(runtime));
            }
        }

        let ctx = self.shared.ctx.for_workspace(workspace.as_deref());
        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = GlobWatcher::start(&patterns, &ctx, &options, tx);
        let alive = CancellationToken::new();

        // state is created on the first start and survives stop/restart
        let (state, created_at) = match watches.get(&id) {
            Some(existing) => (Arc::clone(&existing.state), existing.created_at),
            None => (Arc::new(Mutex::new(RuntimeState::default())), Utc::now()),
        };

        let pump = tokio::spawn(pump(
            Arc::clone(&self.shared),
            id,
            Arc::clone(&state),
            options.clone(),
            alive.clone(),
            rx,
        ));

        let runtime = WatchRuntime {
            state,
            options,
            created_at,
            running: Some(RunningWatch {
                watcher,
                alive,
                pump,
            }),
        };
        let result = snapshot(&runtime);
        watches.insert(id, runtime);
        drop(watches);

        let _ = self.shared.events.send(WatchEvent {
            id,
            kind: WatchEventKind::Started,
        });
        Ok(result)
    }

    /// Stop a running watch, discarding its caches. Stopping an already
    /// stopped watch is a no-op.
    pub fn stop_watch(&self, id: WatchId) -> Result<(), EngineError> {
        let stopped = {
            let mut watches = self.shared.watches.lock();
            let runtime = watches.get_mut(&id).ok_or(EngineError::NotStarted(id))?;
            match runtime.running.take() {
                Some(running) => {
                    shut_down(running);
                    *runtime.state.lock() = RuntimeState::default();
                    true
                }
                None => false,
            }
        };
        if stopped {
            let _ = self.shared.events.send(WatchEvent {
                id,
                kind: WatchEventKind::Stopped,
            });
        }
        Ok(())
    }

    /// Stop every running watch.
    pub fn stop_all(&self) {
        let ids: Vec<WatchId> = self.shared.watches.lock().keys().copied().collect();
        for id in ids {
            let _ = self.stop_watch(id);
        }
    }

    /// Runtime state snapshot, or `None` for an identity never started.
    pub fn state(&self, id: WatchId) -> Option<WatchState> {
        self.shared.watches.lock().get(&id).map(snapshot)
    }

    /// Per-severity line counts over the watch's unfiltered content.
    pub fn stats(&self, id: WatchId) -> Option<SeverityCounts> {
        let raw = {
            let watches = self.shared.watches.lock();
            watches.get(&id)?.state.lock().raw.clone()
        };
        Some(severity_counts(&self.shared.parser, &raw))
    }

    /// Forget current content: future reads start at the current end-of-file.
    pub async fn clear_contents(&self, id: WatchId) -> Result<(), EngineError> {
        let (state, encoding) = self.runtime_handles(id)?;
        let path = state.lock().file.clone();
        let size = match &path {
            Some(path) => tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0),
            None => 0,
        };
        state.lock().offset = size;
        self.rerun_diff(id, &state, encoding.as_deref()).await;
        Ok(())
    }

    /// Undo [`WatchManager::clear_contents`]: re-read the file from the start.
    pub async fn restore_contents(&self, id: WatchId) -> Result<(), EngineError> {
        let (state, encoding) = self.runtime_handles(id)?;
        state.lock().offset = 0;
        self.rerun_diff(id, &state, encoding.as_deref()).await;
        Ok(())
    }

    /// Replace the configuration wholesale.
    ///
    /// Watches whose identity disappeared are stopped and removed, running
    /// or not. Survivors keep their runtime but have the new filter applied
    /// to their cached bytes, notifying only on a real difference.
    pub fn reload(&self, config: WatchConfig) {
        let keep: HashSet<WatchId> = config.watch_ids().into_iter().collect();
        let filter = Arc::new(LogFilter::new(config.filter.clone()));
        *self.shared.config.write() = config;
        *self.shared.filter.write() = Arc::clone(&filter);

        let orphans: Vec<WatchId> = {
            let watches = self.shared.watches.lock();
            watches.keys().filter(|id| !keep.contains(id)).copied().collect()
        };
        for id in orphans {
            debug!(id, "removing orphaned watch");
            let removed = self.shared.watches.lock().remove(&id);
            if let Some(mut runtime) = removed {
                if let Some(running) = runtime.running.take() {
                    shut_down(running);
                    let _ = self.shared.events.send(WatchEvent {
                        id,
                        kind: WatchEventKind::Stopped,
                    });
                }
            }
        }

        let survivors: Vec<(WatchId, Arc<Mutex<RuntimeState>>)> = {
            let watches = self.shared.watches.lock();
            watches
                .iter()
                .map(|(id, runtime)| (*id, Arc::clone(&runtime.state)))
                .collect()
        };
        for (id, state) in survivors {
            let changed = {
                let mut s = state.lock();
                let filtered = filter.apply(&self.shared.parser, &s.raw);
                if s.filtered != filtered {
                    s.filtered = filtered;
                    s.last_changed_at = Some(Utc::now());
                    true
                } else {
                    false
                }
            };
            if changed {
                let _ = self.shared.events.send(WatchEvent {
                    id,
                    kind: WatchEventKind::ContentChanged,
                });
            }
        }
    }

    fn runtime_handles(
        &self,
        id: WatchId,
    ) -> Result<(Arc<Mutex<RuntimeState>>, Option<String>), EngineError> {
        let watches = self.shared.watches.lock();
        let runtime = watches.get(&id).ok_or(EngineError::NotStarted(id))?;
        Ok((Arc::clone(&runtime.state), runtime.options.encoding.clone()))
    }

    async fn rerun_diff(&self, id: WatchId, state: &Arc<Mutex<RuntimeState>>, encoding: Option<&str>) {
        if refresh(&self.shared, state, encoding, None).await {
            let _ = self.shared.events.send(WatchEvent {
                id,
                kind: WatchEventKind::ContentChanged,
            });
        }
    }
}

impl Drop for WatchManager {
    fn drop(&mut self) {
        let mut watches = self.shared.watches.lock();
        for (_, runtime) in watches.iter_mut() {
            if let Some(running) = runtime.running.take() {
                shut_down(running);
            }
        }
    }
}

fn shut_down(running: RunningWatch) {
    running.alive.cancel();
    running.watcher.dispose();
    running.pump.abort();
}

fn snapshot(runtime: &WatchRuntime) -> WatchState {
    let state = runtime.state.lock();
    WatchState {
        running: runtime.running.is_some(),
        matched_file: state.file.clone(),
        raw: state.raw.clone(),
        filtered: state.filtered.clone(),
        created_at: runtime.created_at,
        last_changed_at: state.last_changed_at.unwrap_or(runtime.created_at),
    }
}

/// Consume one watch's glob notifications until its channel closes.
async fn pump(
    shared: Arc<Shared>,
    id: WatchId,
    state: Arc<Mutex<RuntimeState>>,
    options: WatchOptions,
    alive: CancellationToken,
    mut rx: mpsc::UnboundedReceiver<GlobNotification>,
) {
    while let Some(notification) = rx.recv().await {
        if alive.is_cancelled() {
            break;
        }
        match notification {
            GlobNotification::FileChanged { path } => {
                {
                    let mut s = state.lock();
                    s.file = path;
                    // a newly selected file is read from the beginning
                    s.offset = 0;
                }
                refresh(&shared, &state, options.encoding.as_deref(), Some(&alive)).await;
                if alive.is_cancelled() {
                    break;
                }
                let _ = shared.events.send(WatchEvent {
                    id,
                    kind: WatchEventKind::FileChanged,
                });
            }
            GlobNotification::ContentChanged { .. } => {
                let changed =
                    refresh(&shared, &state, options.encoding.as_deref(), Some(&alive)).await;
                if alive.is_cancelled() {
                    break;
                }
                if changed {
                    let _ = shared.events.send(WatchEvent {
                        id,
                        kind: WatchEventKind::ContentChanged,
                    });
                }
            }
        }
    }
}

/// Re-derive raw bytes from the current offset, filter them, and compare
/// against the cached filtered bytes. Returns whether they differed.
///
/// The two-level diff keeps noise down: stat deltas trigger a read, but
/// only a change in *filtered* bytes updates state and notifies.
async fn refresh(
    shared: &Arc<Shared>,
    state: &Arc<Mutex<RuntimeState>>,
    encoding: Option<&str>,
    alive: Option<&CancellationToken>,
) -> bool {
    let (path, offset) = {
        let s = state.lock();
        (s.file.clone(), s.offset)
    };
    let tail_lines = shared.config.read().tail_lines;

    let text = match &path {
        Some(path) => {
            match read_content(path, offset, encoding, &shared.decoders, tail_lines).await {
                Ok(result) => result.text,
                // a vanished file is a normal transition, not a failure
                Err(error) => {
                    debug!(path = %path.display(), %error, "content read failed");
                    String::new()
                }
            }
        }
        None => String::new(),
    };

    if alive.is_some_and(|token| token.is_cancelled()) {
        return false;
    }

    let filter = Arc::clone(&shared.filter.read());
    let filtered = filter.apply(&shared.parser, &text);

    let mut s = state.lock();
    // the selection may have moved on while we were reading
    if s.file != path {
        return false;
    }
    if s.filtered != filtered {
        s.raw = text;
        s.filtered = filtered;
        s.last_changed_at = Some(Utc::now());
        true
    } else {
        false
    }
}
