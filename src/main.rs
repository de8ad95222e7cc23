use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use logscope_engine::{WatchManager, WatchState};
use logscope_fs::ResolveContext;
use logscope_types::{WatchConfig, WatchEvent, WatchEventKind, WatchId};

/// Logscope - tails, decodes, and filters the newest log file matching a glob pattern
#[derive(Parser, Debug)]
#[command(name = "logscope")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the watch configuration file
    #[arg(long, default_value = "logscope.toml")]
    config: PathBuf,

    /// Watch ids to start (default: every configured watch)
    #[arg(value_name = "ID")]
    ids: Vec<WatchId>,

    /// Emit change events as JSON lines instead of log content
    #[arg(long)]
    json: bool,

    /// Anchor relative patterns and ${workspaceFolder} at this directory
    #[arg(long)]
    workspace: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing for debugging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = run_app(args).await;

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

async fn run_app(args: Args) -> Result<()> {
    let raw = std::fs::read_to_string(&args.config)
        .with_context(|| format!("failed to read {}", args.config.display()))?;
    let config: WatchConfig = toml::from_str(&raw)
        .with_context(|| format!("invalid watch configuration in {}", args.config.display()))?;

    let mut ctx = ResolveContext::from_process();
    if let Some(workspace) = args.workspace {
        ctx = ctx.with_workspace(workspace);
    }

    let ids = if args.ids.is_empty() {
        config.watch_ids()
    } else {
        args.ids.clone()
    };
    anyhow::ensure!(!ids.is_empty(), "no watches configured");

    let (manager, mut events) = WatchManager::new(config, ctx);
    for id in &ids {
        if let Err(e) = manager.start_watch(*id) {
            eprintln!("Warning: {}", e);
        }
    }

    // Byte count already printed per watch, to emit only fresh output
    let mut printed: HashMap<WatchId, usize> = HashMap::new();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,

            event = events.recv() => {
                let Some(event) = event else { break };
                render_event(&manager, &event, args.json, &mut printed);
            }
        }
    }

    manager.stop_all();
    Ok(())
}

fn render_event(
    manager: &WatchManager,
    event: &WatchEvent,
    json: bool,
    printed: &mut HashMap<WatchId, usize>,
) {
    if json {
        if let Ok(line) = serde_json::to_string(event) {
            println!("{line}");
        }
        return;
    }

    match event.kind {
        WatchEventKind::Started | WatchEventKind::Stopped => {}
        WatchEventKind::FileChanged => {
            printed.insert(event.id, 0);
            if let Some(state) = manager.state(event.id) {
                match &state.matched_file {
                    Some(path) => eprintln!("==> watch {} tracking {}", event.id, path.display()),
                    None => eprintln!("==> watch {}: no matching file", event.id),
                }
                print_fresh(event.id, &state, printed);
            }
        }
        WatchEventKind::ContentChanged => {
            if let Some(state) = manager.state(event.id) {
                print_fresh(event.id, &state, printed);
            }
        }
    }
}

/// Print the filtered bytes not yet written for this watch. Shrunk or
/// rewritten content starts over from the beginning.
fn print_fresh(id: WatchId, state: &WatchState, printed: &mut HashMap<WatchId, usize>) {
    let filtered = &state.filtered;
    let seen = printed.entry(id).or_insert(0);
    if *seen > filtered.len() || !filtered.is_char_boundary(*seen) {
        *seen = 0;
    }

    let fresh = &filtered[*seen..];
    if !fresh.is_empty() {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(fresh.as_bytes());
        if !fresh.ends_with('\n') {
            let _ = stdout.write_all(b"\n");
        }
        let _ = stdout.flush();
    }
    *seen = filtered.len();
}
