//! Expander replay entrypoint.
//!
//! Loads a macro file and an HTML fixture, replays a keystroke script against
//! it, and prints the resulting markup.
use anyhow::{Context, Result};
use clap::Parser;
use core_config::load_from;
use core_model::read_macros_json;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Once;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

mod replay;
mod script;

use replay::Replay;
use script::{Step, parse_script};

const LOG_FILE: &str = "expander.log";

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "expander", version, about = "Replay keystrokes through the text expander")]
struct Args {
    /// Configuration file (overrides discovery of `expander.toml`).
    #[arg(long = "config")]
    config: Option<PathBuf>,
    /// JSON array of macros.
    #[arg(long)]
    macros: PathBuf,
    /// HTML fixture holding the editable elements.
    #[arg(long)]
    fixture: PathBuf,
    /// Element id to focus. Defaults to the first editable element.
    #[arg(long)]
    focus: Option<String>,
    /// Hostname the fixture pretends to be served from.
    #[arg(long)]
    hostname: Option<String>,
    /// Replay script (`type`, `key`, `wait`, `blur`, `focus`).
    #[arg(long, conflicts_with = "keys", required_unless_present = "keys")]
    script: Option<PathBuf>,
    /// Text to type, as a shorthand for a one-line script.
    #[arg(long)]
    keys: Option<String>,
    /// Replay through the event loop with real sleeps instead of a virtual clock.
    #[arg(long)]
    realtime: bool,
}

fn configure_logging() -> Option<WorkerGuard> {
    let log_dir = Path::new(".");
    let log_path = log_dir.join(LOG_FILE);
    if log_path.exists() {
        let _ = std::fs::remove_file(&log_path);
    }

    let file_appender = tracing_appender::rolling::never(log_dir, LOG_FILE);
    let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(nb_writer)
        .with_ansi(false)
        .try_init()
        .ok()
        // Already installed elsewhere; dropping the guard shuts the writer down.
        .map(|_| guard)
}

fn install_panic_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            tracing::error!(target: "runtime.panic", ?info, "panic");
            default_panic(info);
        }));
    });
}

fn load_steps(args: &Args) -> Result<Vec<Step>> {
    match (&args.script, &args.keys) {
        (Some(path), _) => {
            let src = std::fs::read_to_string(path)
                .with_context(|| format!("reading script {}", path.display()))?;
            parse_script(&src).with_context(|| format!("parsing script {}", path.display()))
        }
        (None, Some(keys)) => Ok(vec![Step::Type(keys.clone())]),
        (None, None) => Ok(Vec::new()),
    }
}

fn bootstrap(args: &Args) -> Result<Replay> {
    let loaded = load_from(args.config.clone())?;
    let macros_file =
        File::open(&args.macros).with_context(|| format!("opening {}", args.macros.display()))?;
    let macros = read_macros_json(macros_file)
        .with_context(|| format!("reading macros from {}", args.macros.display()))?;
    let fixture = std::fs::read_to_string(&args.fixture)
        .with_context(|| format!("reading fixture {}", args.fixture.display()))?;
    info!(
        target: "runtime.startup",
        macros = macros.len(),
        config_override = args.config.is_some(),
        realtime = args.realtime,
        "bootstrap_complete"
    );
    Replay::new(
        loaded.config,
        macros,
        &fixture,
        args.focus.as_deref(),
        args.hostname.as_deref(),
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = configure_logging();
    install_panic_hook();
    info!(target: "runtime", "startup");

    let args = Args::parse();
    let steps = load_steps(&args)?;
    let mut replay = bootstrap(&args)?;
    if args.realtime {
        replay.run_realtime(steps).await?;
    } else {
        replay.run_simulated(&steps);
    }
    println!("{}", replay.html());
    info!(
        target: "runtime",
        commits = replay.commits(),
        pending_commit = replay.session().has_pending_commit(),
        "shutdown"
    );
    Ok(())
}
