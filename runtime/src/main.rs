//! bshell - line-at-a-time front end for the pipeline interpreter.
//!
//! Reads command lines from `-c` or stdin, runs each through a [`Session`]
//! and prints the output. Errors go to stderr as `error: ...`. Ctrl+C
//! interrupts the running line; a second press tears it down.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde_json::{Map, Value as Json};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer};

use bshell::logging::env_filter;
use bshell::{HostResponse, LocalHost, Outcome, Result, Session, ShellConfig};

/// How often the session checks for Ctrl+C presses while a line runs.
const INTERRUPT_POLL: Duration = Duration::from_millis(20);

/// Exit status of a `-c` line stopped by Ctrl+C (128 + SIGINT).
const EXIT_INTERRUPTED: u8 = 130;

/// Pipeline shell for stream-of-values commands
#[derive(Parser, Debug)]
#[command(name = "bshell")]
#[command(about = "Run stream-of-values command pipelines")]
struct Args {
    /// TOML config file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Persist history to this JSON file (overrides the config)
    #[arg(long, value_name = "FILE")]
    history: Option<PathBuf>,

    /// Run a single line and exit
    #[arg(short = 'c', long = "command", value_name = "LINE")]
    command: Option<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Per-subsystem verbosity comes from the config's `debug.filter`; this
    // filter only has to let the crate's events through.
    let rust_log = std::env::var("RUST_LOG").ok();
    let filter = env_filter(rust_log.as_deref());
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(io::stderr)
                .with_filter(filter),
        )
        .init();

    match run(args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &Args) -> Result<ShellConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|e| {
                bshell::ShellError::Config(format!("{}: {}", path.display(), e))
            })?;
            ShellConfig::from_toml(&text)?
        }
        None => ShellConfig::default(),
    };
    if let Some(path) = &args.history {
        config.history.path = Some(path.display().to_string());
    }
    Ok(config)
}

/// Host side answering a few background requests in-process.
fn local_host() -> LocalHost {
    let host = LocalHost::new();
    host.on("background", "echo", |payload| HostResponse::ok(payload.clone()))
        .on("background", "ping", |_| {
            let mut data = Map::new();
            data.insert("pong".to_string(), Json::Bool(true));
            HostResponse::ok(data)
        })
        .on("background", "time", |_| {
            let mut data = Map::new();
            data.insert(
                "now".to_string(),
                Json::String(chrono::Utc::now().to_rfc3339()),
            );
            HostResponse::ok(data)
        });
    host
}

/// Count Ctrl+C presses for [`Session::watch_interrupts`].
fn install_ctrlc() -> Arc<AtomicUsize> {
    let presses = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&presses);
    if let Err(err) = ctrlc::set_handler(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }) {
        tracing::warn!("Ctrl+C will not interrupt lines: {}", err);
    }
    presses
}

fn run(args: Args) -> Result<ExitCode> {
    let config = load_config(&args)?;
    let session = Session::new(config)?.with_host(Rc::new(local_host()));
    let presses = install_ctrlc();
    session.watch_interrupts(Arc::clone(&presses), INTERRUPT_POLL)?;

    if let Some(line) = &args.command {
        let outcome = print_outcome(&session, line);
        return Ok(if outcome.interrupted {
            ExitCode::from(EXIT_INTERRUPTED)
        } else if outcome.errors.is_empty() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                tracing::warn!("stdin: {}", err);
                break;
            }
        };
        if line.trim() == "exit" {
            break;
        }
        // presses at the prompt do not carry over into the next line
        presses.store(0, Ordering::SeqCst);
        print_outcome(&session, &line);
    }
    Ok(ExitCode::SUCCESS)
}

/// Run one line and print what it produced.
fn print_outcome(session: &Session, line: &str) -> Outcome {
    let outcome = session.submit(line);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if outcome.clear_screen {
        let _ = write!(out, "\x1b[2J\x1b[H");
    }
    for text in &outcome.lines {
        let _ = writeln!(out, "{}", text);
    }
    for err in &outcome.errors {
        eprintln!("error: {}", err);
    }
    outcome
}
