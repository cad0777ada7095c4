//! Classboard command-line entry point.

use clap::{Parser, Subcommand};
use classboard_app::{AppConfig, Dispatch, ShortcutRegistry, Whiteboard, export_history};
use classboard_core::{
    BackingStore, FileStorage, HttpBackingStore, NativeWebSocket, Session,
};
use classboard_render::ReplayEngine;
use kurbo::Point;
use serde::Deserialize;
use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Collaborative classroom whiteboard
#[derive(Parser, Debug)]
#[command(name = "classboard")]
#[command(version, about, long_about = None)]
struct Args {
    /// Config file (defaults to the user config directory)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Create a whiteboard session and print its token
    New,
    /// Render a session's persisted history into a PDF
    Export {
        session_token: String,
        #[arg(value_name = "OUT")]
        output: PathBuf,
    },
    /// Drive a live session from a JSON-lines event script (stdin if no file)
    Play {
        session_token: String,
        #[arg(value_name = "SCRIPT")]
        script: Option<PathBuf>,
        /// Write the deck to a PDF after the script ends
        #[arg(long, value_name = "OUT")]
        export: Option<PathBuf>,
    },
    /// Mark a lesson day's status
    Status {
        session_token: String,
        day: String,
        status: String,
    },
    /// List keyboard shortcuts
    Shortcuts,
}

/// One line of a `play` script.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum ScriptEvent {
    Down { x: f64, y: f64 },
    Move { x: f64, y: f64 },
    Up,
    Key {
        key: String,
        #[serde(default)]
        ctrl: bool,
        #[serde(default)]
        shift: bool,
    },
    Wait { ms: u64 },
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> CliResult<()> {
    let path = args.config.or_else(AppConfig::default_path);
    let config = AppConfig::load_or_default(path.as_deref())?;

    match args.command {
        CliCommand::New => {
            let store = HttpBackingStore::new(&config.server_url)?;
            let session = Whiteboard::<NativeWebSocket>::create_session(&store, &config)?;
            println!("{}", session.session_token);
        }
        CliCommand::Export {
            session_token,
            output,
        } => {
            let store = HttpBackingStore::new(&config.server_url)?;
            let session = session_for(&config, session_token);
            let history = store.load_history(&session)?;
            let engine = ReplayEngine::new(config.surface_width, config.surface_height)
                .with_background(config.background);
            export_history(history, engine)?.save_pdf(&output)?;
        }
        CliCommand::Play {
            session_token,
            script,
            export,
        } => play(&config, session_token, script, export)?,
        CliCommand::Status {
            session_token,
            day,
            status,
        } => {
            let store = HttpBackingStore::new(&config.server_url)?;
            store.update_status(&session_for(&config, session_token), &day, &status)?;
        }
        CliCommand::Shortcuts => ShortcutRegistry::print_all(),
    }
    Ok(())
}

fn session_for(config: &AppConfig, session_token: String) -> Session {
    Session::new(session_token, config.school_id.clone(), config.auth_token.clone())
}

fn play(
    config: &AppConfig,
    session_token: String,
    script: Option<PathBuf>,
    export: Option<PathBuf>,
) -> CliResult<()> {
    let store = Arc::new(HttpBackingStore::new(&config.server_url)?);
    let session = session_for(config, session_token);
    let mut board = Whiteboard::new(
        config.clone(),
        session,
        store,
        NativeWebSocket::new(),
        Instant::now(),
    );
    match FileStorage::default_location() {
        Ok(storage) => board = board.with_storage(Arc::new(storage)),
        Err(e) => log::warn!("Local deck storage unavailable: {}", e),
    }
    board.enter_immersive(Instant::now())?;

    let reader: Box<dyn BufRead> = match &script {
        Some(path) => Box::new(std::io::BufReader::new(std::fs::File::open(path)?)),
        None => Box::new(std::io::stdin().lock()),
    };

    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event: ScriptEvent = serde_json::from_str(&line)
            .map_err(|e| format!("script line {}: {}", number + 1, e))?;
        let now = Instant::now();
        match event {
            ScriptEvent::Down { x, y } => board.pointer_down(Point::new(x, y), now),
            ScriptEvent::Move { x, y } => board.pointer_move(Point::new(x, y), now),
            ScriptEvent::Up => board.pointer_up(now),
            ScriptEvent::Key { key, ctrl, shift } => {
                let Some(command) = ShortcutRegistry::lookup(&key, ctrl, shift) else {
                    log::warn!("No shortcut for {}", key);
                    continue;
                };
                if let Dispatch::Exited(_) = board.dispatch(command, now)? {
                    break;
                }
            }
            ScriptEvent::Wait { ms } => std::thread::sleep(Duration::from_millis(ms)),
        }
        board.tick(Instant::now());
    }

    if let Some(output) = export {
        board.export_deck()?.save_pdf(&output)?;
    }
    board.exit_immersive(Instant::now());
    let stats = board.channel().stats();
    log::info!(
        "Sent {} message(s) with {} op(s); dropped {} op(s)",
        stats.messages_sent,
        stats.ops_sent,
        board.dropped_ops()
    );
    Ok(())
}
