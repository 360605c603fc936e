//! letschat - a terminal chat client that keeps working offline.
//!
//! Messages sync live with a Firestore collection while the network is
//! reachable; otherwise the last cached history is shown read-only.

mod app;
mod ui;

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use letschat_core::cache::{FileStore, SnapshotCache};
use letschat_core::Config;

use app::{App, AppState};
use ui::input::handle_input;
use ui::render::render;

// ============================================================================
// Constants
// ============================================================================

/// Timeout for polling terminal events (in milliseconds)
const EVENT_POLL_TIMEOUT_MS: u64 = 100;

const LOG_FILE: &str = "letschat.log";

/// Initialize the tracing subscriber. The terminal belongs to the UI, so
/// logs go to a file in the cache directory.
fn init_tracing(log_dir: &Path) -> Result<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
    let appender = tracing_appender::rolling::never(log_dir, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .with(filter)
        .init();
    Ok(guard)
}

fn cache_dir() -> PathBuf {
    Config::load()
        .unwrap_or_default()
        .cache_dir()
        .unwrap_or_else(|_| PathBuf::from("./cache"))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--dump-cache") {
        return dump_cache().await;
    }
    let local = args.iter().any(|a| a == "--local");

    let _log_guard = init_tracing(&cache_dir())?;
    info!(local, "letschat starting");

    let mut app = App::new(local)?;

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Main loop
    let result = run_app(&mut terminal, &mut app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    app.shutdown().await;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
    }

    info!("letschat shutting down");
    Ok(())
}

/// Print the cached message history as JSON
async fn dump_cache() -> Result<()> {
    let dir = cache_dir();
    let store = FileStore::new(dir.clone())
        .with_context(|| format!("Failed to open cache at {}", dir.display()))?;
    let cache = SnapshotCache::new(std::sync::Arc::new(store));

    match cache.load_messages().await? {
        Some(cached) => {
            eprintln!(
                "{} messages, cached {}",
                cached.data.len(),
                cached.age_display()
            );
            println!("{}", serde_json::to_string_pretty(&cached.data)?);
        }
        None => eprintln!("No cached messages in {}", dir.display()),
    }
    Ok(())
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> Result<()> {
    loop {
        // Draw UI
        terminal.draw(|f| render(f, app))?;

        // Poll for events with timeout to allow background updates
        if event::poll(Duration::from_millis(EVENT_POLL_TIMEOUT_MS))? {
            if let Event::Key(key) = event::read()? {
                // Ctrl+C to quit
                if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
                    return Ok(());
                }

                // Handle input
                if handle_input(app, key).await? {
                    return Ok(());
                }
            }
        }

        // Apply background results and connectivity changes
        app.check_background_tasks().await;

        // Check if we should quit
        if matches!(app.state, AppState::Quitting) {
            return Ok(());
        }
    }
}
