mod api;
mod app;
mod commands;
mod config;
mod sync;
mod table;
mod ui;

use anyhow::Result;
use crossterm::{
    event::EventStream,
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::{fs::OpenOptions, io, sync::Mutex, time::Duration};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::{
    api::ControlApi,
    app::App,
    commands::COMMAND_QUEUE_CAPACITY,
    config::{env_true, Config},
    sync::{SyncEvent, SYNC_QUEUE_CAPACITY},
};

const CLOCK_TICK_SECS: u64 = 1;

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::load_config()?;
    init_logging(&config);

    let api = ControlApi::new(&config)?;
    info!(event = "dashboard_start", api_base = %api.base());

    let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
    let (sync_tx, mut sync_rx) = mpsc::channel(SYNC_QUEUE_CAPACITY);
    tokio::spawn(commands::command_loop(
        api.clone(),
        command_rx,
        sync_tx.clone(),
    ));
    tokio::spawn(sync::sync_loop(api, config.clone(), sync_tx));

    let mut app = App::new(config, command_tx);
    let mut terminal = setup_terminal()?;
    let result = run_app(&mut terminal, &mut app, &mut sync_rx).await;
    restore_terminal(&mut terminal)?;
    info!(event = "dashboard_exit");
    result
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    sync_rx: &mut mpsc::Receiver<SyncEvent>,
) -> Result<()> {
    let mut input = EventStream::new();
    let mut clock = tokio::time::interval(Duration::from_secs(CLOCK_TICK_SECS));

    loop {
        terminal.draw(|frame| ui::render(frame, app))?;
        tokio::select! {
            _ = clock.tick() => {}
            Some(event) = sync_rx.recv() => {
                app.apply_sync_event(event);
            }
            maybe_event = input.next() => {
                match maybe_event {
                    Some(Ok(event)) => {
                        if app::handle_input(event, app) {
                            break;
                        }
                    }
                    Some(Err(err)) => warn!(event = "input_error", error = %err),
                    None => break,
                }
            }
        }
    }
    Ok(())
}

fn init_logging(config: &Config) {
    let level = if config.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if let Some(path) = config.log_file.as_ref() {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .try_init();
                return;
            }
            Err(err) => eprintln!("log_file_error: {}: {err}", path.display()),
        }
    }

    if env_true("SERVEROUTE_LOG_STDOUT") {
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::sink)
            .try_init();
    }
}
