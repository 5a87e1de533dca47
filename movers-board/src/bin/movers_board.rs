/// Movers Board TUI
///
/// Polls (or subscribes to) a movers snapshot feed and shows a stabilized
/// top-N gainers or losers list that only changes on commit boundaries.
use std::{
    error::Error,
    fs::File,
    io,
    sync::Mutex,
    time::{Duration, Instant},
};

use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use movers_board::{
    render_movers_panel, spawn_engine, spawn_feed, EngineConfig, FeedConfig, FeedStatus,
    MoversEngine, Polarity, Preset,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Terminal,
};
use tokio::sync::watch;
use tracing::info;

/// Get feed URL from MOVERS_FEED_URL env var (default: http://127.0.0.1:8080/movers)
fn get_feed_url() -> String {
    std::env::var("MOVERS_FEED_URL").unwrap_or_else(|_| "http://127.0.0.1:8080/movers".to_string())
}

/// Get tuning preset from MOVERS_PRESET env var (default: smooth)
fn get_preset() -> Preset {
    std::env::var("MOVERS_PRESET")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_default()
}

/// Get board side from MOVERS_POLARITY env var (default: gainers)
fn get_polarity() -> Polarity {
    std::env::var("MOVERS_POLARITY")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_default()
}

/// Get visible row count from MOVERS_VISIBLE env var (default: 10)
fn get_visible_count() -> usize {
    std::env::var("MOVERS_VISIBLE")
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|n| *n > 0)
        .unwrap_or(10)
}

/// Get poll interval from MOVERS_POLL_MS env var (default: 1000)
fn get_poll_interval() -> Duration {
    let ms = std::env::var("MOVERS_POLL_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1000);
    Duration::from_millis(ms)
}

/// Initialize logging into MOVERS_LOG (default: movers-board.log) so the terminal stays clean
fn init_logging() -> io::Result<()> {
    let path = std::env::var("MOVERS_LOG").unwrap_or_else(|_| "movers-board.log".to_string());
    let file = File::create(path)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_logging()?;

    let preset = get_preset();
    let config = EngineConfig::new(preset)
        .with_visible_count(get_visible_count())
        .with_polarity(get_polarity());
    let polarity = config.polarity;
    let engine = MoversEngine::new(config)?;

    let mut handle = spawn_engine(engine);
    let (status_tx, status_rx) = watch::channel(FeedStatus::Reconnecting);
    let feed_config = FeedConfig::new(get_feed_url()).with_poll_interval(get_poll_interval());
    let feed_url = feed_config.url.clone();
    let feed_task = spawn_feed(
        feed_config,
        handle.batch_sender(),
        handle.shutdown_signal(),
        status_tx,
    )?;
    handle.attach(feed_task);
    info!(%preset, %polarity, url = %feed_url, "Movers board running");

    // Setup panic hook to restore terminal on crash
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture);
        original_hook(panic_info);
    }));

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut rows_rx = handle.subscribe();
    let mut status_rx = status_rx;
    let poll_timeout = Duration::from_millis(50);
    let redraw_interval = Duration::from_secs(1);
    let mut last_draw: Option<Instant> = None;

    loop {
        let rows_changed = rows_rx.has_changed().unwrap_or(false);
        let status_changed = status_rx.has_changed().unwrap_or(false);
        let stale = last_draw.map_or(true, |t| t.elapsed() >= redraw_interval);

        if rows_changed || status_changed || stale {
            let rows = rows_rx.borrow_and_update().clone();
            let status = *status_rx.borrow_and_update();

            terminal.draw(|f| {
                let chunks = Layout::default()
                    .direction(Direction::Vertical)
                    .constraints([Constraint::Min(3), Constraint::Length(1)])
                    .split(f.area());

                render_movers_panel(f, chunks[0], &rows, status, polarity);

                let footer = Line::from(vec![
                    Span::styled(
                        format!(" {} | {} ", preset, feed_url),
                        Style::default().fg(Color::Rgb(120, 120, 120)),
                    ),
                    Span::styled("q: quit", Style::default().fg(Color::Rgb(100, 180, 220))),
                ]);
                f.render_widget(Paragraph::new(footer), chunks[1]);
            })?;
            last_draw = Some(Instant::now());
        }

        if event::poll(poll_timeout)? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => break,
                    _ => {}
                }
            }
        }
    }

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    handle.shutdown().await;
    Ok(())
}
