//! Terminal UI for zrak that lets users browse city air quality, seven-day timelines, and comparisons.

mod app;
mod config;
mod input;
mod ui;

use std::{env, fs::File, io, sync::Arc, time::Duration as StdDuration};

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event as CEvent},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use reqwest::Client;
use tokio::{task::JoinHandle, time::interval};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use zrak_core::{
    service::{History, Upstream, ZrakService},
    stations::StationRegistry,
};
use zrak_provider_waqi as waqi;
use zrak_store_memory::MemoryHistoryStore;

use crate::app::{App, Screen};
use crate::input::Action;

const DEFAULT_LOG_PATH: &str = "zrak.log";

/// History older than this is pruned; one day beyond the timeline window.
const HISTORY_RETENTION_DAYS: i64 = 8;

const PRUNE_EVERY: StdDuration = StdDuration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::load()?;
    init_tracing()?;

    // HTTP + service setup
    let client = Client::builder()
        .user_agent("zrak/0.1")
        .timeout(config.upstream.timeout())
        .build()?;

    let registry = Arc::new(StationRegistry::new(config.cities.clone()));
    let waqi = waqi::source(client, &config.upstream, Arc::clone(&registry));
    let store = Arc::new(MemoryHistoryStore::new());

    let service = Arc::new(ZrakService::new(
        &config,
        registry,
        Upstream {
            live: Arc::clone(&waqi) as _,
            forecast: waqi as _,
        },
        History {
            store: Arc::clone(&store) as _,
            recorder: Arc::clone(&store) as _,
        },
    ));

    // Background housekeeping
    let shutdown = CancellationToken::new();
    let mut background = service.spawn_reclaimers(&shutdown);
    background.push(spawn_history_pruner(store, shutdown.child_token()));
    info!(cities = config.cities.len(), "zrak started");

    // App state; a screen load spans several upstream calls.
    let app = App::new(service, config.upstream.timeout().saturating_mul(2));

    // Terminal init
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run event loop
    let res = run(&mut terminal, app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    shutdown.cancel();
    for handle in background {
        if let Err(err) = handle.await {
            warn!(%err, "background task ended abnormally");
        }
    }
    info!("zrak stopped");

    res
}

/// Log to a file; the terminal belongs to the UI.
fn init_tracing() -> Result<()> {
    let path = env::var("ZRAK_LOG").unwrap_or_else(|_| DEFAULT_LOG_PATH.to_owned());
    let file = File::create(&path).with_context(|| format!("failed to create log file {path}"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Arc::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn spawn_history_pruner(
    store: Arc<MemoryHistoryStore>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(PRUNE_EVERY);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let cutoff = Utc::now() - Duration::days(HISTORY_RETENTION_DAYS);
                    store.prune_before(cutoff).await;
                }
            }
        }
    })
}

async fn run(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, mut app: App) -> Result<()> {
    loop {
        // Draw current UI
        terminal.draw(|frame| ui::draw(frame, &app))?;

        // Poll for input (non-blocking, small timeout to keep CPU low)
        if event::poll(StdDuration::from_millis(100))?
            && let CEvent::Key(key) = event::read()?
        {
            let action = input::handle_key_event(key, &mut app);

            match action {
                Action::Quit => break,
                Action::None => {}
                Action::LoadCity => {
                    let Some(city) = app.select_current_city() else {
                        app.error_message = Some("No cities configured".into());
                        continue;
                    };

                    app.is_loading = true;
                    app.error_message = None;
                    terminal.draw(|frame| ui::draw(frame, &app))?;

                    let cancel = app.request_token();
                    let _done = cancel.clone().drop_guard();
                    let (live, timeline, forecast) = tokio::join!(
                        app.service.live(&city, &cancel),
                        app.service.daily_timeline(&city, &cancel),
                        app.service.forecast(&city, &cancel),
                    );

                    app.is_loading = false;
                    let mut failures = Vec::new();
                    match live {
                        Ok(snapshot) => app.live = Some(snapshot),
                        Err(err) => failures.push(format!("current reading: {err}")),
                    }
                    match timeline {
                        Ok(entries) => app.timeline = entries,
                        Err(err) => failures.push(format!("timeline: {err}")),
                    }
                    match forecast {
                        Ok(days) => app.forecast = days,
                        Err(err) => failures.push(format!("forecast: {err}")),
                    }
                    if !failures.is_empty() {
                        app.error_message = Some(format!("Failed to load {}", failures.join("; ")));
                    }
                }
                Action::RefreshCity => {
                    let Some(city) = app.selected_city.clone() else {
                        app.error_message = Some("Select a city first".into());
                        continue;
                    };

                    app.is_loading = true;
                    app.error_message = None;
                    terminal.draw(|frame| ui::draw(frame, &app))?;

                    let cancel = app.request_token();
                    let _done = cancel.clone().drop_guard();
                    // Fresh reading first so the timeline's live fill sees it.
                    let live = app.service.live_fresh(&city, &cancel).await;
                    let timeline = app.service.daily_timeline(&city, &cancel).await;

                    app.is_loading = false;
                    match (live, timeline) {
                        (Ok(snapshot), Ok(entries)) => {
                            app.live = Some(snapshot);
                            app.timeline = entries;
                        }
                        (Ok(snapshot), Err(err)) => {
                            app.live = Some(snapshot);
                            app.error_message = Some(format!("Failed to refresh timeline: {err}"));
                        }
                        (Err(err), timeline) => {
                            if let Ok(entries) = timeline {
                                app.timeline = entries;
                            }
                            app.error_message = Some(format!("Failed to refresh: {err}"));
                        }
                    }
                }
                Action::Compare => {
                    let cities = app.comparison_cities();

                    app.screen = Screen::Comparison;
                    app.comparison.clear();
                    app.is_loading = true;
                    app.error_message = None;
                    terminal.draw(|frame| ui::draw(frame, &app))?;

                    let cancel = app.request_token();
                    let _done = cancel.clone().drop_guard();
                    app.comparison = app.service.compare(&cities, &cancel).await;
                    app.is_loading = false;
                }
            }
        }
    }

    Ok(())
}
