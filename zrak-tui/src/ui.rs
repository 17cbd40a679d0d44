use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Cell, List, ListItem, ListState, Paragraph, Row, Table, Wrap},
};
use zrak_core::{
    compare::ComparisonReport,
    model::{DayCategory, GapFill, Snapshot},
};

use crate::app::{App, Screen};

/// Forecast pollutant shown under the timeline.
const FORECAST_POLLUTANT: &str = "pm25";

pub(crate) fn draw(frame: &mut Frame<'_>, app: &App) {
    let area = frame.area();

    // Outer layout: title, main content, status line
    let layout_chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(area);

    let chunks = layout_chunks.as_ref();
    let [header_area, content_area, status_area] = chunks else {
        return;
    };

    let header = Paragraph::new("zrak – city air quality")
        .block(Block::default().borders(Borders::ALL).title("Zrak"));
    frame.render_widget(header, *header_area);

    match app.screen {
        Screen::CitySelect => draw_city_select(frame, app, *content_area),
        Screen::Timeline => draw_timeline(frame, app, *content_area),
        Screen::Comparison => draw_comparison(frame, app, *content_area),
    }

    let nav_hint = match app.screen {
        Screen::CitySelect => {
            "↑/↓ move · Enter open · Space mark · c compare marked (or all) · q/Ctrl-C quit"
        }
        Screen::Timeline => "r refresh live · Esc/←/b back · q/Ctrl-C quit",
        Screen::Comparison => "r run again · Esc/←/b back · q/Ctrl-C quit",
    };

    let status_text = if app.is_loading {
        format!("Loading… · {nav_hint}")
    } else if let Some(msg) = &app.error_message {
        format!("{msg} · {nav_hint}")
    } else {
        let (live_stats, forecast_stats) = app.service.cache_stats();
        format!(
            "cache {}/{} live · {}/{} forecast (hits/misses) · {nav_hint}",
            live_stats.hits, live_stats.misses, forecast_stats.hits, forecast_stats.misses
        )
    };

    let status_style = if app.error_message.is_some() {
        Style::default().fg(Color::Red)
    } else if app.is_loading {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };

    let status = Paragraph::new(status_text)
        .block(Block::default().borders(Borders::ALL).title("Status"))
        .style(status_style)
        .wrap(Wrap { trim: true });

    frame.render_widget(status, *status_area);
}

fn draw_city_select(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let items = app
        .cities
        .iter()
        .enumerate()
        .map(|(idx, (id, name))| {
            let prefix = if idx == app.city_list_index {
                "> "
            } else {
                "  "
            };
            let mark = if app.marked.contains(&idx) {
                "[x]"
            } else {
                "[ ]"
            };
            // Only what is already cached; listing never triggers a fetch.
            let cached = app
                .service
                .cached_live(id)
                .map(|snapshot| format!("  AQI {} ({})", snapshot.overall_index, snapshot.category.label()))
                .unwrap_or_default();
            ListItem::new(format!("{prefix}{mark} {name}{cached}"))
        })
        .collect::<Vec<ListItem<'_>>>();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Cities (↑/↓, Enter, Space to mark)"),
        )
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );

    let mut state = ListState::default();
    if !app.cities.is_empty() {
        state.select(Some(app.city_list_index));
    }
    frame.render_stateful_widget(list, area, &mut state);
}

fn draw_timeline(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let layout_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),  // live reading
            Constraint::Length(10), // seven days
            Constraint::Min(0),     // forecast
        ])
        .split(area);

    let chunks = layout_chunks.as_ref();
    let [live_area, days_area, forecast_area] = chunks else {
        return;
    };

    let city_name = app
        .selected_city
        .as_ref()
        .map_or("<city>", |city| city.0.as_str());

    let live_text = match (&app.live, app.is_loading) {
        (Some(snapshot), _) => live_label(snapshot),
        (None, true) => "Loading…".to_owned(),
        (None, false) => "No current reading".to_owned(),
    };
    let live_style = app
        .live
        .as_ref()
        .map_or_else(Style::default, |snapshot| {
            Style::default().fg(hex_color(snapshot.category.color()))
        });
    let live = Paragraph::new(live_text)
        .style(live_style)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Now in {city_name}")),
        );
    frame.render_widget(live, *live_area);

    let rows = app.timeline.iter().map(|entry| {
        let aqi = entry
            .aqi
            .map_or_else(|| "–".to_owned(), |aqi| aqi.to_string());
        let category = match entry.category {
            DayCategory::Rated(category) => category.label(),
            DayCategory::NoData => "No data",
        };
        Row::new(vec![
            Cell::from(entry.date.format("%d.%m.%Y").to_string()),
            Cell::from(entry.short_day_name.clone()),
            Cell::from(aqi),
            Cell::from(category),
            Cell::from(fill_label(entry.fill)),
        ])
        .style(Style::default().fg(hex_color(&entry.color)))
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(12),
            Constraint::Length(5),
            Constraint::Length(5),
            Constraint::Length(32),
            Constraint::Min(10),
        ],
    )
    .header(
        Row::new(vec!["Date", "Day", "AQI", "Category", "Source"])
            .style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title("Last seven days (Esc/←/b to go back)"),
    )
    .column_spacing(1);
    frame.render_widget(table, *days_area);

    let forecast_rows = app
        .forecast
        .iter()
        .filter(|day| day.pollutant == FORECAST_POLLUTANT)
        .map(|day| {
            Row::new(vec![
                Cell::from(day.date.format("%d.%m.%Y").to_string()),
                Cell::from(day.avg.to_string()),
                Cell::from(day.min.to_string()),
                Cell::from(day.max.to_string()),
            ])
        });

    let forecast = Table::new(
        forecast_rows,
        [
            Constraint::Length(12),
            Constraint::Length(6),
            Constraint::Length(6),
            Constraint::Length(6),
        ],
    )
    .header(
        Row::new(vec!["Date", "Avg", "Min", "Max"])
            .style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("Forecast ({FORECAST_POLLUTANT})")),
    )
    .column_spacing(1);
    frame.render_widget(forecast, *forecast_area);
}

fn draw_comparison(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let layout_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(3)])
        .split(area);

    let chunks = layout_chunks.as_ref();
    let [table_area, summary_area] = chunks else {
        return;
    };

    if app.comparison.is_empty() {
        let text = if app.is_loading {
            "Comparing…"
        } else {
            "No comparison yet."
        };
        let paragraph = Paragraph::new(text)
            .block(Block::default().borders(Borders::ALL).title("Comparison"))
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, *table_area);
        return;
    }

    let rows = app.comparison.iter().map(|outcome| match &outcome.result {
        Ok(snapshot) => Row::new(vec![
            Cell::from(outcome.city.0.clone()),
            Cell::from(snapshot.overall_index.to_string()),
            Cell::from(snapshot.category.label()),
            Cell::from(snapshot.dominant_pollutant.clone().unwrap_or_default()),
        ])
        .style(Style::default().fg(hex_color(snapshot.category.color()))),
        Err(reason) => Row::new(vec![
            Cell::from(outcome.city.0.clone()),
            Cell::from("–"),
            Cell::from(reason.describe()),
            Cell::from(""),
        ])
        .style(Style::default().fg(Color::DarkGray)),
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(20),
            Constraint::Length(5),
            Constraint::Min(32),
            Constraint::Length(10),
        ],
    )
    .header(
        Row::new(vec!["City", "AQI", "Category", "Dominant"])
            .style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .block(Block::default().borders(Borders::ALL).title("Comparison"))
    .column_spacing(1);
    frame.render_widget(table, *table_area);

    let report = ComparisonReport::from_outcomes(&app.comparison);
    let summary = match (&report.cleanest, &report.most_polluted) {
        (Some(best), Some(worst)) => format!(
            "Cleanest: {} ({}) · Most polluted: {} ({}) · {} failed",
            best.city, best.overall_index, worst.city, worst.overall_index, report.failed
        ),
        _ => format!("No readings · {} failed", report.failed),
    };
    let paragraph = Paragraph::new(summary)
        .block(Block::default().borders(Borders::ALL).title("Summary"));
    frame.render_widget(paragraph, *summary_area);
}

fn live_label(snapshot: &Snapshot) -> String {
    let pollutant = snapshot
        .dominant_pollutant
        .as_deref()
        .map(|pollutant| format!(" · dominant {pollutant}"))
        .unwrap_or_default();
    format!(
        "AQI {} · {}{} · measured {}",
        snapshot.overall_index,
        snapshot.category.label(),
        pollutant,
        snapshot.timestamp.format("%d.%m.%Y %H:%M UTC")
    )
}

fn fill_label(fill: GapFill) -> &'static str {
    match fill {
        GapFill::Recorded => "recorded",
        GapFill::Live => "live",
        GapFill::CarriedForward => "carried forward",
        GapFill::Missing => "",
    }
}

fn hex_color(hex: &str) -> Color {
    hex.parse().unwrap_or(Color::Gray)
}
