use crate::{
    app::{App, SnapshotState},
    table::ServiceRow,
};
use chrono::Utc;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};
use serveroute_core::{ControlCommand, ServiceStatus};

const COMPACT_WIDTH: u16 = 72;
const NAME_WIDTH: usize = 24;
const SUBDOMAIN_WIDTH: usize = 18;

#[derive(Clone, Copy)]
struct Theme {
    bg: Color,
    surface: Color,
    border: Color,
    title: Color,
    text: Color,
    muted: Color,
    accent: Color,
    ok: Color,
    warn: Color,
    critical: Color,
    info: Color,
}

fn theme() -> Theme {
    Theme {
        bg: Color::Rgb(11, 18, 32),
        surface: Color::Rgb(17, 26, 46),
        border: Color::Rgb(71, 85, 105),
        title: Color::Rgb(191, 219, 254),
        text: Color::Rgb(226, 232, 240),
        muted: Color::Rgb(148, 163, 184),
        accent: Color::Rgb(56, 189, 248),
        ok: Color::Rgb(34, 197, 94),
        warn: Color::Rgb(245, 158, 11),
        critical: Color::Rgb(239, 68, 68),
        info: Color::Rgb(59, 130, 246),
    }
}

pub fn render(frame: &mut Frame, app: &App) {
    let size = frame.size();
    let theme = theme();
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(4), Constraint::Min(0)])
        .split(size);
    frame.render_widget(render_header(app, theme, size.width), layout[0]);
    render_services(frame, app, theme, layout[1]);
    if app.help_open {
        render_help_overlay(frame, theme);
    }
}

fn panel(title: &'static str, theme: Theme, bg: Color) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.border))
        .style(Style::default().bg(bg))
        .title(Span::styled(
            title,
            Style::default()
                .fg(theme.title)
                .add_modifier(Modifier::BOLD),
        ))
}

fn render_header(app: &App, theme: Theme, width: u16) -> Paragraph<'static> {
    let inner_width = width.saturating_sub(4) as usize;
    let registry = app.registry();
    let started = app.count_with(&ServiceStatus::Started);
    let stopped = app.count_with(&ServiceStatus::Stopped);
    let fields = vec![
        format!("Stream: {}", stream_label(app)),
        format!(
            "Services: {} ({} started, {} stopped)",
            registry.len(),
            started,
            stopped
        ),
        format!("Updated: {}", format_age(app)),
        format!("API: {}", app.config.api_base),
    ];
    let status_line = fit_fields(&fields, inner_width.max(12));

    let note = app.status_note.as_deref().unwrap_or("ready");
    let note_line = if is_compact(width) {
        note.to_string()
    } else {
        format!("{note}  (s start, x stop, ? help)")
    };

    Paragraph::new(Text::from(vec![
        Line::from(Span::styled(status_line, Style::default().fg(theme.text))),
        Line::from(Span::styled(
            ellipsize(&note_line, inner_width.max(12)),
            Style::default().fg(status_note_color(note, theme)),
        )),
    ]))
    .style(Style::default().fg(theme.text).bg(theme.bg))
    .block(panel("Status", theme, theme.bg))
}

fn stream_label(app: &App) -> &'static str {
    match (app.snapshot, app.connected) {
        (SnapshotState::Loading, _) => "loading",
        (SnapshotState::Failed, _) => "unavailable",
        (SnapshotState::Loaded, true) => "live",
        (SnapshotState::Loaded, false) if app.disconnected_at.is_some() => "reconnecting",
        (SnapshotState::Loaded, false) => "connecting",
    }
}

fn format_age(app: &App) -> String {
    app.last_update_at
        .map(|at| format!("{}s ago", (Utc::now() - at).num_seconds().max(0)))
        .unwrap_or_else(|| "n/a".to_string())
}

fn render_services(frame: &mut Frame, app: &App, theme: Theme, area: Rect) {
    let rows = app.table().rows();
    if rows.is_empty() {
        let message = match app.snapshot {
            SnapshotState::Loading => "Loading services...",
            SnapshotState::Failed => "Service list could not be loaded.",
            SnapshotState::Loaded => "No services reported.",
        };
        let paragraph = Paragraph::new(Line::from(Span::styled(
            message,
            Style::default().fg(theme.muted),
        )))
        .style(Style::default().fg(theme.text).bg(theme.surface))
        .block(panel("Services", theme, theme.surface));
        frame.render_widget(paragraph, area);
        return;
    }

    let compact = is_compact(area.width);
    let items: Vec<ListItem> = rows
        .iter()
        .map(|row| ListItem::new(Line::from(row_spans(row, theme, compact))))
        .collect();
    let mut state = ListState::default();
    state.select(Some(app.selected.min(rows.len() - 1)));
    let list = List::new(items)
        .highlight_symbol(">> ")
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .block(panel("Services", theme, theme.surface));
    frame.render_stateful_widget(list, area, &mut state);
}

fn row_spans(row: &ServiceRow, theme: Theme, compact: bool) -> Vec<Span<'static>> {
    let mut spans = vec![
        Span::styled(
            format!("{:<9}", format!("[{}]", ellipsize(row.status.as_str(), 7))),
            Style::default()
                .fg(status_color(&row.status, theme))
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(
            format!("{:<width$}", ellipsize(&row.name, NAME_WIDTH), width = NAME_WIDTH),
            Style::default().fg(theme.text).add_modifier(Modifier::BOLD),
        ),
    ];
    if !compact {
        let subdomain = row.subdomain.as_deref().unwrap_or("-");
        spans.push(Span::raw(" "));
        spans.push(Span::styled(
            format!(
                "{:<width$}",
                ellipsize(subdomain, SUBDOMAIN_WIDTH),
                width = SUBDOMAIN_WIDTH
            ),
            Style::default().fg(theme.muted),
        ));
    }
    spans.push(Span::raw(" "));
    spans.push(trigger_span(row, ControlCommand::Start, theme));
    spans.push(Span::raw(" "));
    spans.push(trigger_span(row, ControlCommand::Stop, theme));
    spans
}

fn trigger_span(row: &ServiceRow, command: ControlCommand, theme: Theme) -> Span<'static> {
    let label = match command {
        ControlCommand::Start => "[s]tart",
        ControlCommand::Stop => "[x]stop",
    };
    let style = if row.trigger_enabled(command) {
        Style::default().fg(theme.accent).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(theme.border).add_modifier(Modifier::DIM)
    };
    Span::styled(label, style)
}

fn status_color(status: &ServiceStatus, theme: Theme) -> Color {
    match status {
        ServiceStatus::Started => theme.ok,
        ServiceStatus::Stopped => theme.muted,
        ServiceStatus::Other(_) => theme.warn,
    }
}

fn status_note_color(note: &str, theme: Theme) -> Color {
    let normalized = note.to_ascii_lowercase();
    if normalized.contains("failed")
        || normalized.contains("unavailable")
        || normalized.contains("dispatcher")
    {
        return theme.critical;
    }
    if normalized.contains("reconnecting") || normalized.contains("full") {
        return theme.warn;
    }
    if normalized.contains("requested") || normalized.contains("connected") {
        return theme.info;
    }
    theme.muted
}

fn render_help_overlay(frame: &mut Frame, theme: Theme) {
    let area = centered_rect(64, 60, frame.size());
    let heading = |text: &'static str| {
        Line::from(Span::styled(
            text,
            Style::default()
                .fg(theme.accent)
                .add_modifier(Modifier::BOLD),
        ))
    };
    let lines = vec![
        heading("Services"),
        Line::from("  j/k, Up/Down  select service"),
        Line::from("  g / G         jump to first / last"),
        Line::from("  s             start selected service"),
        Line::from("  x             stop selected service"),
        Line::from(""),
        heading("Status"),
        Line::from("  Rows change only when the event stream reports it;"),
        Line::from("  a greyed trigger would be a no-op."),
        Line::from(""),
        heading("Exit"),
        Line::from("  ? or F1       toggle this help"),
        Line::from("  Esc           close help"),
        Line::from("  q             quit"),
    ];
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(Text::from(lines))
            .style(Style::default().fg(theme.text).bg(theme.surface))
            .block(panel("Help", theme, theme.surface))
            .wrap(Wrap { trim: false }),
        area,
    );
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100u16.saturating_sub(percent_y)) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100u16.saturating_sub(percent_y)) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100u16.saturating_sub(percent_x)) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100u16.saturating_sub(percent_x)) / 2),
        ])
        .split(vertical[1])[1]
}

fn ellipsize(input: &str, max: usize) -> String {
    if input.chars().count() <= max {
        return input.to_string();
    }
    if max <= 3 {
        return "...".chars().take(max).collect();
    }
    let prefix: String = input.chars().take(max - 3).collect();
    format!("{prefix}...")
}

fn fit_fields(fields: &[String], max: usize) -> String {
    if max == 0 {
        return String::new();
    }
    let mut output = String::new();
    for field in fields {
        let candidate = if output.is_empty() {
            field.clone()
        } else {
            format!("{output} | {field}")
        };
        if candidate.chars().count() <= max {
            output = candidate;
            continue;
        }
        if output.is_empty() {
            return ellipsize(field, max);
        }
        break;
    }
    output
}

fn is_compact(width: u16) -> bool {
    width < COMPACT_WIDTH
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::test_config, sync::SyncEvent};
    use ratatui::{backend::TestBackend, Terminal};
    use tokio::sync::mpsc;

    fn draw(app: &App, width: u16, height: u16) -> Vec<String> {
        let mut terminal = Terminal::new(TestBackend::new(width, height)).expect("terminal");
        terminal.draw(|frame| render(frame, app)).expect("draw");
        let buffer = terminal.backend().buffer().clone();
        (0..height)
            .map(|y| {
                (0..width)
                    .map(|x| buffer.get(x, y).symbol().to_string())
                    .collect::<String>()
            })
            .collect()
    }

    fn loaded_app() -> App {
        let (tx, _rx) = mpsc::channel(1);
        let mut app = App::new(test_config("http://127.0.0.1:1"), tx);
        app.apply_sync_event(SyncEvent::Snapshot(
            serde_json::from_str(
                r#"{"web": {"status": "stopped", "subdomain": "www"}, "db": {"status": "started"}}"#,
            )
            .expect("listing"),
        ));
        app
    }

    #[test]
    fn renders_one_line_per_service() {
        let lines = draw(&loaded_app(), 100, 12);
        let web: Vec<&String> = lines.iter().filter(|line| line.contains("web")).collect();
        let db: Vec<&String> = lines.iter().filter(|line| line.contains(" db ")).collect();
        assert_eq!(web.len(), 1);
        assert_eq!(db.len(), 1);
        assert!(web[0].contains("[stopped]"));
        assert!(web[0].contains("www"));
        assert!(db[0].contains("[started]"));
        assert!(lines[1].contains("Services: 2 (1 started, 1 stopped)"));
    }

    #[test]
    fn empty_states_explain_themselves() {
        let (tx, _rx) = mpsc::channel(1);
        let mut app = App::new(test_config("http://127.0.0.1:1"), tx);
        let lines = draw(&app, 80, 10);
        assert!(lines.iter().any(|line| line.contains("Loading services...")));

        app.apply_sync_event(SyncEvent::SnapshotFailed("/list returned 500".to_string()));
        let lines = draw(&app, 80, 10);
        assert!(lines
            .iter()
            .any(|line| line.contains("Service list could not be loaded.")));
    }

    #[test]
    fn fit_fields_drops_fields_that_do_not_fit() {
        let fields = vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()];
        assert_eq!(fit_fields(&fields, 12), "alpha | beta");
        assert_eq!(fit_fields(&fields, 3), "...");
        assert_eq!(ellipsize("started", 5), "st...");
    }
}
