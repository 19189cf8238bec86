//! UI rendering for the TUI.

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
};

use crate::core::projector::JobRow;
use crate::session::ConnectionState;

use super::app::{TuiApp, View};

/// Main render function - dispatches to view-specific renderers.
pub fn render(frame: &mut Frame, app: &TuiApp) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Content
            Constraint::Length(3), // Footer/help
        ])
        .split(frame.area());

    render_header(frame, app, chunks[0]);

    match &app.view {
        View::Queue { selected } => render_queue(frame, app, chunks[1], *selected),
        View::Catalog { selected } => render_catalog(frame, app, chunks[1], *selected),
        View::Detail { job_id, scroll } => render_detail(frame, app, chunks[1], job_id, *scroll),
    }

    render_footer(frame, app, chunks[2]);
}

fn render_header(frame: &mut Frame, app: &TuiApp, area: Rect) {
    let (state, color) = match &app.data.connection {
        ConnectionState::Connecting => ("connecting...".to_string(), Color::Yellow),
        ConnectionState::Connected => ("live".to_string(), Color::Green),
        ConnectionState::Disconnected { .. } => ("reconnecting...".to_string(), Color::Red),
    };

    let counts = app
        .data
        .queue
        .counts
        .iter()
        .map(|(status, n)| format!("{n} {status}"))
        .collect::<Vec<_>>()
        .join("  ");

    let title = Line::from(vec![
        Span::raw(" debease  "),
        Span::styled(state, Style::default().fg(color)),
        Span::raw(format!("  {counts} ")),
    ]);

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    frame.render_widget(block, area);
}

fn status_icon(job: &JobRow) -> Span<'static> {
    match job.status.as_str() {
        "succeeded" => Span::styled("✓", Style::default().fg(Color::Green)),
        "failed" => Span::styled("✗", Style::default().fg(Color::Red)),
        "queued" => Span::styled("…", Style::default().fg(Color::DarkGray)),
        _ => Span::styled("•", Style::default().fg(Color::Yellow)),
    }
}

fn selected_style(is_selected: bool) -> Style {
    if is_selected {
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    }
}

fn render_queue(frame: &mut Frame, app: &TuiApp, area: Rect, selected: usize) {
    let block = Block::default()
        .title("Install Queue")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    if app.data.queue.jobs.is_empty() {
        let text = Paragraph::new("  No jobs yet. Press Tab to pick a package.")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(text, area);
        return;
    }

    let items: Vec<ListItem> = app
        .data
        .queue
        .jobs
        .iter()
        .enumerate()
        .map(|(i, job)| {
            let is_selected = i == selected;
            let progress = match job.progress {
                Some(pct) if !job.terminal => format!("{} {:>3}%", progress_bar(pct, 20), pct),
                _ => String::new(),
            };

            let line = Line::from(vec![
                Span::raw(if is_selected { "> " } else { "  " }),
                status_icon(job),
                Span::raw(format!(
                    "  {:<8}  {:<24}  {:<10}  {}",
                    short_id(&job.job_id),
                    job.package,
                    job.status,
                    progress
                )),
            ]);

            ListItem::new(line).style(selected_style(is_selected))
        })
        .collect();

    let list = List::new(items).block(block);
    frame.render_widget(list, area);
}

fn render_catalog(frame: &mut Frame, app: &TuiApp, area: Rect, selected: usize) {
    let title = match &app.data.catalog_query {
        Some(q) => format!("Catalog: \"{}\" ({} matches)", q, app.data.catalog_total),
        None => format!("Catalog ({} packages)", app.data.catalog_total),
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    if app.data.catalog.is_empty() {
        let text = Paragraph::new("  No packages found")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(text, area);
        return;
    }

    let items: Vec<ListItem> = app
        .data
        .catalog
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let is_selected = i == selected;
            let line = Line::from(vec![
                Span::raw(if is_selected { "> " } else { "  " }),
                Span::raw(row.label.clone()),
            ]);
            ListItem::new(line).style(selected_style(is_selected))
        })
        .collect();

    let list = List::new(items).block(block);
    frame.render_widget(list, area);
}

fn render_detail(frame: &mut Frame, app: &TuiApp, area: Rect, job_id: &str, scroll: u16) {
    let block = Block::default()
        .title("Job Details")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let Some(job) = app.data.queue.job(job_id) else {
        let text = Paragraph::new(format!("  Job {job_id} is no longer in the queue"))
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(text, area);
        return;
    };

    let field = |name: &'static str, value: String| {
        Line::from(vec![
            Span::styled(format!("  {name:<10}"), Style::default().fg(Color::Cyan)),
            Span::raw(value),
        ])
    };

    let mut lines = vec![
        field("Job ID:", job.job_id.clone()),
        field("Package:", job.package.clone()),
        field("Status:", job.status.clone()),
        field(
            "Progress:",
            job.progress.map_or("-".to_string(), |p| format!("{p}%")),
        ),
        field(
            "Exit:",
            job.exit_code.map_or("-".to_string(), |c| c.to_string()),
        ),
        Line::from(""),
        Line::from(Span::styled(
            format!("  Log ({} of {} lines)", job.log.len(), job.log_len),
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from("  ─────────────────────────────────────────"),
    ];
    let header_len = lines.len();

    // Show the newest lines that fit, shifted back by `scroll`.
    let room = (area.height as usize).saturating_sub(header_len + 2);
    let end = job.log.len().saturating_sub(scroll as usize);
    let start = end.saturating_sub(room);
    lines.extend(
        job.log[start..end]
            .iter()
            .map(|text| Line::from(format!("  {text}"))),
    );

    let paragraph = Paragraph::new(lines).block(block);
    frame.render_widget(paragraph, area);
}

fn render_footer(frame: &mut Frame, app: &TuiApp, area: Rect) {
    let help_text = match &app.view {
        View::Queue { .. } => "[↑↓] Navigate  [Enter] Details  [Tab] Catalog  [r] Reconcile  [q] Quit",
        View::Catalog { .. } => "[↑↓] Navigate  [Enter] Install  [Tab] Queue  [q] Quit",
        View::Detail { .. } => "[↑↓] Scroll  [Esc] Back  [q] Quit",
    };

    let mut spans = vec![Span::raw(format!("  {}", help_text))];

    if let Some(notice) = &app.data.notice {
        spans.push(Span::styled(
            format!("  {notice} [d] dismiss"),
            Style::default().fg(Color::Red),
        ));
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    let paragraph = Paragraph::new(Line::from(spans)).block(block);
    frame.render_widget(paragraph, area);
}

fn short_id(job_id: &str) -> &str {
    match job_id.char_indices().nth(8) {
        Some((end, _)) => &job_id[..end],
        None => job_id,
    }
}

fn progress_bar(percentage: u8, width: usize) -> String {
    let percentage = percentage.min(100) as usize;
    let filled = (percentage * width) / 100;
    let empty = width - filled;
    format!("[{}{}]", "█".repeat(filled), "░".repeat(empty))
}
