//! Drawing. Reads [`App`] state, never mutates it.

use crate::shell::app::{App, Focus};
use crate::shell::rows::{Page, RowKind};
use crate::transcript::{Category, Line as TranscriptLine};
use crate::transport::Transport;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Tabs, Wrap},
    Frame,
};
use tui_input::Input;

const SEND_LABEL: &str = " [Send]";
const BUSY_LABEL: &str = " [ .. ]";
const EMPTY_SLOT: &str = "(empty slot)";
const RESPONSE_PINK: Color = Color::Rgb(255, 20, 147);

/// Draw the whole screen.
pub fn draw<T: Transport>(frame: &mut Frame, app: &App<T>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(5),
            Constraint::Length(1),
        ])
        .split(frame.area());

    draw_settings(frame, app, chunks[0]);

    let main = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(chunks[1]);

    draw_commands(frame, app, main[0]);
    draw_transcript(frame, app, main[1]);
    draw_status(frame, app, chunks[2]);

    if let Some(message) = app.warning() {
        draw_warning(frame, message);
    }
}

fn focus_style(focused: bool) -> Style {
    if focused {
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::DarkGray)
    }
}

fn draw_settings<T: Transport>(frame: &mut Frame, app: &App<T>, area: Rect) {
    let settings = app.settings();
    let block = Block::default()
        .title(" TCP Connection Settings ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let host_label = "IP Address: ";
    let port_label = "  Port: ";
    let checkbox = if settings.auto_newline { "[x]" } else { "[ ]" };

    let line = Line::from(vec![
        Span::raw(host_label),
        Span::styled(
            settings.host.value().to_string(),
            focus_style(app.focus() == Focus::Host),
        ),
        Span::raw(port_label),
        Span::styled(
            settings.port.value().to_string(),
            focus_style(app.focus() == Focus::Port),
        ),
        Span::raw(format!("  {} Auto append \\n (Ctrl+N)", checkbox)),
    ]);
    frame.render_widget(Paragraph::new(line), inner);

    let host_x = inner.x + host_label.len() as u16;
    match app.focus() {
        Focus::Host => place_cursor(frame, &settings.host, host_x, inner),
        Focus::Port => {
            let port_x = host_x + settings.host.value().chars().count() as u16 + port_label.len() as u16;
            place_cursor(frame, &settings.port, port_x, inner);
        }
        Focus::Rows => {}
    }
}

fn place_cursor(frame: &mut Frame, input: &Input, x: u16, area: Rect) {
    let x = x.saturating_add(input.visual_cursor() as u16);
    if x < area.right() {
        frame.set_cursor_position((x, area.y));
    }
}

fn draw_commands<T: Transport>(frame: &mut Frame, app: &App<T>, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(1)])
        .split(area);

    let titles: Vec<Line> = app
        .rows()
        .pages()
        .iter()
        .map(|page| Line::from(page.name.clone()))
        .collect();
    let tabs = Tabs::new(titles)
        .block(
            Block::default()
                .title(" Sections (Ctrl+←/→) ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray)),
        )
        .select(app.page())
        .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD));
    frame.render_widget(tabs, chunks[0]);

    let block = Block::default()
        .title(" Commands ")
        .borders(Borders::ALL)
        .border_style(focus_style(app.focus() == Focus::Rows));
    let inner = block.inner(chunks[1]);
    frame.render_widget(block, chunks[1]);

    let Some(page) = app.rows().page(app.page()) else {
        return;
    };

    // Keep the selected row on screen.
    let selected = app.selected().unwrap_or(0);
    let height = inner.height as usize;
    let offset = if height > 0 && selected >= height {
        selected + 1 - height
    } else {
        0
    };

    let lines = page_lines(app, page, inner.width as usize);
    frame.render_widget(Paragraph::new(lines).scroll((offset as u16, 0)), inner);

    if app.focus() == Focus::Rows && app.warning().is_none() {
        if let Some(RowKind::Command(input)) = page.rows.get(selected).map(|r| &r.kind) {
            let row_y = (selected - offset) as u16;
            if row_y < inner.height {
                place_cursor(frame, input, inner.x + 2, Rect { y: inner.y + row_y, ..inner });
            }
        }
    }
}

fn page_lines<'a, T: Transport>(app: &App<T>, page: &'a Page, width: usize) -> Vec<Line<'a>> {
    let text_width = width.saturating_sub(2 + SEND_LABEL.len());

    page.rows
        .iter()
        .enumerate()
        .map(|(index, row)| {
            let (RowKind::Command(input), Some(control)) = (&row.kind, row.control) else {
                return Line::default();
            };

            let is_selected = app.selected() == Some(index);
            let marker = if is_selected { "> " } else { "  " };

            let value = input.value();
            let shown = if value.is_empty() {
                Span::styled(EMPTY_SLOT, Style::default().fg(Color::DarkGray))
            } else {
                Span::raw(value.chars().take(text_width).collect::<String>())
            };
            let pad = text_width.saturating_sub(shown.width());

            let button = if app.is_busy() && !app.control_enabled(control) && row.has_command() {
                Span::styled(BUSY_LABEL, Style::default().fg(Color::Yellow))
            } else if app.control_enabled(control) {
                Span::styled(SEND_LABEL, Style::default().fg(Color::Green))
            } else {
                Span::styled(SEND_LABEL, Style::default().fg(Color::DarkGray))
            };

            let mut line = Line::from(vec![Span::raw(marker), shown, Span::raw(" ".repeat(pad)), button]);
            if is_selected {
                line = line.style(Style::default().add_modifier(Modifier::BOLD));
            }
            line
        })
        .collect()
}

/// Render one transcript entry. Multi-line text continues on indented rows
/// under the first.
fn transcript_lines(line: &TranscriptLine) -> Vec<Line<'_>> {
    let label = line.category.label();
    let (label_style, body_style) = match line.category {
        Category::Sent => (Style::default(), Style::default()),
        Category::Success => (
            Style::default().fg(Color::Green),
            Style::default().fg(RESPONSE_PINK),
        ),
        Category::Error => (
            Style::default().fg(Color::Red),
            Style::default().fg(Color::Red),
        ),
    };

    let stamp = format!("[{}] ", line.timestamp);
    let indent = " ".repeat(stamp.len() + label.len());
    let mut parts = line.text.split('\n').map(|part| part.trim_end_matches('\r'));
    let first = parts.next().unwrap_or_default();

    let mut lines = vec![Line::from(vec![
        Span::raw(stamp),
        Span::styled(label, label_style),
        Span::styled(first, body_style),
    ])];
    lines.extend(
        parts.map(|part| Line::from(vec![Span::raw(indent.clone()), Span::styled(part, body_style)])),
    );
    lines
}

fn draw_transcript<T: Transport>(frame: &mut Frame, app: &App<T>, area: Rect) {
    let block = Block::default()
        .title(" Response (Ctrl+L clears) ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let lines: Vec<Line> = app
        .transcript()
        .lines()
        .iter()
        .flat_map(transcript_lines)
        .collect();

    let scroll = transcript_scroll(lines.len(), inner.height, app.scroll_back());

    frame.render_widget(Paragraph::new(lines).scroll((scroll, 0)), inner);
}

/// Top row to show: pinned to the bottom unless the operator scrolled back.
fn transcript_scroll(total: usize, height: u16, scroll_back: u16) -> u16 {
    let total = u16::try_from(total).unwrap_or(u16::MAX);
    total.saturating_sub(height).saturating_sub(scroll_back)
}

fn draw_status<T: Transport>(frame: &mut Frame, app: &App<T>, area: Rect) {
    let status_style = if app.is_busy() {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::Green)
    };
    let line = Line::from(vec![
        Span::styled(format!(" {} ", app.status()), status_style),
        Span::styled(
            " Enter send | Tab focus | PgUp/PgDn scroll | Esc quit",
            Style::default().fg(Color::DarkGray),
        ),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

fn draw_warning(frame: &mut Frame, message: &str) {
    let width = (message.chars().count() as u16 + 6).max(30).min(frame.area().width);
    let area = centered_rect(width, 5, frame.area());
    frame.render_widget(Clear, area);

    let block = Block::default()
        .title(" Warning ")
        .title_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));

    let text = vec![
        Line::from(message.to_string()),
        Line::from(Span::styled("Enter/Esc to dismiss", Style::default().fg(Color::DarkGray))),
    ];
    frame.render_widget(Paragraph::new(text).block(block).wrap(Wrap { trim: true }), area);
}

/// Create a centered rectangle.
fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length((area.height.saturating_sub(height)) / 2),
            Constraint::Length(height),
            Constraint::Min(0),
        ])
        .split(area);

    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length((area.width.saturating_sub(width)) / 2),
            Constraint::Length(width),
            Constraint::Min(0),
        ])
        .split(vertical[1]);

    horizontal[1]
}
