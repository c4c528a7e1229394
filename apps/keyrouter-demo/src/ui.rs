//! UI rendering for the key router demo.

use crate::app::{App, Mode};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame,
};
use tui_keyrouter::format_pattern;

/// Draw the application.
pub fn draw(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),    // List
            Constraint::Length(3), // Status
        ])
        .split(f.area());

    draw_list(f, app, chunks[0]);
    draw_status(f, app, chunks[1]);
}

fn draw_list(f: &mut Frame, app: &App, area: Rect) {
    let selection = app.selection();
    let items: Vec<ListItem> = app
        .items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let selected = selection.is_some_and(|(start, end)| (start..=end).contains(&i));
            let style = if selected {
                Style::default().bg(Color::Blue)
            } else {
                Style::default()
            };
            ListItem::new(item.as_str()).style(style)
        })
        .collect();

    let title = match app.mode {
        Mode::Normal => " NORMAL ",
        Mode::Select => " SELECT ",
    };
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    let mut state = ListState::default().with_selected(Some(app.cursor));
    f.render_stateful_widget(list, area, &mut state);
}

fn draw_status(f: &mut Frame, app: &App, area: Rect) {
    let pending = app.pending();
    let mut spans = vec![Span::styled(
        format!("{}{} ", pending.count, format_pattern(&pending.keys)),
        Style::default().fg(Color::Cyan),
    )];

    if app.is_recording() {
        spans.push(Span::styled(
            "recording ",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ));
    }
    if let Some(message) = &app.message {
        spans.push(Span::raw(message.as_str()));
    }

    let help = " j/k gg/G dd <C-d>/<C-u> v:select m:record @:replay q:quit ";
    let status = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).title(help));
    f.render_widget(status, area);
}
