//! Stateless rendering of both players' screens.

use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};

use super::app::App;
use crate::games::tictactoe::Mark;
use crate::projector::BoardView;

const KEY_HELP: &str =
    "Tab switch  f find game  1-9 play  r restart  d delete game  o toggle store  q quit";

/// Renders the whole screen.
pub fn draw(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Title
            Constraint::Min(14),   // Panes
            Constraint::Length(3), // Footer
        ])
        .split(frame.area());

    let store = if app.store_online() {
        Span::styled("store online", Style::default().fg(Color::Green))
    } else {
        Span::styled("store OFFLINE", Style::default().fg(Color::Red))
    };
    let title = Paragraph::new(Line::from(vec![
        Span::styled(
            "Tic-Tac-Toe Sync  ",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        store,
    ]))
    .alignment(Alignment::Center);
    frame.render_widget(title, chunks[0]);

    let panes = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(chunks[1]);
    for (index, client) in app.clients().iter().enumerate() {
        let title = format!(" Player {} ", index + 1);
        draw_pane(frame, panes[index], &title, &client.view(), index == app.active());
    }

    let footer_text = app.last_action().unwrap_or(KEY_HELP);
    let footer = Paragraph::new(footer_text)
        .style(Style::default().fg(Color::DarkGray))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(footer, chunks[2]);
}

fn draw_pane(frame: &mut Frame, area: Rect, title: &str, view: &BoardView, focused: bool) {
    let border = if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let block = Block::default()
        .title(title.to_string())
        .borders(Borders::ALL)
        .border_style(border);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2), // Players
            Constraint::Length(5), // Board
            Constraint::Min(3),    // Status
        ])
        .split(inner);

    frame.render_widget(players(view), rows[0]);
    frame.render_widget(
        Paragraph::new(board_lines(view)).alignment(Alignment::Center),
        rows[1],
    );

    let mut status = vec![Line::from(Span::styled(
        view.status.to_string(),
        Style::default().fg(Color::Yellow),
    ))];
    if view.setup_visible && view.find_enabled {
        status.push(Line::from(Span::styled(
            "Press f to find a game",
            Style::default().fg(Color::Cyan),
        )));
    }
    if view.restart_visible {
        status.push(Line::from(Span::styled(
            "Press r for a new game",
            Style::default().fg(Color::Cyan),
        )));
    }
    frame.render_widget(
        Paragraph::new(status)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true }),
        rows[2],
    );
}

fn players(view: &BoardView) -> Paragraph<'static> {
    if view.my_mark.is_none() {
        return Paragraph::new("");
    }
    let mark = view
        .my_mark
        .map(|m| m.to_string())
        .unwrap_or_else(|| "?".to_string());
    Paragraph::new(vec![
        Line::from(format!("You: {} ({})", view.my_name, mark)),
        Line::from(format!("Opponent: {}", view.opponent_name)),
    ])
    .alignment(Alignment::Center)
}

fn board_lines(view: &BoardView) -> Vec<Line<'static>> {
    let separator = Line::from(Span::styled(
        "───┼───┼───",
        Style::default().fg(Color::DarkGray),
    ));
    let mut lines = Vec::with_capacity(5);
    for row in 0..3 {
        if row > 0 {
            lines.push(separator.clone());
        }
        let mut spans = Vec::with_capacity(5);
        for col in 0..3 {
            if col > 0 {
                spans.push(Span::styled("│", Style::default().fg(Color::DarkGray)));
            }
            let index = row * 3 + col;
            spans.push(cell_span(&view.cells[index], index));
        }
        lines.push(Line::from(spans));
    }
    lines
}

fn cell_span(label: &str, index: usize) -> Span<'static> {
    match label.parse::<Mark>() {
        Ok(Mark::X) => Span::styled(
            " X ",
            Style::default().fg(Color::Blue).add_modifier(Modifier::BOLD),
        ),
        Ok(Mark::O) => Span::styled(
            " O ",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ),
        Err(_) => Span::styled(
            format!(" {} ", index + 1),
            Style::default().fg(Color::DarkGray),
        ),
    }
}
