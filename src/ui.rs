use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap},
};
use crate::app::{App, Message, Sender};

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Input box grows with its content, the chat view takes the rest
    let input_height = app.input_height() + 2; // +2 for borders

    let [header_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(input_height),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_chat(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" Gemini Chat ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!(" {} ", app.model),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = if app.is_busy() {
        Style::default().bg(Color::Yellow).fg(Color::Black)
    } else {
        Style::default().bg(Color::Blue).fg(Color::White)
    };
    let mode_text = if app.is_busy() { " SENDING " } else { " READY " };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let mut spans = vec![Span::styled(mode_text, mode_style)];
    spans.extend(vec![
        Span::styled(" Enter ", key_style),
        Span::styled(" send ", label_style),
        Span::styled(" Shift+Enter ", key_style),
        Span::styled(" newline ", label_style),
        Span::styled(" ↑/↓ ", key_style),
        Span::styled(" scroll ", label_style),
        Span::styled(" Esc ", key_style),
        Span::styled(" quit ", label_style),
    ]);

    let footer = Paragraph::new(Line::from(spans));
    frame.render_widget(footer, area);
}

/// Lines for one chat message: a bold role label, one line per newline-
/// separated segment of the text, and a trailing blank separator.
fn message_lines(msg: &Message) -> Vec<Line<'static>> {
    let (label, color) = match msg.sender {
        Sender::User => ("You:", Color::Cyan),
        Sender::Assistant => ("Gemini:", Color::Yellow),
    };

    let mut lines = vec![Line::from(Span::styled(
        label,
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    ))];

    for line in msg.text.lines() {
        lines.push(Line::from(line.to_string()));
    }

    lines.push(Line::default());
    lines
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    // Store chat area dimensions for scroll calculations (inner size minus borders)
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Conversation ");

    let chat_text = if app.messages.is_empty() && !app.is_busy() {
        Text::from(Span::styled(
            "Ask Gemini anything...",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        let mut lines: Vec<Line> = Vec::new();

        for msg in &app.messages {
            lines.extend(message_lines(msg));
        }

        if app.is_busy() {
            lines.push(Line::from(Span::styled(
                "Gemini:",
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )));
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("Thinking{}", dots),
                Style::default()
                    .fg(Color::DarkGray)
                    .add_modifier(Modifier::ITALIC),
            )));
        }

        Text::from(lines)
    };

    let chat = Paragraph::new(chat_text)
        .block(chat_block)
        .wrap(Wrap { trim: true })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);

    // Render scrollbar when the transcript overflows the view
    let total_lines = app.total_chat_lines(app.chat_width.max(1));
    if total_lines > app.chat_height {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("^"))
            .end_symbol(Some("v"));

        let mut scrollbar_state =
            ScrollbarState::new(total_lines as usize).position(app.chat_scroll as usize);

        frame.render_stateful_widget(
            scrollbar,
            area.inner(ratatui::layout::Margin {
                vertical: 1,
                horizontal: 0,
            }),
            &mut scrollbar_state,
        );
    }
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if app.is_busy() {
            Color::DarkGray
        } else {
            Color::Yellow
        }))
        .title(" Message ");

    let inner_width = area.width.saturating_sub(2) as usize;
    let visible_rows = app.input_height() as usize;
    let (cursor_row, cursor_col) = app.input_cursor_position();

    // Scroll offsets to keep the cursor visible
    let col_offset = if inner_width == 0 {
        0
    } else if cursor_col as usize >= inner_width {
        cursor_col as usize - inner_width + 1
    } else {
        0
    };
    let row_offset = (cursor_row as usize).saturating_sub(visible_rows.saturating_sub(1));

    let visible_lines: Vec<Line> = app
        .input
        .split('\n')
        .skip(row_offset)
        .take(visible_rows)
        .map(|line| {
            Line::from(
                line.chars()
                    .skip(col_offset)
                    .take(inner_width)
                    .collect::<String>(),
            )
        })
        .collect();

    let input = Paragraph::new(visible_lines)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);

    frame.render_widget(input, area);

    frame.set_cursor_position((
        area.x + 1 + (cursor_col as usize - col_offset) as u16,
        area.y + 1 + (cursor_row as usize - row_offset) as u16,
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newlines_become_separate_rendered_lines() {
        let msg = Message {
            sender: Sender::User,
            text: "a\nb".to_string(),
        };

        let lines = message_lines(&msg);

        // label, "a", "b", blank separator
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1].spans[0].content, "a");
        assert_eq!(lines[2].spans[0].content, "b");
    }

    #[test]
    fn single_line_message_renders_one_segment() {
        let msg = Message {
            sender: Sender::Assistant,
            text: "Hi".to_string(),
        };

        let lines = message_lines(&msg);

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].spans[0].content, "Gemini:");
        assert_eq!(lines[1].spans[0].content, "Hi");
    }
}
