//! The demo binary's TUI shell: a chat pane, a peers sidebar, and a
//! one-line table/board summary. This is the thinnest possible window onto
//! the sync core — it never draws boards, markers, or fog; those stay
//! opaque to this crate.

use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};

use crate::peer_link::PcState;
use crate::theme::Theme;

/// One line in the chat pane's history.
pub enum ChatLine {
    System(String),
    Chat { display_name: String, text: String },
}

pub struct PeerRow {
    pub display_name: String,
    pub pc_state: PcState,
}

/// All state the UI needs to render. The event loop owns a `&mut App` and
/// mutates it in response to keyboard/network/tick events; rendering takes
/// only an immutable reference.
pub struct App {
    pub messages: Vec<ChatLine>,
    pub input: String,
    pub cursor_pos: usize,
    pub should_quit: bool,
    pub peers: Vec<PeerRow>,
    pub table_name: String,
    pub board_summary: String,
}

impl App {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            messages: Vec::new(),
            input: String::new(),
            cursor_pos: 0,
            should_quit: false,
            peers: Vec::new(),
            table_name: table_name.into(),
            board_summary: "no boards yet".to_string(),
        }
    }

    pub fn push_system_message(&mut self, message: impl Into<String>) {
        self.messages.push(ChatLine::System(message.into()));
    }

    pub fn push_chat_message(&mut self, display_name: impl Into<String>, text: impl Into<String>) {
        self.messages.push(ChatLine::Chat {
            display_name: display_name.into(),
            text: text.into(),
        });
    }

    pub fn set_board_summary(&mut self, board_count: usize, marker_count: usize) {
        self.board_summary = format!("{board_count} board(s), {marker_count} marker(s)");
    }

    /// Handle one key press. Returns the submitted line on Enter, `None`
    /// otherwise.
    pub fn handle_key_press(&mut self, key_code: crossterm::event::KeyCode) -> Option<String> {
        use crossterm::event::KeyCode;
        match key_code {
            KeyCode::Esc => {
                self.should_quit = true;
                None
            }
            KeyCode::Enter => {
                let text: String = self.input.drain(..).collect();
                self.cursor_pos = 0;
                if text.is_empty() {
                    None
                } else {
                    Some(text)
                }
            }
            KeyCode::Backspace => {
                if self.cursor_pos > 0 {
                    self.cursor_pos -= 1;
                    self.input.remove(self.cursor_pos);
                }
                None
            }
            KeyCode::Left => {
                self.cursor_pos = self.cursor_pos.saturating_sub(1);
                None
            }
            KeyCode::Right => {
                if self.cursor_pos < self.input.len() {
                    self.cursor_pos += 1;
                }
                None
            }
            KeyCode::Char(c) => {
                self.input.insert(self.cursor_pos, c);
                self.cursor_pos += 1;
                None
            }
            _ => None,
        }
    }
}

fn pc_state_tag(state: PcState) -> (&'static str, ratatui::style::Color) {
    match state {
        PcState::New | PcState::Connecting => ("[connecting]", ratatui::style::Color::Yellow),
        PcState::Connected => ("[connected]", ratatui::style::Color::Green),
        PcState::Disconnected => ("[disconnected]", ratatui::style::Color::Yellow),
        PcState::Failed => ("[failed]", ratatui::style::Color::Red),
        PcState::Closed => ("[closed]", ratatui::style::Color::DarkGray),
    }
}

pub fn render_ui(frame: &mut ratatui::Frame, app: &App, theme: &Theme) {
    let rows = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(1),
        Constraint::Length(3),
    ])
    .split(frame.area());

    let summary = Paragraph::new(Line::from(vec![
        Span::styled(app.table_name.as_str(), Style::default().fg(theme.title)),
        Span::raw(" — "),
        Span::styled(app.board_summary.as_str(), Style::default().fg(theme.text_dim)),
    ]));
    frame.render_widget(summary, rows[0]);

    let top_panes = Layout::horizontal([Constraint::Min(1), Constraint::Length(28)]).split(rows[1]);

    let message_lines: Vec<Line> = app
        .messages
        .iter()
        .map(|msg| match msg {
            ChatLine::System(text) => Line::from(Span::styled(
                format!("[system] {text}"),
                Style::default().fg(theme.text_muted).add_modifier(Modifier::ITALIC),
            )),
            ChatLine::Chat { display_name, text } => Line::from(vec![
                Span::styled(
                    display_name.as_str(),
                    Style::default().fg(theme.nickname).add_modifier(Modifier::BOLD),
                ),
                Span::raw(format!(": {text}")),
            ]),
        })
        .collect();

    let visible = top_panes[0].height.saturating_sub(2) as usize;
    let scroll_offset = message_lines.len().saturating_sub(visible) as u16;
    let messages_widget = Paragraph::new(message_lines)
        .scroll((scroll_offset, 0))
        .block(Block::default().borders(Borders::ALL).title("chat"));
    frame.render_widget(messages_widget, top_panes[0]);

    let peer_lines: Vec<Line> = app
        .peers
        .iter()
        .map(|peer| {
            let (tag, tag_color) = pc_state_tag(peer.pc_state);
            Line::from(vec![
                Span::styled(format!("{tag} "), Style::default().fg(tag_color)),
                Span::styled(peer.display_name.as_str(), Style::default().fg(theme.peer_name)),
            ])
        })
        .collect();
    let peers_widget = Paragraph::new(peer_lines)
        .block(Block::default().borders(Borders::ALL).title("peers"));
    frame.render_widget(peers_widget, top_panes[1]);

    let input_widget =
        Paragraph::new(format!("> {}", app.input)).block(Block::default().borders(Borders::ALL));
    frame.render_widget(input_widget, rows[2]);
    frame.set_cursor_position((rows[2].x + 2 + app.cursor_pos as u16, rows[2].y + 1));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyCode;

    #[test]
    fn enter_on_nonempty_input_drains_and_returns_it() {
        let mut app = App::new("Table");
        for c in "hello".chars() {
            app.handle_key_press(KeyCode::Char(c));
        }
        let submitted = app.handle_key_press(KeyCode::Enter);
        assert_eq!(submitted, Some("hello".to_string()));
        assert!(app.input.is_empty());
    }

    #[test]
    fn enter_on_empty_input_returns_none() {
        let mut app = App::new("Table");
        assert_eq!(app.handle_key_press(KeyCode::Enter), None);
    }

    #[test]
    fn esc_sets_should_quit() {
        let mut app = App::new("Table");
        app.handle_key_press(KeyCode::Esc);
        assert!(app.should_quit);
    }

    #[test]
    fn backspace_removes_before_cursor() {
        let mut app = App::new("Table");
        for c in "ab".chars() {
            app.handle_key_press(KeyCode::Char(c));
        }
        app.handle_key_press(KeyCode::Backspace);
        assert_eq!(app.input, "a");
    }

    #[test]
    fn board_summary_formats_counts() {
        let mut app = App::new("Table");
        app.set_board_summary(2, 5);
        assert_eq!(app.board_summary, "2 board(s), 5 marker(s)");
    }
}
