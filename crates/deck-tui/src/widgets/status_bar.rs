//! Status bar — bottom line with connection state, mode, and keybindings.

use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use crate::theme::{C_ACCENT, C_MODE_NORMAL, C_MODE_SEARCH, C_MUTED, C_PLAYING};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputMode {
    Normal,
    /// Typing into a list filter.
    Filter,
    /// Typing a search query.
    Search,
}

impl InputMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Filter => "FILTER",
            Self::Search => "SEARCH",
        }
    }

    pub fn color(self) -> Color {
        match self {
            Self::Normal => C_MODE_NORMAL,
            Self::Filter | Self::Search => C_MODE_SEARCH,
        }
    }

    fn keys(self) -> &'static str {
        match self {
            Self::Normal => {
                " space play/pause  n/p next/prev  ,/. seek  -/+ vol  s shuffle  r repeat  / search  Tab/1-5 panes  L logs  ? help  q quit"
            }
            Self::Filter => " type to filter  ↑↓ move  Enter keep  Esc clear+close",
            Self::Search => " type query  ^T/^A/^R track/album/artist  Enter search  Esc cancel",
        }
    }
}

/// Draw the keybindings footer bar (one row).
pub fn draw_keys_bar(frame: &mut Frame, area: Rect, mode: InputMode, connected: bool) {
    let conn_span = if connected {
        Span::styled(" ●", Style::default().fg(C_PLAYING))
    } else {
        Span::styled(" ○", Style::default().fg(C_ACCENT))
    };

    let line = Line::from(vec![
        conn_span,
        Span::styled(
            format!(" {} ", mode.label()),
            Style::default()
                .fg(mode.color())
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(mode.keys(), Style::default().fg(C_MUTED)),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}
