//! HelpOverlay component — centered popup with the keyboard reference.

use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyEventKind};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

use crate::{
    action::{Action, ComponentId},
    app_state::AppState,
    component::Component,
    theme::{C_MUTED, C_OVERLAY_BG, C_PANEL_BORDER, C_PRIMARY, C_SECONDARY},
};

const SECTIONS: &[(&str, &[(&str, &str)])] = &[
    (
        "playback",
        &[
            ("space", "play / pause"),
            ("n / p", "next / previous track"),
            ("0", "restart track"),
            (", / .", "seek -10s / +10s"),
            ("- / +", "volume down / up"),
            ("m", "mute"),
            ("s / r", "toggle shuffle / cycle repeat"),
            ("D", "transfer playback to configured device"),
            ("d", "list devices"),
            ("u", "refresh state and playlists"),
        ],
    ),
    (
        "panes",
        &[
            ("tab / shift-tab", "focus next / previous pane"),
            ("1 – 5", "now playing, album, queue, playlists, search"),
            ("↑ / ↓  or  j / k", "move selection"),
            ("enter", "play selection"),
            ("e", "add selected track to queue"),
            ("l", "save / unsave selected track"),
            ("a / x", "add / remove playing track (playlists)"),
            ("f", "filter focused list"),
            ("J", "jump to playing track"),
        ],
    ),
    (
        "search & ui",
        &[
            ("/", "search (^T track, ^A album, ^R artist)"),
            ("L / K", "toggle log panel / keys bar"),
            ("?", "toggle this help"),
            ("q / Ctrl+C", "quit"),
        ],
    ),
];

pub struct HelpOverlay {
    pub visible: bool,
}

impl HelpOverlay {
    pub fn new() -> Self {
        Self { visible: false }
    }

    pub fn toggle(&mut self) {
        self.visible = !self.visible;
    }

    fn lines() -> Vec<Line<'static>> {
        let mut lines = vec![Line::from(Span::styled(
            " keyboard shortcuts",
            Style::default().fg(C_PRIMARY).add_modifier(Modifier::BOLD),
        ))];
        for &(title, rows) in SECTIONS {
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                format!(" {}", title),
                Style::default().fg(C_MUTED).add_modifier(Modifier::BOLD),
            )));
            lines.extend(rows.iter().map(|&(key, desc)| help_row(key, desc)));
        }
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            " press ? or esc to close",
            Style::default().fg(C_MUTED),
        )));
        lines
    }
}

impl Default for HelpOverlay {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for HelpOverlay {
    fn id(&self) -> ComponentId {
        ComponentId::HelpOverlay
    }

    /// Swallows every key while open.
    fn handle_key(&mut self, key: KeyEvent, _state: &AppState) -> Vec<Action> {
        if key.kind == KeyEventKind::Release || !self.visible {
            return vec![];
        }
        match key.code {
            KeyCode::Char('?') | KeyCode::Char('q') | KeyCode::Esc => vec![Action::ToggleHelp],
            _ => vec![],
        }
    }

    fn on_action(&mut self, action: &Action, _state: &AppState) -> Vec<Action> {
        if let Action::ToggleHelp = action {
            self.toggle();
        }
        vec![]
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, _focused: bool, _state: &AppState) {
        if !self.visible {
            return;
        }
        let lines = Self::lines();
        let popup = centered_rect(64, lines.len() as u16 + 2, area);
        frame.render_widget(Clear, popup);
        frame.render_widget(
            Paragraph::new(lines).block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(C_PANEL_BORDER))
                    .style(Style::default().bg(C_OVERLAY_BG)),
            ),
            popup,
        );
    }
}

fn help_row(key: &'static str, desc: &'static str) -> Line<'static> {
    Line::from(vec![
        Span::raw(" "),
        Span::styled(
            format!("{:<18}", key),
            Style::default().fg(C_PRIMARY).add_modifier(Modifier::BOLD),
        ),
        Span::styled(desc, Style::default().fg(C_SECONDARY)),
    ])
}

fn centered_rect(percent_x: u16, height: u16, r: Rect) -> Rect {
    let vert = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(height.min(r.height)),
            Constraint::Min(0),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vert[1])[1]
}
