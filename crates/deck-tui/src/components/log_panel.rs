//! LogPanel component — collapsible log viewer.
//!
//! Collapsed: the latest notice of this session on one line.
//! Expanded: the tail of deck.log, scrollable, colored by level.

use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyEventKind, MouseEvent, MouseEventKind};
use ratatui::{
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Clear, Paragraph},
    Frame,
};

use crate::{
    action::{Action, ComponentId},
    app_state::AppState,
    component::Component,
    theme::{C_MUTED, C_SECONDARY, C_TOAST_ERROR, C_TOAST_INFO, C_TOAST_WARNING},
    widgets::{pane_chrome::pane_chrome, text::truncate},
};

/// One line of deck.log split into its parts.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub time: Option<String>,
    pub level: Option<String>,
    pub message: String,
}

impl LogEntry {
    fn level_color(&self) -> Color {
        match self.level.as_deref() {
            Some("ERROR") => C_TOAST_ERROR,
            Some("WARN") => C_TOAST_WARNING,
            Some("INFO") => C_TOAST_INFO,
            _ => C_MUTED,
        }
    }
}

/// Split `2026-10-19T09:12:44.120Z  INFO deck::bus: bus: …` into
/// time / level / message, dropping the module path.
pub fn parse_log_line(raw: &str) -> LogEntry {
    let mut rest = raw.trim();

    let mut time = None;
    if let Some((tok, rem)) = rest.split_once(char::is_whitespace) {
        if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(tok) {
            time = Some(dt.with_timezone(&chrono::Local).format("%H:%M:%S").to_string());
            rest = rem.trim_start();
        }
    }

    let mut level = None;
    if let Some((tok, rem)) = rest.split_once(char::is_whitespace) {
        if matches!(tok, "TRACE" | "DEBUG" | "INFO" | "WARN" | "ERROR") {
            level = Some(tok.to_string());
            rest = rem.trim_start();
        }
    }

    // The module target only follows a level.
    if level.is_some() {
        if let Some((target, msg)) = rest.split_once(": ") {
            if target
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
            {
                rest = msg;
            }
        }
    }

    LogEntry {
        time,
        level,
        message: rest.to_string(),
    }
}

pub struct LogPanel {
    pub expanded: bool,
    pub scroll: usize,
    last_line_count: usize,
}

impl LogPanel {
    pub fn new() -> Self {
        Self {
            expanded: false,
            scroll: 0,
            last_line_count: 0,
        }
    }

    pub fn toggle(&mut self) {
        self.expanded = !self.expanded;
        if self.expanded {
            self.scroll = usize::MAX;
        }
    }

    fn scroll_by(&mut self, delta: isize) {
        self.scroll = self.scroll.saturating_add_signed(delta);
    }
}

impl Default for LogPanel {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for LogPanel {
    fn id(&self) -> ComponentId {
        ComponentId::LogPanel
    }

    fn handle_key(&mut self, key: KeyEvent, _state: &AppState) -> Vec<Action> {
        if key.kind == KeyEventKind::Release || !self.expanded {
            return vec![];
        }
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => self.scroll_by(-1),
            KeyCode::Down | KeyCode::Char('j') => self.scroll_by(1),
            KeyCode::PageUp => self.scroll_by(-10),
            KeyCode::PageDown => self.scroll_by(10),
            KeyCode::Home | KeyCode::Char('g') => self.scroll = 0,
            KeyCode::End | KeyCode::Char('G') => self.scroll = usize::MAX,
            KeyCode::Esc => return vec![Action::ToggleLogs],
            _ => {}
        }
        vec![]
    }

    fn handle_mouse(&mut self, event: MouseEvent, _area: Rect, _state: &AppState) -> Vec<Action> {
        if self.expanded {
            match event.kind {
                MouseEventKind::ScrollUp => self.scroll_by(-1),
                MouseEventKind::ScrollDown => self.scroll_by(1),
                _ => {}
            }
        }
        vec![]
    }

    fn on_action(&mut self, action: &Action, _state: &AppState) -> Vec<Action> {
        if let Action::ToggleLogs = action {
            self.toggle();
        }
        vec![]
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, focused: bool, state: &AppState) {
        if area.height == 0 {
            return;
        }
        frame.render_widget(Clear, area);

        if !self.expanded || area.height <= 2 {
            let last = state.logs.last().map(String::as_str).unwrap_or("(no notices)");
            let width = area.width.saturating_sub(5) as usize;
            frame.render_widget(
                Paragraph::new(Line::from(vec![
                    Span::styled(" log ", Style::default().fg(C_MUTED)),
                    Span::styled(truncate(last, width), Style::default().fg(C_SECONDARY)),
                ])),
                area,
            );
            return;
        }

        let block = pane_chrome("log", None, focused, None);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let lines = &state.tui_log_lines;
        if lines.is_empty() {
            frame.render_widget(
                Paragraph::new(Span::styled("  no log entries yet", Style::default().fg(C_MUTED))),
                inner,
            );
            return;
        }

        let height = inner.height as usize;
        let max_scroll = lines.len().saturating_sub(height);
        // Follow the tail while the view sits at the bottom.
        if lines.len() > self.last_line_count && self.scroll >= max_scroll.saturating_sub(1) {
            self.scroll = usize::MAX;
        }
        self.last_line_count = lines.len();
        self.scroll = self.scroll.min(max_scroll);

        let width = inner.width as usize;
        let rendered: Vec<Line> = lines
            .iter()
            .skip(self.scroll)
            .take(height)
            .map(|raw| {
                let entry = parse_log_line(raw);
                let color = entry.level_color();
                let mut spans = Vec::new();
                if let Some(t) = &entry.time {
                    spans.push(Span::styled(format!(" {} ", t), Style::default().fg(C_MUTED)));
                }
                if let Some(l) = &entry.level {
                    spans.push(Span::styled(format!("{:<5} ", l), Style::default().fg(color)));
                }
                let used: usize = spans.iter().map(|s| s.width()).sum();
                spans.push(Span::styled(
                    truncate(&entry.message, width.saturating_sub(used)),
                    Style::default().fg(C_SECONDARY),
                ));
                Line::from(spans)
            })
            .collect();

        frame.render_widget(Paragraph::new(rendered), inner);
    }
}
