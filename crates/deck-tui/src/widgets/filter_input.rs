//! FilterInput — wraps tui-input as a one-line prompt (list filters, search).

use ratatui::crossterm::event::{Event, KeyCode, KeyEvent};
use ratatui::{
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};
use tui_input::{backend::crossterm::EventHandler, Input};

use crate::theme::{C_INPUT_BG, C_INPUT_FG, C_MUTED};

#[derive(Debug, PartialEq)]
pub enum FilterAction {
    Changed(String),
    Confirmed(String),
    Cancelled,
}

pub struct FilterInput {
    input: Input,
    active: bool,
    prompt: &'static str,
    placeholder: String,
}

impl FilterInput {
    pub fn new(prompt: &'static str, placeholder: impl Into<String>) -> Self {
        Self {
            input: Input::default(),
            active: false,
            prompt,
            placeholder: placeholder.into(),
        }
    }

    pub fn activate(&mut self) {
        self.active = true;
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }

    pub fn clear(&mut self) {
        self.input = Input::default();
    }

    pub fn text(&self) -> &str {
        self.input.value()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_placeholder(&mut self, placeholder: impl Into<String>) {
        self.placeholder = placeholder.into();
    }

    /// Handle a key event. Returns what happened.
    ///
    /// Esc clears the text first; a second Esc on an empty input closes it.
    pub fn handle_key(&mut self, key: KeyEvent) -> FilterAction {
        match key.code {
            KeyCode::Esc => {
                if !self.input.value().is_empty() {
                    self.input = Input::default();
                    FilterAction::Changed(String::new())
                } else {
                    self.deactivate();
                    FilterAction::Cancelled
                }
            }
            KeyCode::Enter => {
                self.deactivate();
                FilterAction::Confirmed(self.input.value().to_string())
            }
            _ => {
                self.input.handle_event(&Event::Key(key));
                FilterAction::Changed(self.input.value().to_string())
            }
        }
    }

    /// Render the prompt line into `area`.
    pub fn draw(&self, frame: &mut Frame, area: Rect) {
        let prefix = format!("{} ", self.prompt);
        let prefix_w = prefix.chars().count();
        let scroll = self
            .input
            .visual_scroll((area.width as usize).saturating_sub(prefix_w + 1));
        let value = self.input.value();
        let display = if value.is_empty() {
            Span::styled(
                format!("{}{}", prefix, self.placeholder),
                Style::default().fg(C_MUTED),
            )
        } else {
            let visible: String = value.chars().skip(scroll).collect();
            Span::styled(
                format!("{}{}", prefix, visible),
                Style::default().fg(C_INPUT_FG),
            )
        };

        let paragraph =
            Paragraph::new(Line::from(vec![display])).style(Style::default().bg(C_INPUT_BG));
        frame.render_widget(paragraph, area);

        if self.active && area.width > 0 {
            let cursor_x =
                area.x + (prefix_w + self.input.visual_cursor().saturating_sub(scroll)) as u16;
            frame.set_cursor_position((cursor_x.min(area.x + area.width - 1), area.y));
        }
    }
}
