//! NowPlaying component — the song box.
//!
//! Row 1: `♥ title by artist | album (year)`.
//! Row 2: progress bar driven by the local clock.
//! Row 3: shuffle / repeat / volume / device.

use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use deck_proto::protocol::{Command, PlaybackSnapshot, RepeatMode};

use crate::{
    action::{Action, ComponentId},
    app_state::AppState,
    component::Component,
    theme::{
        C_ACCENT, C_ALBUM, C_ARTIST, C_BADGE_ON, C_LIKED, C_MUTED, C_PAUSED, C_PLAYING,
        C_PRIMARY, C_SECONDARY,
    },
    widgets::{
        pane_chrome::{pane_chrome, Badge},
        progress_bar::draw_progress,
        text::truncate,
    },
};

/// Seek step for ← / → (Shift = ×6).
pub const SEEK_STEP_MS: i64 = 10_000;
/// Volume step for ↑ / ↓ and + / -.
pub const VOLUME_STEP: i64 = 5;

pub struct NowPlaying;

impl NowPlaying {
    pub fn new() -> Self {
        Self
    }

    fn title_line(state: &AppState, width: usize) -> Line<'static> {
        let Some(track) = state.current_track() else {
            return Line::from(Span::styled("nothing playing", Style::default().fg(C_MUTED)));
        };

        let mut spans = Vec::new();
        if state.is_liked(&track.id) {
            spans.push(Span::styled("♥ ", Style::default().fg(C_LIKED)));
        }
        spans.push(Span::styled(
            truncate(&track.name, width / 2),
            Style::default().fg(C_PRIMARY).add_modifier(Modifier::BOLD),
        ));
        let artists = track.artist_line();
        if !artists.is_empty() {
            spans.push(Span::styled(" by ", Style::default().fg(C_MUTED)));
            spans.push(Span::styled(
                truncate(&artists, width / 4),
                Style::default().fg(C_ARTIST),
            ));
        }
        if let Some(album) = &track.album {
            spans.push(Span::styled(" | ", Style::default().fg(C_MUTED)));
            let year = album.release_year();
            let label = if year.is_empty() {
                album.name.clone()
            } else {
                format!("{} ({})", album.name, year)
            };
            spans.push(Span::styled(
                truncate(&label, width / 4),
                Style::default().fg(C_ALBUM),
            ));
        }
        Line::from(spans)
    }

    fn controls_line(snapshot: &PlaybackSnapshot) -> Line<'static> {
        let on_off = |on: bool| {
            if on {
                Style::default().fg(C_BADGE_ON).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(C_MUTED)
            }
        };

        let repeat = snapshot.repeat_mode.as_str();
        let volume = snapshot
            .volume_percent
            .map_or("--".to_string(), |v| format!("{}%", v));

        let mut spans = vec![
            Span::styled("shuffle ", Style::default().fg(C_SECONDARY)),
            Span::styled(
                if snapshot.shuffle_enabled { "on" } else { "off" },
                on_off(snapshot.shuffle_enabled),
            ),
            Span::styled("   repeat ", Style::default().fg(C_SECONDARY)),
            Span::styled(repeat, on_off(snapshot.repeat_mode != RepeatMode::Off)),
            Span::styled("   volume ", Style::default().fg(C_SECONDARY)),
            Span::styled(volume, Style::default().fg(C_PRIMARY)),
        ];
        if let Some(device) = &snapshot.device {
            spans.push(Span::styled("   on ", Style::default().fg(C_SECONDARY)));
            spans.push(Span::styled(device.name.clone(), Style::default().fg(C_PRIMARY)));
        }
        Line::from(spans)
    }
}

impl Default for NowPlaying {
    fn default() -> Self {
        Self::new()
    }
}

/// Relative seek from what the user currently sees.
pub fn seek_by(state: &AppState, delta_ms: i64) -> Action {
    let position_ms = state.elapsed_ms() as i64 + delta_ms;
    Action::SendCommand(Command::Seek { position_ms })
}

impl Component for NowPlaying {
    fn id(&self) -> ComponentId {
        ComponentId::NowPlaying
    }

    fn handle_key(&mut self, key: KeyEvent, state: &AppState) -> Vec<Action> {
        if key.kind == KeyEventKind::Release {
            return vec![];
        }
        let coarse = key.modifiers.contains(KeyModifiers::SHIFT);
        let seek = if coarse { SEEK_STEP_MS * 6 } else { SEEK_STEP_MS };
        let command = match key.code {
            KeyCode::Enter => Command::TogglePlay,
            KeyCode::Left => return vec![seek_by(state, -seek)],
            KeyCode::Right => return vec![seek_by(state, seek)],
            KeyCode::Up | KeyCode::Char('k') => Command::AdjustVolume {
                delta: VOLUME_STEP,
            },
            KeyCode::Down | KeyCode::Char('j') => Command::AdjustVolume {
                delta: -VOLUME_STEP,
            },
            KeyCode::Char('l') => match state.current_track() {
                Some(track) => Command::ToggleSaved {
                    track_id: track.id.clone(),
                    name: track.name.clone(),
                },
                None => return vec![],
            },
            _ => return vec![],
        };
        vec![Action::SendCommand(command)]
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, focused: bool, state: &AppState) {
        let badge = match state.snapshot() {
            Some(s) if s.item.is_some() && s.is_playing => Some(Badge {
                text: "▶ playing",
                color: C_PLAYING,
            }),
            Some(s) if s.item.is_some() => Some(Badge {
                text: "⏸ paused",
                color: C_PAUSED,
            }),
            _ if !state.connected => Some(Badge {
                text: "offline",
                color: C_ACCENT,
            }),
            _ => None,
        };
        let block = pane_chrome("now playing", Some('1'), focused, badge);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        if inner.height == 0 {
            return;
        }

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Length(1),
            ])
            .split(inner);

        let width = inner.width as usize;
        frame.render_widget(Paragraph::new(Self::title_line(state, width)), rows[0]);
        draw_progress(frame, rows[1], state.progress);
        if let Some(snapshot) = state.snapshot() {
            frame.render_widget(Paragraph::new(Self::controls_line(snapshot)), rows[2]);
        } else if let Some(err) = &state.last_error {
            frame.render_widget(
                Paragraph::new(Span::styled(truncate(err, width), Style::default().fg(C_ACCENT))),
                rows[2],
            );
        }
    }
}
