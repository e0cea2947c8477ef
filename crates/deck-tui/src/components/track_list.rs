//! TrackList component — the browsed album and the up-next queue.
//!
//! Both panes render the same `num  name  m:ss  ♥` rows; they differ in where
//! the tracks come from and in what Enter does:
//! - album: play from the selected track, the rest of the album following;
//! - queue: play the selected track right now.

use std::time::Instant;

use ratatui::crossterm::event::{
    KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{List, ListItem, ListState, Paragraph},
    Frame,
};

use deck_proto::protocol::{Command, Track};

use crate::{
    action::{Action, ComponentId},
    app_state::AppState,
    component::Component,
    theme::{C_LIKED, C_MUTED, C_PLAYING, C_PRIMARY, C_SECONDARY, C_SELECTION_BG},
    widgets::{
        filter_input::{FilterAction, FilterInput},
        pane_chrome::{pane_chrome, Badge},
        progress_bar::fmt_ms,
        scrollable_list::ScrollableList,
        text::fit,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSource {
    Album,
    Queue,
}

pub struct TrackList {
    source: TrackSource,
    pub list: ScrollableList<Track>,
    filter_input: FilterInput,
    list_state: ListState,
    /// Current track id when the items were last synced.
    following: Option<String>,
    last_click: Option<(usize, Instant)>,
}

impl TrackList {
    pub fn new(source: TrackSource) -> Self {
        Self {
            source,
            list: ScrollableList::new(track_matches),
            filter_input: FilterInput::new("/", "track or artist…"),
            list_state: ListState::default(),
            following: None,
            last_click: None,
        }
    }

    fn tracks<'a>(&self, state: &'a AppState) -> &'a [Track] {
        match self.source {
            TrackSource::Album => state.album().map(|a| a.tracks.as_slice()).unwrap_or_default(),
            TrackSource::Queue => state.queue(),
        }
    }

    fn activate(&self) -> Vec<Action> {
        let Some(track) = self.list.selected_item() else {
            return vec![];
        };
        let command = match self.source {
            TrackSource::Album => Command::PlayInCollection {
                track_uri: track.uri.clone(),
            },
            TrackSource::Queue => Command::PlayTrack {
                uri: track.uri.clone(),
            },
        };
        vec![Action::SendCommand(command)]
    }

    fn row<'a>(
        &self,
        track: &'a Track,
        number: usize,
        selected: bool,
        width: usize,
        state: &AppState,
    ) -> ListItem<'a> {
        let is_current = state.current_track().is_some_and(|t| t.id == track.id);
        let liked = state.is_liked(&track.id);

        let num = match self.source {
            TrackSource::Album if track.track_number > 0 => track.track_number as usize,
            _ => number,
        };
        let marker = if is_current { "▶" } else { " " };
        let name_color = if is_current {
            C_PLAYING
        } else if selected {
            C_PRIMARY
        } else {
            C_SECONDARY
        };
        let mut name_style = Style::default().fg(name_color);
        if is_current || selected {
            name_style = name_style.add_modifier(Modifier::BOLD);
        }

        let name = match self.source {
            TrackSource::Album => track.name.clone(),
            TrackSource::Queue => format!("{} · {}", track.name, track.artist_line()),
        };

        let line = Line::from(vec![
            Span::styled(marker, Style::default().fg(C_PLAYING)),
            Span::styled(format!("{:>2} ", num), Style::default().fg(C_MUTED)),
            Span::styled(fit(&name, width.saturating_sub(12).max(4)), name_style),
            Span::styled(format!(" {:>5}", fmt_ms(track.duration_ms)), Style::default().fg(C_MUTED)),
            Span::styled(if liked { " ♥" } else { "  " }, Style::default().fg(C_LIKED)),
        ]);
        let item = ListItem::new(line);
        if selected {
            item.style(Style::default().bg(C_SELECTION_BG))
        } else {
            item
        }
    }
}

fn track_matches(track: &Track, q: &str) -> bool {
    let q = q.to_lowercase();
    let text = format!("{} {}", track.name, track.artist_line()).to_lowercase();
    q.split_whitespace().all(|term| text.contains(term))
}

impl Component for TrackList {
    fn id(&self) -> ComponentId {
        match self.source {
            TrackSource::Album => ComponentId::Album,
            TrackSource::Queue => ComponentId::Queue,
        }
    }

    fn handle_key(&mut self, key: KeyEvent, state: &AppState) -> Vec<Action> {
        if key.kind == KeyEventKind::Release {
            return vec![];
        }

        if self.filter_input.is_active() {
            match key.code {
                KeyCode::Up => {
                    self.list.select_up(1);
                    return vec![];
                }
                KeyCode::Down => {
                    self.list.select_down(1);
                    return vec![];
                }
                _ => {}
            }
            return match self.filter_input.handle_key(key) {
                FilterAction::Changed(q) => {
                    self.list.set_filter(&q);
                    vec![]
                }
                FilterAction::Confirmed(_) => vec![Action::CloseFilter],
                FilterAction::Cancelled => {
                    self.list.set_filter("");
                    vec![Action::CloseFilter]
                }
            };
        }

        let step = if key.modifiers.contains(KeyModifiers::SHIFT) { 5 } else { 1 };
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => self.list.select_up(step),
            KeyCode::Down | KeyCode::Char('j') => self.list.select_down(step),
            KeyCode::PageUp => self.list.select_up(10),
            KeyCode::PageDown => self.list.select_down(10),
            KeyCode::Home | KeyCode::Char('g') => self.list.select_first(),
            KeyCode::End | KeyCode::Char('G') => self.list.select_last(),
            KeyCode::Enter => return self.activate(),
            KeyCode::Char('e') => {
                if let Some(track) = self.list.selected_item() {
                    return vec![Action::SendCommand(Command::Enqueue {
                        uri: track.uri.clone(),
                    })];
                }
            }
            KeyCode::Char('l') => {
                if let Some(track) = self.list.selected_item() {
                    return vec![Action::SendCommand(Command::ToggleSaved {
                        track_id: track.id.clone(),
                        name: track.name.clone(),
                    })];
                }
            }
            KeyCode::Char('J') => {
                if let Some(current) = state.current_track() {
                    let id = current.id.clone();
                    self.list.select_where(|t| t.id == id);
                }
            }
            KeyCode::Char('f') => {
                self.filter_input.activate();
                return vec![Action::OpenFilter];
            }
            _ => {}
        }
        vec![]
    }

    fn handle_mouse(&mut self, event: MouseEvent, area: Rect, _state: &AppState) -> Vec<Action> {
        let rel_row = event.row.saturating_sub(area.y + 1) as usize; // +1 for border
        match event.kind {
            MouseEventKind::ScrollUp => self.list.select_up(1),
            MouseEventKind::ScrollDown => self.list.select_down(1),
            MouseEventKind::Down(MouseButton::Left) => {
                let now = Instant::now();
                let is_double = self
                    .last_click
                    .is_some_and(|(row, t)| row == rel_row && t.elapsed().as_millis() < 400);
                if self.list.handle_click(rel_row) && is_double {
                    self.last_click = None;
                    return self.activate();
                }
                self.last_click = Some((rel_row, now));
            }
            _ => {}
        }
        vec![]
    }

    fn on_action(&mut self, action: &Action, _state: &AppState) -> Vec<Action> {
        if let Action::CloseFilter = action {
            self.filter_input.deactivate();
        }
        vec![]
    }

    fn on_update(&mut self, state: &AppState) {
        let tracks = self.tracks(state).to_vec();
        self.list.set_items(tracks);

        // Follow the playing track when it changes, not on every refresh.
        let current = state.current_track().map(|t| t.id.clone());
        if current != self.following {
            if let Some(id) = &current {
                self.list.select_where(|t| &t.id == id);
            }
            self.following = current;
        }
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, focused: bool, state: &AppState) {
        let title = match self.source {
            TrackSource::Album => match state.album() {
                Some(album) if !album.name.is_empty() => {
                    let year = album.release_date.split('-').next().unwrap_or("");
                    if year.is_empty() {
                        format!("album · {}", album.name)
                    } else {
                        format!("album · {} ({})", album.name, year)
                    }
                }
                _ => "album".to_string(),
            },
            TrackSource::Queue => "up next".to_string(),
        };
        let (key, count) = match self.source {
            TrackSource::Album => ('2', self.list.len()),
            TrackSource::Queue => ('3', self.list.len()),
        };
        let count_text = count.to_string();
        let badge = (count > 0).then(|| Badge {
            text: &count_text,
            color: C_MUTED,
        });
        let block = pane_chrome(&title, Some(key), focused, badge);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        if self.list.is_empty() {
            let msg = if !self.list.filter.is_empty() {
                "  no tracks match filter"
            } else {
                match self.source {
                    TrackSource::Album => "  no album loaded",
                    TrackSource::Queue => "  queue is empty",
                }
            };
            frame.render_widget(
                Paragraph::new(Span::styled(msg, Style::default().fg(C_MUTED))),
                inner,
            );
        } else {
            let width = inner.width as usize;
            let content_h = inner.height as usize;
            self.list.ensure_visible(content_h);
            let sel_in_view = self.list.selected_in_view(content_h);
            let items: Vec<ListItem> = self
                .list
                .visible_items(content_h)
                .into_iter()
                .enumerate()
                .map(|(view_row, (orig_idx, track))| {
                    self.row(track, orig_idx + 1, view_row == sel_in_view, width, state)
                })
                .collect();

            self.list_state.select(Some(sel_in_view));
            frame.render_stateful_widget(List::new(items), inner, &mut self.list_state);
        }

        if self.filter_input.is_active() {
            let filter_area = Rect {
                y: inner.y + inner.height.saturating_sub(1),
                height: 1,
                ..inner
            };
            self.filter_input.draw(frame, filter_area);
        }
    }
}
