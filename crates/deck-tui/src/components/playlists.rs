//! Playlists component — the user's playlists, with the playing one marked.
//!
//! Enter starts the playlist at a random track.  `a` / `x` add the playing
//! track to, or remove it from, the selected playlist.

use ratatui::crossterm::event::{
    KeyCode, KeyEvent, KeyEventKind, MouseButton, MouseEvent, MouseEventKind,
};
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{List, ListItem, ListState, Paragraph},
    Frame,
};

use deck_proto::protocol::{Command, PlaylistSummary};

use crate::{
    action::{Action, ComponentId},
    app_state::AppState,
    component::Component,
    theme::{C_MUTED, C_PLAYING, C_PRIMARY, C_SECONDARY, C_SELECTION_BG},
    widgets::{
        filter_input::{FilterAction, FilterInput},
        pane_chrome::pane_chrome,
        scrollable_list::ScrollableList,
        text::fit,
    },
};

pub struct Playlists {
    pub list: ScrollableList<PlaylistSummary>,
    filter_input: FilterInput,
    list_state: ListState,
}

impl Playlists {
    pub fn new() -> Self {
        Self {
            list: ScrollableList::new(|p: &PlaylistSummary, q: &str| {
                p.name.to_lowercase().contains(&q.to_lowercase())
            }),
            filter_input: FilterInput::new("/", "playlist name…"),
            list_state: ListState::default(),
        }
    }

    /// Add/remove the playing track against the selected playlist.
    fn edit(&self, state: &AppState, add: bool) -> Vec<Action> {
        let (Some(playlist), Some(track)) = (self.list.selected_item(), state.current_track())
        else {
            return vec![];
        };
        let playlist_id = playlist.id.clone();
        let playlist_name = playlist.name.clone();
        let track_uri = track.uri.clone();
        let track_name = track.name.clone();
        let command = if add {
            Command::AddToPlaylist {
                playlist_id,
                playlist_name,
                track_uri,
                track_name,
            }
        } else {
            Command::RemoveFromPlaylist {
                playlist_id,
                playlist_name,
                track_uri,
                track_name,
            }
        };
        vec![Action::SendCommand(command)]
    }

    fn play_selected(&self) -> Vec<Action> {
        match self.list.selected_item() {
            Some(p) => vec![Action::SendCommand(Command::PlayPlaylist {
                uri: p.uri.clone(),
                track_count: p.track_count,
            })],
            None => vec![],
        }
    }
}

impl Default for Playlists {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for Playlists {
    fn id(&self) -> ComponentId {
        ComponentId::Playlists
    }

    fn handle_key(&mut self, key: KeyEvent, state: &AppState) -> Vec<Action> {
        if key.kind == KeyEventKind::Release {
            return vec![];
        }

        if self.filter_input.is_active() {
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

        match key.code {
            KeyCode::Up | KeyCode::Char('k') => self.list.select_up(1),
            KeyCode::Down | KeyCode::Char('j') => self.list.select_down(1),
            KeyCode::PageUp => self.list.select_up(10),
            KeyCode::PageDown => self.list.select_down(10),
            KeyCode::Home | KeyCode::Char('g') => self.list.select_first(),
            KeyCode::End | KeyCode::Char('G') => self.list.select_last(),
            KeyCode::Enter => return self.play_selected(),
            KeyCode::Char('a') => return self.edit(state, true),
            KeyCode::Char('x') => return self.edit(state, false),
            KeyCode::Char('f') => {
                self.filter_input.activate();
                return vec![Action::OpenFilter];
            }
            _ => {}
        }
        vec![]
    }

    fn handle_mouse(&mut self, event: MouseEvent, area: Rect, _state: &AppState) -> Vec<Action> {
        match event.kind {
            MouseEventKind::ScrollUp => self.list.select_up(1),
            MouseEventKind::ScrollDown => self.list.select_down(1),
            MouseEventKind::Down(MouseButton::Left) => {
                let rel_row = event.row.saturating_sub(area.y + 1) as usize;
                self.list.handle_click(rel_row);
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
        let first_load = self.list.items.is_empty();
        self.list.set_items(state.playlists().to_vec());
        if first_load {
            if let Some(active) = state.active_playlist_uri() {
                self.list.select_where(|p| p.uri == active);
            }
        }
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, focused: bool, state: &AppState) {
        let block = pane_chrome("playlists", Some('4'), focused, None);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        if self.list.is_empty() {
            let msg = if self.list.filter.is_empty() {
                "  no playlists"
            } else {
                "  no playlists match filter"
            };
            frame.render_widget(
                Paragraph::new(Span::styled(msg, Style::default().fg(C_MUTED))),
                inner,
            );
        } else {
            let active = state.active_playlist_uri();
            let width = inner.width as usize;
            let content_h = inner.height as usize;
            self.list.ensure_visible(content_h);
            let sel_in_view = self.list.selected_in_view(content_h);

            let items: Vec<ListItem> = self
                .list
                .visible_items(content_h)
                .into_iter()
                .enumerate()
                .map(|(row, (_, p))| {
                    let is_active = active == Some(p.uri.as_str());
                    let selected = row == sel_in_view;
                    let color = if is_active {
                        C_PLAYING
                    } else if selected {
                        C_PRIMARY
                    } else {
                        C_SECONDARY
                    };
                    let mut style = Style::default().fg(color);
                    if is_active || selected {
                        style = style.add_modifier(Modifier::BOLD);
                    }
                    let count = format!(" {:>4}", p.track_count);
                    let line = Line::from(vec![
                        Span::styled(if is_active { "▶ " } else { "  " }, Style::default().fg(C_PLAYING)),
                        Span::styled(fit(&p.name, width.saturating_sub(2 + count.len()).max(4)), style),
                        Span::styled(count, Style::default().fg(C_MUTED)),
                    ]);
                    let item = ListItem::new(line);
                    if selected {
                        item.style(Style::default().bg(C_SELECTION_BG))
                    } else {
                        item
                    }
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

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use deck_proto::protocol::{
        ContextKind, ContextRef, PlaybackSnapshot, StateUpdate, Track,
    };
    use ratatui::crossterm::event::KeyModifiers;

    fn playlist(id: &str, name: &str, count: u32) -> PlaylistSummary {
        PlaylistSummary {
            id: id.into(),
            uri: format!("spotify:playlist:{}", id),
            name: name.into(),
            track_count: count,
            ..Default::default()
        }
    }

    fn state() -> AppState {
        let mut state = AppState::new();
        state.update = Some(Rc::new(StateUpdate {
            snapshot: PlaybackSnapshot {
                item: Some(Track {
                    id: "t1".into(),
                    uri: "spotify:track:t1".into(),
                    name: "Blue in Green".into(),
                    duration_ms: 1,
                    ..Default::default()
                }),
                context: Some(ContextRef {
                    kind: ContextKind::Playlist,
                    uri: "spotify:playlist:p2".into(),
                }),
                ..Default::default()
            },
            playlists: vec![playlist("p1", "Morning", 12), playlist("p2", "Late Night", 40)],
            ..Default::default()
        }));
        state
    }

    fn press(p: &mut Playlists, code: KeyCode, state: &AppState) -> Vec<Action> {
        p.handle_key(KeyEvent::new(code, KeyModifiers::NONE), state)
    }

    #[test]
    fn first_load_selects_the_playing_playlist() {
        let state = state();
        let mut playlists = Playlists::new();
        playlists.on_update(&state);
        assert_eq!(
            playlists.list.selected_item().map(|p| p.id.as_str()),
            Some("p2")
        );
    }

    #[test]
    fn enter_plays_playlist_with_its_track_count() {
        let state = state();
        let mut playlists = Playlists::new();
        playlists.on_update(&state);
        match press(&mut playlists, KeyCode::Enter, &state).as_slice() {
            [Action::SendCommand(Command::PlayPlaylist { uri, track_count })] => {
                assert_eq!(uri, "spotify:playlist:p2");
                assert_eq!(*track_count, 40);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn add_and_remove_target_the_playing_track() {
        let state = state();
        let mut playlists = Playlists::new();
        playlists.on_update(&state);
        press(&mut playlists, KeyCode::Up, &state);

        match press(&mut playlists, KeyCode::Char('a'), &state).as_slice() {
            [Action::SendCommand(Command::AddToPlaylist {
                playlist_name,
                track_uri,
                ..
            })] => {
                assert_eq!(playlist_name, "Morning");
                assert_eq!(track_uri, "spotify:track:t1");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            press(&mut playlists, KeyCode::Char('x'), &state).as_slice(),
            [Action::SendCommand(Command::RemoveFromPlaylist { .. })]
        ));
    }

    #[test]
    fn edits_need_a_playing_track() {
        let mut state = state();
        state.update = Some(Rc::new(StateUpdate {
            playlists: vec![playlist("p1", "Morning", 12)],
            ..Default::default()
        }));
        let mut playlists = Playlists::new();
        playlists.on_update(&state);
        assert!(press(&mut playlists, KeyCode::Char('a'), &state).is_empty());
    }
}
