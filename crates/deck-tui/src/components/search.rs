//! Search component — query prompt in the top row, results as a centered
//! overlay once the sequencer publishes them.

use std::rc::Rc;

use ratatui::crossterm::event::{
    KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph},
    Frame,
};

use deck_proto::protocol::{AlbumRef, Artist, Command, SearchKind, SearchResults, Track};

use crate::{
    action::{Action, ComponentId},
    app_state::AppState,
    component::Component,
    theme::{
        C_ALBUM, C_ARTIST, C_MUTED, C_OVERLAY_BG, C_PANEL_BORDER_FOCUSED, C_PRIMARY,
        C_SECONDARY, C_SELECTION_BG,
    },
    widgets::{
        filter_input::{FilterAction, FilterInput},
        progress_bar::fmt_ms,
        scrollable_list::ScrollableList,
        text::{fit, truncate},
    },
};

/// One selectable line of the results overlay.
#[derive(Debug, Clone)]
pub enum ResultRow {
    Track(Track),
    Album(AlbumRef),
    Artist(Artist),
}

impl ResultRow {
    fn label(&self) -> &str {
        match self {
            Self::Track(t) => &t.name,
            Self::Album(a) => &a.name,
            Self::Artist(a) => &a.name,
        }
    }

    fn detail(&self) -> String {
        match self {
            Self::Track(t) => t.artist_line(),
            Self::Album(a) => {
                let artists = a
                    .artists
                    .iter()
                    .map(|x| x.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                match a.release_year() {
                    "" => artists,
                    year => format!("{} · {}", artists, year),
                }
            }
            Self::Artist(_) => String::new(),
        }
    }

    /// What Enter does on this row.
    fn play(&self) -> Command {
        match self {
            Self::Track(t) => Command::PlayTrack { uri: t.uri.clone() },
            Self::Album(a) => Command::PlayContext {
                context_uri: a.uri.clone(),
                offset: None,
            },
            Self::Artist(a) => Command::PlayContext {
                context_uri: a.uri.clone(),
                offset: None,
            },
        }
    }
}

pub fn result_rows(results: &SearchResults) -> Vec<ResultRow> {
    match results.kind {
        SearchKind::Track => results.tracks.iter().cloned().map(ResultRow::Track).collect(),
        SearchKind::Album => results.albums.iter().cloned().map(ResultRow::Album).collect(),
        SearchKind::Artist => results.artists.iter().cloned().map(ResultRow::Artist).collect(),
    }
}

pub struct Search {
    kind: SearchKind,
    input: FilterInput,
    results: Option<Rc<SearchResults>>,
    pub list: ScrollableList<ResultRow>,
    list_state: ListState,
    overlay_visible: bool,
}

impl Search {
    pub fn new() -> Self {
        Self {
            kind: SearchKind::Track,
            input: FilterInput::new("search:", SearchKind::Track.as_str()),
            results: None,
            list: ScrollableList::new(|r: &ResultRow, q: &str| {
                r.label().to_lowercase().contains(&q.to_lowercase())
            }),
            list_state: ListState::default(),
            overlay_visible: false,
        }
    }

    pub fn set_kind(&mut self, kind: SearchKind) {
        self.kind = kind;
        self.input.set_placeholder(kind.as_str());
    }

    pub fn is_typing(&self) -> bool {
        self.input.is_active()
    }

    pub fn overlay_visible(&self) -> bool {
        self.overlay_visible
    }

    /// True while keys must go here regardless of focus.
    pub fn captures_keys(&self) -> bool {
        self.is_typing() || self.overlay_visible
    }

    pub fn set_results(&mut self, results: Rc<SearchResults>) {
        self.list.set_items(result_rows(&results));
        self.list.select_first();
        self.results = Some(results);
        self.overlay_visible = true;
    }

    fn handle_prompt_key(&mut self, key: KeyEvent) -> Vec<Action> {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            let kind = match key.code {
                KeyCode::Char('t') => Some(SearchKind::Track),
                KeyCode::Char('a') => Some(SearchKind::Album),
                KeyCode::Char('r') => Some(SearchKind::Artist),
                _ => None,
            };
            if let Some(kind) = kind {
                self.set_kind(kind);
                return vec![];
            }
        }

        match self.input.handle_key(key) {
            FilterAction::Changed(_) => vec![],
            FilterAction::Confirmed(query) => {
                let query = query.trim().to_string();
                if query.is_empty() {
                    return vec![Action::CloseSearch];
                }
                vec![
                    Action::SendCommand(Command::Search {
                        query,
                        kind: self.kind,
                    }),
                    Action::CloseSearch,
                ]
            }
            FilterAction::Cancelled => vec![Action::CloseSearch],
        }
    }

    fn handle_overlay_key(&mut self, key: KeyEvent) -> Vec<Action> {
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => return vec![Action::CloseResults],
            KeyCode::Up | KeyCode::Char('k') => self.list.select_up(1),
            KeyCode::Down | KeyCode::Char('j') => self.list.select_down(1),
            KeyCode::PageUp => self.list.select_up(10),
            KeyCode::PageDown => self.list.select_down(10),
            KeyCode::Home | KeyCode::Char('g') => self.list.select_first(),
            KeyCode::End | KeyCode::Char('G') => self.list.select_last(),
            KeyCode::Enter => {
                if let Some(row) = self.list.selected_item() {
                    return vec![Action::SendCommand(row.play()), Action::CloseResults];
                }
            }
            KeyCode::Char('e') => {
                if let Some(ResultRow::Track(t)) = self.list.selected_item() {
                    return vec![Action::SendCommand(Command::Enqueue { uri: t.uri.clone() })];
                }
            }
            KeyCode::Char('/') => return vec![Action::CloseResults, Action::OpenSearch],
            _ => {}
        }
        vec![]
    }

    /// Draw the results overlay over `area` (the whole frame).
    pub fn draw_results(&mut self, frame: &mut Frame, area: Rect) {
        if !self.overlay_visible {
            return;
        }
        let Some(results) = self.results.clone() else {
            return;
        };

        let height = (self.list.len() as u16 + 2).clamp(5, area.height.saturating_sub(4).max(5));
        let popup = centered_rect(70, height, area);
        let title = format!(
            " {} results for \"{}\" ({}) ",
            results.kind.as_str(),
            truncate(&results.query, 30),
            results.len()
        );
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(C_PANEL_BORDER_FOCUSED))
            .title(Span::styled(
                title,
                Style::default().fg(C_PRIMARY).add_modifier(Modifier::BOLD),
            ))
            .style(Style::default().bg(C_OVERLAY_BG));
        let inner = block.inner(popup);
        frame.render_widget(Clear, popup);
        frame.render_widget(block, popup);

        if self.list.is_empty() {
            frame.render_widget(
                Paragraph::new(Span::styled("  nothing found", Style::default().fg(C_MUTED))),
                inner,
            );
            return;
        }

        let width = inner.width as usize;
        let content_h = inner.height as usize;
        self.list.ensure_visible(content_h);
        let sel_in_view = self.list.selected_in_view(content_h);

        let items: Vec<ListItem> = self
            .list
            .visible_items(content_h)
            .into_iter()
            .enumerate()
            .map(|(row, (_, r))| {
                let selected = row == sel_in_view;
                let label_w = width * 3 / 5;
                let mut spans = vec![Span::styled(
                    fit(r.label(), label_w),
                    Style::default().fg(if selected { C_PRIMARY } else { C_SECONDARY }),
                )];
                let detail_color = match r {
                    ResultRow::Album(_) => C_ALBUM,
                    _ => C_ARTIST,
                };
                let tail = match r {
                    ResultRow::Track(t) => format!(" {:>6}", fmt_ms(t.duration_ms)),
                    _ => String::new(),
                };
                let detail_w = width.saturating_sub(label_w + tail.chars().count() + 1);
                spans.push(Span::raw(" "));
                spans.push(Span::styled(
                    fit(&r.detail(), detail_w),
                    Style::default().fg(detail_color),
                ));
                spans.push(Span::styled(tail, Style::default().fg(C_MUTED)));
                let item = ListItem::new(Line::from(spans));
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
}

impl Default for Search {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for Search {
    fn id(&self) -> ComponentId {
        ComponentId::Search
    }

    fn handle_key(&mut self, key: KeyEvent, _state: &AppState) -> Vec<Action> {
        if key.kind == KeyEventKind::Release {
            return vec![];
        }
        if self.is_typing() {
            return self.handle_prompt_key(key);
        }
        if self.overlay_visible {
            return self.handle_overlay_key(key);
        }
        match key.code {
            KeyCode::Enter => vec![Action::OpenSearch],
            KeyCode::Char('o') if self.results.is_some() => {
                self.overlay_visible = true;
                vec![]
            }
            _ => vec![],
        }
    }

    fn handle_mouse(&mut self, event: MouseEvent, _area: Rect, _state: &AppState) -> Vec<Action> {
        if !self.overlay_visible {
            return match event.kind {
                MouseEventKind::Down(MouseButton::Left) => vec![Action::OpenSearch],
                _ => vec![],
            };
        }
        match event.kind {
            MouseEventKind::ScrollUp => self.list.select_up(1),
            MouseEventKind::ScrollDown => self.list.select_down(1),
            _ => {}
        }
        vec![]
    }

    fn on_action(&mut self, action: &Action, _state: &AppState) -> Vec<Action> {
        match action {
            Action::OpenSearch => {
                self.overlay_visible = false;
                self.input.clear();
                self.input.activate();
            }
            Action::CloseSearch => self.input.deactivate(),
            Action::CloseResults => self.overlay_visible = false,
            _ => {}
        }
        vec![]
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, focused: bool, _state: &AppState) {
        if area.height == 0 {
            return;
        }
        if self.is_typing() {
            self.input.draw(frame, area);
            return;
        }
        let hint = match &self.results {
            Some(r) => format!(
                " search: \"{}\" · {} {}s · o reopen",
                truncate(&r.query, 40),
                r.len(),
                r.kind.as_str()
            ),
            None => " / search tracks, albums, artists".to_string(),
        };
        let style = if focused {
            Style::default().fg(C_PRIMARY)
        } else {
            Style::default().fg(C_MUTED)
        };
        frame.render_widget(Paragraph::new(Span::styled(hint, style)), area);
    }
}

fn centered_rect(percent_x: u16, height: u16, r: Rect) -> Rect {
    let vert = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(height),
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

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    fn type_str(search: &mut Search, s: &str) {
        let state = AppState::new();
        for c in s.chars() {
            search.handle_key(key(KeyCode::Char(c)), &state);
        }
    }

    fn open(search: &mut Search) {
        search.on_action(&Action::OpenSearch, &AppState::new());
    }

    #[test]
    fn enter_sends_query_with_selected_kind() {
        let state = AppState::new();
        let mut search = Search::new();
        open(&mut search);
        search.handle_key(ctrl('a'), &state);
        type_str(&mut search, " kind of blue ");

        let actions = search.handle_key(key(KeyCode::Enter), &state);
        match actions.as_slice() {
            [Action::SendCommand(Command::Search { query, kind }), Action::CloseSearch] => {
                assert_eq!(query, "kind of blue");
                assert_eq!(*kind, SearchKind::Album);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(!search.is_typing());
    }

    #[test]
    fn empty_query_just_closes() {
        let state = AppState::new();
        let mut search = Search::new();
        open(&mut search);
        assert!(matches!(
            search.handle_key(key(KeyCode::Enter), &state).as_slice(),
            [Action::CloseSearch]
        ));
    }

    #[test]
    fn results_overlay_plays_selected_row() {
        let state = AppState::new();
        let mut search = Search::new();
        search.set_results(Rc::new(SearchResults {
            query: "miles".into(),
            kind: SearchKind::Artist,
            artists: vec![
                Artist {
                    id: "a1".into(),
                    name: "Miles Davis".into(),
                    uri: "spotify:artist:a1".into(),
                },
                Artist {
                    id: "a2".into(),
                    name: "Miles Okazaki".into(),
                    uri: "spotify:artist:a2".into(),
                },
            ],
            ..Default::default()
        }));
        assert!(search.captures_keys());

        search.handle_key(key(KeyCode::Down), &state);
        match search.handle_key(key(KeyCode::Enter), &state).as_slice() {
            [Action::SendCommand(Command::PlayContext {
                context_uri,
                offset: None,
            }), Action::CloseResults] => assert_eq!(context_uri, "spotify:artist:a2"),
            other => panic!("unexpected {:?}", other),
        }

        search.on_action(&Action::CloseResults, &state);
        assert!(!search.captures_keys());
    }

    #[test]
    fn enqueue_only_applies_to_tracks() {
        let state = AppState::new();
        let mut search = Search::new();
        search.set_results(Rc::new(SearchResults {
            query: "so what".into(),
            kind: SearchKind::Track,
            tracks: vec![Track {
                uri: "spotify:track:t1".into(),
                name: "So What".into(),
                ..Default::default()
            }],
            ..Default::default()
        }));
        assert!(matches!(
            search.handle_key(key(KeyCode::Char('e')), &state).as_slice(),
            [Action::SendCommand(Command::Enqueue { uri })] if uri == "spotify:track:t1"
        ));

        search.set_results(Rc::new(SearchResults {
            kind: SearchKind::Album,
            albums: vec![AlbumRef::default()],
            ..Default::default()
        }));
        assert!(search.handle_key(key(KeyCode::Char('e')), &state).is_empty());
    }
}
