//! AppState — shared read-only data passed to all components during render/event.
//!
//! Components read this for the last published snapshot, but never mutate it.
//! The App event-loop is the only thing that writes to AppState.

use std::rc::Rc;

use deck_proto::protocol::{
    Album, PlaybackSnapshot, PlaylistSummary, StateUpdate, Track,
};

use crate::clock::Progress;
use crate::widgets::status_bar::InputMode;

/// The full shared state of the application.
/// Components read this; only the App event-loop writes to it.
pub struct AppState {
    // ── Remote ──────────────────────────────────────────────────────────────
    /// Last state-update event.  Kept on failure so panels show the last good
    /// snapshot.
    pub update: Option<Rc<StateUpdate>>,
    /// Latest clock render; `None` when nothing is loaded.
    pub progress: Option<Progress>,
    /// False after a failed command until the next successful update.
    pub connected: bool,
    pub last_error: Option<String>,

    // ── UI mode ─────────────────────────────────────────────────────────────
    pub input_mode: InputMode,

    // ── Session ─────────────────────────────────────────────────────────────
    /// Notices and failures seen this session (newest last).
    pub logs: Vec<String>,
    /// Cached lines from deck.log (refreshed periodically by App).
    pub tui_log_lines: Vec<String>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            update: None,
            progress: None,
            connected: false,
            last_error: None,
            input_mode: InputMode::Normal,
            logs: Vec::new(),
            tui_log_lines: Vec::new(),
        }
    }

    pub fn snapshot(&self) -> Option<&PlaybackSnapshot> {
        self.update.as_deref().map(|u| &u.snapshot)
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.snapshot()?.item.as_ref()
    }

    pub fn album(&self) -> Option<&Album> {
        self.update.as_deref()?.album.as_ref()
    }

    pub fn queue(&self) -> &[Track] {
        self.update.as_deref().map(|u| u.queue.as_slice()).unwrap_or_default()
    }

    pub fn playlists(&self) -> &[PlaylistSummary] {
        self.update.as_deref().map(|u| u.playlists.as_slice()).unwrap_or_default()
    }

    pub fn is_liked(&self, track_id: &str) -> bool {
        self.update.as_deref().is_some_and(|u| u.is_liked(track_id))
    }

    pub fn active_playlist_uri(&self) -> Option<&str> {
        self.update.as_deref()?.active_playlist_uri()
    }

    pub fn is_playing(&self) -> bool {
        self.snapshot().is_some_and(|s| s.is_playing)
    }

    /// Elapsed position the user sees: the clock's render when present,
    /// otherwise the snapshot's.
    pub fn elapsed_ms(&self) -> u64 {
        match self.progress {
            Some(p) => p.elapsed_ms,
            None => self.snapshot().and_then(|s| s.elapsed_ms).unwrap_or(0),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
