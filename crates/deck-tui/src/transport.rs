//! The boundary to the remote player.
//!
//! Everything the sequencer needs from the streaming service goes through
//! `RemoteTransport`.  Calls have unknown latency and the backend is only
//! eventually consistent: a read right after a write may not reflect it.

use std::collections::HashMap;

use deck_proto::protocol::{
    Album, Device, PlayRequest, PlaybackSnapshot, PlaylistSummary, RepeatMode, SearchKind,
    SearchResults, Track,
};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("no active output device")]
    NoActiveDevice,
    #[error("not authorized: {0}")]
    Unauthorized(String),
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("missing credentials (set CLIENT_ID, CLIENT_SECRET and REFRESH_TOKEN)")]
    MissingCredentials,
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Futures are not `Send`: implementations are driven on the UI thread's
/// `LocalSet`.
#[allow(async_fn_in_trait)]
pub trait RemoteTransport {
    // ── reads ────────────────────────────────────────────────────────────────
    async fn playback_state(&self) -> TransportResult<PlaybackSnapshot>;
    async fn queue(&self) -> TransportResult<Vec<Track>>;
    async fn saved_status(&self, track_ids: &[String]) -> TransportResult<HashMap<String, bool>>;
    async fn devices(&self) -> TransportResult<Vec<Device>>;
    async fn album(&self, album_id: &str) -> TransportResult<Album>;
    async fn search(&self, query: &str, kind: SearchKind) -> TransportResult<SearchResults>;
    async fn user_playlists(&self) -> TransportResult<Vec<PlaylistSummary>>;

    // ── playback ─────────────────────────────────────────────────────────────
    async fn play(&self, request: &PlayRequest) -> TransportResult<()>;
    async fn pause(&self) -> TransportResult<()>;
    async fn skip_next(&self) -> TransportResult<()>;
    async fn skip_previous(&self) -> TransportResult<()>;
    async fn seek(&self, position_ms: u64) -> TransportResult<()>;
    async fn set_repeat(&self, mode: RepeatMode) -> TransportResult<()>;
    async fn set_shuffle(&self, enabled: bool) -> TransportResult<()>;
    async fn set_volume(&self, percent: u8) -> TransportResult<()>;
    async fn enqueue(&self, uri: &str) -> TransportResult<()>;
    async fn transfer(&self, device_id: &str) -> TransportResult<()>;

    // ── library ──────────────────────────────────────────────────────────────
    async fn save_tracks(&self, track_ids: &[String]) -> TransportResult<()>;
    async fn remove_saved_tracks(&self, track_ids: &[String]) -> TransportResult<()>;
    async fn add_to_playlist(&self, playlist_id: &str, uris: &[String]) -> TransportResult<()>;
    async fn remove_from_playlist(&self, playlist_id: &str, uris: &[String])
        -> TransportResult<()>;
}
