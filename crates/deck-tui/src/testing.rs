//! Recording in-memory transport for sequencer and app tests.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use deck_proto::protocol::{
    Album, Device, PlayRequest, PlaybackSnapshot, PlaylistSummary, RepeatMode, SearchKind,
    SearchResults, Track,
};

use crate::transport::{RemoteTransport, TransportError, TransportResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    PlaybackState,
    Queue,
    SavedStatus(Vec<String>),
    Devices,
    Album(String),
    Search(String, SearchKind),
    UserPlaylists,
    Play(PlayRequest),
    Pause,
    SkipNext,
    SkipPrevious,
    Seek(u64),
    SetRepeat(RepeatMode),
    SetShuffle(bool),
    SetVolume(u8),
    Enqueue(String),
    Transfer(String),
    SaveTracks(Vec<String>),
    RemoveSavedTracks(Vec<String>),
    AddToPlaylist(String, Vec<String>),
    RemoveFromPlaylist(String, Vec<String>),
}

impl Call {
    fn name(&self) -> &'static str {
        match self {
            Call::PlaybackState => "playback_state",
            Call::Queue => "queue",
            Call::SavedStatus(_) => "saved_status",
            Call::Devices => "devices",
            Call::Album(_) => "album",
            Call::Search(..) => "search",
            Call::UserPlaylists => "user_playlists",
            Call::Play(_) => "play",
            Call::Pause => "pause",
            Call::SkipNext => "skip_next",
            Call::SkipPrevious => "skip_previous",
            Call::Seek(_) => "seek",
            Call::SetRepeat(_) => "set_repeat",
            Call::SetShuffle(_) => "set_shuffle",
            Call::SetVolume(_) => "set_volume",
            Call::Enqueue(_) => "enqueue",
            Call::Transfer(_) => "transfer",
            Call::SaveTracks(_) => "save_tracks",
            Call::RemoveSavedTracks(_) => "remove_saved_tracks",
            Call::AddToPlaylist(..) => "add_to_playlist",
            Call::RemoveFromPlaylist(..) => "remove_from_playlist",
        }
    }
}

/// Backend double.  Writes mutate the held snapshot the way the real service
/// would (eventually); knobs simulate its quirks.
#[derive(Default)]
pub struct FakeTransport {
    calls: RefCell<Vec<Call>>,
    snapshot: RefCell<PlaybackSnapshot>,
    queue: RefCell<Vec<Track>>,
    album: RefCell<Option<Album>>,
    saved: RefCell<HashMap<String, bool>>,
    playlists: RefCell<Vec<PlaylistSummary>>,
    devices: RefCell<Vec<Device>>,
    fail_on: RefCell<Option<&'static str>>,
    reset_shuffle_on_play: Cell<bool>,
    stale_shuffle: Cell<bool>,
}

impl FakeTransport {
    pub fn with_snapshot(snapshot: PlaybackSnapshot) -> Self {
        let fake = Self::default();
        *fake.snapshot.borrow_mut() = snapshot;
        fake
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn set_album(&self, album: Album) {
        *self.album.borrow_mut() = Some(album);
    }

    pub fn set_playlists(&self, playlists: Vec<PlaylistSummary>) {
        *self.playlists.borrow_mut() = playlists;
    }

    pub fn set_devices(&self, devices: Vec<Device>) {
        *self.devices.borrow_mut() = devices;
    }

    /// Every call named `name` fails with HTTP 500.
    pub fn fail_on(&self, name: &'static str) {
        *self.fail_on.borrow_mut() = Some(name);
    }

    /// Context plays switch shuffle off.
    pub fn reset_shuffle_on_play(&self, on: bool) {
        self.reset_shuffle_on_play.set(on);
    }

    /// Shuffle writes are accepted but not yet visible to reads.
    pub fn stale_shuffle(&self, on: bool) {
        self.stale_shuffle.set(on);
    }

    fn record(&self, call: Call) -> TransportResult<()> {
        let name = call.name();
        self.calls.borrow_mut().push(call);
        if *self.fail_on.borrow() == Some(name) {
            return Err(TransportError::Status {
                status: 500,
                message: format!("{} failed", name),
            });
        }
        Ok(())
    }
}

impl RemoteTransport for FakeTransport {
    async fn playback_state(&self) -> TransportResult<PlaybackSnapshot> {
        self.record(Call::PlaybackState)?;
        Ok(self.snapshot.borrow().clone())
    }

    async fn queue(&self) -> TransportResult<Vec<Track>> {
        self.record(Call::Queue)?;
        Ok(self.queue.borrow().clone())
    }

    async fn saved_status(&self, track_ids: &[String]) -> TransportResult<HashMap<String, bool>> {
        self.record(Call::SavedStatus(track_ids.to_vec()))?;
        let saved = self.saved.borrow();
        Ok(track_ids
            .iter()
            .map(|id| (id.clone(), saved.get(id).copied().unwrap_or(false)))
            .collect())
    }

    async fn devices(&self) -> TransportResult<Vec<Device>> {
        self.record(Call::Devices)?;
        Ok(self.devices.borrow().clone())
    }

    async fn album(&self, album_id: &str) -> TransportResult<Album> {
        self.record(Call::Album(album_id.to_string()))?;
        let held = self.album.borrow().clone().filter(|a| a.id == album_id);
        Ok(held.unwrap_or_else(|| Album {
            id: album_id.to_string(),
            uri: format!("spotify:album:{}", album_id),
            ..Default::default()
        }))
    }

    async fn search(&self, query: &str, kind: SearchKind) -> TransportResult<SearchResults> {
        self.record(Call::Search(query.to_string(), kind))?;
        Ok(SearchResults {
            query: query.to_string(),
            kind,
            ..Default::default()
        })
    }

    async fn user_playlists(&self) -> TransportResult<Vec<PlaylistSummary>> {
        self.record(Call::UserPlaylists)?;
        Ok(self.playlists.borrow().clone())
    }

    async fn play(&self, request: &PlayRequest) -> TransportResult<()> {
        self.record(Call::Play(request.clone()))?;
        let mut snapshot = self.snapshot.borrow_mut();
        snapshot.is_playing = true;
        let switches = request.context_uri.is_some() || !request.uris.is_empty();
        if switches && self.reset_shuffle_on_play.get() {
            snapshot.shuffle_enabled = false;
        }
        Ok(())
    }

    async fn pause(&self) -> TransportResult<()> {
        self.record(Call::Pause)?;
        self.snapshot.borrow_mut().is_playing = false;
        Ok(())
    }

    async fn skip_next(&self) -> TransportResult<()> {
        self.record(Call::SkipNext)
    }

    async fn skip_previous(&self) -> TransportResult<()> {
        self.record(Call::SkipPrevious)
    }

    async fn seek(&self, position_ms: u64) -> TransportResult<()> {
        self.record(Call::Seek(position_ms))?;
        self.snapshot.borrow_mut().elapsed_ms = Some(position_ms);
        Ok(())
    }

    async fn set_repeat(&self, mode: RepeatMode) -> TransportResult<()> {
        self.record(Call::SetRepeat(mode))?;
        self.snapshot.borrow_mut().repeat_mode = mode;
        Ok(())
    }

    async fn set_shuffle(&self, enabled: bool) -> TransportResult<()> {
        self.record(Call::SetShuffle(enabled))?;
        if !self.stale_shuffle.get() {
            self.snapshot.borrow_mut().shuffle_enabled = enabled;
        }
        Ok(())
    }

    async fn set_volume(&self, percent: u8) -> TransportResult<()> {
        self.record(Call::SetVolume(percent))?;
        self.snapshot.borrow_mut().volume_percent = Some(percent);
        Ok(())
    }

    async fn enqueue(&self, uri: &str) -> TransportResult<()> {
        self.record(Call::Enqueue(uri.to_string()))
    }

    async fn transfer(&self, device_id: &str) -> TransportResult<()> {
        self.record(Call::Transfer(device_id.to_string()))
    }

    async fn save_tracks(&self, track_ids: &[String]) -> TransportResult<()> {
        self.record(Call::SaveTracks(track_ids.to_vec()))?;
        let mut saved = self.saved.borrow_mut();
        for id in track_ids {
            saved.insert(id.clone(), true);
        }
        Ok(())
    }

    async fn remove_saved_tracks(&self, track_ids: &[String]) -> TransportResult<()> {
        self.record(Call::RemoveSavedTracks(track_ids.to_vec()))?;
        let mut saved = self.saved.borrow_mut();
        for id in track_ids {
            saved.insert(id.clone(), false);
        }
        Ok(())
    }

    async fn add_to_playlist(&self, playlist_id: &str, uris: &[String]) -> TransportResult<()> {
        self.record(Call::AddToPlaylist(playlist_id.to_string(), uris.to_vec()))
    }

    async fn remove_from_playlist(
        &self,
        playlist_id: &str,
        uris: &[String],
    ) -> TransportResult<()> {
        self.record(Call::RemoveFromPlaylist(
            playlist_id.to_string(),
            uris.to_vec(),
        ))
    }
}
