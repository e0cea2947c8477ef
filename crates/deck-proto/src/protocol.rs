use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Remote repeat setting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    Off,
    Track,
    Context,
}

impl RepeatMode {
    /// off → track → context → off
    pub fn next(self) -> Self {
        match self {
            Self::Off => Self::Track,
            Self::Track => Self::Context,
            Self::Context => Self::Off,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Track => "track",
            Self::Context => "context",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "off" => Some(Self::Off),
            "track" => Some(Self::Track),
            "context" => Some(Self::Context),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Artist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub uri: String,
}

/// Album as embedded in a track (no track listing).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AlbumRef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub release_date: String,
    #[serde(default)]
    pub artists: Vec<Artist>,
}

impl AlbumRef {
    /// `"2019-04-12"` → `"2019"`
    pub fn release_year(&self) -> &str {
        self.release_date.split('-').next().unwrap_or("")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Track {
    pub id: String,
    pub uri: String,
    pub name: String,
    pub duration_ms: u64,
    #[serde(default)]
    pub track_number: u32,
    #[serde(default)]
    pub artists: Vec<Artist>,
    #[serde(default)]
    pub album: Option<AlbumRef>,
}

impl Track {
    pub fn artist_line(&self) -> String {
        self.artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Full album with its track listing — the collection a user can browse.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Album {
    pub id: String,
    pub uri: String,
    pub name: String,
    #[serde(default)]
    pub release_date: String,
    #[serde(default)]
    pub artists: Vec<Artist>,
    #[serde(default)]
    pub tracks: Vec<Track>,
}

impl Album {
    pub fn track_uris(&self) -> Vec<String> {
        self.tracks.iter().map(|t| t.uri.clone()).collect()
    }

    pub fn track_ids(&self) -> Vec<String> {
        self.tracks.iter().map(|t| t.id.clone()).collect()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContextKind {
    Album,
    Playlist,
    Artist,
    Show,
    #[default]
    Other,
}

/// Opaque reference to what the player is playing from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ContextRef {
    pub kind: ContextKind,
    pub uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Device {
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub volume_percent: Option<u8>,
}

/// One authoritative read of remote playback state.
///
/// `elapsed_ms` may already exceed the item's duration; consumers must not
/// assume otherwise.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PlaybackSnapshot {
    pub item: Option<Track>,
    pub elapsed_ms: Option<u64>,
    pub is_playing: bool,
    pub shuffle_enabled: bool,
    pub repeat_mode: RepeatMode,
    pub volume_percent: Option<u8>,
    pub context: Option<ContextRef>,
    #[serde(default)]
    pub device: Option<Device>,
}

impl PlaybackSnapshot {
    pub fn current_item_id(&self) -> Option<&str> {
        self.item.as_ref().map(|t| t.id.as_str())
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.item.as_ref().map(|t| t.duration_ms)
    }

    pub fn playlist_context_uri(&self) -> Option<&str> {
        self.context
            .as_ref()
            .filter(|c| c.kind == ContextKind::Playlist)
            .map(|c| c.uri.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PlaylistSummary {
    pub id: String,
    pub uri: String,
    pub name: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub track_count: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    #[default]
    Track,
    Album,
    Artist,
}

impl SearchKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Track => "track",
            Self::Album => "album",
            Self::Artist => "artist",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SearchResults {
    pub query: String,
    pub kind: SearchKind,
    #[serde(default)]
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub albums: Vec<AlbumRef>,
    #[serde(default)]
    pub artists: Vec<Artist>,
}

impl SearchResults {
    pub fn len(&self) -> usize {
        match self.kind {
            SearchKind::Track => self.tracks.len(),
            SearchKind::Album => self.albums.len(),
            SearchKind::Artist => self.artists.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A fresh snapshot plus everything the panels derive from it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StateUpdate {
    pub snapshot: PlaybackSnapshot,
    #[serde(default)]
    pub queue: Vec<Track>,
    /// Track id → saved, for the tracks of `album` and the current item.
    #[serde(default)]
    pub liked: HashMap<String, bool>,
    /// The collection being browsed: the album of the current item.
    #[serde(default)]
    pub album: Option<Album>,
    #[serde(default)]
    pub playlists: Vec<PlaylistSummary>,
}

impl StateUpdate {
    pub fn is_liked(&self, track_id: &str) -> bool {
        self.liked.get(track_id).copied().unwrap_or(false)
    }

    pub fn active_playlist_uri(&self) -> Option<&str> {
        self.snapshot.playlist_context_uri()
    }
}

/// Arguments of a remote "play" call.  Either a context (optionally with an
/// offset into it) or an explicit ordered list of track uris.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PlayRequest {
    pub context_uri: Option<String>,
    #[serde(default)]
    pub uris: Vec<String>,
    pub offset: Option<usize>,
    pub device_id: Option<String>,
}

impl PlayRequest {
    /// Resume whatever is loaded.
    pub fn resume() -> Self {
        Self::default()
    }

    pub fn context(uri: impl Into<String>, offset: Option<usize>) -> Self {
        Self {
            context_uri: Some(uri.into()),
            offset,
            ..Self::default()
        }
    }

    pub fn tracks(uris: Vec<String>) -> Self {
        Self {
            uris,
            ..Self::default()
        }
    }

    pub fn on_device(mut self, device_id: Option<String>) -> Self {
        self.device_id = device_id;
        self
    }
}

/// User (or clock) intent.  Produced by panels, consumed once by the command
/// sequencer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "cmd")]
pub enum Command {
    SkipNext,
    SkipPrevious,
    TogglePlay,
    RestartTrack,
    /// Play one track right now, keeping the current context queued behind it.
    PlayTrack { uri: String },
    /// Play a track from the browsed collection, the rest of it following.
    PlayInCollection { track_uri: String },
    PlayContext { context_uri: String, offset: Option<usize> },
    /// Start a playlist at a random position.
    PlayPlaylist { uri: String, track_count: u32 },
    Seek { position_ms: i64 },
    SetShuffle { enabled: bool },
    ToggleShuffle,
    SetRepeat { mode: RepeatMode },
    CycleRepeat,
    SetVolume { percent: i64 },
    AdjustVolume { delta: i64 },
    Enqueue { uri: String },
    ToggleSaved { track_id: String, name: String },
    AddToPlaylist {
        playlist_id: String,
        playlist_name: String,
        track_uri: String,
        track_name: String,
    },
    RemoveFromPlaylist {
        playlist_id: String,
        playlist_name: String,
        track_uri: String,
        track_name: String,
    },
    Search { query: String, kind: SearchKind },
    TransferPlayback { device_id: String },
    ListDevices,
    /// Re-read state without changing anything remote.
    Refresh { playlists: bool },
}

impl Command {
    /// Short name for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::SkipNext => "skip-next",
            Self::SkipPrevious => "skip-previous",
            Self::TogglePlay => "toggle-play",
            Self::RestartTrack => "restart-track",
            Self::PlayTrack { .. } => "play-track",
            Self::PlayInCollection { .. } => "play-in-collection",
            Self::PlayContext { .. } => "play-context",
            Self::PlayPlaylist { .. } => "play-playlist",
            Self::Seek { .. } => "seek",
            Self::SetShuffle { .. } => "set-shuffle",
            Self::ToggleShuffle => "toggle-shuffle",
            Self::SetRepeat { .. } => "set-repeat",
            Self::CycleRepeat => "cycle-repeat",
            Self::SetVolume { .. } => "set-volume",
            Self::AdjustVolume { .. } => "adjust-volume",
            Self::Enqueue { .. } => "enqueue",
            Self::ToggleSaved { .. } => "toggle-saved",
            Self::AddToPlaylist { .. } => "add-to-playlist",
            Self::RemoveFromPlaylist { .. } => "remove-from-playlist",
            Self::Search { .. } => "search",
            Self::TransferPlayback { .. } => "transfer-playback",
            Self::ListDevices => "list-devices",
            Self::Refresh { .. } => "refresh",
        }
    }

    /// Commands that load a new album/playlist context.  The backend resets
    /// shuffle to off as a side effect of these.
    pub fn switches_context(&self) -> bool {
        matches!(
            self,
            Self::PlayContext { .. } | Self::PlayPlaylist { .. } | Self::PlayInCollection { .. }
        )
    }
}
