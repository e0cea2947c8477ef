//! HTTP implementation of `RemoteTransport` against the Spotify Web API.
//!
//! Authentication is the refresh-token flow: an access token is minted on
//! first use, and a 401 from any endpoint triggers exactly one refresh and one
//! retry of that call.  Wire shapes are private; everything leaving this
//! module is a `deck_proto::protocol` type.

use std::cell::RefCell;
use std::collections::HashMap;

use deck_proto::config::RemoteConfig;
use deck_proto::protocol::{
    Album, AlbumRef, Artist, ContextKind, ContextRef, Device, PlayRequest, PlaybackSnapshot,
    PlaylistSummary, RepeatMode, SearchKind, SearchResults, Track,
};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::transport::{RemoteTransport, TransportError, TransportResult};

/// `me/tracks/contains` and friends accept at most this many ids.
const IDS_PER_REQUEST: usize = 50;
const SEARCH_LIMIT: u32 = 20;
const PLAYLIST_LIMIT: u32 = 50;

pub struct SpotifyClient {
    http: Client,
    remote: RemoteConfig,
    access_token: RefCell<Option<String>>,
}

impl SpotifyClient {
    pub fn new(remote: RemoteConfig) -> Self {
        Self {
            http: Client::new(),
            remote,
            access_token: RefCell::new(None),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.remote.api_base.trim_end_matches('/'), path)
    }

    async fn token(&self) -> TransportResult<String> {
        let cached = self.access_token.borrow().clone();
        match cached {
            Some(token) => Ok(token),
            None => self.refresh_access_token().await,
        }
    }

    /// Exchange the refresh token for a fresh access token.
    pub async fn refresh_access_token(&self) -> TransportResult<String> {
        if !self.remote.has_credentials() {
            return Err(TransportError::MissingCredentials);
        }
        debug!("spotify: refreshing access token");

        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", self.remote.refresh_token.as_str()),
            ("client_id", self.remote.client_id.as_str()),
            ("client_secret", self.remote.client_secret.as_str()),
        ];
        let response = self
            .http
            .post(&self.remote.accounts_url)
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Unauthorized(format!(
                "token refresh failed ({}): {}",
                status, body
            )));
        }

        let token: WireToken = response
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))?;
        info!("spotify: access token refreshed");
        *self.access_token.borrow_mut() = Some(token.access_token.clone());
        Ok(token.access_token)
    }

    /// Send the request built by `build`, refreshing the token and retrying
    /// once on 401.
    async fn send<F>(&self, path: &str, build: F) -> TransportResult<Response>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let token = self.token().await?;
        let response = build(&token).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return check(path, response).await;
        }

        debug!("spotify: 401 on {}, retrying with a fresh token", path);
        let token = self.refresh_access_token().await?;
        let response = build(&token).send().await?;
        check(path, response).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> TransportResult<Option<T>> {
        let url = self.url(path);
        let response = self
            .send(path, |token| {
                self.http.get(&url).bearer_auth(token).query(query)
            })
            .await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| TransportError::Decode(format!("{}: {}", path, e)))
    }

    async fn get_required<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> TransportResult<T> {
        self.get_json(path, query)
            .await?
            .ok_or_else(|| TransportError::Decode(format!("{}: empty body", path)))
    }

    async fn call(
        &self,
        method: reqwest::Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<serde_json::Value>,
    ) -> TransportResult<()> {
        let url = self.url(path);
        self.send(path, |token| {
            let mut request = self
                .http
                .request(method.clone(), &url)
                .bearer_auth(token)
                .query(query);
            request = match &body {
                Some(body) => request.json(body),
                // The player endpoints reject bodiless PUT/POST without a length.
                None => request.header(reqwest::header::CONTENT_LENGTH, "0"),
            };
            request
        })
        .await?;
        Ok(())
    }
}

async fn check(path: &str, response: Response) -> TransportResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<WireErrorBody>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);
    Err(match status {
        StatusCode::UNAUTHORIZED => TransportError::Unauthorized(message),
        StatusCode::NOT_FOUND if path.starts_with("me/player") => TransportError::NoActiveDevice,
        _ => TransportError::Status {
            status: status.as_u16(),
            message,
        },
    })
}

fn ids_param(ids: &[String]) -> Vec<(&'static str, String)> {
    vec![("ids", ids.join(","))]
}

impl RemoteTransport for SpotifyClient {
    async fn playback_state(&self) -> TransportResult<PlaybackSnapshot> {
        let wire: Option<WirePlayback> = self.get_json("me/player", &[]).await?;
        // 204: no active session at all.
        Ok(wire.map(WirePlayback::into_snapshot).unwrap_or_default())
    }

    async fn queue(&self) -> TransportResult<Vec<Track>> {
        let wire: Option<WireQueue> = self.get_json("me/player/queue", &[]).await?;
        Ok(wire
            .map(|q| q.queue.into_iter().map(WireTrack::into_track).collect())
            .unwrap_or_default())
    }

    async fn saved_status(&self, track_ids: &[String]) -> TransportResult<HashMap<String, bool>> {
        let mut liked = HashMap::with_capacity(track_ids.len());
        for chunk in track_ids.chunks(IDS_PER_REQUEST) {
            let flags: Vec<bool> = self
                .get_required("me/tracks/contains", &ids_param(chunk))
                .await?;
            liked.extend(chunk.iter().cloned().zip(flags));
        }
        Ok(liked)
    }

    async fn devices(&self) -> TransportResult<Vec<Device>> {
        let wire: WireDevices = self.get_required("me/player/devices", &[]).await?;
        Ok(wire.devices.into_iter().map(WireDevice::into_device).collect())
    }

    async fn album(&self, album_id: &str) -> TransportResult<Album> {
        let wire: WireAlbumFull = self
            .get_required(&format!("albums/{}", album_id), &[])
            .await?;
        Ok(wire.into_album())
    }

    async fn search(&self, query: &str, kind: SearchKind) -> TransportResult<SearchResults> {
        let params = [
            ("q", query.to_string()),
            ("type", kind.as_str().to_string()),
            ("limit", SEARCH_LIMIT.to_string()),
        ];
        let wire: WireSearch = self.get_required("search", &params).await?;
        Ok(SearchResults {
            query: query.to_string(),
            kind,
            tracks: wire
                .tracks
                .map(|p| p.items.into_iter().map(WireTrack::into_track).collect())
                .unwrap_or_default(),
            albums: wire
                .albums
                .map(|p| p.items.into_iter().map(WireAlbum::into_ref).collect())
                .unwrap_or_default(),
            artists: wire
                .artists
                .map(|p| p.items.into_iter().map(WireArtist::into_artist).collect())
                .unwrap_or_default(),
        })
    }

    async fn user_playlists(&self) -> TransportResult<Vec<PlaylistSummary>> {
        let params = [("limit", PLAYLIST_LIMIT.to_string())];
        let wire: WirePage<WirePlaylist> = self.get_required("me/playlists", &params).await?;
        Ok(wire
            .items
            .into_iter()
            .map(WirePlaylist::into_summary)
            .collect())
    }

    async fn play(&self, request: &PlayRequest) -> TransportResult<()> {
        let mut body = serde_json::Map::new();
        if let Some(uri) = &request.context_uri {
            body.insert("context_uri".into(), json!(uri));
        }
        if !request.uris.is_empty() {
            body.insert("uris".into(), json!(request.uris));
        }
        if let Some(position) = request.offset {
            body.insert("offset".into(), json!({ "position": position }));
        }
        let query: Vec<(&str, String)> = request
            .device_id
            .iter()
            .map(|id| ("device_id", id.clone()))
            .collect();
        let body = (!body.is_empty()).then(|| serde_json::Value::Object(body));
        self.call(reqwest::Method::PUT, "me/player/play", &query, body)
            .await
    }

    async fn pause(&self) -> TransportResult<()> {
        self.call(reqwest::Method::PUT, "me/player/pause", &[], None)
            .await
    }

    async fn skip_next(&self) -> TransportResult<()> {
        self.call(reqwest::Method::POST, "me/player/next", &[], None)
            .await
    }

    async fn skip_previous(&self) -> TransportResult<()> {
        self.call(reqwest::Method::POST, "me/player/previous", &[], None)
            .await
    }

    async fn seek(&self, position_ms: u64) -> TransportResult<()> {
        let query = [("position_ms", position_ms.to_string())];
        self.call(reqwest::Method::PUT, "me/player/seek", &query, None)
            .await
    }

    async fn set_repeat(&self, mode: RepeatMode) -> TransportResult<()> {
        let query = [("state", mode.as_str().to_string())];
        self.call(reqwest::Method::PUT, "me/player/repeat", &query, None)
            .await
    }

    async fn set_shuffle(&self, enabled: bool) -> TransportResult<()> {
        let query = [("state", enabled.to_string())];
        self.call(reqwest::Method::PUT, "me/player/shuffle", &query, None)
            .await
    }

    async fn set_volume(&self, percent: u8) -> TransportResult<()> {
        let query = [("volume_percent", percent.to_string())];
        self.call(reqwest::Method::PUT, "me/player/volume", &query, None)
            .await
    }

    async fn enqueue(&self, uri: &str) -> TransportResult<()> {
        let query = [("uri", uri.to_string())];
        self.call(reqwest::Method::POST, "me/player/queue", &query, None)
            .await
    }

    async fn transfer(&self, device_id: &str) -> TransportResult<()> {
        let body = json!({ "device_ids": [device_id] });
        self.call(reqwest::Method::PUT, "me/player", &[], Some(body))
            .await
    }

    async fn save_tracks(&self, track_ids: &[String]) -> TransportResult<()> {
        for chunk in track_ids.chunks(IDS_PER_REQUEST) {
            self.call(reqwest::Method::PUT, "me/tracks", &ids_param(chunk), None)
                .await?;
        }
        Ok(())
    }

    async fn remove_saved_tracks(&self, track_ids: &[String]) -> TransportResult<()> {
        for chunk in track_ids.chunks(IDS_PER_REQUEST) {
            self.call(reqwest::Method::DELETE, "me/tracks", &ids_param(chunk), None)
                .await?;
        }
        Ok(())
    }

    async fn add_to_playlist(&self, playlist_id: &str, uris: &[String]) -> TransportResult<()> {
        let body = json!({ "uris": uris });
        self.call(
            reqwest::Method::POST,
            &format!("playlists/{}/tracks", playlist_id),
            &[],
            Some(body),
        )
        .await
    }

    async fn remove_from_playlist(
        &self,
        playlist_id: &str,
        uris: &[String],
    ) -> TransportResult<()> {
        let tracks: Vec<_> = uris.iter().map(|uri| json!({ "uri": uri })).collect();
        self.call(
            reqwest::Method::DELETE,
            &format!("playlists/{}/tracks", playlist_id),
            &[],
            Some(json!({ "tracks": tracks })),
        )
        .await
    }
}

// ── Wire shapes ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct WireToken {
    access_token: String,
}

#[derive(Deserialize)]
struct WireErrorBody {
    error: WireErrorDetail,
}

#[derive(Deserialize)]
struct WireErrorDetail {
    message: String,
}

#[derive(Deserialize)]
struct WirePlayback {
    #[serde(default)]
    device: Option<WireDevice>,
    #[serde(default)]
    item: Option<WireTrack>,
    #[serde(default)]
    progress_ms: Option<u64>,
    #[serde(default)]
    is_playing: bool,
    #[serde(default)]
    shuffle_state: bool,
    #[serde(default)]
    repeat_state: Option<String>,
    #[serde(default)]
    context: Option<WireContext>,
}

impl WirePlayback {
    fn into_snapshot(self) -> PlaybackSnapshot {
        let device = self.device.map(WireDevice::into_device);
        PlaybackSnapshot {
            item: self.item.map(WireTrack::into_track),
            elapsed_ms: self.progress_ms,
            is_playing: self.is_playing,
            shuffle_enabled: self.shuffle_state,
            repeat_mode: self
                .repeat_state
                .as_deref()
                .and_then(RepeatMode::parse)
                .unwrap_or_default(),
            volume_percent: device.as_ref().and_then(|d| d.volume_percent),
            context: self.context.map(WireContext::into_context),
            device,
        }
    }
}

#[derive(Deserialize)]
struct WireContext {
    #[serde(rename = "type", default)]
    kind: String,
    uri: String,
}

impl WireContext {
    fn into_context(self) -> ContextRef {
        let kind = match self.kind.as_str() {
            "album" => ContextKind::Album,
            "playlist" => ContextKind::Playlist,
            "artist" => ContextKind::Artist,
            "show" => ContextKind::Show,
            _ => ContextKind::Other,
        };
        ContextRef { kind, uri: self.uri }
    }
}

#[derive(Deserialize)]
struct WireDevice {
    id: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    is_active: bool,
    #[serde(default)]
    volume_percent: Option<u8>,
}

impl WireDevice {
    fn into_device(self) -> Device {
        Device {
            id: self.id,
            name: self.name,
            kind: self.kind,
            is_active: self.is_active,
            volume_percent: self.volume_percent,
        }
    }
}

#[derive(Deserialize)]
struct WireDevices {
    #[serde(default)]
    devices: Vec<WireDevice>,
}

#[derive(Deserialize)]
struct WireArtist {
    #[serde(default)]
    id: String,
    name: String,
    #[serde(default)]
    uri: String,
}

impl WireArtist {
    fn into_artist(self) -> Artist {
        Artist {
            id: self.id,
            name: self.name,
            uri: self.uri,
        }
    }
}

#[derive(Deserialize)]
struct WireAlbum {
    #[serde(default)]
    id: String,
    name: String,
    #[serde(default)]
    uri: String,
    #[serde(default)]
    release_date: String,
    #[serde(default)]
    artists: Vec<WireArtist>,
}

impl WireAlbum {
    fn into_ref(self) -> AlbumRef {
        AlbumRef {
            id: self.id,
            name: self.name,
            uri: self.uri,
            release_date: self.release_date,
            artists: self.artists.into_iter().map(WireArtist::into_artist).collect(),
        }
    }
}

#[derive(Deserialize)]
struct WireTrack {
    // Local files have no id.
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    uri: String,
    name: String,
    #[serde(default)]
    duration_ms: u64,
    #[serde(default)]
    track_number: u32,
    #[serde(default)]
    artists: Vec<WireArtist>,
    #[serde(default)]
    album: Option<WireAlbum>,
}

impl WireTrack {
    fn into_track(self) -> Track {
        Track {
            id: self.id.unwrap_or_default(),
            uri: self.uri,
            name: self.name,
            duration_ms: self.duration_ms,
            track_number: self.track_number,
            artists: self.artists.into_iter().map(WireArtist::into_artist).collect(),
            album: self.album.map(WireAlbum::into_ref),
        }
    }
}

#[derive(Deserialize)]
struct WireAlbumFull {
    #[serde(flatten)]
    album: WireAlbum,
    tracks: WirePage<WireTrack>,
}

impl WireAlbumFull {
    fn into_album(self) -> Album {
        let album_ref = self.album.into_ref();
        let tracks = self
            .tracks
            .items
            .into_iter()
            .map(|t| {
                let mut track = t.into_track();
                // Album listings omit the album on each track.
                track.album.get_or_insert_with(|| album_ref.clone());
                track
            })
            .collect();
        Album {
            id: album_ref.id,
            uri: album_ref.uri,
            name: album_ref.name,
            release_date: album_ref.release_date,
            artists: album_ref.artists,
            tracks,
        }
    }
}

#[derive(Deserialize)]
struct WireQueue {
    #[serde(default)]
    queue: Vec<WireTrack>,
}

#[derive(Deserialize)]
struct WirePage<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Deserialize)]
struct WireSearch {
    #[serde(default)]
    tracks: Option<WirePage<WireTrack>>,
    #[serde(default)]
    albums: Option<WirePage<WireAlbum>>,
    #[serde(default)]
    artists: Option<WirePage<WireArtist>>,
}

#[derive(Deserialize)]
struct WirePlaylistOwner {
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Deserialize)]
struct WirePlaylistTracks {
    #[serde(default)]
    total: u32,
}

#[derive(Deserialize)]
struct WirePlaylist {
    id: String,
    uri: String,
    name: String,
    #[serde(default)]
    owner: Option<WirePlaylistOwner>,
    #[serde(default)]
    tracks: Option<WirePlaylistTracks>,
}

impl WirePlaylist {
    fn into_summary(self) -> PlaylistSummary {
        PlaylistSummary {
            id: self.id,
            uri: self.uri,
            name: self.name,
            owner: self
                .owner
                .and_then(|o| o.display_name)
                .unwrap_or_default(),
            track_count: self.tracks.map(|t| t.total).unwrap_or(0),
        }
    }
}
