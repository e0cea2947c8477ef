//! CommandSequencer — turns intent into a verified, re-fetched snapshot.
//!
//! Each command runs as its own `spawn_local` task:
//!
//! 1. clamp the payload,
//! 2. issue the transport call(s),
//! 3. wait the settle delay (the backend is not read-after-write consistent),
//! 4. fetch the snapshot and everything the panels derive from it,
//! 5. publish `Event::StateUpdated`.
//!
//! A failure anywhere in 2–4 abandons the command: it is reported through the
//! bus and nothing is published, so the panels keep the last good snapshot.
//! There is no retry; skip and friends are not idempotent.
//!
//! Starting an album or playlist makes the backend switch shuffle off.  The
//! sequencer tracks the user's shuffle state itself (seeded from the persisted
//! settings) and re-applies it after every such context switch.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use deck_proto::protocol::{
    Command, PlayRequest, PlaybackSnapshot, PlaylistSummary, StateUpdate,
};
use deck_proto::state::SettingsStore;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::bus::{Event, EventBus, Notice, Topic};
use crate::clock::PlaybackClock;
use crate::transport::{RemoteTransport, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum SequencerError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The command makes no sense in the current state; it is dropped.
    #[error("{0}")]
    Precondition(String),
}

type SeqResult<T> = Result<T, SequencerError>;

/// Clamp a requested volume into 0..=100.
pub fn clamp_volume(percent: i64) -> u8 {
    percent.clamp(0, 100) as u8
}

/// Move `selected` to the front, keeping everything else in order.
/// `None` if `selected` is not in `uris`.
pub fn stable_partition(uris: &[String], selected: &str) -> Option<Vec<String>> {
    let pos = uris.iter().position(|u| u == selected)?;
    let mut ordered = Vec::with_capacity(uris.len());
    ordered.push(uris[pos].clone());
    ordered.extend(
        uris.iter()
            .enumerate()
            .filter(|(i, _)| *i != pos)
            .map(|(_, u)| u.clone()),
    );
    Some(ordered)
}

pub struct SequencerOptions {
    pub settle_delay: Duration,
    /// Output woken by play when nothing is loaded.
    pub device_id: Option<String>,
    pub fallback_context_uri: Option<String>,
}

pub struct CommandSequencer<T: RemoteTransport> {
    transport: Rc<T>,
    bus: Rc<EventBus>,
    clock: PlaybackClock,
    settings: RefCell<SettingsStore>,
    options: SequencerOptions,
    /// Shuffle as the user last had it.  `None` until the first snapshot or
    /// shuffle command of this session.
    shuffle: Cell<Option<bool>>,
    last: RefCell<Option<Rc<StateUpdate>>>,
    playlists: RefCell<Option<Vec<PlaylistSummary>>>,
}

impl<T: RemoteTransport + 'static> CommandSequencer<T> {
    pub fn new(
        transport: Rc<T>,
        bus: Rc<EventBus>,
        clock: PlaybackClock,
        settings: SettingsStore,
        options: SequencerOptions,
    ) -> Rc<Self> {
        Rc::new(Self {
            transport,
            bus,
            clock,
            settings: RefCell::new(settings),
            options,
            shuffle: Cell::new(None),
            last: RefCell::new(None),
            playlists: RefCell::new(None),
        })
    }

    /// Subscribe to commands and to the clock's track-ended signal.
    pub fn attach(self: &Rc<Self>) {
        let weak = Rc::downgrade(self);
        self.bus.subscribe(Topic::Command, "sequencer", move |event| {
            if let (Event::Command(command), Some(this)) = (event, weak.upgrade()) {
                this.spawn(command.clone());
            }
            Ok(())
        });

        let weak = Rc::downgrade(self);
        self.bus
            .subscribe(Topic::TrackEnded, "sequencer", move |_| {
                if let Some(this) = weak.upgrade() {
                    tokio::task::spawn_local(async move {
                        if let Err(e) = this.after_track_end().await {
                            this.fail("track-ended", e);
                        }
                    });
                }
                Ok(())
            });
    }

    fn spawn(self: Rc<Self>, command: Command) {
        tokio::task::spawn_local(async move {
            let label = command.label();
            if let Err(e) = self.execute(command).await {
                self.fail(label, e);
            }
        });
    }

    fn fail(&self, label: &str, err: SequencerError) {
        match err {
            SequencerError::Precondition(reason) => {
                warn!("sequencer: ignoring {}: {}", label, reason)
            }
            SequencerError::Transport(e) => {
                self.bus.report(&format!("sequencer/{}", label), e)
            }
        }
    }

    /// Shuffle state to restore after a context switch.
    pub fn shuffle_state(&self) -> bool {
        self.shuffle
            .get()
            .unwrap_or_else(|| self.settings.borrow().on_start_shuffle_state())
    }

    fn last_snapshot(&self) -> Option<PlaybackSnapshot> {
        self.last.borrow().as_ref().map(|u| u.snapshot.clone())
    }

    // ── command handlers ──────────────────────────────────────────────────────

    pub async fn execute(&self, command: Command) -> SeqResult<()> {
        if command.switches_context() {
            info!("sequencer: {} (context switch)", command.label());
        } else {
            info!("sequencer: {}", command.label());
        }
        let t = &*self.transport;

        match command {
            Command::SkipNext => t.skip_next().await?,
            Command::SkipPrevious => t.skip_previous().await?,
            Command::TogglePlay => self.toggle_play().await?,
            Command::RestartTrack => t.seek(0).await?,
            Command::PlayTrack { uri } => {
                t.enqueue(&uri).await?;
                self.settle().await;
                t.skip_next().await?;
            }
            Command::PlayInCollection { track_uri } => {
                let album = self
                    .last
                    .borrow()
                    .as_ref()
                    .and_then(|u| u.album.clone())
                    .ok_or_else(|| {
                        SequencerError::Precondition("no collection loaded".to_string())
                    })?;
                let ordered = stable_partition(&album.track_uris(), &track_uri).ok_or_else(
                    || {
                        SequencerError::Precondition(format!(
                            "{} is not in {}",
                            track_uri, album.name
                        ))
                    },
                )?;
                return self.switch_context(PlayRequest::tracks(ordered)).await;
            }
            Command::PlayContext {
                context_uri,
                offset,
            } => {
                return self
                    .switch_context(PlayRequest::context(context_uri, offset))
                    .await;
            }
            Command::PlayPlaylist { uri, track_count } => {
                let offset = (track_count > 0).then(|| rand::thread_rng().gen_range(0..track_count));
                let request = PlayRequest::context(uri, offset.map(|o| o as usize))
                    .on_device(self.options.device_id.clone());
                return self.switch_context(request).await;
            }
            Command::Seek { position_ms } => t.seek(position_ms.max(0) as u64).await?,
            Command::SetShuffle { enabled } => {
                t.set_shuffle(enabled).await?;
                self.remember_shuffle(enabled);
            }
            Command::ToggleShuffle => {
                let enabled = !self.shuffle_state();
                t.set_shuffle(enabled).await?;
                self.remember_shuffle(enabled);
            }
            Command::SetRepeat { mode } => t.set_repeat(mode).await?,
            Command::CycleRepeat => {
                let current = self
                    .last_snapshot()
                    .map(|s| s.repeat_mode)
                    .unwrap_or_default();
                t.set_repeat(current.next()).await?;
            }
            Command::SetVolume { percent } => t.set_volume(clamp_volume(percent)).await?,
            Command::AdjustVolume { delta } => {
                let current = self
                    .last_snapshot()
                    .and_then(|s| s.volume_percent)
                    .unwrap_or(0);
                t.set_volume(clamp_volume(current as i64 + delta)).await?;
            }
            Command::Enqueue { uri } => t.enqueue(&uri).await?,
            Command::ToggleSaved { track_id, name } => {
                let ids = vec![track_id.clone()];
                let saved = t.saved_status(&ids).await?;
                if saved.get(&track_id).copied().unwrap_or(false) {
                    t.remove_saved_tracks(&ids).await?;
                    self.notify(Notice::success(format!("Removed {} from saved tracks", name)));
                } else {
                    t.save_tracks(&ids).await?;
                    self.notify(Notice::success(format!("Added {} to saved tracks", name)));
                }
            }
            Command::AddToPlaylist {
                playlist_id,
                playlist_name,
                track_uri,
                track_name,
            } => {
                t.add_to_playlist(&playlist_id, &[track_uri]).await?;
                self.notify(Notice::success(format!(
                    "Added {} to playlist {}",
                    track_name, playlist_name
                )));
                return Ok(());
            }
            Command::RemoveFromPlaylist {
                playlist_id,
                playlist_name,
                track_uri,
                track_name,
            } => {
                t.remove_from_playlist(&playlist_id, &[track_uri]).await?;
                self.notify(Notice::success(format!(
                    "Removed {} from playlist {}",
                    track_name, playlist_name
                )));
                return Ok(());
            }
            Command::Search { query, kind } => {
                let query = query.trim();
                if query.is_empty() {
                    return Err(SequencerError::Precondition("empty search".to_string()));
                }
                let results = t.search(query, kind).await?;
                debug!("sequencer: {} {} result(s) for {:?}", results.len(), kind.as_str(), query);
                self.bus.publish(Event::SearchResults(Rc::new(results)));
                return Ok(());
            }
            Command::TransferPlayback { device_id } => t.transfer(&device_id).await?,
            Command::ListDevices => {
                let devices = t.devices().await?;
                let listing = if devices.is_empty() {
                    "No output devices".to_string()
                } else {
                    devices
                        .iter()
                        .map(|d| {
                            if d.is_active {
                                format!("{} (active)", d.name)
                            } else {
                                d.name.clone()
                            }
                        })
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                self.notify(Notice::info(listing));
                return Ok(());
            }
            Command::Refresh { playlists } => {
                return self.refresh(playlists).await;
            }
        }

        self.settle().await;
        self.refresh(false).await
    }

    /// Play/pause, or wake the configured device when nothing is loaded.
    async fn toggle_play(&self) -> SeqResult<()> {
        let t = &*self.transport;
        let snapshot = t.playback_state().await?;

        if snapshot.item.is_none() {
            let device_id = self.options.device_id.clone().ok_or_else(|| {
                SequencerError::Precondition(
                    "nothing is loaded and no device_id is configured".to_string(),
                )
            })?;
            info!("sequencer: nothing loaded, transferring to {}", device_id);
            t.transfer(&device_id).await?;
            self.settle().await;
            let request = match &self.options.fallback_context_uri {
                Some(uri) => PlayRequest::context(uri.clone(), None),
                None => PlayRequest::resume(),
            };
            t.play(&request.on_device(Some(device_id))).await?;
        } else if snapshot.is_playing {
            t.pause().await?;
            self.clock.stop();
        } else {
            t.play(&PlayRequest::resume()).await?;
        }
        Ok(())
    }

    /// Start a new context, then put shuffle back the way it was before.
    async fn switch_context(&self, request: PlayRequest) -> SeqResult<()> {
        let shuffle = self.shuffle_state();
        let t = &*self.transport;

        t.play(&request).await?;
        self.settle().await;
        debug!("sequencer: restoring shuffle={} after context switch", shuffle);
        t.set_shuffle(shuffle).await?;
        self.shuffle.set(Some(shuffle));
        self.settle().await;

        let mut update = self.fetch(false).await?;
        // The read may predate the shuffle call landing.
        update.snapshot.shuffle_enabled = shuffle;
        self.publish(update);
        Ok(())
    }

    async fn after_track_end(&self) -> SeqResult<()> {
        self.settle().await;
        self.refresh(false).await
    }

    // ── refresh ───────────────────────────────────────────────────────────────

    pub async fn refresh(&self, reload_playlists: bool) -> SeqResult<()> {
        let update = self.fetch(reload_playlists).await?;
        self.publish(update);
        Ok(())
    }

    async fn fetch(&self, reload_playlists: bool) -> SeqResult<StateUpdate> {
        let t = &*self.transport;
        let (snapshot, queue) = futures_util::try_join!(t.playback_state(), t.queue())?;

        let album_id = snapshot
            .item
            .as_ref()
            .and_then(|item| item.album.as_ref())
            .map(|album| album.id.clone())
            .filter(|id| !id.is_empty());

        let cached = self
            .last
            .borrow()
            .as_ref()
            .and_then(|u| u.album.clone())
            .filter(|a| Some(&a.id) == album_id.as_ref());
        let album = match (cached, album_id) {
            (Some(album), _) => Some(album),
            (None, Some(id)) => Some(t.album(&id).await?),
            (None, None) => None,
        };

        let mut ids: Vec<String> = album.as_ref().map(|a| a.track_ids()).unwrap_or_default();
        if let Some(id) = snapshot.current_item_id() {
            if !id.is_empty() && !ids.iter().any(|i| i == id) {
                ids.push(id.to_string());
            }
        }
        let liked = if ids.is_empty() {
            Default::default()
        } else {
            t.saved_status(&ids).await?
        };

        let need_playlists = reload_playlists || self.playlists.borrow().is_none();
        let playlists = if need_playlists {
            let fresh = t.user_playlists().await?;
            *self.playlists.borrow_mut() = Some(fresh.clone());
            fresh
        } else {
            self.playlists.borrow().clone().unwrap_or_default()
        };

        Ok(StateUpdate {
            snapshot,
            queue,
            liked,
            album,
            playlists,
        })
    }

    fn publish(&self, update: StateUpdate) {
        self.shuffle.set(Some(update.snapshot.shuffle_enabled));
        debug!(
            "sequencer: publishing {:?} playing={} queue={}",
            update.snapshot.current_item_id(),
            update.snapshot.is_playing,
            update.queue.len()
        );
        let update = Rc::new(update);
        *self.last.borrow_mut() = Some(Rc::clone(&update));
        self.bus.publish(Event::StateUpdated(update));
    }

    // ── helpers ───────────────────────────────────────────────────────────────

    async fn settle(&self) {
        tokio::time::sleep(self.options.settle_delay).await;
    }

    fn remember_shuffle(&self, enabled: bool) {
        self.shuffle.set(Some(enabled));
        let saved = self.settings.borrow_mut().set_shuffle_preference(enabled);
        if let Err(e) = saved {
            warn!(
                "sequencer: could not persist shuffle preference to {}: {:#}",
                self.settings.borrow().path().display(),
                e
            );
        }
    }

    fn notify(&self, notice: Notice) {
        self.bus.publish(Event::Notice(notice));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, FakeTransport};
    use deck_proto::protocol::{Album, RepeatMode, SearchKind, Track};

    const SETTLE: Duration = Duration::from_millis(500);

    struct Harness {
        transport: Rc<FakeTransport>,
        bus: Rc<EventBus>,
        sequencer: Rc<CommandSequencer<FakeTransport>>,
        published: Rc<RefCell<Vec<Rc<StateUpdate>>>>,
        _dir: tempfile::TempDir,
    }

    fn harness(transport: FakeTransport, persisted_shuffle: bool) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = SettingsStore::load(dir.path().join("settings.json"));
        settings.set_shuffle_preference(persisted_shuffle).unwrap();

        let transport = Rc::new(transport);
        let bus = Rc::new(EventBus::new());
        let clock = PlaybackClock::new(bus.clone(), Duration::from_millis(1_000));
        let sequencer = CommandSequencer::new(
            transport.clone(),
            bus.clone(),
            clock,
            settings,
            SequencerOptions {
                settle_delay: SETTLE,
                device_id: Some("desk".into()),
                fallback_context_uri: Some("spotify:playlist:fallback".into()),
            },
        );

        let published = Rc::new(RefCell::new(Vec::new()));
        let p = published.clone();
        bus.subscribe(Topic::StateUpdated, "test", move |event| {
            if let Event::StateUpdated(update) = event {
                p.borrow_mut().push(update.clone());
            }
            Ok(())
        });

        Harness {
            transport,
            bus,
            sequencer,
            published,
            _dir: dir,
        }
    }

    fn track(id: &str, album_id: &str) -> Track {
        Track {
            id: id.into(),
            uri: format!("spotify:track:{}", id),
            name: id.to_uppercase(),
            duration_ms: 180_000,
            album: Some(deck_proto::protocol::AlbumRef {
                id: album_id.into(),
                name: "Record".into(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn album_abcd() -> Album {
        Album {
            id: "al".into(),
            uri: "spotify:album:al".into(),
            name: "Record".into(),
            tracks: ["a", "b", "c", "d"].iter().map(|id| track(id, "al")).collect(),
            ..Default::default()
        }
    }

    fn playing(item: Track) -> PlaybackSnapshot {
        PlaybackSnapshot {
            item: Some(item),
            elapsed_ms: Some(1_000),
            is_playing: true,
            volume_percent: Some(50),
            ..Default::default()
        }
    }

    async fn in_local<F: std::future::Future<Output = ()>>(f: F) {
        tokio::task::LocalSet::new().run_until(f).await;
    }

    #[test]
    fn test_clamp_volume() {
        assert_eq!(clamp_volume(150), 100);
        assert_eq!(clamp_volume(-10), 0);
        assert_eq!(clamp_volume(42), 42);
    }

    #[test]
    fn test_stable_partition() {
        let uris: Vec<String> = ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect();
        assert_eq!(
            stable_partition(&uris, "C").unwrap(),
            vec!["C", "A", "B", "D"]
        );
        assert_eq!(stable_partition(&uris, "A").unwrap(), uris);
        assert_eq!(stable_partition(&uris, "Z"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_volume_is_clamped() {
        in_local(async {
            let h = harness(FakeTransport::with_snapshot(playing(track("a", "al"))), false);

            h.sequencer
                .execute(Command::SetVolume { percent: 150 })
                .await
                .unwrap();
            h.sequencer
                .execute(Command::SetVolume { percent: -10 })
                .await
                .unwrap();

            let volumes: Vec<u8> = h
                .transport
                .calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::SetVolume(v) => Some(v),
                    _ => None,
                })
                .collect();
            assert_eq!(volumes, vec![100, 0]);
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_adjust_volume_uses_last_snapshot() {
        in_local(async {
            let h = harness(FakeTransport::with_snapshot(playing(track("a", "al"))), false);
            h.sequencer.refresh(false).await.unwrap();

            h.sequencer
                .execute(Command::AdjustVolume { delta: 70 })
                .await
                .unwrap();
            assert!(h.transport.calls().contains(&Call::SetVolume(100)));
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_settles_then_publishes() {
        in_local(async {
            let h = harness(FakeTransport::with_snapshot(playing(track("a", "al"))), false);
            h.transport.set_album(album_abcd());

            let start = tokio::time::Instant::now();
            h.sequencer.execute(Command::SkipNext).await.unwrap();

            assert!(start.elapsed() >= SETTLE);
            let calls = h.transport.calls();
            assert_eq!(calls[0], Call::SkipNext);
            assert!(calls.contains(&Call::PlaybackState));
            assert!(calls.contains(&Call::Queue));

            let published = h.published.borrow();
            assert_eq!(published.len(), 1);
            assert_eq!(published[0].album.as_ref().unwrap().id, "al");
            assert_eq!(published[0].liked.len(), 4);
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_in_collection_orders_tracks() {
        in_local(async {
            let h = harness(FakeTransport::with_snapshot(playing(track("a", "al"))), false);
            h.transport.set_album(album_abcd());
            h.sequencer.refresh(false).await.unwrap();

            h.sequencer
                .execute(Command::PlayInCollection {
                    track_uri: "spotify:track:c".into(),
                })
                .await
                .unwrap();

            let play = h
                .transport
                .calls()
                .into_iter()
                .find_map(|c| match c {
                    Call::Play(req) => Some(req),
                    _ => None,
                })
                .unwrap();
            assert_eq!(
                play.uris,
                vec![
                    "spotify:track:c",
                    "spotify:track:a",
                    "spotify:track:b",
                    "spotify:track:d"
                ]
            );
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_in_collection_without_album_is_precondition() {
        in_local(async {
            let h = harness(FakeTransport::default(), false);
            let err = h
                .sequencer
                .execute(Command::PlayInCollection {
                    track_uri: "spotify:track:c".into(),
                })
                .await
                .unwrap_err();
            assert!(matches!(err, SequencerError::Precondition(_)));
            assert!(h.transport.calls().is_empty());
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_context_switch_restores_shuffle() {
        in_local(async {
            let mut snapshot = playing(track("a", "al"));
            snapshot.shuffle_enabled = true;
            let h = harness(FakeTransport::with_snapshot(snapshot), false);
            h.sequencer.refresh(false).await.unwrap();
            assert!(h.sequencer.shuffle_state());

            // Backend forgets shuffle on every context play, and the read
            // after our shuffle write still reports it off.
            h.transport.reset_shuffle_on_play(true);
            h.transport.stale_shuffle(true);

            h.sequencer
                .execute(Command::PlayContext {
                    context_uri: "spotify:album:x".into(),
                    offset: None,
                })
                .await
                .unwrap();

            let calls = h.transport.calls();
            let play_at = calls
                .iter()
                .position(|c| matches!(c, Call::Play(_)))
                .unwrap();
            let shuffle_at = calls
                .iter()
                .position(|c| *c == Call::SetShuffle(true))
                .unwrap();
            assert!(shuffle_at > play_at);
            assert!(h.sequencer.shuffle_state());
            assert!(h.published.borrow().last().unwrap().snapshot.shuffle_enabled);
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shuffle_falls_back_to_persisted_setting() {
        in_local(async {
            let h = harness(FakeTransport::with_snapshot(playing(track("a", "al"))), true);
            h.transport.reset_shuffle_on_play(true);

            h.sequencer
                .execute(Command::PlayPlaylist {
                    uri: "spotify:playlist:p".into(),
                    track_count: 10,
                })
                .await
                .unwrap();

            let calls = h.transport.calls();
            let Some(Call::Play(request)) = calls.iter().find(|c| matches!(c, Call::Play(_)))
            else {
                panic!("no play call");
            };
            assert!(request.offset.unwrap() < 10);
            assert_eq!(request.device_id.as_deref(), Some("desk"));
            assert!(calls.contains(&Call::SetShuffle(true)));
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_shuffle_persists() {
        in_local(async {
            let h = harness(FakeTransport::with_snapshot(playing(track("a", "al"))), false);
            h.sequencer.execute(Command::ToggleShuffle).await.unwrap();

            assert!(h.transport.calls().contains(&Call::SetShuffle(true)));
            let path = h.sequencer.settings.borrow().path().to_path_buf();
            assert!(SettingsStore::load(path).on_start_shuffle_state());
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_repeat_advances() {
        in_local(async {
            let mut snapshot = playing(track("a", "al"));
            snapshot.repeat_mode = RepeatMode::Track;
            let h = harness(FakeTransport::with_snapshot(snapshot), false);
            h.sequencer.refresh(false).await.unwrap();

            h.sequencer.execute(Command::CycleRepeat).await.unwrap();
            assert!(h
                .transport
                .calls()
                .contains(&Call::SetRepeat(RepeatMode::Context)));
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_command_publishes_nothing() {
        in_local(async {
            let h = harness(FakeTransport::with_snapshot(playing(track("a", "al"))), false);
            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
            h.bus.set_failure_sink(tx);
            h.sequencer.attach();
            h.transport.fail_on("skip_next");

            h.bus.publish(Event::Command(Command::SkipNext));
            tokio::time::sleep(SETTLE * 4).await;

            assert!(h.published.borrow().is_empty());
            let failure = rx.try_recv().unwrap();
            assert_eq!(failure.source, "sequencer/skip-next");
            // Not retried.
            let skips = h
                .transport
                .calls()
                .iter()
                .filter(|c| **c == Call::SkipNext)
                .count();
            assert_eq!(skips, 1);
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_failure_abandons_publish() {
        in_local(async {
            let h = harness(FakeTransport::with_snapshot(playing(track("a", "al"))), false);
            h.transport.fail_on("queue");
            let err = h.sequencer.execute(Command::RestartTrack).await.unwrap_err();
            assert!(matches!(err, SequencerError::Transport(_)));
            assert!(h.transport.calls().contains(&Call::Seek(0)));
            assert!(h.published.borrow().is_empty());
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_play_pauses_and_stops_clock() {
        in_local(async {
            let h = harness(FakeTransport::with_snapshot(playing(track("a", "al"))), false);
            h.sequencer.clock.reset(&playing(track("a", "al")));

            h.sequencer.execute(Command::TogglePlay).await.unwrap();

            assert!(h.transport.calls().contains(&Call::Pause));
            assert!(!h.sequencer.clock.state().running);
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_play_with_nothing_loaded_wakes_device() {
        in_local(async {
            let h = harness(FakeTransport::default(), false);
            h.sequencer.execute(Command::TogglePlay).await.unwrap();

            let calls = h.transport.calls();
            assert_eq!(calls[1], Call::Transfer("desk".into()));
            let Call::Play(request) = &calls[2] else {
                panic!("expected play after transfer, got {:?}", calls[2]);
            };
            assert_eq!(
                request.context_uri.as_deref(),
                Some("spotify:playlist:fallback")
            );
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_track_enqueues_then_skips() {
        in_local(async {
            let h = harness(FakeTransport::with_snapshot(playing(track("a", "al"))), false);
            h.sequencer
                .execute(Command::PlayTrack {
                    uri: "spotify:track:z".into(),
                })
                .await
                .unwrap();
            let calls = h.transport.calls();
            assert_eq!(calls[0], Call::Enqueue("spotify:track:z".into()));
            assert_eq!(calls[1], Call::SkipNext);
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_saved_flips_and_notifies() {
        in_local(async {
            let h = harness(FakeTransport::with_snapshot(playing(track("a", "al"))), false);
            let notices = Rc::new(RefCell::new(Vec::new()));
            let n = notices.clone();
            h.bus.subscribe(Topic::Notice, "test", move |event| {
                if let Event::Notice(notice) = event {
                    n.borrow_mut().push(notice.text.clone());
                }
                Ok(())
            });

            h.sequencer
                .execute(Command::ToggleSaved {
                    track_id: "a".into(),
                    name: "A".into(),
                })
                .await
                .unwrap();

            assert!(h.transport.calls().contains(&Call::SaveTracks(vec!["a".into()])));
            assert_eq!(notices.borrow()[0], "Added A to saved tracks");
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_playlist_edits_notify_without_refresh() {
        in_local(async {
            let h = harness(FakeTransport::with_snapshot(playing(track("a", "al"))), false);
            let notices = Rc::new(RefCell::new(Vec::new()));
            let n = notices.clone();
            h.bus.subscribe(Topic::Notice, "test", move |event| {
                if let Event::Notice(notice) = event {
                    n.borrow_mut().push(notice.text.clone());
                }
                Ok(())
            });

            h.sequencer
                .execute(Command::AddToPlaylist {
                    playlist_id: "p1".into(),
                    playlist_name: "Mix".into(),
                    track_uri: "spotify:track:a".into(),
                    track_name: "A".into(),
                })
                .await
                .unwrap();
            h.sequencer
                .execute(Command::RemoveFromPlaylist {
                    playlist_id: "p1".into(),
                    playlist_name: "Mix".into(),
                    track_uri: "spotify:track:a".into(),
                    track_name: "A".into(),
                })
                .await
                .unwrap();
            tokio::time::sleep(SETTLE * 4).await;

            assert_eq!(
                h.transport.calls(),
                vec![
                    Call::AddToPlaylist("p1".into(), vec!["spotify:track:a".into()]),
                    Call::RemoveFromPlaylist("p1".into(), vec!["spotify:track:a".into()]),
                ]
            );
            assert_eq!(
                *notices.borrow(),
                vec!["Added A to playlist Mix", "Removed A from playlist Mix"]
            );
            assert!(h.published.borrow().is_empty());
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_publishes_results_without_refresh() {
        in_local(async {
            let h = harness(FakeTransport::default(), false);
            let got = Rc::new(Cell::new(0));
            let g = got.clone();
            h.bus.subscribe(Topic::SearchResults, "test", move |_| {
                g.set(g.get() + 1);
                Ok(())
            });

            h.sequencer
                .execute(Command::Search {
                    query: " boards ".into(),
                    kind: SearchKind::Album,
                })
                .await
                .unwrap();

            assert_eq!(got.get(), 1);
            assert_eq!(
                h.transport.calls(),
                vec![Call::Search("boards".into(), SearchKind::Album)]
            );
            assert!(h.published.borrow().is_empty());
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_devices_notifies() {
        in_local(async {
            let h = harness(FakeTransport::default(), false);
            h.transport.set_devices(vec![
                deck_proto::protocol::Device {
                    id: Some("d1".into()),
                    name: "Desk".into(),
                    is_active: true,
                    ..Default::default()
                },
                deck_proto::protocol::Device {
                    id: Some("d2".into()),
                    name: "Phone".into(),
                    ..Default::default()
                },
            ]);
            let notices = Rc::new(RefCell::new(Vec::new()));
            let n = notices.clone();
            h.bus.subscribe(Topic::Notice, "test", move |event| {
                if let Event::Notice(notice) = event {
                    n.borrow_mut().push(notice.text.clone());
                }
                Ok(())
            });

            h.sequencer.execute(Command::ListDevices).await.unwrap();
            assert_eq!(*notices.borrow(), vec!["Desk (active), Phone".to_string()]);
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_track_end_triggers_refresh() {
        in_local(async {
            let h = harness(FakeTransport::with_snapshot(playing(track("a", "al"))), false);
            h.sequencer.attach();

            h.bus.publish(Event::TrackEnded);
            tokio::time::sleep(SETTLE * 2).await;

            assert_eq!(h.published.borrow().len(), 1);
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_album_is_cached_between_refreshes() {
        in_local(async {
            let h = harness(FakeTransport::with_snapshot(playing(track("a", "al"))), false);
            h.transport.set_album(album_abcd());
            h.transport.set_playlists(vec![PlaylistSummary {
                id: "p".into(),
                uri: "spotify:playlist:p".into(),
                name: "Mix".into(),
                ..Default::default()
            }]);

            h.sequencer.refresh(false).await.unwrap();
            h.sequencer.refresh(false).await.unwrap();

            let album_calls = h
                .transport
                .calls()
                .iter()
                .filter(|c| matches!(c, Call::Album(_)))
                .count();
            let playlist_calls = h
                .transport
                .calls()
                .iter()
                .filter(|c| **c == Call::UserPlaylists)
                .count();
            assert_eq!(album_calls, 1);
            assert_eq!(playlist_calls, 1);
            assert_eq!(h.published.borrow()[1].playlists[0].name, "Mix");
        })
        .await;
    }
}
