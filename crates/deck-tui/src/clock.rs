//! Local playback clock.
//!
//! The remote player never says "track ended" and only reports position when
//! asked, so the progress shown between refreshes is simulated here.  Every
//! authoritative snapshot resets the simulation; between snapshots the clock
//! advances by a fixed interval and, once the simulated position passes the
//! known duration, publishes `Event::TrackEnded` exactly once.
//!
//! `ClockState` is the pure state machine.  `PlaybackClock` drives it with
//! `spawn_local` timers on the single-threaded runtime.  Every scheduled tick
//! carries the generation it was scheduled under; a reset bumps the
//! generation, so ticks from an earlier chain find a mismatch and do nothing.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;

use deck_proto::protocol::PlaybackSnapshot;
use tracing::{debug, info, trace};

use crate::bus::{Event, EventBus, Topic};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockPhase {
    /// Nothing loaded.
    #[default]
    Idle,
    Running,
    /// Frozen value: paused remotely, stopped locally, or ran past the end.
    Paused,
}

/// What a tick hands to the panels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub elapsed_ms: u64,
    pub duration_ms: u64,
    pub is_playing: bool,
}

/// Permission for one tick, valid only while the generation it carries is
/// still current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickToken {
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Superseded by a reset or stop; nothing rendered.
    Stale,
    /// Rendered and advanced; schedule `next` one interval later.
    Advanced { rendered: Progress, next: TickToken },
    /// Rendered a position past the duration.  Ticking has stopped.
    Overrun { rendered: Progress },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClockState {
    pub simulated_elapsed_ms: u64,
    pub duration_ms: u64,
    pub running: bool,
    pub generation: u64,
    pub phase: ClockPhase,
}

impl ClockState {
    /// Adopt `snapshot` as the new basis.  Returns the token for the first
    /// tick when the snapshot says the player is playing an item with a
    /// known length.
    ///
    /// The generation moves on every call, so any tick already scheduled is
    /// invalidated, including when the new snapshot has nothing loaded.
    pub fn reset(&mut self, snapshot: &PlaybackSnapshot) -> Option<TickToken> {
        self.generation += 1;

        let Some(item) = snapshot.item.as_ref() else {
            self.simulated_elapsed_ms = 0;
            self.duration_ms = 0;
            self.running = false;
            self.phase = ClockPhase::Idle;
            return None;
        };

        self.simulated_elapsed_ms = snapshot.elapsed_ms.unwrap_or(0);
        self.duration_ms = item.duration_ms;
        // Without a length there is nothing to count towards.
        self.running = snapshot.is_playing && item.duration_ms > 0;
        if self.running {
            self.phase = ClockPhase::Running;
            Some(self.token())
        } else {
            self.phase = ClockPhase::Paused;
            None
        }
    }

    /// Halt ticking, keeping elapsed and duration as they are.
    pub fn stop(&mut self) {
        self.running = false;
        if self.phase == ClockPhase::Running {
            self.phase = ClockPhase::Paused;
        }
    }

    pub fn tick(&mut self, token: TickToken, interval_ms: u64) -> TickOutcome {
        if token.generation != self.generation || !self.running {
            return TickOutcome::Stale;
        }

        let rendered = self.progress();
        if self.simulated_elapsed_ms > self.duration_ms {
            self.running = false;
            self.phase = ClockPhase::Paused;
            return TickOutcome::Overrun { rendered };
        }

        self.simulated_elapsed_ms += interval_ms;
        TickOutcome::Advanced {
            rendered,
            next: self.token(),
        }
    }

    /// Current value, or `None` when idle.
    pub fn render(&self) -> Option<Progress> {
        match self.phase {
            ClockPhase::Idle => None,
            _ => Some(self.progress()),
        }
    }

    fn progress(&self) -> Progress {
        Progress {
            elapsed_ms: self.simulated_elapsed_ms,
            duration_ms: self.duration_ms,
            is_playing: self.running,
        }
    }

    fn token(&self) -> TickToken {
        TickToken {
            generation: self.generation,
        }
    }
}

// ── Driver ────────────────────────────────────────────────────────────────────

type ProgressSink = Box<dyn Fn(Option<Progress>)>;

struct ClockInner {
    state: RefCell<ClockState>,
    interval: Duration,
    bus: Rc<EventBus>,
    on_progress: RefCell<Option<ProgressSink>>,
}

/// Cheap handle; clones share one clock.
#[derive(Clone)]
pub struct PlaybackClock {
    inner: Rc<ClockInner>,
}

impl PlaybackClock {
    pub fn new(bus: Rc<EventBus>, interval: Duration) -> Self {
        Self {
            inner: Rc::new(ClockInner {
                state: RefCell::new(ClockState::default()),
                interval,
                bus,
                on_progress: RefCell::new(None),
            }),
        }
    }

    /// Receives every rendered value; `None` means nothing is loaded.
    pub fn set_progress_sink<F>(&self, sink: F)
    where
        F: Fn(Option<Progress>) + 'static,
    {
        *self.inner.on_progress.borrow_mut() = Some(Box::new(sink));
    }

    /// Reset from every `StateUpdated` published on the bus.
    pub fn attach(&self) {
        let weak = Rc::downgrade(&self.inner);
        self.inner
            .bus
            .subscribe(Topic::StateUpdated, "clock", move |event| {
                if let (Event::StateUpdated(update), Some(inner)) = (event, weak.upgrade()) {
                    PlaybackClock { inner }.reset(&update.snapshot);
                }
                Ok(())
            });
    }

    pub fn reset(&self, snapshot: &PlaybackSnapshot) {
        let (token, state) = {
            let mut state = self.inner.state.borrow_mut();
            let token = state.reset(snapshot);
            (token, state.clone())
        };
        debug!(
            "clock: reset gen={} {:?} {}/{}ms",
            state.generation, state.phase, state.simulated_elapsed_ms, state.duration_ms
        );

        match token {
            // First tick renders straight away.
            Some(token) => schedule(Rc::downgrade(&self.inner), token, Duration::ZERO),
            None => self.inner.emit(state.render()),
        }
    }

    pub fn stop(&self) {
        let mut state = self.inner.state.borrow_mut();
        state.stop();
        debug!(
            "clock: stopped at {}/{}ms",
            state.simulated_elapsed_ms, state.duration_ms
        );
    }

    #[cfg(test)]
    pub fn state(&self) -> ClockState {
        self.inner.state.borrow().clone()
    }
}

impl ClockInner {
    fn emit(&self, progress: Option<Progress>) {
        if let Some(sink) = self.on_progress.borrow().as_ref() {
            sink(progress);
        }
    }

    fn fire(self: &Rc<Self>, token: TickToken) {
        let interval_ms = self.interval.as_millis() as u64;
        let outcome = self.state.borrow_mut().tick(token, interval_ms);

        match outcome {
            TickOutcome::Stale => trace!("clock: stale tick gen={}", token.generation),
            TickOutcome::Advanced { rendered, next } => {
                self.emit(Some(rendered));
                schedule(Rc::downgrade(self), next, self.interval);
            }
            TickOutcome::Overrun { rendered } => {
                self.emit(Some(rendered));
                info!(
                    "clock: overrun {}ms > {}ms, track ended",
                    rendered.elapsed_ms, rendered.duration_ms
                );
                self.bus.publish(Event::TrackEnded);
            }
        }
    }
}

fn schedule(inner: Weak<ClockInner>, token: TickToken, delay: Duration) {
    tokio::task::spawn_local(async move {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(inner) = inner.upgrade() {
            inner.fire(token);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use deck_proto::protocol::Track;
    use std::cell::Cell;

    fn snapshot(elapsed_ms: u64, duration_ms: u64, is_playing: bool) -> PlaybackSnapshot {
        PlaybackSnapshot {
            item: Some(Track {
                id: "t".into(),
                uri: "spotify:track:t".into(),
                name: "T".into(),
                duration_ms,
                ..Default::default()
            }),
            elapsed_ms: Some(elapsed_ms),
            is_playing,
            ..Default::default()
        }
    }

    #[test]
    fn test_reset_twice_is_idempotent_except_generation() {
        let snap = snapshot(1_000, 5_000, true);

        let mut once = ClockState::default();
        once.reset(&snap);

        let mut twice = ClockState::default();
        twice.reset(&snap);
        twice.reset(&snap);

        assert_eq!(once.simulated_elapsed_ms, twice.simulated_elapsed_ms);
        assert_eq!(once.duration_ms, twice.duration_ms);
        assert_eq!(once.running, twice.running);
        assert_eq!(once.phase, twice.phase);
        assert_eq!(once.generation, 1);
        assert_eq!(twice.generation, 2);
    }

    #[test]
    fn test_stale_tick_is_noop() {
        let mut clock = ClockState::default();
        let old = clock.reset(&snapshot(0, 10_000, true)).unwrap();
        clock.reset(&snapshot(7_000, 10_000, true));

        assert_eq!(clock.tick(old, 1_000), TickOutcome::Stale);
        assert_eq!(clock.simulated_elapsed_ms, 7_000);
    }

    #[test]
    fn test_overrun_fires_once() {
        let mut clock = ClockState::default();
        let token = clock.reset(&snapshot(2_000, 3_000, true)).unwrap();

        let TickOutcome::Advanced { next, .. } = clock.tick(token, 1_000) else {
            panic!("first tick should advance");
        };
        let TickOutcome::Advanced { rendered, next } = clock.tick(next, 1_000) else {
            panic!("second tick should advance");
        };
        assert_eq!(rendered.elapsed_ms, 3_000);

        assert!(matches!(
            clock.tick(next, 1_000),
            TickOutcome::Overrun { rendered } if rendered.elapsed_ms == 4_000
        ));
        assert!(!clock.running);
        assert_eq!(clock.tick(next, 1_000), TickOutcome::Stale);
    }

    #[test]
    fn test_snapshot_already_past_end_overruns_on_first_tick() {
        let mut clock = ClockState::default();
        let token = clock.reset(&snapshot(9_000, 3_000, true)).unwrap();
        assert!(matches!(clock.tick(token, 1_000), TickOutcome::Overrun { .. }));
    }

    #[test]
    fn test_paused_and_idle_resets_schedule_nothing() {
        let mut clock = ClockState::default();
        assert_eq!(clock.reset(&snapshot(4_000, 9_000, false)), None);
        assert_eq!(clock.phase, ClockPhase::Paused);
        assert_eq!(
            clock.render(),
            Some(Progress {
                elapsed_ms: 4_000,
                duration_ms: 9_000,
                is_playing: false
            })
        );

        let running = clock.reset(&snapshot(0, 9_000, true)).unwrap();
        assert_eq!(clock.reset(&PlaybackSnapshot::default()), None);
        assert_eq!(clock.phase, ClockPhase::Idle);
        assert_eq!(clock.render(), None);
        assert_eq!(clock.tick(running, 1_000), TickOutcome::Stale);
    }

    #[test]
    fn test_zero_length_item_does_not_tick() {
        let mut clock = ClockState::default();
        assert_eq!(clock.reset(&snapshot(0, 0, true)), None);
        assert_eq!(clock.phase, ClockPhase::Paused);
        assert!(!clock.running);
        assert_eq!(clock.render().map(|p| p.duration_ms), Some(0));
    }

    #[test]
    fn test_missing_elapsed_starts_at_zero() {
        let mut clock = ClockState::default();
        let mut snap = snapshot(0, 9_000, true);
        snap.elapsed_ms = None;
        clock.reset(&snap);
        assert_eq!(clock.simulated_elapsed_ms, 0);
    }

    #[test]
    fn test_stop_keeps_basis() {
        let mut clock = ClockState::default();
        let token = clock.reset(&snapshot(1_000, 9_000, true)).unwrap();
        clock.tick(token, 1_000);
        clock.stop();

        assert_eq!(clock.simulated_elapsed_ms, 2_000);
        assert_eq!(clock.duration_ms, 9_000);
        assert_eq!(clock.phase, ClockPhase::Paused);
        assert_eq!(clock.tick(token, 1_000), TickOutcome::Stale);
    }

    // ── driver ────────────────────────────────────────────────────────────────

    fn driver() -> (PlaybackClock, Rc<Cell<usize>>, Rc<RefCell<Vec<Option<Progress>>>>) {
        let bus = Rc::new(EventBus::new());
        let ended = Rc::new(Cell::new(0));
        let e = ended.clone();
        bus.subscribe(Topic::TrackEnded, "test", move |_| {
            e.set(e.get() + 1);
            Ok(())
        });

        let clock = PlaybackClock::new(bus, Duration::from_millis(1_000));
        let rendered = Rc::new(RefCell::new(Vec::new()));
        let r = rendered.clone();
        clock.set_progress_sink(move |p| r.borrow_mut().push(p));
        (clock, ended, rendered)
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_publishes_track_ended_once() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let (clock, ended, rendered) = driver();
                clock.reset(&snapshot(2_000, 3_000, true));

                tokio::time::sleep(Duration::from_millis(2_500)).await;
                assert_eq!(ended.get(), 1);
                let values: Vec<u64> = rendered
                    .borrow()
                    .iter()
                    .flatten()
                    .map(|p| p.elapsed_ms)
                    .collect();
                assert_eq!(values, vec![2_000, 3_000, 4_000]);

                tokio::time::sleep(Duration::from_millis(5_000)).await;
                assert_eq!(ended.get(), 1);
                assert_eq!(rendered.borrow().len(), 3);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_reset_cancels_pending_chain() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let (clock, ended, rendered) = driver();
                clock.reset(&snapshot(0, 60_000, true));
                tokio::time::sleep(Duration::from_millis(500)).await;
                assert_eq!(rendered.borrow().len(), 1);

                clock.reset(&snapshot(30_000, 60_000, true));
                tokio::time::sleep(Duration::from_millis(1_700)).await;

                // The first chain's tick at 1000ms was dropped: only the new
                // chain rendered (30000 immediately, 31000 a second later).
                let values: Vec<u64> = rendered
                    .borrow()
                    .iter()
                    .flatten()
                    .map(|p| p.elapsed_ms)
                    .collect();
                assert_eq!(values, vec![0, 30_000, 31_000]);
                assert_eq!(ended.get(), 0);
                assert_eq!(clock.state().generation, 2);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_renders_idle_and_paused_once() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let (clock, _ended, rendered) = driver();
                clock.reset(&snapshot(5_000, 9_000, false));
                clock.reset(&PlaybackSnapshot::default());
                tokio::time::sleep(Duration::from_millis(3_000)).await;

                assert_eq!(
                    *rendered.borrow(),
                    vec![
                        Some(Progress {
                            elapsed_ms: 5_000,
                            duration_ms: 9_000,
                            is_playing: false
                        }),
                        None
                    ]
                );
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_attached_clock_follows_state_updates() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let bus = Rc::new(EventBus::new());
                let clock = PlaybackClock::new(bus.clone(), Duration::from_millis(1_000));
                clock.attach();

                let update = deck_proto::protocol::StateUpdate {
                    snapshot: snapshot(12_000, 20_000, false),
                    ..Default::default()
                };
                bus.publish(Event::StateUpdated(Rc::new(update)));

                let state = clock.state();
                assert_eq!(state.simulated_elapsed_ms, 12_000);
                assert_eq!(state.phase, ClockPhase::Paused);
            })
            .await;
    }
}
