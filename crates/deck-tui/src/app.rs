//! App — component-based event loop.
//!
//! Architecture:
//! - `App` owns all components and `AppState` (shared read-only data for components).
//! - Bus subscribers and the clock forward into a local `mpsc` channel of
//!   `AppMessage`; terminal input arrives on its own channel from a blocking
//!   reader thread.
//! - The event loop draws each frame, then awaits the next message.
//! - Components return `Vec<Action>`; `SendCommand` is published on the bus
//!   as a command event and the sequencer takes it from there.

use std::io;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use ratatui::crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
        KeyModifiers, MouseEvent, MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    Terminal,
};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use deck_proto::config::PollingConfig;
use deck_proto::protocol::{Command, SearchResults, StateUpdate};

use crate::{
    action::{Action, ComponentId},
    app_state::AppState,
    bus::{Event as BusEvent, EventBus, HandlerFailure, Notice, Topic},
    clock::{PlaybackClock, Progress},
    component::Component,
    components::{
        help_overlay::HelpOverlay,
        log_panel::LogPanel,
        now_playing::{seek_by, NowPlaying, SEEK_STEP_MS, VOLUME_STEP},
        playlists::Playlists,
        search::Search,
        track_list::{TrackList, TrackSource},
    },
    focus::FocusRing,
    widgets::{
        status_bar::{self, InputMode},
        toast::{Severity, ToastManager},
    },
};

const MAX_LOG_LINES: usize = 500;

// ── Internal messages ─────────────────────────────────────────────────────────

pub enum AppMessage {
    StateUpdated(Rc<StateUpdate>),
    SearchResults(Rc<SearchResults>),
    Notice(Notice),
    Progress(Option<Progress>),
}

/// Last drawn area of every clickable pane.
#[derive(Default, Clone, Copy)]
struct PaneAreas {
    screen: Rect,
    search_bar: Rect,
    now_playing: Rect,
    album: Rect,
    queue: Rect,
    playlists: Rect,
    log_panel: Rect,
}

pub struct AppOptions {
    pub log_path: PathBuf,
    /// Target of `D` (transfer playback).
    pub device_id: Option<String>,
    pub polling: PollingConfig,
}

pub struct App {
    bus: Rc<EventBus>,
    state: AppState,
    rx: mpsc::UnboundedReceiver<AppMessage>,
    failure_rx: mpsc::UnboundedReceiver<HandlerFailure>,

    now_playing: NowPlaying,
    album: TrackList,
    queue: TrackList,
    playlists: Playlists,
    search: Search,
    log_panel: LogPanel,
    help_overlay: HelpOverlay,

    focus: FocusRing,
    toast: ToastManager,
    pane_areas: PaneAreas,
    show_keys_bar: bool,
    should_quit: bool,
    options: AppOptions,
}

impl App {
    /// Build the UI and route bus traffic, clock renders and handler failures
    /// into it.
    pub fn new(bus: Rc<EventBus>, clock: &PlaybackClock, options: AppOptions) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<AppMessage>();

        let fwd = tx.clone();
        bus.subscribe(Topic::StateUpdated, "ui", move |event| {
            if let BusEvent::StateUpdated(update) = event {
                let _ = fwd.send(AppMessage::StateUpdated(Rc::clone(update)));
            }
            Ok(())
        });
        let fwd = tx.clone();
        bus.subscribe(Topic::SearchResults, "ui", move |event| {
            if let BusEvent::SearchResults(results) = event {
                let _ = fwd.send(AppMessage::SearchResults(Rc::clone(results)));
            }
            Ok(())
        });
        let fwd = tx.clone();
        bus.subscribe(Topic::Notice, "ui", move |event| {
            if let BusEvent::Notice(notice) = event {
                let _ = fwd.send(AppMessage::Notice(notice.clone()));
            }
            Ok(())
        });

        let fwd = tx;
        clock.set_progress_sink(move |progress| {
            let _ = fwd.send(AppMessage::Progress(progress));
        });

        let (failure_tx, failure_rx) = mpsc::unbounded_channel();
        bus.set_failure_sink(failure_tx);

        Self {
            bus,
            state: AppState::new(),
            rx,
            failure_rx,
            now_playing: NowPlaying::new(),
            album: TrackList::new(TrackSource::Album),
            queue: TrackList::new(TrackSource::Queue),
            playlists: Playlists::new(),
            search: Search::new(),
            log_panel: LogPanel::new(),
            help_overlay: HelpOverlay::new(),
            focus: FocusRing::new(Self::focus_order(false)),
            toast: ToastManager::new(),
            pane_areas: PaneAreas::default(),
            show_keys_bar: true,
            should_quit: false,
            options,
        }
    }

    fn focus_order(with_log: bool) -> Vec<ComponentId> {
        let mut order = vec![
            ComponentId::NowPlaying,
            ComponentId::Album,
            ComponentId::Queue,
            ComponentId::Playlists,
            ComponentId::Search,
        ];
        if with_log {
            order.push(ComponentId::LogPanel);
        }
        order
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        debug!("run(): enabling raw mode");
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        debug!("run(): terminal created, size={:?}", terminal.size());

        self.push_log("deck started".to_string());

        // ── Background task: keyboard/mouse events ────────────────────────────
        let (term_tx, mut term_rx) = mpsc::channel::<Event>(256);
        tokio::task::spawn_blocking(move || loop {
            match event::read() {
                Ok(ev) => {
                    if term_tx.blocking_send(ev).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        });

        // ── Periodic timers ───────────────────────────────────────────────────
        let mut toast_tick = tokio::time::interval(Duration::from_millis(100));
        toast_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // deck.log tail refresh: every 2s, only when the log panel is open
        let mut log_refresh = tokio::time::interval(Duration::from_secs(2));
        log_refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Passive state polling; startup already published a refresh.
        let poll_period = Duration::from_secs(self.options.polling.poll_interval_secs.max(1));
        let mut poll_tick = tokio::time::interval_at(Instant::now() + poll_period, poll_period);
        poll_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // ── Main loop ─────────────────────────────────────────────────────────
        let mut needs_redraw = true;
        loop {
            if needs_redraw {
                terminal.draw(|f| self.draw(f))?;
            }
            needs_redraw = false;

            if self.should_quit {
                break;
            }

            tokio::select! {
                Some(ev) = term_rx.recv() => {
                    needs_redraw = self.handle_terminal_event(ev);
                }

                Some(msg) = self.rx.recv() => {
                    const MAX_DRAIN: usize = 256;
                    let mut redraw = self.handle_message(msg);
                    let mut drained = 0usize;
                    while drained < MAX_DRAIN {
                        let Ok(next) = self.rx.try_recv() else {
                            break;
                        };
                        drained += 1;
                        redraw |= self.handle_message(next);
                    }
                    needs_redraw = redraw;
                }

                Some(failure) = self.failure_rx.recv() => {
                    self.on_failure(failure);
                    needs_redraw = true;
                }

                _ = toast_tick.tick() => {
                    if !self.toast.is_empty() {
                        self.toast.tick();
                        needs_redraw = true;
                    }
                }

                _ = log_refresh.tick() => {
                    if self.log_panel.expanded {
                        self.reload_tui_log();
                        needs_redraw = true;
                    }
                }

                _ = poll_tick.tick() => {
                    if self.options.polling.auto_polling {
                        self.bus.publish(BusEvent::Command(Command::Refresh { playlists: false }));
                    }
                }
            }
        }

        // ── Teardown ──────────────────────────────────────────────────────────
        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;
        info!("deck exiting");

        Ok(())
    }

    fn handle_terminal_event(&mut self, ev: Event) -> bool {
        let actions = match ev {
            Event::Key(key) if key.kind != KeyEventKind::Release => self.handle_key(key),
            Event::Mouse(mouse) => self.handle_mouse(mouse),
            Event::Resize(_, _) => return true,
            _ => return false,
        };
        for action in actions {
            self.dispatch(action);
        }
        true
    }

    /// Returns whether a redraw is needed.
    fn handle_message(&mut self, msg: AppMessage) -> bool {
        match msg {
            AppMessage::StateUpdated(update) => {
                self.state.update = Some(update);
                self.state.connected = true;
                self.state.last_error = None;
                let s = &self.state;
                self.now_playing.on_update(s);
                self.album.on_update(s);
                self.queue.on_update(s);
                self.playlists.on_update(s);
                self.search.on_update(s);
            }
            AppMessage::SearchResults(results) => {
                if results.is_empty() {
                    self.toast.push(
                        format!("no {} results for \"{}\"", results.kind.as_str(), results.query),
                        Severity::Info,
                    );
                }
                self.search.set_results(results);
            }
            AppMessage::Notice(notice) => {
                self.toast.notice(&notice);
                self.push_log(notice.text);
            }
            AppMessage::Progress(progress) => {
                if self.state.progress == progress {
                    return false;
                }
                self.state.progress = progress;
            }
        }
        true
    }

    fn on_failure(&mut self, failure: HandlerFailure) {
        self.state.connected = false;
        self.state.last_error = Some(failure.message.clone());
        self.toast.notice(&Notice::from(&failure));
        self.push_log(failure.to_string());
    }

    // ── Key handling ──────────────────────────────────────────────────────────

    fn handle_key(&mut self, key: KeyEvent) -> Vec<Action> {
        if key.code == KeyCode::Char('c') && key.modifiers == KeyModifiers::CONTROL {
            return vec![Action::Quit];
        }

        // A search prompt takes every key, `q` and `?` included.
        if self.search.is_typing() {
            return self.search.handle_key(key, &self.state);
        }

        // Global keys
        if self.state.input_mode == InputMode::Normal {
            match key.code {
                KeyCode::Char('q') if !self.search.overlay_visible() => {
                    return vec![Action::Quit];
                }
                KeyCode::Char('?') => return vec![Action::ToggleHelp],
                KeyCode::Char('L') => return vec![Action::ToggleLogs],
                KeyCode::Char('K') => return vec![Action::ToggleKeys],
                _ => {}
            }
        }

        // Overlays capture all keys when visible
        if self.help_overlay.visible {
            return self.help_overlay.handle_key(key, &self.state);
        }
        if self.search.overlay_visible() {
            return self.search.handle_key(key, &self.state);
        }

        // Tab / Shift-Tab always cycle focus (closing an open filter first)
        match key.code {
            KeyCode::Tab => {
                if self.state.input_mode == InputMode::Filter {
                    return vec![Action::CloseFilter, Action::FocusNext];
                }
                return vec![Action::FocusNext];
            }
            KeyCode::BackTab => {
                if self.state.input_mode == InputMode::Filter {
                    return vec![Action::CloseFilter, Action::FocusPrev];
                }
                return vec![Action::FocusPrev];
            }
            _ => {}
        }

        if self.state.input_mode == InputMode::Normal {
            if let Some(actions) = self.global_playback_key(key) {
                return actions;
            }
        }

        let s = &self.state;
        match self.focus.current() {
            Some(ComponentId::NowPlaying) => self.now_playing.handle_key(key, s),
            Some(ComponentId::Album) => self.album.handle_key(key, s),
            Some(ComponentId::Queue) => self.queue.handle_key(key, s),
            Some(ComponentId::Playlists) => self.playlists.handle_key(key, s),
            Some(ComponentId::Search) => self.search.handle_key(key, s),
            Some(ComponentId::LogPanel) => self.log_panel.handle_key(key, s),
            Some(ComponentId::HelpOverlay) | None => vec![],
        }
    }

    /// Playback keys that work from any pane in Normal mode.
    fn global_playback_key(&mut self, key: KeyEvent) -> Option<Vec<Action>> {
        let command = match key.code {
            KeyCode::Char(' ') => Command::TogglePlay,
            KeyCode::Char('n') => Command::SkipNext,
            KeyCode::Char('p') => Command::SkipPrevious,
            KeyCode::Char('0') => Command::RestartTrack,
            KeyCode::Char('s') => Command::ToggleShuffle,
            KeyCode::Char('r') => Command::CycleRepeat,
            KeyCode::Char('m') => Command::SetVolume { percent: 0 },
            KeyCode::Char('+') | KeyCode::Char('=') => Command::AdjustVolume { delta: VOLUME_STEP },
            KeyCode::Char('-') => Command::AdjustVolume {
                delta: -VOLUME_STEP,
            },
            KeyCode::Char(',') => return Some(vec![seek_by(&self.state, -SEEK_STEP_MS)]),
            KeyCode::Char('.') => return Some(vec![seek_by(&self.state, SEEK_STEP_MS)]),
            KeyCode::Char('u') => Command::Refresh { playlists: true },
            KeyCode::Char('d') => Command::ListDevices,
            KeyCode::Char('D') => match &self.options.device_id {
                Some(device_id) => Command::TransferPlayback {
                    device_id: device_id.clone(),
                },
                None => {
                    self.toast.push("no device_id configured", Severity::Warning);
                    return Some(vec![]);
                }
            },
            KeyCode::Char('/') => return Some(vec![Action::OpenSearch]),
            KeyCode::Char(c @ '1'..='6') => {
                self.focus.set_by_position((c as u8 - b'1') as usize);
                return Some(vec![]);
            }
            _ => return None,
        };
        Some(vec![Action::SendCommand(command)])
    }

    // ── Mouse handling ────────────────────────────────────────────────────────

    fn handle_mouse(&mut self, event: MouseEvent) -> Vec<Action> {
        let is_click = matches!(
            event.kind,
            MouseEventKind::Down(_) | MouseEventKind::ScrollUp | MouseEventKind::ScrollDown
        );
        if !is_click || self.help_overlay.visible {
            return vec![];
        }

        if self.search.overlay_visible() {
            return self
                .search
                .handle_mouse(event, self.pane_areas.screen, &self.state);
        }

        fn hit(r: Rect, col: u16, row: u16) -> bool {
            r.width > 0
                && r.height > 0
                && col >= r.x
                && col < r.x + r.width
                && row >= r.y
                && row < r.y + r.height
        }

        let (col, row) = (event.column, event.row);
        let areas = self.pane_areas;
        let s = &self.state;
        let (id, mut actions) = if hit(areas.now_playing, col, row) {
            (
                ComponentId::NowPlaying,
                self.now_playing.handle_mouse(event, areas.now_playing, s),
            )
        } else if hit(areas.album, col, row) {
            (ComponentId::Album, self.album.handle_mouse(event, areas.album, s))
        } else if hit(areas.queue, col, row) {
            (ComponentId::Queue, self.queue.handle_mouse(event, areas.queue, s))
        } else if hit(areas.playlists, col, row) {
            (
                ComponentId::Playlists,
                self.playlists.handle_mouse(event, areas.playlists, s),
            )
        } else if hit(areas.search_bar, col, row) {
            (
                ComponentId::Search,
                self.search.handle_mouse(event, areas.search_bar, s),
            )
        } else if hit(areas.log_panel, col, row) {
            (
                ComponentId::LogPanel,
                self.log_panel.handle_mouse(event, areas.log_panel, s),
            )
        } else {
            return vec![];
        };

        // Focus follows the click
        if self.focus.current() != Some(id) && self.focus.slot_of(id).is_some() {
            actions.insert(0, Action::FocusPane(id));
        }
        actions
    }

    // ── Action dispatcher ─────────────────────────────────────────────────────

    fn dispatch(&mut self, action: Action) {
        // Components react first (filters close, overlays toggle)
        let secondary: Vec<Action> = {
            let s = &self.state;
            let mut out = Vec::new();
            out.extend(self.now_playing.on_action(&action, s));
            out.extend(self.album.on_action(&action, s));
            out.extend(self.queue.on_action(&action, s));
            out.extend(self.playlists.on_action(&action, s));
            out.extend(self.search.on_action(&action, s));
            out.extend(self.log_panel.on_action(&action, s));
            out.extend(self.help_overlay.on_action(&action, s));
            out
        };

        self.apply_action(action);

        // Depth-limited to one level
        for a in secondary {
            self.apply_action(a);
        }
    }

    fn apply_action(&mut self, action: Action) {
        debug!("apply_action: {:?}", action);
        match action {
            Action::SendCommand(command) => {
                let label = command.label();
                if self.bus.publish(BusEvent::Command(command)) == 0 {
                    warn!("bus: no subscriber for command {}", label);
                }
            }

            Action::FocusNext => {
                self.focus.next();
                self.state.input_mode = InputMode::Normal;
            }
            Action::FocusPrev => {
                self.focus.prev();
                self.state.input_mode = InputMode::Normal;
            }
            Action::FocusPane(id) => {
                if self.state.input_mode == InputMode::Filter {
                    self.dispatch(Action::CloseFilter);
                }
                self.focus.set(id);
            }

            Action::OpenFilter => self.state.input_mode = InputMode::Filter,
            Action::CloseFilter => self.state.input_mode = InputMode::Normal,
            Action::OpenSearch => {
                self.focus.set(ComponentId::Search);
                self.state.input_mode = InputMode::Search;
            }
            Action::CloseSearch => self.state.input_mode = InputMode::Normal,
            Action::CloseResults => {}

            Action::ToggleLogs => {
                let expanded = self.log_panel.expanded;
                self.focus.set_items(Self::focus_order(expanded));
                if expanded {
                    self.reload_tui_log();
                }
            }
            Action::ToggleHelp => {}
            Action::ToggleKeys => self.show_keys_bar = !self.show_keys_bar,

            Action::Quit => self.should_quit = true,
        }
    }

    // ── Drawing ───────────────────────────────────────────────────────────────

    fn draw(&mut self, frame: &mut ratatui::Frame) {
        use crate::theme::C_BG;
        use ratatui::widgets::Block;
        let area = frame.area();

        frame.render_widget(
            Block::default().style(ratatui::style::Style::default().bg(C_BG)),
            area,
        );

        // ── Outer layout: search | now playing | body | log | status ─────────
        let status_h = if self.show_keys_bar { 1u16 } else { 0 };
        let log_h = if self.log_panel.expanded { 10u16 } else { 1 };

        let outer = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Length(5),
                Constraint::Min(0),
                Constraint::Length(log_h),
                Constraint::Length(status_h),
            ])
            .split(area);

        let focused = |id| self.focus.is_focused(id);
        let (f_search, f_now, f_album, f_queue, f_lists, f_log) = (
            focused(ComponentId::Search),
            focused(ComponentId::NowPlaying),
            focused(ComponentId::Album),
            focused(ComponentId::Queue),
            focused(ComponentId::Playlists),
            focused(ComponentId::LogPanel),
        );

        self.search.draw(frame, outer[0], f_search, &self.state);
        self.now_playing.draw(frame, outer[1], f_now, &self.state);

        // ── Body: album over playlists | queue ───────────────────────────────
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
            .split(outer[2]);
        let left = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(columns[0]);

        self.album.draw(frame, left[0], f_album, &self.state);
        self.playlists.draw(frame, left[1], f_lists, &self.state);
        self.queue.draw(frame, columns[1], f_queue, &self.state);
        self.log_panel.draw(frame, outer[3], f_log, &self.state);

        if self.show_keys_bar {
            status_bar::draw_keys_bar(frame, outer[4], self.state.input_mode, self.state.connected);
        }

        self.pane_areas = PaneAreas {
            screen: area,
            search_bar: outer[0],
            now_playing: outer[1],
            album: left[0],
            queue: columns[1],
            playlists: left[1],
            log_panel: outer[3],
        };

        // ── Overlays (results, help, then toasts on top) ─────────────────────
        self.search.draw_results(frame, area);
        self.help_overlay.draw(frame, area, false, &self.state);
        self.toast.draw(frame, area);
    }

    fn push_log(&mut self, msg: String) {
        let stamp = chrono::Local::now().format("%H:%M:%S");
        self.state.logs.push(format!("{} {}", stamp, msg));
        if self.state.logs.len() > MAX_LOG_LINES {
            self.state.logs.remove(0);
        }
    }

    /// Read the last lines of deck.log into state.tui_log_lines.
    fn reload_tui_log(&mut self) {
        if let Ok(content) = std::fs::read_to_string(&self.options.log_path) {
            let lines: Vec<&str> = content.lines().collect();
            let start = lines.len().saturating_sub(MAX_LOG_LINES);
            self.state.tui_log_lines = lines[start..].iter().map(|l| l.to_string()).collect();
        }
    }
}
