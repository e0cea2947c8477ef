//! Action enum — all user-initiated intents and internal events.

use deck_proto::protocol::Command;

/// Unique identifier for a focusable component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentId {
    NowPlaying,
    Album,
    Queue,
    Playlists,
    Search,
    LogPanel,
    HelpOverlay,
}

/// All actions that can flow through the system.
/// Components produce Actions; the App dispatches them.
#[derive(Debug, Clone)]
pub enum Action {
    // ── Remote ───────────────────────────────────────────────────────────────
    /// Published on the bus as a command event.
    SendCommand(Command),

    // ── Navigation ───────────────────────────────────────────────────────────
    FocusNext,
    FocusPrev,
    FocusPane(ComponentId),

    // ── Filter/search ────────────────────────────────────────────────────────
    OpenFilter,
    CloseFilter,
    OpenSearch,
    CloseSearch,
    CloseResults,

    // ── UI toggles ───────────────────────────────────────────────────────────
    ToggleLogs,
    ToggleHelp,
    ToggleKeys,

    // ── System ───────────────────────────────────────────────────────────────
    Quit,
}
