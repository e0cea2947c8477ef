pub mod help_overlay;
pub mod log_panel;
pub mod now_playing;
pub mod playlists;
pub mod search;
pub mod track_list;
