mod action;
mod app;
mod app_state;
mod bus;
mod clock;
mod component;
mod components;
mod focus;
mod sequencer;
mod spotify;
mod theme;
mod transport;
mod widgets;

#[cfg(test)]
mod testing;

use std::rc::Rc;

use deck_proto::config::Config;
use deck_proto::protocol::Command;
use deck_proto::state::SettingsStore;

use crate::bus::{Event, EventBus};
use crate::clock::PlaybackClock;
use crate::sequencer::{CommandSequencer, SequencerOptions};
use crate::spotify::SpotifyClient;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Everything shares Rc state, so the whole program runs on one LocalSet.
    let local = tokio::task::LocalSet::new();
    local.run_until(run()).await
}

async fn run() -> anyhow::Result<()> {
    let mut config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("deck: config unreadable ({:#}), using defaults", e);
            Config::default()
        }
    };
    config.remote.apply_env();

    let data_dir = config.paths.data_dir.clone();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("deck.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    // Allow RUST_LOG override; default to debug for app code but suppress noisy
    // connection-level DEBUG from HTTP client internals (hyper_util, reqwest).
    let log_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "debug,hyper_util=warn,reqwest=warn,hyper=warn".to_string());
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(log_filter.as_str())
        .with_ansi(false)
        .init();

    // Print log path to stderr so the operator can tail it immediately.
    eprintln!("deck log: {}", log_path.display());

    tracing::info!("deck starting…");
    if !config.remote.has_credentials() {
        tracing::warn!("no credentials configured; every remote call will fail");
    }

    // ── Bus + clock ──────────────────────────────────────────────────────────
    let bus = Rc::new(EventBus::new());
    let clock = PlaybackClock::new(Rc::clone(&bus), config.timing.tick_interval());
    clock.attach();

    // ── Sequencer ────────────────────────────────────────────────────────────
    let settings = SettingsStore::load(config.settings_path());
    let transport = Rc::new(SpotifyClient::new(config.remote.clone()));
    let sequencer = CommandSequencer::new(
        transport,
        Rc::clone(&bus),
        clock.clone(),
        settings,
        SequencerOptions {
            settle_delay: config.timing.settle_delay(),
            device_id: config.remote.device_id.clone(),
            fallback_context_uri: config.remote.fallback_context_uri.clone(),
        },
    );
    sequencer.attach();

    // ── Run TUI ──────────────────────────────────────────────────────────────
    let app = app::App::new(
        Rc::clone(&bus),
        &clock,
        app::AppOptions {
            log_path,
            device_id: config.remote.device_id.clone(),
            polling: config.polling.clone(),
        },
    );

    bus.publish(Event::Command(Command::Refresh { playlists: true }));

    let result = app.run().await;
    clock.stop();
    if let Err(e) = &result {
        tracing::error!("deck exited with error: {:#}", e);
    }
    result
}
