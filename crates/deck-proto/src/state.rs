//! Small persisted settings record.
//!
//! Holds the last user-chosen shuffle preference so the sequencer has a value
//! to restore after a context switch before any command of this session has
//! set one.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Settings {
    #[serde(default, alias = "onStartShuffleState")]
    pub on_start_shuffle_state: bool,
}

pub struct SettingsStore {
    settings: Settings,
    settings_file: PathBuf,
}

impl SettingsStore {
    /// Load from `settings_file`; a missing or unreadable file yields defaults.
    pub fn load(settings_file: PathBuf) -> Self {
        let settings = Self::load_persistent(&settings_file);
        Self {
            settings,
            settings_file,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn on_start_shuffle_state(&self) -> bool {
        self.settings.on_start_shuffle_state
    }

    pub fn set_shuffle_preference(&mut self, enabled: bool) -> anyhow::Result<()> {
        self.settings.on_start_shuffle_state = enabled;
        self.save()
    }

    pub fn path(&self) -> &Path {
        &self.settings_file
    }

    fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.settings_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.settings)?;
        std::fs::write(&self.settings_file, json)?;
        Ok(())
    }

    fn load_persistent(settings_file: &Path) -> Settings {
        let content = match std::fs::read_to_string(settings_file) {
            Ok(c) => c,
            Err(_) => return Settings::default(),
        };
        match serde_json::from_str::<Settings>(&content) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(
                    "settings: ignoring unreadable {}: {}",
                    settings_file.display(),
                    e
                );
                Settings::default()
            }
        }
    }
}
