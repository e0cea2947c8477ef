use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::platform;

/// Wait inserted after every remote command before trusting a read.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Interval between local playback clock ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

/// Credentials and endpoints for the streaming service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_accounts_url")]
    pub accounts_url: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub refresh_token: String,
    /// Output device to wake when play is pressed with nothing loaded.
    #[serde(default)]
    pub device_id: Option<String>,
    /// Context started on that device in the same situation.
    #[serde(default)]
    pub fallback_context_uri: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_auto_polling")]
    pub auto_polling: bool,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Where `settings.json` and `deck.log` live.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            accounts_url: default_accounts_url(),
            client_id: String::new(),
            client_secret: String::new(),
            refresh_token: String::new(),
            device_id: None,
            fallback_context_uri: None,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            auto_polling: default_auto_polling(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl TimingConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Never zero: a zero interval would spin the clock.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

impl RemoteConfig {
    /// Fill empty credentials from `CLIENT_ID`, `CLIENT_SECRET` and
    /// `REFRESH_TOKEN`.
    pub fn apply_env(&mut self) {
        fn fill(slot: &mut String, var: &str) {
            if let Ok(value) = std::env::var(var) {
                if !value.trim().is_empty() {
                    *slot = value;
                }
            }
        }
        fill(&mut self.client_id, "CLIENT_ID");
        fill(&mut self.client_secret, "CLIENT_SECRET");
        fill(&mut self.refresh_token, "REFRESH_TOKEN");
    }

    pub fn has_credentials(&self) -> bool {
        !self.client_id.is_empty() && !self.refresh_token.is_empty()
    }
}

fn default_api_base() -> String {
    "https://api.spotify.com/v1".to_string()
}

fn default_accounts_url() -> String {
    "https://accounts.spotify.com/api/token".to_string()
}

fn default_settle_delay_ms() -> u64 {
    DEFAULT_SETTLE_DELAY.as_millis() as u64
}

fn default_tick_interval_ms() -> u64 {
    DEFAULT_TICK_INTERVAL.as_millis() as u64
}

fn default_auto_polling() -> bool {
    true
}

fn default_poll_interval_secs() -> u64 {
    15
}

fn default_data_dir() -> PathBuf {
    platform::data_dir()
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }

    pub fn settings_path(&self) -> PathBuf {
        self.paths.data_dir.join("settings.json")
    }
}
