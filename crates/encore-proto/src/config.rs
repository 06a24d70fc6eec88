use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub tts: TtsConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub recommend: RecommendConfig,
}

/// Command socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Timing and sizing policy of the continuation controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// How long before the expected end of a track the monitor wakes up.
    #[serde(default = "default_monitor_prefire_ms")]
    pub monitor_prefire_ms: u64,
    /// Lower bound for the monitor's coarse wait.
    #[serde(default = "default_monitor_min_delay_ms")]
    pub monitor_min_delay_ms: u64,
    /// Poll interval once the monitor is confirming.
    #[serde(default = "default_confirm_poll_ms")]
    pub confirm_poll_ms: u64,
    /// Period of the global session poller.
    #[serde(default = "default_global_poll_ms")]
    pub global_poll_ms: u64,
    /// Delay before the autoplay guard is released after an attempt.
    #[serde(default = "default_autoplay_cooldown_ms")]
    pub autoplay_cooldown_ms: u64,
    #[serde(default = "default_recommendation_cap")]
    pub recommendation_cap: usize,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Delay between an explicit skip that empties the queue and the
    /// follow-up autoplay attempt.
    #[serde(default = "default_skip_autoplay_delay_ms")]
    pub skip_autoplay_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    #[serde(default = "default_tts_lang")]
    pub lang: String,
    #[serde(default)]
    pub slow: bool,
    #[serde(default = "default_tts_min_duration_ms")]
    pub min_duration_ms: u64,
    #[serde(default = "default_tts_ms_per_word")]
    pub ms_per_word: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Volume (percent) new sessions start at.
    #[serde(default = "default_volume")]
    pub default_volume: u32,
    /// Upper bound accepted by the volume command.
    #[serde(default = "default_max_volume")]
    pub max_volume: u32,
    /// mpv `--audio-device` used when a session names no voice target.
    #[serde(default)]
    pub audio_device: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            monitor_prefire_ms: default_monitor_prefire_ms(),
            monitor_min_delay_ms: default_monitor_min_delay_ms(),
            confirm_poll_ms: default_confirm_poll_ms(),
            global_poll_ms: default_global_poll_ms(),
            autoplay_cooldown_ms: default_autoplay_cooldown_ms(),
            recommendation_cap: default_recommendation_cap(),
            history_capacity: default_history_capacity(),
            skip_autoplay_delay_ms: default_skip_autoplay_delay_ms(),
        }
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            lang: default_tts_lang(),
            slow: false,
            min_duration_ms: default_tts_min_duration_ms(),
            ms_per_word: default_tts_ms_per_word(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_volume: default_volume(),
            max_volume: default_max_volume(),
            audio_device: None,
        }
    }
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
        }
    }
}

impl ControllerConfig {
    /// Poll periods feed `interval_at`, which rejects a zero period.
    pub fn confirm_poll(&self) -> Duration {
        Duration::from_millis(self.confirm_poll_ms.max(1))
    }

    pub fn global_poll(&self) -> Duration {
        Duration::from_millis(self.global_poll_ms.max(1))
    }

    pub fn autoplay_cooldown(&self) -> Duration {
        Duration::from_millis(self.autoplay_cooldown_ms)
    }

    pub fn skip_autoplay_delay(&self) -> Duration {
        Duration::from_millis(self.skip_autoplay_delay_ms)
    }

    /// Coarse wait before a track monitor starts confirming: ten seconds
    /// (by default) ahead of the expected end, never less than the minimum.
    /// Unknown lengths count as zero.
    pub fn monitor_delay(&self, duration_ms: Option<u64>) -> Duration {
        let ahead = duration_ms
            .unwrap_or(0)
            .saturating_sub(self.monitor_prefire_ms);
        Duration::from_millis(ahead.max(self.monitor_min_delay_ms))
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    platform::DAEMON_TCP_PORT
}

fn default_monitor_prefire_ms() -> u64 {
    10_000
}

fn default_monitor_min_delay_ms() -> u64 {
    1_000
}

fn default_confirm_poll_ms() -> u64 {
    500
}

fn default_global_poll_ms() -> u64 {
    2_000
}

fn default_autoplay_cooldown_ms() -> u64 {
    5_000
}

fn default_recommendation_cap() -> usize {
    7
}

fn default_history_capacity() -> usize {
    20
}

fn default_skip_autoplay_delay_ms() -> u64 {
    1_000
}

fn default_tts_lang() -> String {
    "en".to_string()
}

fn default_tts_min_duration_ms() -> u64 {
    2_000
}

fn default_tts_ms_per_word() -> u64 {
    400
}

fn default_volume() -> u32 {
    100
}

fn default_max_volume() -> u32 {
    5_000
}

fn default_user_agent() -> String {
    "Mozilla/5.0".to_string()
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
        let config: Self = toml::from_str(&content)?;
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
}
