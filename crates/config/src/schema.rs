/// Config schema types (server, session store, channels, debounce timers).
use std::{collections::BTreeMap, time::Duration};

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParleyConfig {
    pub server: ServerConfig,
    pub session: SessionConfig,
    /// Conversation state every new session starts from.
    pub initial_state: serde_json::Map<String, serde_json::Value>,
    /// Channel name → channel settings. Ordered so webhook routes mount
    /// deterministically.
    pub channels: BTreeMap<String, ChannelConfig>,
}

/// Webhook server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to. Defaults to "127.0.0.1".
    pub bind: String,
    /// Port to listen on. Defaults to 5000.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 5000,
        }
    }
}

/// Which backend persists sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionDriver {
    #[default]
    Memory,
    File,
    /// Any driver name this build does not ship; falls back to memory.
    #[serde(other)]
    Unknown,
}

/// Session store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub driver: SessionDriver,
    /// Minutes of inactivity after which a session is treated as gone.
    /// `None` keeps sessions for a year (memory) or forever (file).
    pub expires_in: Option<u64>,
    pub memory: MemoryStoreConfig,
    pub file: FileStoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryStoreConfig {
    /// Maximum number of sessions kept before least-recently-used eviction.
    pub max_size: u64,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self { max_size: 500 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileStoreConfig {
    pub dirname: String,
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self {
            dirname: ".sessions".into(),
        }
    }
}

/// Per-channel settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub enabled: bool,
    /// Webhook path. Defaults to `/webhooks/<channel>`.
    pub path: Option<String>,
    /// Answer the webhook only after handling finished, returning the
    /// handler's response.
    pub sync: bool,
    pub timer: TimerConfig,
}

impl ChannelConfig {
    pub fn webhook_path(&self, channel: &str) -> String {
        self.path
            .clone()
            .unwrap_or_else(|| format!("/webhooks/{channel}"))
    }
}

/// How a new message moves the deadline of an open debounce window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerMode {
    /// Consume the elapsed time, then add `extend_duration`.
    #[default]
    Extend,
    /// Restart the window with its current length.
    Refresh,
    /// Never move the deadline.
    Fixed,
}

impl std::fmt::Display for TimerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Extend => write!(f, "extend"),
            Self::Refresh => write!(f, "refresh"),
            Self::Fixed => write!(f, "fixed"),
        }
    }
}

/// Debounce window settings. Durations are in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    pub enabled: bool,
    pub initial_duration: u64,
    pub extend_duration: u64,
    /// Mark the conversation seen this long before the window closes (0 = never).
    pub show_seen_before_end_ms: u64,
    /// Turn typing on this long before the window closes (0 = never).
    pub show_typing_before_end_ms: u64,
    pub mode: TimerMode,
    /// Once seen was marked for a session, mark every later event seen
    /// right away instead of waiting for the timer.
    pub seen_always_after_first: bool,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            initial_duration: 15_000,
            extend_duration: 5_000,
            show_seen_before_end_ms: 7_000,
            show_typing_before_end_ms: 3_500,
            mode: TimerMode::Extend,
            seen_always_after_first: false,
        }
    }
}

impl TimerConfig {
    pub fn initial(&self) -> Duration {
        Duration::from_millis(self.initial_duration)
    }

    pub fn extend(&self) -> Duration {
        Duration::from_millis(self.extend_duration)
    }

    pub fn seen_before_end(&self) -> Duration {
        Duration::from_millis(self.show_seen_before_end_ms)
    }

    pub fn typing_before_end(&self) -> Duration {
        Duration::from_millis(self.show_typing_before_end_ms)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn timer_defaults_match_documented_values() {
        let timer = TimerConfig::default();
        assert!(!timer.enabled);
        assert_eq!(timer.initial(), Duration::from_secs(15));
        assert_eq!(timer.extend(), Duration::from_secs(5));
        assert_eq!(timer.seen_before_end(), Duration::from_secs(7));
        assert_eq!(timer.typing_before_end(), Duration::from_millis(3500));
        assert_eq!(timer.mode, TimerMode::Extend);
    }

    #[test]
    fn partial_channel_table_keeps_defaults() {
        let cfg: ParleyConfig = toml::from_str(
            r#"
            [channels.console]
            enabled = true
            sync = true

            [channels.console.timer]
            enabled = true
            mode = "refresh"
            initial_duration = 2000
            "#,
        )
        .unwrap();
        let console = &cfg.channels["console"];
        assert!(console.enabled && console.sync);
        assert_eq!(console.timer.mode, TimerMode::Refresh);
        assert_eq!(console.timer.initial_duration, 2000);
        assert_eq!(console.timer.extend_duration, 5000);
        assert_eq!(console.webhook_path("console"), "/webhooks/console");
    }

    #[test]
    fn unknown_session_driver_parses_as_unknown() {
        let cfg: ParleyConfig = toml::from_str("[session]\ndriver = \"redis\"").unwrap();
        assert_eq!(cfg.session.driver, SessionDriver::Unknown);
        assert_eq!(cfg.session.memory.max_size, 500);
        assert_eq!(cfg.session.file.dirname, ".sessions");
    }
}
