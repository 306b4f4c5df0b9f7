//! Client settings and configuration

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable that overrides the stored auth token
pub const TOKEN_ENV_VAR: &str = "GHCHAT_TOKEN";

/// Client settings
///
/// Stored as JSON; missing fields fall back to their defaults so older
/// files keep loading.
///
/// # Example
/// ```rust,no_run
/// use ghchat::config::Settings;
///
/// let settings = Settings::load("ghchat.json").expect("Failed to load");
/// println!("API: {}", settings.api_base_url);
/// println!("Message cache TTL: {:?}", settings.message_cache_ttl());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base URL of the REST API
    pub api_base_url: String,
    /// URL of the realtime websocket endpoint
    pub realtime_url: String,
    /// Bearer token issued by the auth collaborator
    pub auth_token: Option<String>,
    /// Freshness window of a conversation's message cache (milliseconds)
    pub message_cache_ttl_ms: u64,
    /// Freshness window of the conversation list cache (milliseconds)
    pub list_cache_ttl_ms: u64,
    /// Delay before opened messages are reported read (milliseconds)
    pub read_receipt_delay_ms: u64,
    /// Idle time after the last keystroke before stop-typing is sent (milliseconds)
    pub typing_idle_ms: u64,
    /// Number of most recent conversations whose messages are prefetched
    pub prefetch_count: usize,
    /// Messages retained per conversation while it is not open
    pub max_retained_messages: usize,
    /// First reconnect delay (milliseconds)
    pub reconnect_base_delay_ms: u64,
    /// Upper bound of the reconnect delay (milliseconds)
    pub reconnect_max_delay_ms: u64,
}

impl Settings {
    /// Load settings from a JSON file
    ///
    /// Returns default settings if the file doesn't exist or is empty. The
    /// `GHCHAT_TOKEN` environment variable, when set, overrides the token.
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let mut settings = if !path.exists() {
            Self::default()
        } else {
            let data = std::fs::read_to_string(path)
                .map_err(|e| Error::Config(format!("Failed to read settings: {}", e)))?;

            if data.trim().is_empty() {
                Self::default()
            } else {
                serde_json::from_str(&data)
                    .map_err(|e| Error::Config(format!("Failed to parse settings: {}", e)))?
            }
        };

        settings.apply_token_override(std::env::var(TOKEN_ENV_VAR).ok());
        settings.validate()?;
        Ok(settings)
    }

    /// Replace the token with a non-blank override
    pub fn apply_token_override(&mut self, token: Option<String>) {
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.auth_token = Some(token.trim().to_string());
        }
    }

    /// Save settings to a JSON file
    pub fn save<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;

        Ok(())
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let api = url::Url::parse(&self.api_base_url)?;
        if !matches!(api.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "api_base_url must be http(s), got {}",
                api.scheme()
            )));
        }

        let realtime = url::Url::parse(&self.realtime_url)?;
        if !matches!(realtime.scheme(), "ws" | "wss") {
            return Err(Error::Config(format!(
                "realtime_url must be ws(s), got {}",
                realtime.scheme()
            )));
        }

        let timers = [
            ("message_cache_ttl_ms", self.message_cache_ttl_ms),
            ("list_cache_ttl_ms", self.list_cache_ttl_ms),
            ("read_receipt_delay_ms", self.read_receipt_delay_ms),
            ("typing_idle_ms", self.typing_idle_ms),
            ("reconnect_base_delay_ms", self.reconnect_base_delay_ms),
        ];
        for (name, value) in timers {
            if value == 0 {
                return Err(Error::Config(format!("{} must be greater than zero", name)));
            }
        }

        if self.reconnect_max_delay_ms < self.reconnect_base_delay_ms {
            return Err(Error::Config(
                "reconnect_max_delay_ms must not be below reconnect_base_delay_ms".to_string(),
            ));
        }

        Ok(())
    }

    /// Message cache TTL
    pub fn message_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.message_cache_ttl_ms)
    }

    /// Conversation list cache TTL
    pub fn list_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.list_cache_ttl_ms)
    }

    /// Delay before read receipts are sent
    pub fn read_receipt_delay(&self) -> Duration {
        Duration::from_millis(self.read_receipt_delay_ms)
    }

    /// Typing idle timeout
    pub fn typing_idle(&self) -> Duration {
        Duration::from_millis(self.typing_idle_ms)
    }

    /// First reconnect delay
    pub fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms)
    }

    /// Reconnect delay cap
    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_delay_ms)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8787".to_string(),
            realtime_url: "ws://localhost:8787/ws".to_string(),
            auth_token: None,
            message_cache_ttl_ms: 30_000,
            list_cache_ttl_ms: 10_000,
            read_receipt_delay_ms: 1_500,
            typing_idle_ms: 2_000,
            prefetch_count: 5,
            max_retained_messages: 200,
            reconnect_base_delay_ms: 1_000,
            reconnect_max_delay_ms: 30_000,
        }
    }
}
