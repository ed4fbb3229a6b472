//! Session tuning and transport selection.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::transport::{PushTransport, Transport, WebSocketTransport};
use crate::util::{is_http_url, is_ws_url, normalize_text_option};

const DEFAULT_SYNC_INTERVAL_MS: u64 = 30_000;
const DEFAULT_RECONNECT_BASE_DELAY_MS: u64 = 1_000;
const DEFAULT_RECONNECT_MAX_DELAY_MS: u64 = 30_000;
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 15_000;
const DEFAULT_HEARTBEAT_TIMEOUT_MS: u64 = 45_000;

/// Timers and limits of a sync session. Missing fields take their defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    pub sync_interval_ms: u64,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    pub max_reconnect_attempts: u32,
    pub connect_timeout_ms: u64,
    /// `None` disables heartbeats and the idle timeout
    pub heartbeat_interval_ms: Option<u64>,
    pub heartbeat_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sync_interval_ms: DEFAULT_SYNC_INTERVAL_MS,
            reconnect_base_delay_ms: DEFAULT_RECONNECT_BASE_DELAY_MS,
            reconnect_max_delay_ms: DEFAULT_RECONNECT_MAX_DELAY_MS,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            heartbeat_interval_ms: Some(DEFAULT_HEARTBEAT_INTERVAL_MS),
            heartbeat_timeout_ms: DEFAULT_HEARTBEAT_TIMEOUT_MS,
        }
    }
}

impl SessionConfig {
    pub const fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    pub const fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms)
    }

    pub const fn reconnect_max_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_delay_ms)
    }

    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.heartbeat_interval_ms
            .filter(|interval| *interval > 0)
            .map(Duration::from_millis)
    }

    pub const fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    #[must_use]
    pub const fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval_ms = duration_millis(interval);
        self
    }

    #[must_use]
    pub const fn with_reconnect_delays(mut self, base: Duration, max: Duration) -> Self {
        self.reconnect_base_delay_ms = duration_millis(base);
        self.reconnect_max_delay_ms = duration_millis(max);
        self
    }

    #[must_use]
    pub const fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = duration_millis(timeout);
        self
    }

    #[must_use]
    pub const fn with_heartbeat(mut self, interval: Option<Duration>, timeout: Duration) -> Self {
        self.heartbeat_interval_ms = match interval {
            Some(interval) => Some(duration_millis(interval)),
            None => None,
        };
        self.heartbeat_timeout_ms = duration_millis(timeout);
        self
    }

    /// Reject settings that would spin or never fire.
    pub fn validate(&self) -> Result<()> {
        if self.sync_interval_ms == 0 {
            return Err(Error::InvalidInput(
                "syncIntervalMs must be greater than zero".to_string(),
            ));
        }
        if self.reconnect_base_delay_ms == 0 {
            return Err(Error::InvalidInput(
                "reconnectBaseDelayMs must be greater than zero".to_string(),
            ));
        }
        if self.reconnect_max_delay_ms < self.reconnect_base_delay_ms {
            return Err(Error::InvalidInput(
                "reconnectMaxDelayMs must not be below reconnectBaseDelayMs".to_string(),
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(Error::InvalidInput(
                "connectTimeoutMs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn duration_millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

/// Which channel the session uses to reach the peer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TransportConfig {
    /// Bidirectional WebSocket at `url` (`ws://` or `wss://`)
    #[serde(rename_all = "camelCase")]
    Websocket { url: String },
    /// Server-sent events in, HTTP POST out
    #[serde(rename_all = "camelCase")]
    Push {
        events_url: String,
        api_base_url: String,
    },
}

impl TransportConfig {
    pub fn endpoint(&self) -> &str {
        match self {
            Self::Websocket { url } => url,
            Self::Push { events_url, .. } => events_url,
        }
    }

    /// Check URLs and build the matching transport.
    pub fn build(&self) -> Result<Box<dyn Transport>> {
        match self {
            Self::Websocket { url } => {
                let url = require_url(Some(url.clone()), "websocket url", is_ws_url)?;
                Ok(Box::new(WebSocketTransport::new(url)))
            }
            Self::Push {
                events_url,
                api_base_url,
            } => {
                let events_url = require_url(Some(events_url.clone()), "eventsUrl", is_http_url)?;
                let api_base_url =
                    require_url(Some(api_base_url.clone()), "apiBaseUrl", is_http_url)?;
                Ok(Box::new(PushTransport::new(events_url, api_base_url)?))
            }
        }
    }
}

fn require_url(value: Option<String>, field: &str, valid: fn(&str) -> bool) -> Result<String> {
    let url = normalize_text_option(value)
        .ok_or_else(|| Error::InvalidInput(format!("{field} must not be empty")))?;
    if valid(&url) {
        Ok(url.trim_end_matches('/').to_string())
    } else {
        Err(Error::InvalidInput(format!("{field} is not a valid URL: {url}")))
    }
}
