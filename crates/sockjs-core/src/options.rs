//! Per-application session options.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Options applied to every session of one installed application.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SockJsOptions {
    /// How long a detached session waits for a new listener, in milliseconds.
    pub session_timeout_ms: u64,
    /// Interval between heartbeat frames on an idle listener, in milliseconds.
    pub heartbeat_period_ms: u64,
    /// Payload bytes after which a streaming response is recycled.
    pub max_bytes_streaming: usize,
    /// Whether responses carry a `JSESSIONID` cookie.
    pub insert_jsessionid: bool,
    /// Whether the full-duplex transport is offered.
    pub websocket_enabled: bool,
}

impl Default for SockJsOptions {
    fn default() -> Self {
        Self {
            session_timeout_ms: 5_000,
            heartbeat_period_ms: 25_000,
            max_bytes_streaming: 128 * 1024,
            insert_jsessionid: true,
            websocket_enabled: true,
        }
    }
}

impl SockJsOptions {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_millis(self.heartbeat_period_ms)
    }
}
