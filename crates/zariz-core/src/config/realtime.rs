//! Realtime event stream configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::Backoff;

/// Realtime (SSE) client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Stream endpoint URL; the credential is appended as `?token=`.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// First reconnect delay after a stream failure.
    #[serde(default = "default_base_reconnect")]
    pub base_reconnect_ms: u64,
    /// Upper bound for the reconnect delay (before jitter).
    #[serde(default = "default_max_reconnect")]
    pub max_reconnect_ms: u64,
    /// Maximum random jitter added to each reconnect delay.
    #[serde(default = "default_jitter")]
    pub jitter_ms: u64,
}

impl RealtimeConfig {
    /// Reconnect strategy for the stream.
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.base_reconnect_ms),
            Duration::from_millis(self.max_reconnect_ms),
            Duration::from_millis(self.jitter_ms),
        )
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            base_reconnect_ms: default_base_reconnect(),
            max_reconnect_ms: default_max_reconnect(),
            jitter_ms: default_jitter(),
        }
    }
}

fn default_endpoint() -> String {
    "http://localhost:8000/v1/events/sse".to_string()
}

fn default_base_reconnect() -> u64 {
    1_000
}

fn default_max_reconnect() -> u64 {
    30_000
}

fn default_jitter() -> u64 {
    1_000
}
