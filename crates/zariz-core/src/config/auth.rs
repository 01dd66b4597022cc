//! Authentication and renewal configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{Backoff, Role};

/// Whether the issuer hands out a fresh renewal credential on every renewal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    /// Every renewal consumes the stored renewal credential and returns a
    /// replacement.
    #[default]
    Rotating,
    /// The same renewal credential is reused for the whole session.
    Fixed,
}

/// Auth collaborator and renewal scheduling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Base URL of the auth service (e.g. `http://localhost:8000/v1`).
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Renew this many seconds before the access credential expires.
    #[serde(default = "default_safety_margin")]
    pub safety_margin_seconds: u64,
    /// Lower bound for a scheduled renewal delay.
    #[serde(default = "default_min_refresh_delay")]
    pub min_refresh_delay_ms: u64,
    /// First retry delay after a failed renewal.
    #[serde(default = "default_base_backoff")]
    pub base_backoff_ms: u64,
    /// Upper bound for the renewal retry delay (before jitter).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
    /// Maximum random jitter added to each retry delay.
    #[serde(default = "default_jitter")]
    pub jitter_ms: u64,
    /// Consecutive transient renewal failures tolerated before the session
    /// is ended.
    #[serde(default = "default_max_renewal_failures")]
    pub max_renewal_failures: u32,
    /// Renewal credential rotation policy.
    #[serde(default)]
    pub rotation: RotationPolicy,
    /// Roles allowed to hold a session in this client.
    #[serde(default = "default_allowed_roles")]
    pub allowed_roles: Vec<Role>,
    /// Timeout for a single auth request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl AuthConfig {
    /// The renewal safety margin.
    pub fn safety_margin(&self) -> Duration {
        Duration::from_secs(self.safety_margin_seconds)
    }

    /// The minimum delay for a scheduled renewal.
    pub fn min_refresh_delay(&self) -> Duration {
        Duration::from_millis(self.min_refresh_delay_ms)
    }

    /// Retry strategy for failed renewals.
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.base_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
            Duration::from_millis(self.jitter_ms),
        )
    }

    /// Timeout for a single auth request.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            safety_margin_seconds: default_safety_margin(),
            min_refresh_delay_ms: default_min_refresh_delay(),
            base_backoff_ms: default_base_backoff(),
            max_backoff_ms: default_max_backoff(),
            jitter_ms: default_jitter(),
            max_renewal_failures: default_max_renewal_failures(),
            rotation: RotationPolicy::default(),
            allowed_roles: default_allowed_roles(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000/v1".to_string()
}

fn default_safety_margin() -> u64 {
    120
}

fn default_min_refresh_delay() -> u64 {
    250
}

fn default_base_backoff() -> u64 {
    1_000
}

fn default_max_backoff() -> u64 {
    60_000
}

fn default_jitter() -> u64 {
    250
}

fn default_max_renewal_failures() -> u32 {
    5
}

fn default_allowed_roles() -> Vec<Role> {
    vec![Role::Courier, Role::Store, Role::Admin]
}

fn default_request_timeout() -> u64 {
    10
}
