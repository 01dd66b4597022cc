//! Renewal credential persistence configuration.

use serde::{Deserialize, Serialize};

/// Where the renewal credential lives between process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceBackend {
    /// Kept in process memory only.
    #[default]
    Memory,
    /// Written to an owner-only JSON document.
    File,
}

/// Renewal persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Storage backend.
    #[serde(default)]
    pub backend: PersistenceBackend,
    /// Path of the session document for the `file` backend.
    #[serde(default = "default_path")]
    pub path: String,
    /// Max-age of the renewal cookie issued by a web-tier proxy, in days.
    #[serde(default = "default_cookie_max_age")]
    pub cookie_max_age_days: u32,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: PersistenceBackend::default(),
            path: default_path(),
            cookie_max_age_days: default_cookie_max_age(),
        }
    }
}

fn default_path() -> String {
    "data/session.json".to_string()
}

fn default_cookie_max_age() -> u32 {
    7
}
