//! Interactive session configuration for the `zariz-events` binary.

use serde::{Deserialize, Serialize};

/// Where the binary reads login credentials from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Environment variable holding the login identifier.
    #[serde(default = "default_identifier_env")]
    pub identifier_env: String,
    /// Environment variable holding the login secret.
    #[serde(default = "default_secret_env")]
    pub secret_env: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            identifier_env: default_identifier_env(),
            secret_env: default_secret_env(),
        }
    }
}

fn default_identifier_env() -> String {
    "ZARIZ_IDENTIFIER".to_string()
}

fn default_secret_env() -> String {
    "ZARIZ_SECRET".to_string()
}
