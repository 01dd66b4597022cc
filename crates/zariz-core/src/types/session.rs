//! Credential material exchanged with the auth collaborator and persisted
//! between runs.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::role::Role;

/// Credentials returned by `login` and `renew`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Short-lived bearer credential.
    pub access_token: String,
    /// Longer-lived renewal credential, when the issuer returned one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl TokenPair {
    /// Construct a pair.
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
        }
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// What the persistent tier keeps: the renewal credential plus enough of
/// the principal to rebuild a session without a network round trip.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    /// The renewal credential.
    pub renewal_credential: String,
    /// Subject id of the principal.
    pub subject: String,
    /// Role at the time of the last successful exchange.
    pub role: Role,
    /// Stores the principal is scoped to.
    #[serde(default)]
    pub store_ids: Vec<i64>,
    /// Login identifier, for display.
    #[serde(default)]
    pub identifier: Option<String>,
    /// When this record was written.
    pub saved_at: DateTime<Utc>,
}

impl fmt::Debug for StoredSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredSession")
            .field("renewal_credential", &"<redacted>")
            .field("subject", &self.subject)
            .field("role", &self.role)
            .field("store_ids", &self.store_ids)
            .field("identifier", &self.identifier)
            .field("saved_at", &self.saved_at)
            .finish()
    }
}
