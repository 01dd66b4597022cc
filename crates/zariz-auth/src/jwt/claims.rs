//! Claims carried by an access credential.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use zariz_core::types::Role;

/// Structured fields decoded from an access credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject, the principal id.
    pub sub: String,
    /// Role at the time of issuance.
    pub role: Role,
    /// Expiration timestamp (seconds since epoch).
    pub exp: i64,
    /// Issued-at timestamp (seconds since epoch).
    #[serde(default)]
    pub iat: Option<i64>,
    /// Stores the principal is scoped to.
    #[serde(default)]
    pub store_ids: Vec<i64>,
    /// Issuer-side session id.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Display name, when the issuer includes it.
    #[serde(default)]
    pub name: Option<String>,
}

impl Claims {
    /// Returns the expiration as a `DateTime<Utc>`.
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Checks whether this credential has expired.
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.exp
    }

    /// Time left before expiry (zero if expired).
    pub fn remaining(&self) -> Duration {
        let remaining = self.exp - Utc::now().timestamp();
        if remaining > 0 {
            Duration::from_secs(remaining as u64)
        } else {
            Duration::ZERO
        }
    }
}

/// An access credential paired with its decoded claims.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    claims: Claims,
}

impl Credential {
    pub(crate) fn new(token: String, claims: Claims) -> Self {
        Self { token, claims }
    }

    /// The opaque bearer value.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// The decoded claims.
    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    /// Whether the credential is past its expiry.
    pub fn is_expired(&self) -> bool {
        self.claims.is_expired()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("claims", &self.claims)
            .finish()
    }
}
