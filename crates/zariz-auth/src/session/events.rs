//! Session lifecycle notifications.

use chrono::{DateTime, Utc};

use zariz_core::types::Role;

/// Broadcast by [`SessionManager`](super::SessionManager) on every
/// lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A login succeeded.
    LoggedIn {
        /// Subject of the new principal.
        subject: String,
        /// Its role.
        role: Role,
    },
    /// A fresh access credential was stored.
    Renewed {
        /// Subject of the principal.
        subject: String,
        /// Expiry of the new credential.
        expires_at: DateTime<Utc>,
    },
    /// The session was ended on request.
    LoggedOut,
    /// The session was ended by the core; the principal must log in again.
    Expired {
        /// Why the session ended.
        reason: String,
    },
}
