//! Persistent tier for the renewal credential.

use async_trait::async_trait;

use crate::result::AppResult;
use crate::types::StoredSession;

/// Trait for renewal credential persistence (process memory, protected
/// file, platform keychain).
///
/// A store holds at most one session; `save` overwrites, never appends.
#[async_trait]
pub trait RenewalStore: Send + Sync + std::fmt::Debug + 'static {
    /// Load the persisted session, if any.
    async fn load(&self) -> AppResult<Option<StoredSession>>;

    /// Persist `session`, replacing any previous record.
    async fn save(&self, session: &StoredSession) -> AppResult<()>;

    /// Remove the persisted session. Clearing an empty store succeeds.
    async fn clear(&self) -> AppResult<()>;
}
