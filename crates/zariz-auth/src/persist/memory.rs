//! Process-memory renewal store.

use async_trait::async_trait;
use tokio::sync::RwLock;

use zariz_core::result::AppResult;
use zariz_core::traits::RenewalStore;
use zariz_core::types::StoredSession;

/// Keeps the renewal credential in memory only; it never outlives the
/// process.
#[derive(Debug, Default)]
pub struct MemoryRenewalStore {
    session: RwLock<Option<StoredSession>>,
}

impl MemoryRenewalStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RenewalStore for MemoryRenewalStore {
    async fn load(&self) -> AppResult<Option<StoredSession>> {
        Ok(self.session.read().await.clone())
    }

    async fn save(&self, session: &StoredSession) -> AppResult<()> {
        *self.session.write().await = Some(session.clone());
        Ok(())
    }

    async fn clear(&self) -> AppResult<()> {
        *self.session.write().await = None;
        Ok(())
    }
}
