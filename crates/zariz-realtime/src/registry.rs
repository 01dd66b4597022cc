//! Process-wide endpoint registry enforcing one client per endpoint.

use std::collections::HashSet;
use std::sync::{LazyLock, Mutex};

use tracing::debug;

use crate::error::RealtimeError;

static ACTIVE_ENDPOINTS: LazyLock<Mutex<HashSet<String>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

/// Claim on an endpoint, released on drop.
#[derive(Debug)]
pub struct EndpointGuard {
    endpoint: String,
}

impl EndpointGuard {
    /// Claim `endpoint`, failing if another live client holds it.
    pub fn acquire(endpoint: &str) -> Result<Self, RealtimeError> {
        let mut active = ACTIVE_ENDPOINTS.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(endpoint.to_string()) {
            return Err(RealtimeError::DuplicateEndpoint(endpoint.to_string()));
        }
        debug!(endpoint, "Realtime endpoint claimed");
        Ok(Self {
            endpoint: endpoint.to_string(),
        })
    }
}

impl Drop for EndpointGuard {
    fn drop(&mut self) {
        ACTIVE_ENDPOINTS
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.endpoint);
    }
}
