//! The external auth collaborator.

use async_trait::async_trait;

use crate::error::AuthServiceError;
use crate::types::TokenPair;

/// Issuer of access and renewal credentials.
///
/// Implementations must never panic on a failed exchange; every failure is
/// reported as an [`AuthServiceError`].
#[async_trait]
pub trait AuthService: Send + Sync + std::fmt::Debug + 'static {
    /// Exchange a login identifier and secret for a credential pair.
    async fn login(&self, identifier: &str, secret: &str) -> Result<TokenPair, AuthServiceError>;

    /// Exchange a renewal credential for a fresh access credential and,
    /// possibly, a rotated renewal credential.
    async fn renew(&self, renewal_credential: &str) -> Result<TokenPair, AuthServiceError>;

    /// Invalidate a renewal credential on the issuer side.
    async fn revoke(&self, renewal_credential: &str) -> Result<(), AuthServiceError>;
}
