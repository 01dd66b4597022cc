//! Error types for credential decoding and session lifecycle.

use thiserror::Error;

use zariz_core::error::{AppError, ErrorKind};

/// A bearer credential could not be turned into claims.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The credential is not a three-segment compact token.
    #[error("credential is not a three-segment token")]
    Malformed,
    /// The payload segment is not valid base64url JSON with the required
    /// claims.
    #[error("credential payload is invalid: {0}")]
    InvalidPayload(String),
}

/// Errors surfaced by the session manager.
///
/// `Clone` so that every waiter on a single in-flight renewal observes the
/// same failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The issuer rejected the login identifier or secret.
    #[error("invalid credentials")]
    InvalidCredentials,
    /// There is no renewal credential, so no session can be resumed.
    #[error("no active session")]
    NoSession,
    /// A renewal attempt failed transiently; it is retried with backoff.
    #[error("credential renewal failed: {0}")]
    RenewalFailed(String),
    /// The credential's claims are not allowed by the configured policy.
    #[error("policy violation: {0}")]
    PolicyViolation(String),
    /// The auth collaborator could not be reached.
    #[error("auth service unavailable: {0}")]
    Unavailable(String),
    /// The auth collaborator answered with something unusable.
    #[error("malformed auth response: {0}")]
    MalformedResponse(String),
    /// An issued credential could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// The renewal credential could not be persisted or loaded.
    #[error("renewal storage failure: {0}")]
    Storage(String),
}

impl From<AppError> for AuthError {
    fn from(err: AppError) -> Self {
        Self::Storage(err.message)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        let kind = match &err {
            AuthError::InvalidCredentials | AuthError::NoSession | AuthError::Decode(_) => {
                ErrorKind::Authentication
            }
            AuthError::PolicyViolation(_) => ErrorKind::Authorization,
            AuthError::RenewalFailed(_) => ErrorKind::Session,
            AuthError::Unavailable(_) | AuthError::MalformedResponse(_) => {
                ErrorKind::ExternalService
            }
            AuthError::Storage(_) => ErrorKind::Storage,
        };
        let message = err.to_string();
        AppError::with_source(kind, message, err)
    }
}
