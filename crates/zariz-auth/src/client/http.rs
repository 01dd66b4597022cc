//! reqwest-backed [`AuthService`] speaking the issuer's JSON API.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use zariz_core::config::AuthConfig;
use zariz_core::error::{AppError, AuthServiceError, ErrorKind};
use zariz_core::result::AppResult;
use zariz_core::traits::AuthService;
use zariz_core::types::TokenPair;

#[derive(Serialize)]
struct LoginRequest<'a> {
    identifier: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RenewalRequest<'a> {
    refresh_token: &'a str,
}

/// Talks to `{base_url}/auth/login`, `/auth/refresh` and `/auth/logout`.
#[derive(Debug, Clone)]
pub struct HttpAuthService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAuthService {
    /// Build a client for the configured issuer.
    pub fn new(config: &AuthConfig) -> AppResult<Self> {
        Self::with_timeout(&config.base_url, config.request_timeout())
    }

    /// Build a client for `base_url` with a per-request timeout.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                AppError::with_source(ErrorKind::Configuration, "Failed to build HTTP client", e)
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/auth/{path}", self.base_url)
    }

    async fn post<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, AuthServiceError> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| AuthServiceError::Transport(e.to_string()))?;

        let status = response.status();
        debug!(path, status = status.as_u16(), "Auth service responded");
        if !status.is_success() {
            return Err(AuthServiceError::Rejected(status.as_u16()));
        }
        Ok(response)
    }

    async fn exchange<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<TokenPair, AuthServiceError> {
        self.post(path, body)
            .await?
            .json::<TokenPair>()
            .await
            .map_err(|e| AuthServiceError::Decode(e.to_string()))
    }
}

#[async_trait]
impl AuthService for HttpAuthService {
    async fn login(&self, identifier: &str, secret: &str) -> Result<TokenPair, AuthServiceError> {
        self.exchange(
            "login",
            &LoginRequest {
                identifier,
                password: secret,
            },
        )
        .await
    }

    async fn renew(&self, renewal_credential: &str) -> Result<TokenPair, AuthServiceError> {
        self.exchange(
            "refresh",
            &RenewalRequest {
                refresh_token: renewal_credential,
            },
        )
        .await
    }

    async fn revoke(&self, renewal_credential: &str) -> Result<(), AuthServiceError> {
        self.post(
            "logout",
            &RenewalRequest {
                refresh_token: renewal_credential,
            },
        )
        .await
        .map(|_| ())
    }
}
