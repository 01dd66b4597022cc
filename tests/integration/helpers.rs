//! Shared test helpers for integration tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use bytes::Bytes;
use futures::StreamExt;
use futures::channel::mpsc::{UnboundedSender, unbounded};

use zariz_auth::{CredentialStore, MemoryRenewalStore, RolePolicy, SessionManager};
use zariz_core::config::{AuthConfig, RealtimeConfig};
use zariz_core::error::AuthServiceError;
use zariz_core::traits::{AuthService, RenewalStore};
use zariz_core::types::{Role, StoredSession, TokenPair};
use zariz_realtime::{FrameStream, StreamError, StreamTransport};

static TOKEN_NONCE: AtomicUsize = AtomicUsize::new(0);
static ENDPOINT_SEQ: AtomicUsize = AtomicUsize::new(0);

/// Mint an unsigned compact credential for `sub` with `role`, expiring
/// `ttl_secs` from now. Every call yields a distinct token.
pub fn mint_token(sub: &str, role: &str, ttl_secs: i64) -> String {
    let exp = chrono::Utc::now().timestamp() + ttl_secs;
    let nonce = TOKEN_NONCE.fetch_add(1, Ordering::Relaxed);
    let payload = serde_json::json!({
        "sub": sub,
        "role": role,
        "exp": exp,
        "store_ids": [3],
        "session_id": format!("s-{nonce}"),
    });
    format!(
        "{}.{}.signature",
        URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#),
        URL_SAFE_NO_PAD.encode(payload.to_string())
    )
}

/// A fresh courier credential pair.
pub fn courier_pair(ttl_secs: i64, renewal: Option<&str>) -> TokenPair {
    TokenPair::new(
        mint_token("c-1", "courier", ttl_secs),
        renewal.map(str::to_string),
    )
}

/// Auth defaults without jitter, so delays are exact.
pub fn auth_config() -> AuthConfig {
    AuthConfig {
        jitter_ms: 0,
        max_backoff_ms: 30_000,
        ..AuthConfig::default()
    }
}

/// Realtime defaults without jitter.
pub fn realtime_config() -> RealtimeConfig {
    RealtimeConfig {
        jitter_ms: 0,
        ..RealtimeConfig::default()
    }
}

/// Let spawned tasks run without advancing the clock.
pub async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

/// Advance the paused clock and let woken tasks run.
pub async fn advance(duration: Duration) {
    tokio::time::advance(duration).await;
    settle().await;
}

/// Scripted auth collaborator.
///
/// Renewals pop from the script; once it is empty every renewal issues a
/// fresh one-hour courier credential with a new renewal credential.
#[derive(Debug, Default)]
pub struct MockAuthService {
    login_result: Mutex<Option<Result<TokenPair, AuthServiceError>>>,
    renewals: Mutex<VecDeque<Result<TokenPair, AuthServiceError>>>,
    presented: Mutex<Vec<String>>,
    revoked: Mutex<Vec<String>>,
    renew_latency: Mutex<Duration>,
    login_calls: AtomicUsize,
}

impl MockAuthService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Delay every renewal response by `latency`.
    pub fn set_renew_latency(&self, latency: Duration) {
        *self.renew_latency.lock().unwrap() = latency;
    }

    pub fn set_login(&self, result: Result<TokenPair, AuthServiceError>) {
        *self.login_result.lock().unwrap() = Some(result);
    }

    pub fn push_renewal(&self, result: Result<TokenPair, AuthServiceError>) {
        self.renewals.lock().unwrap().push_back(result);
    }

    /// Renewal credentials presented to `renew`, in call order.
    pub fn presented(&self) -> Vec<String> {
        self.presented.lock().unwrap().clone()
    }

    pub fn renew_calls(&self) -> usize {
        self.presented.lock().unwrap().len()
    }

    pub fn revoked(&self) -> Vec<String> {
        self.revoked.lock().unwrap().clone()
    }

    pub fn login_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthService for MockAuthService {
    async fn login(&self, _identifier: &str, _secret: &str) -> Result<TokenPair, AuthServiceError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        self.login_result
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Ok(courier_pair(3600, Some("r0"))))
    }

    async fn renew(&self, renewal_credential: &str) -> Result<TokenPair, AuthServiceError> {
        let issued = {
            let mut presented = self.presented.lock().unwrap();
            presented.push(renewal_credential.to_string());
            presented.len()
        };
        let latency = *self.renew_latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let scripted = self.renewals.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(courier_pair(3600, Some(&format!("r{issued}")))))
    }

    async fn revoke(&self, renewal_credential: &str) -> Result<(), AuthServiceError> {
        self.revoked
            .lock()
            .unwrap()
            .push(renewal_credential.to_string());
        Ok(())
    }
}

/// A session manager wired to in-memory collaborators.
pub struct Harness {
    pub auth: Arc<MockAuthService>,
    pub renewals: Arc<MemoryRenewalStore>,
    pub store: Arc<CredentialStore>,
    pub session: SessionManager,
}

impl Harness {
    pub fn new(config: AuthConfig) -> Self {
        Self::with_policy(config, RolePolicy::allow_all())
    }

    pub fn with_policy(config: AuthConfig, policy: RolePolicy) -> Self {
        let auth = MockAuthService::new();
        let renewals = Arc::new(MemoryRenewalStore::new());
        let store = CredentialStore::new(policy);
        let session = SessionManager::new(
            Arc::clone(&store),
            renewals.clone(),
            auth.clone(),
            config,
        );
        Self {
            auth,
            renewals,
            store,
            session,
        }
    }

    /// Persist a renewal credential as a previous run would have.
    pub async fn seed_renewal(&self, renewal: &str) {
        self.renewals
            .save(&StoredSession {
                renewal_credential: renewal.to_string(),
                subject: "c-1".into(),
                role: Role::Courier,
                store_ids: vec![3],
                identifier: Some("0501234567".into()),
                saved_at: chrono::Utc::now(),
            })
            .await
            .expect("seed renewal store");
    }

    pub async fn stored_renewal(&self) -> Option<String> {
        self.renewals
            .load()
            .await
            .expect("load renewal store")
            .map(|s| s.renewal_credential)
    }

    pub fn current_token(&self) -> Option<String> {
        self.store.current().map(|c| c.token().to_string())
    }
}

type FrameSender = UnboundedSender<Result<Bytes, StreamError>>;

/// Stream transport handing out in-memory streams the test feeds.
#[derive(Debug)]
pub struct MockTransport {
    endpoint: String,
    opened_with: Mutex<Vec<String>>,
    streams: Mutex<Vec<FrameSender>>,
    failures: Mutex<VecDeque<StreamError>>,
}

impl MockTransport {
    /// A transport with an endpoint unique to this test.
    pub fn new() -> Arc<Self> {
        let seq = ENDPOINT_SEQ.fetch_add(1, Ordering::Relaxed);
        Arc::new(Self {
            endpoint: format!("mock://events/{seq}"),
            opened_with: Mutex::new(Vec::new()),
            streams: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
        })
    }

    /// Make the next `open` fail with `error`.
    pub fn fail_next_open(&self, error: StreamError) {
        self.failures.lock().unwrap().push_back(error);
    }

    /// Number of `open` calls, failed ones included.
    pub fn open_count(&self) -> usize {
        self.opened_with.lock().unwrap().len()
    }

    /// Credentials each `open` was called with.
    pub fn opened_with(&self) -> Vec<String> {
        self.opened_with.lock().unwrap().clone()
    }

    /// Whether the client dropped stream `index`.
    pub fn is_closed(&self, index: usize) -> bool {
        self.streams.lock().unwrap()[index].is_closed()
    }

    /// Push raw bytes on the newest stream.
    pub fn send_raw(&self, chunk: &str) {
        let streams = self.streams.lock().unwrap();
        let latest = streams.last().expect("no open stream");
        let _ = latest.unbounded_send(Ok(Bytes::from(chunk.to_string())));
    }

    /// Push one `data:` frame on the newest stream.
    pub fn send_event(&self, payload: &str) {
        self.send_raw(&format!("data: {payload}\n\n"));
    }

    /// Fail the newest stream with `error`.
    pub fn fail_stream(&self, error: StreamError) {
        let streams = self.streams.lock().unwrap();
        let latest = streams.last().expect("no open stream");
        let _ = latest.unbounded_send(Err(error));
    }
}

#[async_trait]
impl StreamTransport for MockTransport {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn open(&self, credential: &str) -> Result<FrameStream, StreamError> {
        self.opened_with
            .lock()
            .unwrap()
            .push(credential.to_string());
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }

        let (tx, rx) = unbounded();
        self.streams.lock().unwrap().push(tx);
        Ok(rx.boxed())
    }
}
