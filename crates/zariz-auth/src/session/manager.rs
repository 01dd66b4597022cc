//! Session lifecycle manager: login, restore, renewal and logout flows.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use zariz_core::config::{AuthConfig, RotationPolicy};
use zariz_core::error::AuthServiceError;
use zariz_core::traits::{AuthService, RenewalStore};
use zariz_core::types::{Backoff, StoredSession, TimerSlot, TokenPair};

use crate::credential::{CredentialStore, CredentialSubscription, StoreOutcome};
use crate::error::AuthError;
use crate::jwt::{Claims, ClaimsCodec, Credential};

use super::events::SessionEvent;
use super::state::RenewalState;

type RenewalResult = Result<Credential, AuthError>;
type RenewalFuture = Shared<BoxFuture<'static, RenewalResult>>;

const EVENT_CAPACITY: usize = 32;

/// Mutable lifecycle bookkeeping, serialized behind one mutex.
#[derive(Debug, Default)]
struct Lifecycle {
    /// Bumped by every login, restore and logout. Work started under an
    /// older generation never commits.
    generation: u64,
    renewal: RenewalState,
    /// Consecutive transient renewal failures.
    failures: u32,
    timer: TimerSlot,
}

struct InFlight {
    id: u64,
    future: RenewalFuture,
}

struct Inner {
    store: Arc<CredentialStore>,
    renewal_store: Arc<dyn RenewalStore>,
    auth: Arc<dyn AuthService>,
    config: AuthConfig,
    backoff: Backoff,
    lifecycle: Mutex<Lifecycle>,
    inflight: Mutex<Option<InFlight>>,
    next_renewal_id: AtomicU64,
    /// Held while a result is being committed to both credential tiers.
    commit: tokio::sync::Mutex<()>,
    events: broadcast::Sender<SessionEvent>,
}

/// Owns the credential lifecycle and is the only writer of the
/// [`CredentialStore`].
///
/// Cheap to clone; all clones drive the same session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.inner.config)
            .field("renewal_state", &self.renewal_state())
            .finish()
    }
}

impl SessionManager {
    /// Creates a manager writing to `store`, persisting renewal credentials
    /// in `renewal_store` and exchanging them with `auth`.
    ///
    /// Installs the store's policy-violation hook: a denied credential ends
    /// the session.
    pub fn new(
        store: Arc<CredentialStore>,
        renewal_store: Arc<dyn RenewalStore>,
        auth: Arc<dyn AuthService>,
        config: AuthConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let inner = Arc::new(Inner {
            store,
            renewal_store,
            auth,
            backoff: config.backoff(),
            config,
            lifecycle: Mutex::new(Lifecycle::default()),
            inflight: Mutex::new(None),
            next_renewal_id: AtomicU64::new(1),
            commit: tokio::sync::Mutex::new(()),
            events,
        });

        let weak = Arc::downgrade(&inner);
        inner.store.on_policy_violation(move |violation| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let reason = violation.to_string();
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        inner.end_session(None, reason).await;
                    });
                }
                Err(_) => error!(%reason, "Policy violation outside a runtime; session not ended"),
            }
        });

        Self { inner }
    }

    /// The credential store this manager writes to.
    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.inner.store
    }

    /// Register a handler for every credential change.
    pub fn on_credential_change<F>(&self, handler: F) -> CredentialSubscription
    where
        F: Fn(Option<&Credential>) + Send + Sync + 'static,
    {
        self.inner.store.subscribe(handler)
    }

    /// Lifecycle notifications.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Claims of the live credential.
    pub fn claims(&self) -> Option<Claims> {
        self.inner.store.claims()
    }

    /// Current renewal state.
    pub fn renewal_state(&self) -> RenewalState {
        self.inner.lock_lifecycle().renewal
    }

    /// Whether a renewal or retry timer is armed.
    pub fn has_pending_renewal(&self) -> bool {
        self.inner.lock_lifecycle().timer.is_pending()
    }

    /// Performs the login flow:
    ///
    /// 1. Exchange identifier and secret with the issuer
    /// 2. Decode the access credential and apply the role policy
    /// 3. Persist the renewal credential
    /// 4. Store the access credential and schedule its renewal
    ///
    /// Nothing is mutated unless every step before 3 succeeds.
    pub async fn login(&self, identifier: &str, secret: &str) -> Result<Claims, AuthError> {
        let inner = &self.inner;
        let pair = inner
            .auth
            .login(identifier, secret)
            .await
            .map_err(map_login_error)?;

        let credential = ClaimsCodec::credential(&pair.access_token)?;
        let renewal = pair.refresh_token.clone().ok_or_else(|| {
            AuthError::MalformedResponse("login response carries no renewal credential".into())
        })?;
        if credential.is_expired() {
            return Err(AuthError::MalformedResponse(
                "issued access credential is already expired".into(),
            ));
        }

        if let Err(violation) = inner.store.policy().check(credential.claims()) {
            warn!(%violation, "Login denied by role policy");
            if let Err(e) = inner.auth.revoke(&renewal).await {
                warn!(error = %e, "Failed to revoke renewal credential of denied login");
            }
            return Err(AuthError::PolicyViolation(violation.to_string()));
        }

        let claims = credential.claims().clone();
        let _commit = inner.commit.lock().await;
        let generation = inner.begin_generation();

        inner
            .renewal_store
            .save(&stored_session(&claims, renewal, Some(identifier.to_string())))
            .await?;
        inner.store.set(Some(credential.token()));
        inner.schedule_from_claims(generation, &claims);

        info!(sub = %claims.sub, role = %claims.role, "Login successful");
        inner.emit(SessionEvent::LoggedIn {
            subject: claims.sub.clone(),
            role: claims.role,
        });
        Ok(claims)
    }

    /// Resume a persisted session without a network round trip.
    ///
    /// Returns the persisted principal and arms an immediate renewal to
    /// re-acquire the access credential. Returns `None` when nothing is
    /// persisted.
    pub async fn restore(&self) -> Result<Option<StoredSession>, AuthError> {
        let inner = &self.inner;
        let _commit = inner.commit.lock().await;

        let Some(stored) = inner.renewal_store.load().await? else {
            debug!("No persisted session to restore");
            return Ok(None);
        };

        if !inner.store.policy().allows(stored.role) {
            warn!(sub = %stored.subject, role = %stored.role, "Persisted session denied by role policy");
            inner.renewal_store.clear().await?;
            return Err(AuthError::PolicyViolation(format!(
                "role '{}' of subject '{}' is not allowed",
                stored.role, stored.subject
            )));
        }

        let generation = inner.begin_generation();
        inner.arm_renewal(generation, inner.config.min_refresh_delay(), None);

        info!(sub = %stored.subject, role = %stored.role, "Session restored");
        Ok(Some(stored))
    }

    /// Returns a credential valid for more than the safety margin,
    /// renewing first if needed.
    ///
    /// Concurrent callers share a single renewal and observe the same
    /// result. If a transient renewal failure leaves the previous credential
    /// unexpired, that credential is returned.
    pub async fn current_access_token(&self) -> Result<Credential, AuthError> {
        let inner = &self.inner;
        if let Some(credential) = inner.store.current() {
            if credential.claims().remaining() > inner.config.safety_margin() {
                return Ok(credential);
            }
        }

        match inner.renew_shared().await {
            Err(AuthError::RenewalFailed(reason)) => inner
                .store
                .current()
                .ok_or(AuthError::RenewalFailed(reason)),
            other => other,
        }
    }

    /// Performs the logout flow:
    ///
    /// 1. Cancel any pending renewal and invalidate in-flight work
    /// 2. Best-effort revoke the renewal credential with the issuer
    /// 3. Clear both credential tiers
    ///
    /// Idempotent. Only a failure to clear persisted state is reported.
    pub async fn logout(&self) -> Result<(), AuthError> {
        let (had_session, cleared) = self.inner.teardown().await;
        if had_session {
            info!("Logout completed");
            self.inner.emit(SessionEvent::LoggedOut);
        }
        cleared
    }
}

impl Inner {
    fn lock_lifecycle(&self) -> std::sync::MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: SessionEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    /// Start a new session generation, dropping every pending timer,
    /// failure count and in-flight renewal of the previous one.
    fn begin_generation(&self) -> u64 {
        let generation = {
            let mut lifecycle = self.lock_lifecycle();
            lifecycle.generation += 1;
            lifecycle.timer.cancel();
            lifecycle.renewal = RenewalState::Idle;
            lifecycle.failures = 0;
            lifecycle.generation
        };
        self.inflight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        generation
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock_lifecycle().generation == generation
    }

    /// Delay until `claims` needs renewing, never below the floor.
    fn renewal_delay(&self, claims: &Claims) -> Duration {
        claims
            .remaining()
            .saturating_sub(self.config.safety_margin())
            .max(self.config.min_refresh_delay())
    }

    fn schedule_from_claims(self: &Arc<Self>, generation: u64, claims: &Claims) {
        let delay = self.renewal_delay(claims);
        if self.arm_renewal(generation, delay, None) {
            debug!(sub = %claims.sub, delay_secs = delay.as_secs(), "Renewal scheduled");
        }
    }

    /// Arm the renewal timer unless `generation` is stale. `attempt` marks
    /// a retry after failures.
    fn arm_renewal(self: &Arc<Self>, generation: u64, delay: Duration, attempt: Option<u32>) -> bool {
        let mut lifecycle = self.lock_lifecycle();
        if lifecycle.generation != generation {
            return false;
        }

        let at = Instant::now() + delay;
        lifecycle.renewal = match attempt {
            Some(attempt) => RenewalState::BackingOff {
                next_attempt: at,
                attempt,
            },
            None => RenewalState::Scheduled { at },
        };

        let weak: Weak<Self> = Arc::downgrade(self);
        lifecycle.timer.arm(delay, async move {
            if let Some(inner) = weak.upgrade() {
                // Failures re-arm the timer themselves.
                let _ = inner.renew_shared().await;
            }
        });
        true
    }

    /// Join the in-flight renewal, or start one.
    fn renew_shared(self: &Arc<Self>) -> RenewalFuture {
        let mut slot = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(inflight) = slot.as_ref() {
            debug!(renewal_id = inflight.id, "Joining in-flight renewal");
            return inflight.future.clone();
        }

        let id = self.next_renewal_id.fetch_add(1, Ordering::Relaxed);
        let generation = self.lock_lifecycle().generation;
        let inner = Arc::clone(self);
        let future = async move {
            let result = inner.perform_renewal(generation).await;
            inner.finish_inflight(id);
            result
        }
        .boxed()
        .shared();

        *slot = Some(InFlight {
            id,
            future: future.clone(),
        });
        // Runs to completion even if every caller stops waiting.
        tokio::spawn(future.clone());
        future
    }

    fn finish_inflight(&self, id: u64) {
        let mut slot = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().is_some_and(|f| f.id == id) {
            *slot = None;
        }
    }

    async fn perform_renewal(self: &Arc<Self>, generation: u64) -> RenewalResult {
        {
            let mut lifecycle = self.lock_lifecycle();
            if lifecycle.generation != generation {
                return Err(AuthError::NoSession);
            }
            lifecycle.timer.cancel();
            lifecycle.renewal = RenewalState::InFlight;
        }

        let stored = match self.renewal_store.load().await {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                // Consumed or removed: the session cannot be kept alive.
                self.end_session(Some(generation), "renewal credential unavailable".into())
                    .await;
                return Err(AuthError::NoSession);
            }
            Err(e) => return self.record_failure(generation, e.message).await,
        };

        match self.auth.renew(&stored.renewal_credential).await {
            Ok(pair) => self.commit_renewal(generation, stored, pair).await,
            Err(e) if e.is_transient() => self.record_failure(generation, e.to_string()).await,
            Err(e) => {
                warn!(error = %e, "Renewal rejected by issuer");
                self.end_session(Some(generation), "renewal rejected by issuer".into())
                    .await;
                Err(AuthError::NoSession)
            }
        }
    }

    async fn commit_renewal(
        self: &Arc<Self>,
        generation: u64,
        stored: StoredSession,
        pair: TokenPair,
    ) -> RenewalResult {
        let credential = match ClaimsCodec::credential(&pair.access_token) {
            Ok(c) if !c.is_expired() => c,
            Ok(_) => {
                return self
                    .record_failure(generation, "renewed credential already expired".into())
                    .await;
            }
            Err(e) => return self.record_failure(generation, e.to_string()).await,
        };

        let commit = self.commit.lock().await;
        if !self.is_current(generation) {
            debug!("Discarding renewal result of an ended session");
            return Err(AuthError::NoSession);
        }

        let next_renewal = match (self.config.rotation, pair.refresh_token) {
            (_, Some(replacement)) => Some(replacement),
            (RotationPolicy::Fixed, None) => Some(stored.renewal_credential),
            (RotationPolicy::Rotating, None) => None,
        };
        let claims = credential.claims().clone();
        let persisted = match next_renewal {
            Some(renewal) => {
                self.renewal_store
                    .save(&stored_session(&claims, renewal, stored.identifier))
                    .await
            }
            None => {
                warn!(sub = %claims.sub, "Issuer returned no replacement renewal credential; stored copy cleared");
                self.renewal_store.clear().await
            }
        };
        if let Err(e) = persisted {
            error!(error = %e, "Failed to persist renewal credential");
            drop(commit);
            return self.record_failure(generation, e.message).await;
        }
        // A logout may have started while persisting; it clears both tiers
        // once the commit lock is released.
        if !self.is_current(generation) {
            debug!("Session ended while persisting; renewed credential discarded");
            return Err(AuthError::NoSession);
        }

        match self.store.set(Some(credential.token())) {
            StoreOutcome::Stored(_) => {}
            // The store's violation hook ends the session.
            StoreOutcome::Denied(violation) => {
                return Err(AuthError::PolicyViolation(violation.to_string()));
            }
            other => {
                drop(commit);
                return self
                    .record_failure(generation, format!("renewed credential rejected: {other:?}"))
                    .await;
            }
        }

        self.lock_lifecycle().failures = 0;
        self.schedule_from_claims(generation, &claims);

        info!(sub = %claims.sub, exp = claims.exp, "Access credential renewed");
        self.emit(SessionEvent::Renewed {
            subject: claims.sub.clone(),
            expires_at: claims.expires_at(),
        });
        Ok(credential)
    }

    /// Count a transient failure and arm the retry, or end the session once
    /// the failure budget is spent.
    async fn record_failure(self: &Arc<Self>, generation: u64, reason: String) -> RenewalResult {
        let failures = {
            let mut lifecycle = self.lock_lifecycle();
            if lifecycle.generation != generation {
                return Err(AuthError::NoSession);
            }
            lifecycle.failures += 1;
            lifecycle.failures
        };

        if failures >= self.config.max_renewal_failures {
            warn!(failures, %reason, "Renewal retries exhausted");
            self.end_session(Some(generation), "renewal retries exhausted".into())
                .await;
            return Err(AuthError::NoSession);
        }

        let delay = self.backoff.delay(failures - 1);
        warn!(
            attempt = failures,
            delay_ms = delay.as_millis() as u64,
            %reason,
            "Renewal failed, retrying"
        );
        self.arm_renewal(generation, delay, Some(failures));
        Err(AuthError::RenewalFailed(reason))
    }

    /// Forced logout. With `Some(generation)`, only ends that generation.
    async fn end_session(self: &Arc<Self>, generation: Option<u64>, reason: String) {
        if generation.is_some_and(|g| !self.is_current(g)) {
            return;
        }

        let (had_session, cleared) = self.teardown().await;
        if let Err(e) = cleared {
            error!(error = %e, "Failed to clear persisted session");
        }
        if had_session {
            warn!(%reason, "Session ended");
            self.emit(SessionEvent::Expired { reason });
        }
    }

    /// Returns whether a session existed, and the outcome of clearing the
    /// persisted tier.
    async fn teardown(&self) -> (bool, Result<(), AuthError>) {
        self.begin_generation();
        let _commit = self.commit.lock().await;
        // A commit that held the lock may have armed a timer meanwhile.
        self.begin_generation();

        let stored = match self.renewal_store.load().await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Failed to load renewal credential for revocation");
                None
            }
        };
        if let Some(stored) = &stored {
            if let Err(e) = self.auth.revoke(&stored.renewal_credential).await {
                warn!(error = %e, "Renewal credential revocation failed");
            }
        }

        let had_credential = self.store.current().is_some();
        let cleared = self.renewal_store.clear().await.map_err(AuthError::from);
        self.store.clear();
        (stored.is_some() || had_credential, cleared)
    }
}

fn stored_session(claims: &Claims, renewal: String, identifier: Option<String>) -> StoredSession {
    StoredSession {
        renewal_credential: renewal,
        subject: claims.sub.clone(),
        role: claims.role,
        store_ids: claims.store_ids.clone(),
        identifier,
        saved_at: Utc::now(),
    }
}

fn map_login_error(err: AuthServiceError) -> AuthError {
    match err {
        AuthServiceError::Rejected(status) if status < 500 => AuthError::InvalidCredentials,
        AuthServiceError::Rejected(status) => {
            AuthError::Unavailable(format!("issuer answered with status {status}"))
        }
        AuthServiceError::Transport(message) => AuthError::Unavailable(message),
        AuthServiceError::Decode(message) => AuthError::MalformedResponse(message),
    }
}
