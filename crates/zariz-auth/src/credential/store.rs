//! Credential store holding the live access credential. Changes fan out
//! to listeners synchronously.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, error, warn};

use zariz_core::types::ListenerId;

use crate::error::DecodeError;
use crate::jwt::{Claims, ClaimsCodec, Credential};
use crate::rbac::{PolicyViolation, RolePolicy};

/// Callback invoked on every `set`, with the credential now in effect.
pub type CredentialListener = Arc<dyn Fn(Option<&Credential>) + Send + Sync>;

type ViolationHook = Arc<dyn Fn(&PolicyViolation) + Send + Sync>;

/// What a `set` call ended up storing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    /// The credential was accepted.
    Stored(Claims),
    /// The store was cleared on request.
    Cleared,
    /// The credential could not be decoded; the store is now empty.
    Undecodable(DecodeError),
    /// The credential was already expired; the store is now empty.
    Expired,
    /// The claims violate the role policy; the store is now empty and the
    /// violation hook fired.
    Denied(PolicyViolation),
}

impl StoreOutcome {
    /// Whether a credential is now stored.
    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Stored(_))
    }
}

#[derive(Default)]
struct StoreState {
    current: Option<Credential>,
    listeners: Vec<(ListenerId, CredentialListener)>,
}

/// Holds the current access credential.
///
/// The session manager is the only writer. Readers either poll
/// [`current`](Self::current) or register a listener with
/// [`subscribe`](Self::subscribe). Listeners run on the caller of `set`,
/// in `set` order, and must not call `set` themselves.
pub struct CredentialStore {
    policy: RolePolicy,
    state: Mutex<StoreState>,
    /// Serializes `set` so listeners observe updates in call order.
    write_lock: Mutex<()>,
    on_violation: Mutex<Option<ViolationHook>>,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f.debug_struct("CredentialStore")
            .field("policy", &self.policy)
            .field("current", &state.current)
            .field("listeners", &state.listeners.len())
            .finish()
    }
}

impl CredentialStore {
    /// Creates an empty store enforcing `policy`.
    pub fn new(policy: RolePolicy) -> Arc<Self> {
        Arc::new(Self {
            policy,
            state: Mutex::new(StoreState::default()),
            write_lock: Mutex::new(()),
            on_violation: Mutex::new(None),
        })
    }

    /// The role policy enforced on `set`.
    pub fn policy(&self) -> &RolePolicy {
        &self.policy
    }

    /// The live credential. An expired credential reads as absent.
    pub fn current(&self) -> Option<Credential> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.current.clone().filter(|c| !c.is_expired())
    }

    /// Claims of the live credential.
    pub fn claims(&self) -> Option<Claims> {
        self.current().map(|c| c.claims().clone())
    }

    /// Replace the current credential and notify every listener.
    ///
    /// Undecodable, expired, or policy-violating credentials are stored as
    /// absent; the latter also fires the violation hook.
    pub fn set(&self, token: Option<&str>) -> StoreOutcome {
        let guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let (next, outcome) = match token {
            None => (None, StoreOutcome::Cleared),
            Some(token) => self.admit(token),
        };

        let listeners: Vec<CredentialListener> = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.current = next.clone();
            state.listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
        };

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(next.as_ref()))).is_err() {
                error!("Credential listener panicked");
            }
        }
        drop(guard);

        if let StoreOutcome::Denied(violation) = &outcome {
            let hook = self
                .on_violation
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone();
            if let Some(hook) = hook {
                hook(violation);
            }
        }

        outcome
    }

    /// Equivalent to `set(None)`.
    pub fn clear(&self) {
        self.set(None);
    }

    /// Register a listener for every future `set`.
    pub fn subscribe<F>(self: &Arc<Self>, listener: F) -> CredentialSubscription
    where
        F: Fn(Option<&Credential>) + Send + Sync + 'static,
    {
        let id = ListenerId::new();
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .listeners
            .push((id, Arc::new(listener)));
        debug!(listener_id = %id, "Credential listener registered");

        CredentialSubscription {
            store: Arc::downgrade(self),
            id: Some(id),
        }
    }

    /// Install the side-channel invoked when a credential is denied by the
    /// role policy. Replaces any previous hook.
    pub fn on_policy_violation<F>(&self, hook: F)
    where
        F: Fn(&PolicyViolation) + Send + Sync + 'static,
    {
        *self.on_violation.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(hook));
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .listeners
            .len()
    }

    fn admit(&self, token: &str) -> (Option<Credential>, StoreOutcome) {
        let credential = match ClaimsCodec::credential(token) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Discarding undecodable credential");
                return (None, StoreOutcome::Undecodable(e));
            }
        };

        if credential.is_expired() {
            warn!(sub = %credential.claims().sub, "Discarding expired credential");
            return (None, StoreOutcome::Expired);
        }

        if let Err(violation) = self.policy.check(credential.claims()) {
            warn!(%violation, "Credential denied by role policy");
            return (None, StoreOutcome::Denied(violation));
        }

        let claims = credential.claims().clone();
        (Some(credential), StoreOutcome::Stored(claims))
    }

    fn remove_listener(&self, id: ListenerId) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.listeners.retain(|(lid, _)| *lid != id);
    }
}

/// Registration returned by [`CredentialStore::subscribe`]. Dropping it
/// unsubscribes.
#[derive(Debug)]
pub struct CredentialSubscription {
    store: Weak<CredentialStore>,
    id: Option<ListenerId>,
}

impl CredentialSubscription {
    /// The listener handle.
    pub fn id(&self) -> Option<ListenerId> {
        self.id
    }

    /// Stop receiving updates.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let (Some(id), Some(store)) = (self.id.take(), self.store.upgrade()) {
            store.remove_listener(id);
        }
    }
}

impl Drop for CredentialSubscription {
    fn drop(&mut self) {
        self.release();
    }
}
