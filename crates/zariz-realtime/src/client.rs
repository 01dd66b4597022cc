//! Multiplexed realtime event client.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use zariz_auth::{CredentialStore, CredentialSubscription};
use zariz_core::config::RealtimeConfig;
use zariz_core::types::{Backoff, SubscriberId, TimerSlot};

use crate::connection::{ConnectionStatus, StreamState, reader};
use crate::error::{RealtimeError, StreamError};
use crate::message::RealtimeEvent;
use crate::registry::EndpointGuard;
use crate::transport::StreamTransport;

/// Callback receiving every normalized event.
pub type EventHandler = Arc<dyn Fn(&RealtimeEvent) + Send + Sync>;

#[derive(Default)]
struct ClientState {
    subscribers: Vec<(SubscriberId, EventHandler)>,
    stream: StreamState,
    /// Bumped whenever the current connection is replaced or closed; a
    /// connection task only reports under its own generation.
    generation: u64,
    /// Consecutive failed connections, drives the reconnect delay.
    attempt: u32,
    /// Cancels the running connection task.
    connection: Option<CancellationToken>,
    reconnect: TimerSlot,
    /// Last live credential seen from the store.
    credential: Option<String>,
}

struct Inner {
    endpoint: String,
    transport: Arc<dyn StreamTransport>,
    credentials: Arc<CredentialStore>,
    backoff: Backoff,
    state: Mutex<ClientState>,
    status: watch::Sender<ConnectionStatus>,
}

/// Shares one event stream among any number of subscribers.
///
/// The stream opens with the first subscriber and closes with the last.
/// Whenever the stored credential changes while subscribers exist, the
/// stream is reopened with the new credential; when it disappears the stream
/// closes until one is stored again. Stream failures are retried with
/// exponential backoff and never reach subscribers.
///
/// Only one client may exist per endpoint in the process; the composition
/// root constructs it and hands it out.
pub struct RealtimeClient {
    inner: Arc<Inner>,
    _credentials: CredentialSubscription,
    _guard: EndpointGuard,
}

impl std::fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("endpoint", &self.inner.endpoint)
            .field("state", &self.stream_state())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl RealtimeClient {
    /// Creates the client for `transport`'s endpoint.
    ///
    /// Fails if a client for the same endpoint is alive.
    pub fn new(
        config: &RealtimeConfig,
        transport: Arc<dyn StreamTransport>,
        credentials: Arc<CredentialStore>,
    ) -> Result<Self, RealtimeError> {
        let endpoint = transport.endpoint().to_string();
        let guard = EndpointGuard::acquire(&endpoint)?;
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);

        let state = ClientState {
            credential: credentials.current().map(|c| c.token().to_string()),
            ..ClientState::default()
        };
        let inner = Arc::new(Inner {
            endpoint,
            transport,
            credentials: Arc::clone(&credentials),
            backoff: config.backoff(),
            state: Mutex::new(state),
            status,
        });

        let weak = Arc::downgrade(&inner);
        let subscription = credentials.subscribe(move |credential| {
            if let Some(inner) = weak.upgrade() {
                inner.credential_changed(credential.map(|c| c.token().to_string()));
            }
        });

        info!(endpoint = %inner.endpoint, "Realtime client created");
        Ok(Self {
            inner,
            _credentials: subscription,
            _guard: guard,
        })
    }

    /// The stream endpoint.
    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    /// Register `handler` for every event. The first subscriber opens the
    /// stream; this never waits for it.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&RealtimeEvent) + Send + Sync + 'static,
    {
        let id = SubscriberId::new();
        let mut state = self.inner.lock_state();
        state.subscribers.push((id, Arc::new(handler)));
        debug!(subscriber_id = %id, count = state.subscribers.len(), "Subscriber added");

        if state.subscribers.len() == 1 && state.stream == StreamState::Disconnected {
            let credential = self.inner.credentials.current().map(|c| c.token().to_string());
            match credential {
                Some(credential) => self.inner.connect(&mut state, credential),
                None => debug!("No credential yet; stream opens once one is stored"),
            }
        }

        Subscription {
            client: Arc::downgrade(&self.inner),
            id: Some(id),
        }
    }

    /// Subscribe through a channel instead of a callback.
    pub fn subscribe_channel(&self) -> (Subscription, mpsc::UnboundedReceiver<RealtimeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(move |event| {
            // The receiver may be gone before the subscription is dropped.
            let _ = tx.send(event.clone());
        });
        (subscription, rx)
    }

    /// Consumer-facing connection status.
    pub fn status(&self) -> ConnectionStatus {
        *self.inner.status.borrow()
    }

    /// Watch the connection status.
    pub fn status_watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    /// Internal stream state.
    pub fn stream_state(&self) -> StreamState {
        self.inner.lock_state().stream
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock_state().subscribers.len()
    }

    /// Whether a reconnect timer is armed.
    pub fn has_pending_reconnect(&self) -> bool {
        self.inner.lock_state().reconnect.is_pending()
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        let mut state = self.inner.lock_state();
        state.subscribers.clear();
        self.inner.close(&mut state);
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_stream(&self, state: &mut ClientState, stream: StreamState) {
        state.stream = stream;
        self.status.send_replace(stream.status());
    }

    /// Replace any current connection with a new one using `credential`.
    fn connect(self: &Arc<Self>, state: &mut ClientState, credential: String) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                error!(endpoint = %self.endpoint, "Cannot open stream outside a tokio runtime");
                return;
            }
        };

        state.reconnect.cancel();
        if let Some(previous) = state.connection.take() {
            previous.cancel();
        }
        state.generation += 1;
        let generation = state.generation;
        let cancel = CancellationToken::new();
        state.connection = Some(cancel.clone());
        self.set_stream(state, StreamState::Connecting);
        debug!(endpoint = %self.endpoint, generation, attempt = state.attempt, "Opening stream");

        let inner = Arc::clone(self);
        handle.spawn(async move {
            inner.run_connection(generation, credential, cancel).await;
        });
    }

    /// Close the stream and stop reconnecting.
    fn close(&self, state: &mut ClientState) {
        state.reconnect.cancel();
        if let Some(connection) = state.connection.take() {
            connection.cancel();
        }
        state.generation += 1;
        state.attempt = 0;
        if state.stream != StreamState::Disconnected {
            info!(endpoint = %self.endpoint, "Stream closed");
        }
        self.set_stream(state, StreamState::Disconnected);
    }

    async fn run_connection(
        self: Arc<Self>,
        generation: u64,
        credential: String,
        cancel: CancellationToken,
    ) {
        let opened = tokio::select! {
            _ = cancel.cancelled() => return,
            opened = self.transport.open(&credential) => opened,
        };

        let stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                self.connection_failed(generation, e);
                return;
            }
        };
        if !self.connected(generation) {
            return;
        }

        let reason = tokio::select! {
            _ = cancel.cancelled() => return,
            reason = reader::pump(stream, |event| self.deliver(&event)) => reason,
        };
        self.connection_failed(generation, reason);
    }

    fn connected(&self, generation: u64) -> bool {
        let mut state = self.lock_state();
        if state.generation != generation {
            return false;
        }
        state.attempt = 0;
        self.set_stream(&mut state, StreamState::Connected);
        info!(endpoint = %self.endpoint, "Stream connected");
        true
    }

    fn connection_failed(self: &Arc<Self>, generation: u64, reason: StreamError) {
        let mut state = self.lock_state();
        if state.generation != generation {
            return;
        }
        warn!(endpoint = %self.endpoint, error = %reason, "Stream failed");
        state.connection = None;
        self.set_stream(&mut state, StreamState::Erroring);
        self.schedule_reconnect(&mut state);
    }

    fn schedule_reconnect(self: &Arc<Self>, state: &mut ClientState) {
        if state.subscribers.is_empty() || self.live_credential(state).is_none() {
            self.close(state);
            return;
        }
        if state.reconnect.is_pending() {
            return;
        }

        let delay = self.backoff.delay(state.attempt);
        state.attempt = state.attempt.saturating_add(1);
        info!(
            endpoint = %self.endpoint,
            attempt = state.attempt,
            delay_ms = delay.as_millis() as u64,
            "Stream reconnect scheduled"
        );

        let weak: Weak<Self> = Arc::downgrade(self);
        state.reconnect.arm(delay, async move {
            if let Some(inner) = weak.upgrade() {
                inner.reconnect_due();
            }
        });
    }

    fn reconnect_due(self: &Arc<Self>) {
        let mut state = self.lock_state();
        if state.stream != StreamState::Erroring || state.subscribers.is_empty() {
            return;
        }
        match self.live_credential(&mut state) {
            Some(credential) => self.connect(&mut state, credential),
            None => self.close(&mut state),
        }
    }

    /// The store's credential if it is still unexpired. The store does not
    /// notify on expiry, so an expired credential is forgotten here and the
    /// stream waits for the next `set`.
    fn live_credential(&self, state: &mut ClientState) -> Option<String> {
        let live = self.credentials.current().map(|c| c.token().to_string());
        if live.is_none() && state.credential.is_some() {
            info!(endpoint = %self.endpoint, "Credential expired; stream waits for a new one");
        }
        state.credential = live.clone();
        live
    }

    fn credential_changed(self: &Arc<Self>, credential: Option<String>) {
        let mut state = self.lock_state();
        if state.credential == credential {
            return;
        }
        state.credential = credential.clone();
        if state.subscribers.is_empty() {
            return;
        }

        match credential {
            Some(credential) => {
                info!(endpoint = %self.endpoint, "Credential changed; reconnecting stream");
                self.connect(&mut state, credential);
            }
            None => {
                info!(endpoint = %self.endpoint, "Credential cleared; closing stream");
                self.close(&mut state);
            }
        }
    }

    fn deliver(&self, event: &RealtimeEvent) {
        let handlers: Vec<EventHandler> = self
            .lock_state()
            .subscribers
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                error!(event = %event.event, "Event handler panicked");
            }
        }
    }

    fn unsubscribe(&self, id: SubscriberId) {
        let mut state = self.lock_state();
        let before = state.subscribers.len();
        state.subscribers.retain(|(sid, _)| *sid != id);
        if state.subscribers.len() == before {
            return;
        }
        debug!(subscriber_id = %id, count = state.subscribers.len(), "Subscriber removed");
        if state.subscribers.is_empty() {
            self.close(&mut state);
        }
    }
}

/// Registration returned by [`RealtimeClient::subscribe`]. Dropping it
/// unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    client: Weak<Inner>,
    id: Option<SubscriberId>,
}

impl Subscription {
    /// The subscriber handle.
    pub fn id(&self) -> Option<SubscriberId> {
        self.id
    }

    /// Stop receiving events. The last subscriber closes the stream.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let (Some(id), Some(client)) = (self.id.take(), self.client.upgrade()) {
            client.unsubscribe(id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}
