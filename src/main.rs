//! Zariz event tail. Logs in, follows the realtime event stream and logs
//! out on shutdown.
//!
//! Entry point that wires the session core together: exactly one
//! credential store, one session manager and one realtime client.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing_subscriber::{EnvFilter, fmt};

use zariz_auth::{CredentialStore, HttpAuthService, RolePolicy, SessionEvent, SessionManager, persist};
use zariz_core::config::AppConfig;
use zariz_core::error::AppError;
use zariz_realtime::{HttpStreamTransport, RealtimeClient};

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Session error: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration from `config/default.toml`, the environment overlay
/// and `ZARIZ__*` variables.
fn load_configuration() -> Result<AppConfig, AppError> {
    let env = std::env::var("ZARIZ_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load(&env)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting zariz-events v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Session core ─────────────────────────────────────
    let store = CredentialStore::new(RolePolicy::new(config.auth.allowed_roles.iter().copied()));
    let renewal_store = persist::from_config(&config.persistence);
    let auth = Arc::new(HttpAuthService::new(&config.auth)?);
    let session = SessionManager::new(
        Arc::clone(&store),
        renewal_store,
        auth,
        config.auth.clone(),
    );
    let mut session_events = session.events();

    // ── Step 2: Authenticate ─────────────────────────────────────
    match session.restore().await? {
        Some(stored) => {
            tracing::info!(sub = %stored.subject, role = %stored.role, "Resuming persisted session");
            session.current_access_token().await?;
        }
        None => {
            let identifier = read_env(&config.session.identifier_env)?;
            let secret = read_env(&config.session.secret_env)?;
            let claims = session.login(&identifier, &secret).await?;
            tracing::info!(sub = %claims.sub, role = %claims.role, "Logged in");
        }
    }

    if let Some(at) = session.renewal_state().due_at() {
        let in_secs = at.saturating_duration_since(tokio::time::Instant::now()).as_secs();
        tracing::info!(in_secs, "Next credential renewal scheduled");
    }

    // ── Step 3: Realtime stream ──────────────────────────────────
    let transport = Arc::new(HttpStreamTransport::new(&config.realtime)?);
    let realtime = RealtimeClient::new(&config.realtime, transport, Arc::clone(&store))?;
    let subscription = realtime.subscribe(|event| {
        tracing::info!(event = %event.event, data = %event.data, "Realtime event");
    });

    let mut status = realtime.status_watch();
    let status_task = tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = *status.borrow_and_update();
            tracing::info!(status = %current, "Connection status changed");
        }
    });

    tracing::info!(endpoint = %realtime.endpoint(), "Following event stream");

    // ── Step 4: Run until shutdown or session end ────────────────
    tokio::select! {
        _ = shutdown_signal() => tracing::info!("Shutdown signal received"),
        reason = session_ended(&mut session_events) => {
            tracing::warn!(%reason, "Session ended; re-authentication required");
        }
    }

    // ── Step 5: Teardown ─────────────────────────────────────────
    subscription.unsubscribe();
    session.logout().await?;
    drop(realtime);
    status_task.abort();

    tracing::info!("zariz-events shut down gracefully");
    Ok(())
}

fn read_env(name: &str) -> Result<String, AppError> {
    std::env::var(name)
        .map_err(|_| AppError::configuration(format!("Environment variable {name} is not set")))
}

/// Resolves once the session is ended by the core.
async fn session_ended(events: &mut broadcast::Receiver<SessionEvent>) -> String {
    loop {
        match events.recv().await {
            Ok(SessionEvent::Expired { reason }) => return reason,
            Ok(SessionEvent::LoggedOut) => return "logged out".to_string(),
            Ok(event) => tracing::debug!(?event, "Session event"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Session events lagged");
            }
            Err(broadcast::error::RecvError::Closed) => std::future::pending::<()>().await,
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
