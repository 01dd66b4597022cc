//! # zariz-auth
//!
//! Credential lifecycle for Zariz clients.
//!
//! ## Modules
//!
//! - `jwt` — decoding bearer credentials into structured claims
//! - `credential` — in-memory credential store with synchronous change fan-out
//! - `rbac` — role policy applied to every stored credential
//! - `persist` — renewal credential persistence backends
//! - `client` — HTTP client for the auth collaborator
//! - `session` — login, single-flight renewal, proactive scheduling, logout

pub mod client;
pub mod credential;
pub mod error;
pub mod jwt;
pub mod persist;
pub mod rbac;
pub mod session;

pub use client::HttpAuthService;
pub use credential::{CredentialStore, CredentialSubscription, StoreOutcome};
pub use error::{AuthError, DecodeError};
pub use jwt::{Claims, ClaimsCodec, Credential};
pub use persist::{FileRenewalStore, MemoryRenewalStore, RenewalCookie};
pub use rbac::{PolicyViolation, RolePolicy};
pub use session::{RenewalState, SessionEvent, SessionManager};
