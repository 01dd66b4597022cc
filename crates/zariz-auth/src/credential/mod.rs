//! In-memory credential store.

pub mod store;

pub use store::{CredentialListener, CredentialStore, CredentialSubscription, StoreOutcome};
