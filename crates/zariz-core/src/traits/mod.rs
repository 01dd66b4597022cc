//! Platform-abstraction traits defined in `zariz-core` and implemented by
//! other crates (or by the embedding application).

pub mod auth_service;
pub mod renewal_store;

pub use auth_service::AuthService;
pub use renewal_store::RenewalStore;
