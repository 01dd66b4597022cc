//! # zariz-core
//!
//! Core crate for the Zariz session core. Contains configuration schemas,
//! the unified error system, shared value types (roles, identifiers,
//! backoff, timers) and the platform-abstraction traits implemented by the
//! auth and realtime crates.
//!
//! This crate has **no** internal dependencies on other Zariz crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::{AppError, AuthServiceError};
pub use result::AppResult;
