//! Core type definitions used across the Zariz workspace.

pub mod backoff;
pub mod id;
pub mod role;
pub mod session;
pub mod timer;

pub use backoff::Backoff;
pub use id::*;
pub use role::Role;
pub use session::{StoredSession, TokenPair};
pub use timer::TimerSlot;
