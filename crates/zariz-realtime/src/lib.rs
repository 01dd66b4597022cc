//! # zariz-realtime
//!
//! Realtime event client for Zariz. Provides:
//!
//! - One multiplexed SSE stream per endpoint, shared by every subscriber
//! - Forced reconnect whenever the access credential changes
//! - Exponential reconnect backoff with jitter
//! - SSE framing and event normalization

pub mod client;
pub mod connection;
pub mod error;
pub mod message;
pub mod registry;
pub mod transport;

pub use client::{EventHandler, RealtimeClient, Subscription};
pub use connection::{ConnectionStatus, StreamState};
pub use error::{RealtimeError, StreamError};
pub use message::{RealtimeEvent, SseDecoder};
pub use transport::{FrameStream, HttpStreamTransport, StreamTransport};
