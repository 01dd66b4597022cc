//! Stream framing and event normalization.

pub mod envelope;
pub mod sse;

pub use envelope::{RealtimeEvent, UNKNOWN_EVENT};
pub use sse::SseDecoder;
