//! Stream connection state and the read loop.

pub mod reader;
pub mod state;

pub use state::{ConnectionStatus, StreamState};
