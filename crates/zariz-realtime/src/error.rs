//! Stream and client construction errors.

use thiserror::Error;

use zariz_core::error::{AppError, ErrorKind};

/// Why a stream connection could not be opened or ended.
///
/// Never surfaced to subscribers; drives the reconnect state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// The request could not be sent.
    #[error("stream connect failed: {0}")]
    Connect(String),
    /// The endpoint answered with a non-success status.
    #[error("stream endpoint answered with status {0}")]
    Status(u16),
    /// Reading the open stream failed.
    #[error("stream read failed: {0}")]
    Read(String),
    /// The endpoint closed the stream.
    #[error("stream closed by endpoint")]
    Closed,
}

/// Misuse of the realtime client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RealtimeError {
    /// A client for this endpoint already exists in the process.
    #[error("a realtime client for '{0}' already exists")]
    DuplicateEndpoint(String),
}

impl From<StreamError> for AppError {
    fn from(err: StreamError) -> Self {
        let message = err.to_string();
        AppError::with_source(ErrorKind::Stream, message, err)
    }
}

impl From<RealtimeError> for AppError {
    fn from(err: RealtimeError) -> Self {
        let message = err.to_string();
        AppError::with_source(ErrorKind::Internal, message, err)
    }
}
