//! Stream transport abstraction.

pub mod http;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::StreamError;

pub use http::HttpStreamTransport;

/// Raw chunks of an open event stream.
pub type FrameStream = BoxStream<'static, Result<Bytes, StreamError>>;

/// Opens authenticated event streams against one endpoint.
///
/// The credential travels with the request, so it cannot change on an open
/// stream; every credential change means a new `open`.
#[async_trait]
pub trait StreamTransport: Send + Sync + std::fmt::Debug + 'static {
    /// The endpoint this transport connects to. At most one client per
    /// endpoint may exist in the process.
    fn endpoint(&self) -> &str;

    /// Open a new stream authenticated with `credential`.
    async fn open(&self, credential: &str) -> Result<FrameStream, StreamError>;
}
