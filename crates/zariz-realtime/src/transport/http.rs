//! reqwest SSE transport.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Url;
use reqwest::header::{ACCEPT, CACHE_CONTROL, HeaderValue};
use tracing::debug;

use zariz_core::config::RealtimeConfig;
use zariz_core::error::{AppError, ErrorKind};
use zariz_core::result::AppResult;

use crate::error::StreamError;

use super::{FrameStream, StreamTransport};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens `GET {endpoint}?token=<credential>` as a `text/event-stream`.
#[derive(Debug, Clone)]
pub struct HttpStreamTransport {
    client: reqwest::Client,
    endpoint: String,
    url: Url,
}

impl HttpStreamTransport {
    /// Build a transport for the configured endpoint.
    pub fn new(config: &RealtimeConfig) -> AppResult<Self> {
        let url = Url::parse(&config.endpoint).map_err(|e| {
            AppError::with_source(
                ErrorKind::Configuration,
                format!("Invalid realtime endpoint '{}'", config.endpoint),
                e,
            )
        })?;

        // No overall timeout: the stream is long-lived.
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| {
                AppError::with_source(ErrorKind::Configuration, "Failed to build HTTP client", e)
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            url,
        })
    }

    fn authenticated_url(&self, credential: &str) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut().append_pair("token", credential);
        url
    }
}

#[async_trait]
impl StreamTransport for HttpStreamTransport {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn open(&self, credential: &str) -> Result<FrameStream, StreamError> {
        let response = self
            .client
            .get(self.authenticated_url(credential))
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
            .header(CACHE_CONTROL, HeaderValue::from_static("no-cache"))
            .send()
            .await
            .map_err(|e| StreamError::Connect(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::Status(status.as_u16()));
        }
        debug!(endpoint = %self.endpoint, "Event stream opened");

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| StreamError::Read(e.to_string())))
            .boxed())
    }
}
