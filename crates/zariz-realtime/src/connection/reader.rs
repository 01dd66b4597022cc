//! Read loop for one open stream.

use futures::StreamExt;
use tracing::trace;

use crate::error::StreamError;
use crate::message::{RealtimeEvent, SseDecoder};
use crate::transport::FrameStream;

/// Decode `stream` and hand every normalized event to `deliver`, in
/// receipt order. Returns why the stream ended.
pub async fn pump<F>(mut stream: FrameStream, mut deliver: F) -> StreamError
where
    F: FnMut(RealtimeEvent),
{
    let mut decoder = SseDecoder::new();
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => return e,
        };
        for frame in decoder.push(&chunk) {
            match RealtimeEvent::normalize(&frame) {
                Some(event) => {
                    trace!(event = %event.event, "Stream event");
                    deliver(event);
                }
                None => continue,
            }
        }
    }
    StreamError::Closed
}
