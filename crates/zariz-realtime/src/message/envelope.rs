//! Normalized event envelope delivered to subscribers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Discriminator used when a payload carries none.
pub const UNKNOWN_EVENT: &str = "unknown";

/// A stream payload in `{event, data}` form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeEvent {
    /// The payload's `event` or `type` discriminator, or `"unknown"`.
    pub event: String,
    /// The payload's `data` member when it has a discriminator and a
    /// truthy `data`, otherwise the whole payload.
    pub data: Value,
}

impl RealtimeEvent {
    /// Parse and normalize a raw frame. Unparseable frames are logged and
    /// dropped.
    pub fn normalize(raw: &str) -> Option<Self> {
        match serde_json::from_str::<Value>(raw) {
            Ok(payload) => Some(Self::from_payload(payload)),
            Err(e) => {
                warn!(error = %e, len = raw.len(), "Dropping malformed stream frame");
                None
            }
        }
    }

    /// Normalize an already parsed payload.
    ///
    /// `event` wins over `type` when both are truthy, and `data` replaces
    /// the payload only when truthy. A non-string discriminator is rendered
    /// as JSON text.
    pub fn from_payload(mut payload: Value) -> Self {
        let discriminator = ["event", "type"].iter().find_map(|key| {
            payload
                .get(*key)
                .filter(|v| is_truthy(v))
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
        });

        match discriminator {
            Some(event) => {
                let data = if payload.get("data").is_some_and(is_truthy) {
                    payload
                        .get_mut("data")
                        .map(Value::take)
                        .unwrap_or_default()
                } else {
                    payload
                };
                Self { event, data }
            }
            None => Self {
                event: UNKNOWN_EVENT.to_string(),
                data: payload,
            },
        }
    }
}

/// `null`, `false`, zero and the empty string are falsy; everything else,
/// empty arrays and objects included, is truthy.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
