//! Stream connection state machine.

use serde::{Deserialize, Serialize};

/// Internal state of the one stream connection.
///
/// ```text
/// disconnected --first subscriber--> connecting
/// connecting   --open ok-----------> connected
/// connecting   --open failed-------> erroring
/// connected    --stream error------> erroring
/// erroring     --retry timer-------> connecting
/// any          --last subscriber left or credential lost--> disconnected
/// connecting|connected --credential changed--> connecting
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    /// No stream and no reconnect pending.
    #[default]
    Disconnected,
    /// A stream is being opened.
    Connecting,
    /// The stream is open and delivering events.
    Connected,
    /// The stream failed; a reconnect may be pending.
    Erroring,
}

impl StreamState {
    /// Consumer-facing view of this state.
    pub fn status(self) -> ConnectionStatus {
        match self {
            Self::Connected => ConnectionStatus::Connected,
            Self::Connecting | Self::Erroring => ConnectionStatus::Connecting,
            Self::Disconnected => ConnectionStatus::Disconnected,
        }
    }
}

/// What a UI indicator shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Events are flowing.
    Connected,
    /// Opening, or waiting to reopen.
    Connecting,
    /// Not connected and not trying.
    Disconnected,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connected => write!(f, "connected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Disconnected => write!(f, "disconnected"),
        }
    }
}
