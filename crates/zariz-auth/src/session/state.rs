//! Renewal state machine.

use tokio::time::Instant;

/// Where the renewal loop of a [`SessionManager`](super::SessionManager)
/// currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenewalState {
    /// No session, or a session without a scheduled renewal.
    #[default]
    Idle,
    /// A renewal timer is armed.
    Scheduled {
        /// When the timer fires.
        at: Instant,
    },
    /// A renewal request is on the wire.
    InFlight,
    /// The last renewal failed; a retry is armed.
    BackingOff {
        /// When the retry fires.
        next_attempt: Instant,
        /// Consecutive failures so far.
        attempt: u32,
    },
}

impl RenewalState {
    /// When the next renewal attempt is due, if one is armed.
    pub fn due_at(&self) -> Option<Instant> {
        match self {
            Self::Scheduled { at } => Some(*at),
            Self::BackingOff { next_attempt, .. } => Some(*next_attempt),
            Self::Idle | Self::InFlight => None,
        }
    }
}
