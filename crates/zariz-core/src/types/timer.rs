//! Single-shot cancellable timer slot.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Holds at most one pending delayed task.
///
/// Arming replaces (and cancels) whatever was pending. Cancellation only
/// affects the waiting phase; once the delay elapsed the task body runs to
/// completion. Dropping the slot cancels the pending timer.
#[derive(Debug, Default)]
pub struct TimerSlot {
    pending: Option<PendingTimer>,
}

#[derive(Debug)]
struct PendingTimer {
    cancel: CancellationToken,
    deadline: Instant,
}

impl TimerSlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `task` to run after `delay`, cancelling any pending timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm<F>(&mut self, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();

        let cancel = CancellationToken::new();
        let deadline = Instant::now() + delay;
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => task.await,
            }
        });

        self.pending = Some(PendingTimer { cancel, deadline });
    }

    /// Cancel the pending timer, if any. Returns `true` if one was pending.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(timer) => {
                let was_pending = !timer.cancel.is_cancelled() && Instant::now() < timer.deadline;
                timer.cancel.cancel();
                was_pending
            }
            None => false,
        }
    }

    /// Whether a timer is armed and has not fired yet.
    pub fn is_pending(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|t| !t.cancel.is_cancelled() && Instant::now() < t.deadline)
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}
