//! Reconnect throttle.
//!
//! At most one reconnect attempt per window. Attempts inside the window fail
//! fast with the remaining wait instead of touching the transport.

use crate::error::DispatchError;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// One-attempt-per-window gate.
#[derive(Debug)]
pub struct ReconnectGuard {
    window: Duration,
    last_attempt: Mutex<Option<Instant>>,
}

impl ReconnectGuard {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_attempt: Mutex::new(None),
        }
    }

    /// Claim the current window.
    ///
    /// Returns `ReconnectThrottled` with the remaining wait if an attempt was
    /// already made inside it.
    pub fn try_acquire(&self) -> Result<(), DispatchError> {
        let now = Instant::now();
        let mut last = self.last_attempt.lock();
        if let Some(previous) = *last {
            let elapsed = now.saturating_duration_since(previous);
            if elapsed < self.window {
                return Err(DispatchError::ReconnectThrottled {
                    retry_in: self.window - elapsed,
                });
            }
        }
        *last = Some(now);
        Ok(())
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}
