//! Dispatch counters.
//!
//! Thread-safe counters bumped on the hot paths; `snapshot()` reads them
//! into a plain value for logging or assertions.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one dispatcher.
#[derive(Debug, Default)]
pub struct DispatchStats {
    /// Calls handed to the submission worker
    pub submitted: AtomicU64,
    /// Pending calls resolved by an inbound match
    pub resolved: AtomicU64,
    /// Pending calls resolved by their deadline
    pub timed_out: AtomicU64,
    /// Publishes the transport rejected, tracked or not
    pub publish_failures: AtomicU64,
    /// Pending calls failed locally before any reply, e.g. a rejected publish
    pub failed_locally: AtomicU64,
    /// Submissions refused because the transport was disconnected
    pub rejected_disconnected: AtomicU64,
    /// Inbound messages no resolver accepted
    pub unmatched: AtomicU64,
    /// Deliveries to persistent observers
    pub observer_deliveries: AtomicU64,
}

impl DispatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current counter snapshot
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            resolved: self.resolved.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            failed_locally: self.failed_locally.load(Ordering::Relaxed),
            rejected_disconnected: self.rejected_disconnected.load(Ordering::Relaxed),
            unmatched: self.unmatched.load(Ordering::Relaxed),
            observer_deliveries: self.observer_deliveries.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub submitted: u64,
    pub resolved: u64,
    pub timed_out: u64,
    pub publish_failures: u64,
    pub failed_locally: u64,
    pub rejected_disconnected: u64,
    pub unmatched: u64,
    pub observer_deliveries: u64,
}

impl StatsSnapshot {
    /// Calls that reached an outcome through the registry.
    pub fn completed(&self) -> u64 {
        self.resolved + self.timed_out + self.failed_locally
    }
}
