//! Timeout scheduler.
//!
//! One waiter task per dispatcher. It parks on a [`Notify`] while the queue
//! is empty, otherwise sleeps until the earliest deadline or until woken,
//! and re-reads the queue head after every wake: an arm or disarm may have
//! changed it while the waiter slept.

use crate::domain::{CallId, TimeoutQueue};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace};

/// Receiver of expired deadlines.
pub trait TimeoutHandler: Send + Sync + 'static {
    fn on_timeout(&self, id: CallId);
}

struct Shared {
    queue: Mutex<TimeoutQueue>,
    wake: Notify,
    closed: AtomicBool,
}

/// Handle to the waiter task. Dropping it stops the waiter.
pub struct TimeoutScheduler {
    shared: Arc<Shared>,
}

impl TimeoutScheduler {
    /// Spawn the waiter on `runtime`. Expired ids go to `handler` for as long
    /// as it is alive.
    pub fn start<H: TimeoutHandler>(runtime: &Handle, handler: Weak<H>) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(TimeoutQueue::new()),
            wake: Notify::new(),
            closed: AtomicBool::new(false),
        });
        runtime.spawn(run_waiter(shared.clone(), handler));
        Self { shared }
    }

    /// Schedule `id` to expire at `deadline`.
    pub fn arm(&self, id: CallId, deadline: Instant) {
        let new_head = self.shared.queue.lock().insert(id, deadline);
        if new_head {
            self.shared.wake.notify_one();
        }
    }

    /// Cancel the entry for `id`. No-op if it already fired or was never armed.
    pub fn disarm(&self, id: &CallId) -> bool {
        self.shared.queue.lock().remove(id)
    }

    pub fn is_armed(&self, id: &CallId) -> bool {
        self.shared.queue.lock().contains(id)
    }

    pub fn len(&self) -> usize {
        self.shared.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry and stop the waiter.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.queue.lock().clear();
        self.shared.wake.notify_one();
    }
}

impl Drop for TimeoutScheduler {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_waiter<H: TimeoutHandler>(shared: Arc<Shared>, handler: Weak<H>) {
    debug!("Timeout waiter started");
    loop {
        if shared.closed.load(Ordering::Acquire) {
            break;
        }

        // Fire everything already due before sleeping again.
        loop {
            let expired = shared.queue.lock().pop_expired(Instant::now());
            let Some(id) = expired else { break };
            let Some(handler) = handler.upgrade() else {
                debug!("Timeout handler gone, waiter exiting");
                return;
            };
            trace!(call_id = %id, "Deadline elapsed");
            handler.on_timeout(id);
        }

        let next = shared.queue.lock().next_deadline();
        match next {
            None => shared.wake.notified().await,
            Some(deadline) => {
                tokio::select! {
                    _ = sleep_until(deadline) => {}
                    _ = shared.wake.notified() => {}
                }
            }
        }
    }
    debug!("Timeout waiter stopped");
}
