//! Observer delivery queues.
//!
//! Each registered observer owns a FIFO of undelivered responses. At most one
//! drain job per observer runs on the blocking pool, so an observer sees its
//! responses in arrival order and a slow observer holds none of the runtime
//! workers.

use crate::domain::Response;
use crate::ports::Callback;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;

/// One observer and its backlog.
pub(crate) struct ObserverSlot {
    callback: Arc<dyn Callback>,
    backlog: Mutex<VecDeque<Response>>,
    draining: AtomicBool,
}

impl ObserverSlot {
    pub(crate) fn new(callback: Arc<dyn Callback>) -> Arc<Self> {
        Arc::new(Self {
            callback,
            backlog: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
        })
    }

    /// Whether this slot wraps `callback`.
    pub(crate) fn holds(&self, callback: &Arc<dyn Callback>) -> bool {
        Arc::ptr_eq(&self.callback, callback)
    }

    /// Queue a response and make sure a drain job is running.
    pub(crate) fn push(self: &Arc<Self>, response: Response, runtime: &Handle) {
        self.backlog.lock().push_back(response);
        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let slot = Arc::clone(self);
            runtime.spawn_blocking(move || slot.drain());
        }
    }

    pub(crate) fn backlog_len(&self) -> usize {
        self.backlog.lock().len()
    }

    fn drain(&self) {
        loop {
            while let Some(response) = self.pop() {
                self.callback.on_response(response);
            }
            self.draining.store(false, Ordering::Release);
            // A push that lost the flag race before the store above left its
            // response for us.
            if self.backlog.lock().is_empty() || self.draining.swap(true, Ordering::AcqRel) {
                return;
            }
        }
    }

    fn pop(&self) -> Option<Response> {
        self.backlog.lock().pop_front()
    }
}
