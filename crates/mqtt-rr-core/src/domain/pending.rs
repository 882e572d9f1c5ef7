//! Pending call registry.
//!
//! Maps correlation keys to FIFO queues of waiting call ids, and call ids to
//! their full pending-task records. A task is owned by the registry from
//! registration until removal; whichever path removes it (inbound match,
//! timeout, publish failure, shutdown) is the only one that may complete it.

use crate::domain::call_id::CallId;
use crate::domain::response::Response;
use crate::error::DispatchError;
use crate::ports::Callback;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::Instant;

/// Completion slot of one pending call.
///
/// The `claimed` flag is the single atomic claim shared by every completion
/// path: the first `complete()` wins, later ones return `false`.
pub struct Completion {
    claimed: AtomicBool,
    callback: Arc<dyn Callback>,
}

impl Completion {
    pub fn new(callback: Arc<dyn Callback>) -> Self {
        Self {
            claimed: AtomicBool::new(false),
            callback,
        }
    }

    /// Deliver the outcome. Returns `false` if the slot was already claimed.
    pub fn complete(&self, result: Result<Response, DispatchError>) -> bool {
        if self
            .claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        match result {
            Ok(response) => self.callback.on_response(response),
            Err(error) => self.callback.on_failure(error),
        }
        true
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }
}

/// A call awaiting either an inbound match or its deadline.
pub struct PendingTask {
    /// Call id
    pub id: CallId,
    /// Correlation key the call is queued under
    pub key: String,
    /// When the call was registered
    pub created_at: Instant,
    /// When the call times out
    pub deadline: Instant,
    completion: Completion,
}

impl PendingTask {
    pub fn new(
        id: CallId,
        key: impl Into<String>,
        created_at: Instant,
        deadline: Instant,
        callback: Arc<dyn Callback>,
    ) -> Self {
        Self {
            id,
            key: key.into(),
            created_at,
            deadline,
            completion: Completion::new(callback),
        }
    }

    /// How long the call was allowed to wait.
    pub fn budget(&self) -> std::time::Duration {
        self.deadline.saturating_duration_since(self.created_at)
    }

    pub fn complete(&self, result: Result<Response, DispatchError>) -> bool {
        self.completion.complete(result)
    }
}

impl fmt::Debug for PendingTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTask")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("budget", &self.budget())
            .field("claimed", &self.completion.is_claimed())
            .finish()
    }
}

#[derive(Default)]
struct RegistryState {
    tasks: HashMap<CallId, PendingTask>,
    queues: HashMap<String, VecDeque<CallId>>,
    closed: bool,
}

impl RegistryState {
    fn unlink(&mut self, key: &str, id: &CallId) {
        if let Some(queue) = self.queues.get_mut(key) {
            if let Some(pos) = queue.iter().position(|queued| queued == id) {
                queue.remove(pos);
            }
            if queue.is_empty() {
                self.queues.remove(key);
            }
        }
    }
}

/// Thread-safe registry of pending calls.
///
/// Both maps sit behind one short-held lock so every mutation is linearized.
#[derive(Default)]
pub struct PendingRegistry {
    state: Mutex<RegistryState>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a task and append its id to its key's queue.
    ///
    /// Hands the task back once the registry has been drained.
    pub fn register(&self, task: PendingTask) -> Result<(), PendingTask> {
        self.register_with(task, |_| {})
    }

    /// Insert a task and run `armed` while the registry lock is still held,
    /// so whatever `armed` publishes (a timeout entry) never observes a
    /// registry that lacks the task.
    ///
    /// After [`Self::drain`] nothing is inserted, `armed` does not run and
    /// the task is handed back for the caller to fail.
    pub fn register_with<F>(&self, task: PendingTask, armed: F) -> Result<(), PendingTask>
    where
        F: FnOnce(&PendingTask),
    {
        let mut state = self.state.lock();
        if state.closed {
            return Err(task);
        }
        let id = task.id;
        state
            .queues
            .entry(task.key.clone())
            .or_default()
            .push_back(id);
        armed(&task);
        state.tasks.insert(id, task);
        Ok(())
    }

    /// Remove and return the oldest queued id for `key`.
    ///
    /// The task record stays in the registry; follow up with [`Self::remove`].
    pub fn pop_first(&self, key: &str) -> Option<CallId> {
        let mut state = self.state.lock();
        let queue = state.queues.get_mut(key)?;
        let id = queue.pop_front();
        if queue.is_empty() {
            state.queues.remove(key);
        }
        id
    }

    /// Pop the oldest task for `key` and remove its record in one step.
    pub fn take_first(&self, key: &str) -> Option<PendingTask> {
        let mut state = self.state.lock();
        loop {
            let queue = state.queues.get_mut(key)?;
            let id = queue.pop_front();
            if queue.is_empty() {
                state.queues.remove(key);
            }
            let id = id?;
            if let Some(task) = state.tasks.remove(&id) {
                return Some(task);
            }
        }
    }

    /// Remove a task record and unlink it from its queue if still queued.
    ///
    /// Idempotent: a second call for the same id returns `None`.
    pub fn remove(&self, id: &CallId) -> Option<PendingTask> {
        let mut state = self.state.lock();
        let task = state.tasks.remove(id)?;
        state.unlink(&task.key, id);
        Some(task)
    }

    /// Remove every task and refuse later registrations (shutdown).
    pub fn drain(&self) -> Vec<PendingTask> {
        let mut state = self.state.lock();
        state.closed = true;
        state.queues.clear();
        state.tasks.drain().map(|(_, task)| task).collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_pending(&self, id: &CallId) -> bool {
        self.state.lock().tasks.contains_key(id)
    }

    /// Whether [`Self::drain`] has run.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of calls queued under `key`.
    pub fn queue_len(&self, key: &str) -> usize {
        self.state
            .lock()
            .queues
            .get(key)
            .map(VecDeque::len)
            .unwrap_or(0)
    }
}
