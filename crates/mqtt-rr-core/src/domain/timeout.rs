//! Deadline-ordered timeout entries.

use crate::domain::call_id::CallId;
use std::collections::{BTreeMap, HashMap};
use tokio::time::Instant;

/// Min-ordered queue of `(deadline, call id)` entries.
///
/// Ties on the deadline are broken by insertion sequence, so two calls armed
/// for the same instant fire in the order they were armed.
#[derive(Debug, Default)]
pub struct TimeoutQueue {
    by_deadline: BTreeMap<(Instant, u64), CallId>,
    by_id: HashMap<CallId, (Instant, u64)>,
    seq: u64,
}

impl TimeoutQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or re-arm) an entry.
    ///
    /// Returns `true` when the new entry became the earliest one, i.e. a
    /// waiter sleeping on the previous head must re-evaluate.
    pub fn insert(&mut self, id: CallId, deadline: Instant) -> bool {
        self.remove(&id);
        let slot = (deadline, self.seq);
        self.seq = self.seq.wrapping_add(1);
        self.by_deadline.insert(slot, id);
        self.by_id.insert(id, slot);
        self.by_deadline.keys().next() == Some(&slot)
    }

    /// Remove an entry. No-op if it already fired or was never armed.
    pub fn remove(&mut self, id: &CallId) -> bool {
        match self.by_id.remove(id) {
            Some(slot) => {
                self.by_deadline.remove(&slot);
                true
            }
            None => false,
        }
    }

    /// Earliest deadline, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.by_deadline.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Pop the earliest entry if its deadline is at or before `now`.
    pub fn pop_expired(&mut self, now: Instant) -> Option<CallId> {
        let (&slot, _) = self.by_deadline.iter().next()?;
        if slot.0 > now {
            return None;
        }
        let id = self.by_deadline.remove(&slot)?;
        self.by_id.remove(&id);
        Some(id)
    }

    pub fn contains(&self, id: &CallId) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_deadline.clear();
        self.by_id.clear();
    }
}
