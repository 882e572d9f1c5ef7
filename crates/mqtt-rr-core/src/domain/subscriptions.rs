//! Subscription bookkeeping with wildcard coverage.
//!
//! The book tracks every filter the application asked for (reference
//! counted), but only the filters not covered by a broader one are actually
//! subscribed at the transport. Subscribing `a/b/#` while `a/b/c` is active
//! therefore unsubscribes `a/b/c`; dropping `a/b/#` again restores it.

use crate::domain::topic::TopicFilter;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One subscription request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicSubscription {
    /// Topic filter
    pub filter: TopicFilter,
    /// Requested QoS (0..=2)
    #[serde(default)]
    pub qos: u8,
    /// Re-issue this subscription after a reconnect
    #[serde(default = "default_attach_record")]
    pub attach_record: bool,
}

fn default_attach_record() -> bool {
    true
}

impl TopicSubscription {
    pub fn new(filter: &str, qos: u8) -> Result<Self, ConfigError> {
        if qos > 2 {
            return Err(ConfigError::InvalidQos(qos));
        }
        Ok(Self {
            filter: TopicFilter::new(filter)?,
            qos,
            attach_record: true,
        })
    }

    /// Do not replay this subscription on reconnect.
    pub fn transient(mut self) -> Self {
        self.attach_record = false;
        self
    }
}

/// Changes to apply at the transport after a book update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionDelta {
    /// Filters to subscribe, with QoS
    pub subscribe: Vec<(String, u8)>,
    /// Filters to unsubscribe
    pub unsubscribe: Vec<String>,
}

impl SubscriptionDelta {
    pub fn is_empty(&self) -> bool {
        self.subscribe.is_empty() && self.unsubscribe.is_empty()
    }
}

#[derive(Debug, Clone)]
struct Entry {
    qos: u8,
    refs: usize,
    attach_record: bool,
}

/// Reference-counted set of requested filters.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionBook {
    entries: BTreeMap<TopicFilter, Entry>,
}

impl SubscriptionBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record subscriptions and return what changes at the transport.
    pub fn subscribe(&mut self, subscriptions: &[TopicSubscription]) -> SubscriptionDelta {
        let before = self.active();
        for sub in subscriptions {
            let entry = self.entries.entry(sub.filter.clone()).or_insert(Entry {
                qos: sub.qos,
                refs: 0,
                attach_record: sub.attach_record,
            });
            entry.refs += 1;
            entry.qos = entry.qos.max(sub.qos);
            entry.attach_record |= sub.attach_record;
        }
        self.delta(before)
    }

    /// Release subscriptions and return what changes at the transport.
    ///
    /// Unknown filters are ignored.
    pub fn unsubscribe(&mut self, filters: &[TopicFilter]) -> SubscriptionDelta {
        let before = self.active();
        for filter in filters {
            if let Some(entry) = self.entries.get_mut(filter) {
                entry.refs -= 1;
                if entry.refs == 0 {
                    self.entries.remove(filter);
                }
            }
        }
        self.delta(before)
    }

    /// Filters currently subscribed at the transport.
    pub fn active(&self) -> BTreeSet<TopicFilter> {
        self.entries
            .keys()
            .filter(|filter| !self.is_shadowed(filter))
            .cloned()
            .collect()
    }

    /// Subscriptions to re-issue on a fresh connection, as `(filter, qos)`.
    ///
    /// Only recorded entries count, and only recorded entries shadow each
    /// other: a transient wildcard is not re-issued, so it cannot stand in
    /// for a narrower recorded filter.
    pub fn replay(&self) -> Vec<(String, u8)> {
        let recorded: Vec<(&TopicFilter, &Entry)> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.attach_record)
            .collect();
        recorded
            .iter()
            .filter(|(filter, _)| {
                !recorded
                    .iter()
                    .any(|(other, _)| other != filter && other.covers(filter))
            })
            .map(|(filter, entry)| (filter.to_string(), entry.qos))
            .collect()
    }

    /// Whether any active filter matches `topic`.
    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.entries.keys().any(|filter| filter.matches(topic))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_shadowed(&self, filter: &TopicFilter) -> bool {
        self.entries
            .keys()
            .any(|other| other != filter && other.covers(filter))
    }

    fn delta(&self, before: BTreeSet<TopicFilter>) -> SubscriptionDelta {
        let after = self.active();
        SubscriptionDelta {
            subscribe: after
                .difference(&before)
                .filter_map(|f| self.entries.get(f).map(|e| (f.to_string(), e.qos)))
                .collect(),
            unsubscribe: before.difference(&after).map(|f| f.to_string()).collect(),
        }
    }
}
