//! The snapshot subscription fan-out (C6, spec.md §4.6).
//!
//! A [`Subscription`] is an RAII handle: dropping it deregisters from the
//! hub automatically, the way the teacher's `SlotGuard`/`CheckpointGuard`
//! release their lock slot on drop rather than requiring callers to
//! remember a matching `close()`. Delivery happens through a bounded
//! per-observer [`inbox::Inbox`] so a slow observer never blocks the write
//! path (spec.md §5 "Backpressure").

pub mod inbox;

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::model::uuid_like::TagId;
use crate::model::Sample;
use crate::registry::TagRegistry;
use inbox::Inbox;

/// Opaque identifier for a live subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct HubInner {
    next_id: AtomicU64,
    /// Every live subscription's inbox and interest set, by id.
    subscriptions: DashMap<SubscriptionId, Arc<SubscriptionRecord>>,
    /// Reverse index: tag -> interested subscription ids, for O(interested) publish.
    by_tag: DashMap<TagId, HashSet<SubscriptionId>>,
    /// Consecutive delivery failures before a subscription is force-closed.
    max_consecutive_failures: u32,
}

struct SubscriptionRecord {
    #[allow(dead_code)]
    principal: String,
    tag_set: RwLock<HashSet<TagId>>,
    inbox: Arc<Inbox>,
    consecutive_failures: AtomicU64,
}

/// Fan-out point for snapshot updates.
#[derive(Clone)]
pub struct SubscriptionHub {
    inner: Arc<HubInner>,
}

impl SubscriptionHub {
    /// Creates an empty hub. `max_consecutive_failures` is how many
    /// delivery failures in a row close a subscription automatically.
    pub fn new(max_consecutive_failures: u32) -> Self {
        Self {
            inner: Arc::new(HubInner {
                next_id: AtomicU64::new(1),
                subscriptions: DashMap::new(),
                by_tag: DashMap::new(),
                max_consecutive_failures,
            }),
        }
    }

    /// Creates a new subscription for `principal` with no tags subscribed yet.
    pub fn create(&self, principal: impl Into<String>, inbox_capacity: usize) -> Subscription {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let record = Arc::new(SubscriptionRecord {
            principal: principal.into(),
            tag_set: RwLock::new(HashSet::new()),
            inbox: Arc::new(Inbox::new(inbox_capacity)),
            consecutive_failures: AtomicU64::new(0),
        });
        self.inner.subscriptions.insert(id, record.clone());
        Subscription {
            id,
            hub: Arc::downgrade(&self.inner),
            record,
        }
    }

    /// Resolves `names` via the registry and subscribes `sub` to the ones
    /// that exist. Unknown names are reported back, not treated as an error
    /// (spec.md §4.6: "unknown or unauthorized names are silently ignored
    /// per-name but reported in a diagnostic list").
    pub fn subscribe(&self, sub: &Subscription, registry: &TagRegistry, names: &[String]) -> Vec<String> {
        let mut unresolved = Vec::new();
        let mut ids = Vec::new();
        for name in names {
            match registry.resolve(name) {
                Some(def) => ids.push(def.id),
                None => unresolved.push(name.clone()),
            }
        }
        {
            let mut set = sub.record.tag_set.write();
            for id in &ids {
                set.insert(*id);
            }
        }
        for id in ids {
            self.inner.by_tag.entry(id).or_default().insert(sub.id);
        }
        unresolved
    }

    /// Unsubscribes `sub` from `names`, resolved the same way as [`Self::subscribe`].
    pub fn unsubscribe(&self, sub: &Subscription, registry: &TagRegistry, names: &[String]) -> Vec<String> {
        let mut unresolved = Vec::new();
        let mut ids = Vec::new();
        for name in names {
            match registry.resolve(name) {
                Some(def) => ids.push(def.id),
                None => unresolved.push(name.clone()),
            }
        }
        {
            let mut set = sub.record.tag_set.write();
            for id in &ids {
                set.remove(id);
            }
        }
        for id in ids {
            if let Some(mut interested) = self.inner.by_tag.get_mut(&id) {
                interested.remove(&sub.id);
            }
        }
        unresolved
    }

    /// Publishes a snapshot update for `tag_id` to every interested, still-live subscription.
    pub fn publish(&self, tag_id: TagId, sample: &Sample) {
        let Some(interested) = self.inner.by_tag.get(&tag_id) else {
            return;
        };
        let mut to_close = Vec::new();
        for id in interested.iter() {
            let Some(record) = self.inner.subscriptions.get(id) else {
                continue;
            };
            let dropped_this_push = record.inbox.push(tag_id, sample.clone());
            if dropped_this_push {
                let failures = record.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                if failures as u32 >= self.inner.max_consecutive_failures {
                    to_close.push(*id);
                }
            } else {
                record.consecutive_failures.store(0, Ordering::Relaxed);
            }
        }
        drop(interested);
        for id in to_close {
            Self::deregister(&self.inner, id);
        }
    }

    fn deregister(inner: &Arc<HubInner>, id: SubscriptionId) {
        if let Some((_, record)) = inner.subscriptions.remove(&id) {
            let tags: Vec<TagId> = record.tag_set.read().iter().copied().collect();
            for tag in tags {
                if let Some(mut interested) = inner.by_tag.get_mut(&tag) {
                    interested.remove(&id);
                }
            }
        }
    }

    /// Number of currently live subscriptions.
    pub fn active_count(&self) -> usize {
        self.inner.subscriptions.len()
    }

    /// Drops `tag_id`'s reverse-index entry entirely, used when a tag is
    /// deleted (spec.md §3 "Deleting a tag emits a terminal event that
    /// tears down subscriptions"). Subscriptions themselves are left
    /// intact — only their interest in this now-nonexistent tag id stops
    /// being resolvable, which matches `TagRegistry::resolve` returning
    /// `None` for the freed name from this point on.
    pub fn teardown_tag(&self, tag_id: TagId) {
        self.inner.by_tag.remove(&tag_id);
    }
}

/// An RAII subscription handle. Dropping it deregisters from the hub.
pub struct Subscription {
    id: SubscriptionId,
    hub: Weak<HubInner>,
    record: Arc<SubscriptionRecord>,
}

impl Subscription {
    /// This subscription's id.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Receives the next pending `(tag_id, sample)` update, blocking up to `timeout`.
    pub fn recv_timeout(&self, timeout: std::time::Duration) -> Option<(TagId, Sample)> {
        self.record.inbox.recv_timeout(timeout)
    }

    /// Receives the next pending update without blocking.
    pub fn try_recv(&self) -> Option<(TagId, Sample)> {
        self.record.inbox.try_recv()
    }

    /// Idempotent close: releases this subscription's interest immediately,
    /// rather than waiting for drop.
    pub fn close(&self) {
        if let Some(hub) = self.hub.upgrade() {
            SubscriptionHub::deregister(&hub, self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Quality, TagSettings};
    use std::time::Duration as StdDuration;

    fn make_registry() -> (TagRegistry, TagId) {
        let registry = TagRegistry::new();
        let def = registry
            .create(
                "tester",
                TagSettings {
                    name: "T1".into(),
                    data_type: crate::model::DataType::FloatingPoint,
                    units: "degC".into(),
                    description: String::new(),
                    state_set_name: None,
                    exception_cfg: crate::model::FilterConfig::disabled(),
                    compression_cfg: crate::model::FilterConfig::disabled(),
                    owner: "tester".into(),
                    policies: vec![],
                },
            )
            .unwrap();
        (registry, def.id)
    }

    #[test]
    fn publish_reaches_subscribed_observer() {
        let hub = SubscriptionHub::new(5);
        let (registry, tag_id) = make_registry();
        let sub = hub.create("tester", 8);
        let unresolved = hub.subscribe(&sub, &registry, &["T1".to_string()]);
        assert!(unresolved.is_empty());

        let sample = Sample::numeric(chrono::Utc::now(), 42.0, Quality::Good, "degC");
        hub.publish(tag_id, &sample);

        let (got_tag, got_sample) = sub.recv_timeout(StdDuration::from_millis(50)).unwrap();
        assert_eq!(got_tag, tag_id);
        assert_eq!(got_sample.numeric, 42.0);
    }

    #[test]
    fn unknown_name_is_reported_not_errored() {
        let hub = SubscriptionHub::new(5);
        let (registry, _tag_id) = make_registry();
        let sub = hub.create("tester", 8);
        let unresolved = hub.subscribe(&sub, &registry, &["nope".to_string()]);
        assert_eq!(unresolved, vec!["nope".to_string()]);
    }

    #[test]
    fn drop_deregisters_subscription() {
        let hub = SubscriptionHub::new(5);
        let (registry, tag_id) = make_registry();
        {
            let sub = hub.create("tester", 8);
            hub.subscribe(&sub, &registry, &["T1".to_string()]);
            assert_eq!(hub.active_count(), 1);
        }
        assert_eq!(hub.active_count(), 0);
        // publishing after the only subscriber dropped must not panic.
        let sample = Sample::numeric(chrono::Utc::now(), 1.0, Quality::Good, "degC");
        hub.publish(tag_id, &sample);
    }

    /// spec.md §4.6/§5: the hub disconnects an observer after a bounded
    /// number of *consecutive* delivery failures, not a lifetime-cumulative
    /// count. A streak of drops followed by clean deliveries must not
    /// force-close the subscription.
    #[test]
    fn consecutive_failures_reset_on_clean_delivery() {
        let hub = SubscriptionHub::new(3);
        let registry = TagRegistry::new();
        let def_a = registry
            .create(
                "tester",
                TagSettings {
                    name: "A".into(),
                    data_type: crate::model::DataType::FloatingPoint,
                    units: "degC".into(),
                    description: String::new(),
                    state_set_name: None,
                    exception_cfg: crate::model::FilterConfig::disabled(),
                    compression_cfg: crate::model::FilterConfig::disabled(),
                    owner: "tester".into(),
                    policies: vec![],
                },
            )
            .unwrap();
        let def_b = registry
            .create(
                "tester",
                TagSettings {
                    name: "B".into(),
                    data_type: crate::model::DataType::FloatingPoint,
                    units: "degC".into(),
                    description: String::new(),
                    state_set_name: None,
                    exception_cfg: crate::model::FilterConfig::disabled(),
                    compression_cfg: crate::model::FilterConfig::disabled(),
                    owner: "tester".into(),
                    policies: vec![],
                },
            )
            .unwrap();
        let sub = hub.create("tester", 1);
        hub.subscribe(&sub, &registry, &["A".to_string(), "B".to_string()]);

        let sample = |v: f64| Sample::numeric(chrono::Utc::now(), v, Quality::Good, "degC");

        // Fill the single-slot inbox with A, then two B pushes each find the
        // slot occupied by a different tag and drop (two consecutive failures).
        hub.publish(def_a.id, &sample(1.0));
        hub.publish(def_b.id, &sample(2.0));
        hub.publish(def_b.id, &sample(3.0));
        assert_eq!(hub.active_count(), 1, "two drops is below the threshold of three");

        // Drain the inbox, then deliver cleanly twice. Under the old
        // cumulative-`dropped_count()` logic these clean deliveries would
        // still count as failures and close the subscription at the
        // threshold; under the fix they reset the streak.
        sub.try_recv();
        hub.publish(def_b.id, &sample(4.0));
        hub.publish(def_b.id, &sample(5.0));
        assert_eq!(
            hub.active_count(),
            1,
            "clean deliveries after a drop streak must not force-close a healthy observer"
        );
    }
}
