//! The per-observer inbox: the coalescing point for hub backpressure.
//!
//! Spec.md §4.6/§5: "the hub coalesces bursts per tag to the latest value if
//! the observer's queue exceeds a per-observer bound; the coalescing point
//! is the per-observer inbox, not the hub... it does not block the write
//! path." A full inbox with a live slot for the incoming tag overwrites that
//! slot in place (preserving delivery order); a full inbox with no existing
//! slot for the tag drops the update and counts it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::model::uuid_like::TagId;
use crate::model::Sample;

struct InboxState {
    queue: VecDeque<(TagId, Sample)>,
}

/// A bounded, per-observer delivery queue with latest-value coalescing.
pub struct Inbox {
    capacity: usize,
    state: Mutex<InboxState>,
    not_empty: Condvar,
    dropped: AtomicU64,
}

impl Inbox {
    /// Creates an inbox that holds at most `capacity` pending `(tag, sample)`
    /// pairs at once.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(InboxState {
                queue: VecDeque::new(),
            }),
            not_empty: Condvar::new(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Delivers one update. Never blocks the caller (the write path).
    /// Returns `true` if this specific push dropped the update (the inbox
    /// was full and held no existing slot for `tag_id`), `false` otherwise
    /// — callers drive consecutive-failure tracking off this return value
    /// rather than [`Self::dropped_count`], which is lifetime-cumulative.
    pub fn push(&self, tag_id: TagId, sample: Sample) -> bool {
        let mut state = self.state.lock();
        if state.queue.len() < self.capacity {
            state.queue.push_back((tag_id, sample));
            self.not_empty.notify_one();
            return false;
        }
        // At capacity: coalesce onto an existing slot for this tag if one is
        // pending, else the update is lost (counted, not silently eaten).
        if let Some(slot) = state.queue.iter_mut().find(|(t, _)| *t == tag_id) {
            slot.1 = sample;
            false
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            true
        }
    }

    /// Pops the oldest pending update, if any, without blocking.
    pub fn try_recv(&self) -> Option<(TagId, Sample)> {
        self.state.lock().queue.pop_front()
    }

    /// Pops the oldest pending update, blocking up to `timeout` for one to
    /// arrive.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<(TagId, Sample)> {
        let mut state = self.state.lock();
        if state.queue.is_empty() {
            let result = self.not_empty.wait_for(&mut state, timeout);
            if result.timed_out() && state.queue.is_empty() {
                return None;
            }
        }
        state.queue.pop_front()
    }

    /// Number of updates dropped because the inbox was full and held no
    /// existing slot for the incoming tag.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Current number of pending updates.
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// True when no updates are pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Quality;
    use chrono::Utc;

    fn sample(v: f64) -> Sample {
        Sample::numeric(Utc::now(), v, Quality::Good, "degC")
    }

    #[test]
    fn coalesces_same_tag_when_full() {
        let inbox = Inbox::new(1);
        let tag = TagId::new();
        assert!(!inbox.push(tag, sample(1.0)));
        assert!(!inbox.push(tag, sample(2.0)), "coalescing onto an existing slot is not a drop");
        assert_eq!(inbox.len(), 1);
        let (_, s) = inbox.try_recv().unwrap();
        assert_eq!(s.numeric, 2.0);
    }

    #[test]
    fn drops_new_tag_when_full() {
        let inbox = Inbox::new(1);
        assert!(!inbox.push(TagId::new(), sample(1.0)));
        assert!(inbox.push(TagId::new(), sample(2.0)), "push() reports this specific call dropped");
        assert_eq!(inbox.dropped_count(), 1);
    }

    #[test]
    fn preserves_order_per_tag() {
        let inbox = Inbox::new(4);
        let a = TagId::new();
        let b = TagId::new();
        inbox.push(a, sample(1.0));
        inbox.push(b, sample(2.0));
        inbox.push(a, sample(3.0));
        let first = inbox.try_recv().unwrap();
        assert_eq!(first.0, a);
        assert_eq!(first.1.numeric, 1.0);
    }
}
