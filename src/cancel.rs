//! Cooperative cancellation.
//!
//! Every public operation in this crate accepts a [`CancellationToken`] and
//! checks it at each suspension point, per the core's concurrency contract.
//! A cancelled write that has already passed the exception stage is not
//! rolled back; partial progress is the documented contract (see
//! [`crate::pipeline`]).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cheap, cloneable flag that callers can flip to request cancellation.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a fresh, not-yet-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that is permanently not cancelled, for call sites that have
    /// no cancellation source of their own.
    pub fn none() -> Self {
        Self::new()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Returns whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}
