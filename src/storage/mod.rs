//! The narrow storage port the core requires (spec.md §4.7).
//!
//! The core never assumes a concrete backend; it only relies on the
//! guarantees [`StorageAdapter`] documents. [`memory`] ships an in-memory
//! reference implementation used by this crate's own tests, the way the
//! teacher keeps an in-memory double alongside its real storage engine for
//! tests that don't need durability.

pub mod memory;

use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::model::uuid_like::TagId;
use crate::model::Sample;
use chrono::{DateTime, Utc};

/// A raw-value store the core writes to and reads from.
///
/// Every method accepts a [`CancellationToken`] as its first argument and
/// must check it at any suspension point, per spec.md §5.
pub trait StorageAdapter: Send + Sync {
    /// Appends samples in ascending time order. Idempotent on an exact
    /// duplicate `(tag_id, utc_time)` pair.
    fn insert(&self, cancel: &CancellationToken, tag_id: TagId, samples: &[Sample]) -> Result<()>;

    /// Returns the most recently inserted sample for a tag, if any.
    fn snapshot(&self, cancel: &CancellationToken, tag_id: TagId) -> Result<Option<Sample>>;

    /// Returns up to `limit` samples in `[t0, t1]` ascending, plus the
    /// nearest sample at-or-before `t0` and at-or-after `t1` as boundary
    /// anchors when they exist outside the range.
    fn raw_range(
        &self,
        cancel: &CancellationToken,
        tag_id: TagId,
        t0: DateTime<Utc>,
        t1: DateTime<Utc>,
        limit: Option<usize>,
    ) -> Result<Vec<Sample>>;

    /// Deletes all archived data for a tag (used when a tag is deleted).
    fn delete_tag_data(&self, cancel: &CancellationToken, tag_id: TagId) -> Result<()>;
}
