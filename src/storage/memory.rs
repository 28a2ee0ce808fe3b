//! An in-memory [`StorageAdapter`] reference implementation.
//!
//! Not a production backend — the core is storage-agnostic by design
//! (spec.md §1) — but a small, correct double this crate's own tests and
//! doctests can run against, the way the teacher keeps in-memory unit-test
//! support alongside its real on-disk engine.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::StorageAdapter;
use crate::cancel::CancellationToken;
use crate::error::{CoreError, Result};
use crate::model::uuid_like::TagId;
use crate::model::Sample;
use crate::time::Ticks;

/// In-memory, per-tag ordered store of archived samples.
#[derive(Default)]
pub struct MemoryStorage {
    tags: RwLock<HashMap<TagId, BTreeMap<Ticks, Sample>>>,
}

impl MemoryStorage {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn check(cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        Ok(())
    }
}

impl StorageAdapter for MemoryStorage {
    fn insert(&self, cancel: &CancellationToken, tag_id: TagId, samples: &[Sample]) -> Result<()> {
        Self::check(cancel)?;
        let mut tags = self.tags.write();
        let series = tags.entry(tag_id).or_default();
        for sample in samples {
            series.insert(Ticks::from_datetime(sample.utc_time), sample.clone());
        }
        Ok(())
    }

    fn snapshot(&self, cancel: &CancellationToken, tag_id: TagId) -> Result<Option<Sample>> {
        Self::check(cancel)?;
        let tags = self.tags.read();
        Ok(tags
            .get(&tag_id)
            .and_then(|series| series.values().next_back().cloned()))
    }

    fn raw_range(
        &self,
        cancel: &CancellationToken,
        tag_id: TagId,
        t0: DateTime<Utc>,
        t1: DateTime<Utc>,
        limit: Option<usize>,
    ) -> Result<Vec<Sample>> {
        Self::check(cancel)?;
        let tags = self.tags.read();
        let Some(series) = tags.get(&tag_id) else {
            return Ok(Vec::new());
        };
        let lo = Ticks::from_datetime(t0);
        let hi = Ticks::from_datetime(t1);

        let mut in_range: Vec<Sample> = series
            .range(lo..=hi)
            .map(|(_, s)| s.clone())
            .collect();
        if let Some(limit) = limit {
            in_range.truncate(limit);
        }

        let before_anchor = series
            .range(..lo)
            .next_back()
            .map(|(_, s)| s.clone());
        let after_anchor = series
            .range((std::ops::Bound::Excluded(hi), std::ops::Bound::Unbounded))
            .next()
            .map(|(_, s)| s.clone());

        let mut out = Vec::with_capacity(in_range.len() + 2);
        out.extend(before_anchor);
        out.extend(in_range);
        out.extend(after_anchor);
        Ok(out)
    }

    fn delete_tag_data(&self, cancel: &CancellationToken, tag_id: TagId) -> Result<()> {
        Self::check(cancel)?;
        self.tags.write().remove(&tag_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Quality;
    use chrono::TimeZone;

    fn sample_at(secs: i64, v: f64) -> Sample {
        Sample::numeric(
            Utc.timestamp_opt(0, 0).unwrap() + chrono::Duration::seconds(secs),
            v,
            Quality::Good,
            "degC",
        )
    }

    #[test]
    fn insert_is_idempotent_on_exact_duplicate() {
        let store = MemoryStorage::new();
        let tag = TagId::new();
        let cancel = CancellationToken::none();
        store.insert(&cancel, tag, &[sample_at(0, 1.0)]).unwrap();
        store.insert(&cancel, tag, &[sample_at(0, 1.0)]).unwrap();
        let range = store
            .raw_range(
                &cancel,
                tag,
                sample_at(0, 0.0).utc_time,
                sample_at(10, 0.0).utc_time,
                None,
            )
            .unwrap();
        assert_eq!(range.len(), 1);
    }

    #[test]
    fn raw_range_includes_boundary_anchors() {
        let store = MemoryStorage::new();
        let tag = TagId::new();
        let cancel = CancellationToken::none();
        for s in [sample_at(0, 0.0), sample_at(5, 5.0), sample_at(10, 10.0), sample_at(15, 15.0)] {
            store.insert(&cancel, tag, &[s]).unwrap();
        }
        let range = store
            .raw_range(&cancel, tag, sample_at(4, 0.0).utc_time, sample_at(11, 0.0).utc_time, None)
            .unwrap();
        let values: Vec<f64> = range.iter().map(|s| s.numeric).collect();
        assert_eq!(values, vec![0.0, 5.0, 10.0, 15.0]);
    }

    #[test]
    fn cancelled_token_short_circuits() {
        let store = MemoryStorage::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = store.insert(&cancel, TagId::new(), &[]).unwrap_err();
        assert_eq!(err, CoreError::Cancelled);
    }
}
