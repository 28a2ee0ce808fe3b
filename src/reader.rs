//! `TagDataReader` (C8, spec.md §4.8): composes [`StorageAdapter::raw_range`]
//! with [`crate::aggregate::apply`], widening the requested window so the
//! aggregation engine gets the boundary anchors spec.md §4.7 promises.

use chrono::{DateTime, Utc};

use crate::aggregate::{self, AggFn};
use crate::cancel::CancellationToken;
use crate::error::{CoreError, Result};
use crate::model::{DataType, Sample};
use crate::registry::TagRegistry;
use crate::storage::StorageAdapter;

/// Composes storage range reads with the aggregation engine for a single
/// historian instance.
#[derive(Clone)]
pub struct TagDataReader {
    registry: TagRegistry,
    storage: std::sync::Arc<dyn StorageAdapter>,
}

impl TagDataReader {
    /// Builds a reader over `registry`/`storage`.
    pub fn new(registry: TagRegistry, storage: std::sync::Arc<dyn StorageAdapter>) -> Self {
        Self { registry, storage }
    }

    /// Raw range read, truncated to `point_count` after range filtering
    /// (spec.md §4.8 "For ReadRaw it enforces point_count truncation after
    /// range filtering").
    pub fn read_raw(
        &self,
        cancel: &CancellationToken,
        tag_name_or_id: &str,
        t0: DateTime<Utc>,
        t1: DateTime<Utc>,
        point_count: Option<usize>,
    ) -> Result<Vec<Sample>> {
        let def = self
            .registry
            .resolve(tag_name_or_id)
            .ok_or(CoreError::NotFound("tag"))?;
        let raw = self.storage.raw_range(cancel, def.id, t0, t1, None)?;
        let mut in_window: Vec<Sample> = raw
            .into_iter()
            .filter(|s| s.utc_time >= t0 && s.utc_time <= t1)
            .collect();
        if let Some(n) = point_count {
            in_window.truncate(n);
        }
        Ok(in_window)
    }

    /// Processed-series read: widens the storage query to pick up boundary
    /// anchors, then hands the slice to [`aggregate::apply`].
    pub fn read_processed(
        &self,
        cancel: &CancellationToken,
        tag_name_or_id: &str,
        fn_kind: AggFn,
        t0: DateTime<Utc>,
        t1: DateTime<Utc>,
        interval_or_point_count: IntervalOrCount,
    ) -> Result<Vec<Sample>> {
        let def = self
            .registry
            .resolve(tag_name_or_id)
            .ok_or(CoreError::NotFound("tag"))?;
        let interval = match interval_or_point_count {
            IntervalOrCount::Interval(d) => d,
            IntervalOrCount::PointCount(n) => aggregate::interval_from_point_count(t0, t1, n)?,
        };
        // raw_range already widens by one anchor on each side per spec.md
        // §4.7; no further widening is needed here.
        let raw = self.storage.raw_range(cancel, def.id, t0, t1, None)?;
        aggregate::apply(fn_kind, def.data_type, t0, t1, interval, &raw)
    }

    /// Convenience wrapper for the `Plot` aggregation function (the
    /// `/tags/data/plot` external endpoint, spec.md §6).
    pub fn read_plot(
        &self,
        cancel: &CancellationToken,
        tag_name_or_id: &str,
        t0: DateTime<Utc>,
        t1: DateTime<Utc>,
        interval_or_point_count: IntervalOrCount,
    ) -> Result<Vec<Sample>> {
        self.read_processed(cancel, tag_name_or_id, AggFn::Plot, t0, t1, interval_or_point_count)
    }

    /// The tag's data type, needed by callers choosing whether `Interval`
    /// semantics will be forced regardless of the requested function.
    pub fn data_type_of(&self, tag_name_or_id: &str) -> Result<DataType> {
        Ok(self
            .registry
            .resolve(tag_name_or_id)
            .ok_or(CoreError::NotFound("tag"))?
            .data_type)
    }

    /// Direct snapshot passthrough, for callers that only need the current
    /// value and not a windowed read.
    pub fn snapshot(&self, cancel: &CancellationToken, tag_name_or_id: &str) -> Result<Option<Sample>> {
        let def = self
            .registry
            .resolve(tag_name_or_id)
            .ok_or(CoreError::NotFound("tag"))?;
        self.storage.snapshot(cancel, def.id)
    }
}

/// Either an explicit interval, or a point count to be resolved into one
/// relative to `[t0, t1]` (spec.md §4.5).
#[derive(Debug, Clone, Copy)]
pub enum IntervalOrCount {
    /// Use this interval directly.
    Interval(chrono::Duration),
    /// Derive `interval = (t1 - t0) / point_count`.
    PointCount(usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::uuid_like::TagId;
    use crate::model::{DataType as DT, DeviationKind, FilterConfig, Quality, TagSettings};
    use crate::storage::memory::MemoryStorage;
    use chrono::Duration;
    use std::sync::Arc;

    fn setup() -> (TagDataReader, TagRegistry, Arc<MemoryStorage>, TagId) {
        let registry = TagRegistry::new();
        let def = registry
            .create(
                "tester",
                TagSettings {
                    name: "T1".into(),
                    data_type: DT::FloatingPoint,
                    units: "degC".into(),
                    description: String::new(),
                    state_set_name: None,
                    exception_cfg: FilterConfig::disabled(),
                    compression_cfg: FilterConfig {
                        enabled: true,
                        deviation_kind: DeviationKind::Absolute,
                        limit: 0.0,
                        window: Duration::hours(1),
                    },
                    owner: "tester".into(),
                    policies: vec![],
                },
            )
            .unwrap();
        let storage = Arc::new(MemoryStorage::new());
        let reader = TagDataReader::new(registry.clone(), storage.clone());
        (reader, registry, storage, def.id)
    }

    fn sample_at(secs: i64, v: f64) -> Sample {
        Sample::numeric(
            chrono::Utc.timestamp_opt(0, 0).unwrap() + Duration::seconds(secs),
            v,
            Quality::Good,
            "degC",
        )
    }

    use chrono::TimeZone;

    #[test]
    fn read_raw_truncates_to_point_count() {
        let (reader, _registry, storage, tag_id) = setup();
        let cancel = CancellationToken::none();
        for i in 0..10 {
            storage.insert(&cancel, tag_id, &[sample_at(i, i as f64)]).unwrap();
        }
        let out = reader
            .read_raw(&cancel, "T1", sample_at(0, 0.0).utc_time, sample_at(9, 0.0).utc_time, Some(3))
            .unwrap();
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn read_processed_interpolates() {
        let (reader, _registry, storage, tag_id) = setup();
        let cancel = CancellationToken::none();
        storage.insert(&cancel, tag_id, &[sample_at(0, 0.0), sample_at(10, 10.0)]).unwrap();
        let out = reader
            .read_processed(
                &cancel,
                "T1",
                AggFn::Interpolated,
                sample_at(0, 0.0).utc_time,
                sample_at(10, 0.0).utc_time,
                IntervalOrCount::Interval(Duration::seconds(2)),
            )
            .unwrap();
        let values: Vec<f64> = out.iter().map(|s| s.numeric).collect();
        assert_eq!(values, vec![0.0, 2.0, 4.0, 6.0, 8.0, 10.0]);
    }

    #[test]
    fn unknown_tag_is_not_found() {
        let (reader, _registry, _storage, _tag_id) = setup();
        let cancel = CancellationToken::none();
        let err = reader
            .read_raw(&cancel, "nope", sample_at(0, 0.0).utc_time, sample_at(1, 0.0).utc_time, None)
            .unwrap_err();
        assert_eq!(err, CoreError::NotFound("tag"));
    }
}
