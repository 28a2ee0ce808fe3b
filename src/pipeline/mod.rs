//! The write pipeline (C4, spec.md §4.4): per-tag serial orchestration of
//! Exception -> Compression -> Snapshot -> Archive.
//!
//! Each tag gets a dedicated [`executor::TagExecutor`] (a background thread
//! + bounded channel); writes for different tags run fully in parallel,
//! writes for the same tag are strictly ordered by arrival (spec.md §5).

mod executor;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::cancel::CancellationToken;
use crate::config::HistorianConfig;
use crate::error::{CoreError, Result};
use crate::filters::DropReason;
use crate::hub::SubscriptionHub;
use crate::model::uuid_like::TagId;
use crate::model::{Sample, TagDefinition};
use crate::registry::TagRegistry;
use crate::storage::StorageAdapter;

use executor::TagExecutor;

/// Per-sample outcome reported in a [`WriteSummary`] (spec.md §7: "Write
/// summaries report per-sample disposition ... so clients can reason
/// without parsing logs").
#[derive(Debug, Clone, PartialEq)]
pub enum SampleDisposition {
    /// The sample updated the snapshot and was written to archive.
    Accepted,
    /// The exception filter rejected the sample; the snapshot is unchanged.
    DroppedByException {
        /// Why the exception filter rejected it.
        reason: DropReason,
        /// The rejected sample's timestamp.
        utc_time: DateTime<Utc>,
    },
    /// The sample passed the exception filter but the compression filter
    /// buffered it as the current door candidate instead of archiving it.
    DroppedByCompression {
        /// The buffered sample's timestamp.
        utc_time: DateTime<Utc>,
    },
    /// The sample was rejected outright before reaching either filter.
    Rejected {
        /// Human-readable rejection reason.
        reason: String,
        /// The rejected sample's timestamp.
        utc_time: DateTime<Utc>,
    },
}

/// The result of a [`WritePipeline::write_snapshot`] or
/// [`WritePipeline::insert_archive`] call (spec.md §4.4).
#[derive(Debug, Clone, PartialEq)]
pub struct WriteSummary {
    /// `false` only when the call was cancelled before processing every
    /// submitted sample; partial progress up to that point still stands.
    pub success: bool,
    /// Number of samples attempted (accepted, dropped, or rejected).
    pub count: usize,
    /// Earliest timestamp among attempted samples.
    pub earliest: Option<DateTime<Utc>>,
    /// Latest timestamp among attempted samples.
    pub latest: Option<DateTime<Utc>>,
    /// `true` if the caller's [`CancellationToken`] fired mid-batch.
    pub cancelled: bool,
    /// Per-sample disposition, in the time order the batch was processed.
    pub notes: Vec<SampleDisposition>,
}

impl WriteSummary {
    pub(crate) fn empty() -> Self {
        Self {
            success: true,
            count: 0,
            earliest: None,
            latest: None,
            cancelled: false,
            notes: Vec::new(),
        }
    }
}

/// A boolean write-authorization hook: `(principal, tag) -> allowed`. Kept
/// separate from [`crate::registry::AuthorizeFn`] because spec.md §1 scopes
/// tag-admin policy and data-write policy as distinct external collaborators
/// ("a boolean `AuthorizeRead/Write/Admin(principal, tag) -> bool` hook").
pub type WriteAuthorizeFn = Arc<dyn Fn(&str, &TagDefinition) -> bool + Send + Sync>;

/// Orchestrates Exception -> Compression -> Snapshot -> Archive per sample,
/// per tag (spec.md §4.4), with a dedicated serial executor per tag.
#[derive(Clone)]
pub struct WritePipeline {
    registry: TagRegistry,
    storage: Arc<dyn StorageAdapter>,
    hub: SubscriptionHub,
    config: HistorianConfig,
    authorize: WriteAuthorizeFn,
    snapshots: Arc<DashMap<TagId, Sample>>,
    executors: Arc<DashMap<TagId, Arc<TagExecutor>>>,
}

impl WritePipeline {
    /// Builds a pipeline that authorizes every write unconditionally,
    /// suitable when the embedding application enforces write policy
    /// elsewhere.
    pub fn new(
        registry: TagRegistry,
        storage: Arc<dyn StorageAdapter>,
        hub: SubscriptionHub,
        config: HistorianConfig,
    ) -> Self {
        Self::with_authorizer(registry, storage, hub, config, Arc::new(|_principal, _tag| true))
    }

    /// Builds a pipeline whose writes are gated by `authorize`.
    pub fn with_authorizer(
        registry: TagRegistry,
        storage: Arc<dyn StorageAdapter>,
        hub: SubscriptionHub,
        config: HistorianConfig,
        authorize: WriteAuthorizeFn,
    ) -> Self {
        Self {
            registry,
            storage,
            hub,
            config,
            authorize,
            snapshots: Arc::new(DashMap::new()),
            executors: Arc::new(DashMap::new()),
        }
    }

    fn executor_for(&self, tag_id: TagId) -> Arc<TagExecutor> {
        self.executors
            .entry(tag_id)
            .or_insert_with(|| {
                TagExecutor::spawn(
                    tag_id,
                    self.registry.clone(),
                    self.storage.clone(),
                    self.hub.clone(),
                    self.snapshots.clone(),
                    self.config.executor_queue_depth,
                )
            })
            .clone()
    }

    /// Runs `samples` through the exception/compression filters for
    /// `tag_name_or_id`, updating the live snapshot and publishing to the
    /// hub on every exception-filter pass, and forwarding compression
    /// emissions to storage (spec.md §4.4).
    pub fn write_snapshot(
        &self,
        principal: &str,
        tag_name_or_id: &str,
        samples: Vec<Sample>,
        cancel: &CancellationToken,
    ) -> Result<WriteSummary> {
        let def = self.resolve_authorized(principal, tag_name_or_id)?;
        self.check_batch_size(&samples)?;
        self.executor_for(def.id).write_snapshot(samples, cancel.clone())
    }

    /// Bypasses both filters entirely: every sample is written straight to
    /// archive, in caller-supplied order, with no snapshot update and no
    /// hub publish (spec.md §4.4). The caller is responsible for keeping
    /// samples strictly time-ordered with respect to the existing archive
    /// tail; the core does not re-validate that on this path.
    pub fn insert_archive(
        &self,
        principal: &str,
        tag_name_or_id: &str,
        samples: Vec<Sample>,
        cancel: &CancellationToken,
    ) -> Result<WriteSummary> {
        let def = self.resolve_authorized(principal, tag_name_or_id)?;
        self.check_batch_size(&samples)?;
        self.executor_for(def.id).insert_archive(samples, cancel.clone())
    }

    fn resolve_authorized(&self, principal: &str, tag_name_or_id: &str) -> Result<TagDefinition> {
        let def = self
            .registry
            .resolve(tag_name_or_id)
            .ok_or(CoreError::NotFound("tag"))?;
        if !(self.authorize)(principal, &def) {
            return Err(CoreError::Unauthorized);
        }
        Ok(def)
    }

    fn check_batch_size(&self, samples: &[Sample]) -> Result<()> {
        if samples.len() > self.config.max_batch_size {
            return Err(CoreError::Validation(format!(
                "batch of {} samples exceeds configured max_batch_size {}",
                samples.len(),
                self.config.max_batch_size
            )));
        }
        Ok(())
    }

    /// The tag's current live snapshot, if any write has passed the
    /// exception filter since this pipeline started (falls back to
    /// storage's own notion of "most recent sample" otherwise, e.g. right
    /// after process start before any write has occurred).
    pub fn snapshot(&self, tag_id: TagId, cancel: &CancellationToken) -> Result<Option<Sample>> {
        if let Some(sample) = self.snapshots.get(&tag_id) {
            return Ok(Some(sample.clone()));
        }
        self.storage.snapshot(cancel, tag_id)
    }

    /// Clears a quarantined tag's filter state and resumes accepting
    /// writes (spec.md §4 "Filter states: reset ... on explicit
    /// reinitialization").
    pub fn reinitialize(&self, tag_id: TagId) -> Result<()> {
        self.executor_for(tag_id).reinitialize()
    }

    /// Tears down a deleted tag: flushes any pending compression candidate
    /// to archive, then releases the tag's executor, snapshot cache entry,
    /// and hub subscriptions (spec.md §3 "Deleting a tag emits a terminal
    /// event that tears down subscriptions, filter state, and releases the
    /// name for reuse"). The registry entry itself must already be gone
    /// (call [`TagRegistry::delete`] first) so in-flight writes racing this
    /// teardown observe `Deleted` rather than silently succeeding.
    pub fn teardown_deleted_tag(&self, tag_id: TagId) -> Result<()> {
        if let Some((_, executor)) = self.executors.remove(&tag_id) {
            executor.flush()?;
        }
        self.snapshots.remove(&tag_id);
        self.hub.teardown_tag(tag_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HistorianConfig;
    use crate::model::{DataType, DeviationKind, FilterConfig, Quality, TagSettings};
    use crate::storage::memory::MemoryStorage;
    use chrono::Duration;

    fn make_pipeline() -> (WritePipeline, TagRegistry, TagId) {
        let registry = TagRegistry::new();
        let def = registry
            .create(
                "tester",
                TagSettings {
                    name: "Reactor.Temp".into(),
                    data_type: DataType::FloatingPoint,
                    units: "degC".into(),
                    description: String::new(),
                    state_set_name: None,
                    exception_cfg: FilterConfig {
                        enabled: true,
                        deviation_kind: DeviationKind::Absolute,
                        limit: 0.5,
                        window: Duration::hours(1),
                    },
                    compression_cfg: FilterConfig {
                        enabled: true,
                        deviation_kind: DeviationKind::Absolute,
                        limit: 1.0,
                        window: Duration::hours(1),
                    },
                    owner: "tester".into(),
                    policies: vec![],
                },
            )
            .unwrap();
        let storage: Arc<dyn StorageAdapter> = Arc::new(MemoryStorage::new());
        let hub = SubscriptionHub::new(8);
        let pipeline = WritePipeline::new(registry.clone(), storage, hub, HistorianConfig::default());
        (pipeline, registry, def.id)
    }

    fn sample_at(secs: i64, v: f64) -> Sample {
        Sample::numeric(
            chrono::Utc::now() + Duration::seconds(secs),
            v,
            Quality::Good,
            "unused",
        )
    }

    #[test]
    fn write_snapshot_updates_live_snapshot() {
        let (pipeline, _registry, tag_id) = make_pipeline();
        let cancel = CancellationToken::none();
        let summary = pipeline
            .write_snapshot("tester", "Reactor.Temp", vec![sample_at(0, 10.0)], &cancel)
            .unwrap();
        assert!(summary.success);
        assert_eq!(summary.notes, vec![SampleDisposition::Accepted]);
        let snap = pipeline.snapshot(tag_id, &cancel).unwrap().unwrap();
        assert_eq!(snap.numeric, 10.0);
        assert_eq!(snap.units, "degC", "units are denormalized from the tag at write time");
    }

    #[test]
    fn unauthorized_principal_is_rejected() {
        let registry = TagRegistry::new();
        let def = registry
            .create(
                "tester",
                TagSettings {
                    name: "T".into(),
                    data_type: DataType::FloatingPoint,
                    units: "".into(),
                    description: String::new(),
                    state_set_name: None,
                    exception_cfg: FilterConfig::disabled(),
                    compression_cfg: FilterConfig::disabled(),
                    owner: "tester".into(),
                    policies: vec![],
                },
            )
            .unwrap();
        let storage: Arc<dyn StorageAdapter> = Arc::new(MemoryStorage::new());
        let hub = SubscriptionHub::new(8);
        let pipeline = WritePipeline::with_authorizer(
            registry,
            storage,
            hub,
            HistorianConfig::default(),
            Arc::new(|p: &str, _t: &TagDefinition| p == "admin"),
        );
        let cancel = CancellationToken::none();
        let err = pipeline
            .write_snapshot("guest", "T", vec![sample_at(0, 1.0)], &cancel)
            .unwrap_err();
        assert_eq!(err, CoreError::Unauthorized);
        let _ = def;
    }

    #[test]
    fn deleted_tag_rejects_in_flight_write() {
        let (pipeline, registry, tag_id) = make_pipeline();
        let cancel = CancellationToken::none();
        // touch the executor once so it exists before deletion.
        pipeline
            .write_snapshot("tester", "Reactor.Temp", vec![sample_at(0, 1.0)], &cancel)
            .unwrap();
        registry.delete("tester", tag_id).unwrap();
        pipeline.teardown_deleted_tag(tag_id).unwrap();
        let err = pipeline
            .write_snapshot("tester", "Reactor.Temp", vec![sample_at(1, 2.0)], &cancel)
            .unwrap_err();
        assert_eq!(err, CoreError::NotFound("tag"));
    }

    #[test]
    fn insert_archive_bypasses_filters() {
        let (pipeline, _registry, _tag_id) = make_pipeline();
        let cancel = CancellationToken::none();
        // Two samples that the exception filter's 0.5 band would have
        // collapsed into one pass; the archive path keeps both.
        let summary = pipeline
            .insert_archive(
                "tester",
                "Reactor.Temp",
                vec![sample_at(0, 10.0), sample_at(1, 10.1)],
                &cancel,
            )
            .unwrap();
        assert_eq!(summary.count, 2);
        assert_eq!(summary.notes, vec![SampleDisposition::Accepted, SampleDisposition::Accepted]);
    }

    #[test]
    fn batch_over_limit_is_rejected() {
        let (pipeline, _registry, _tag_id) = make_pipeline();
        let cancel = CancellationToken::none();
        let mut config = HistorianConfig::default();
        config.max_batch_size = 1;
        let registry2 = TagRegistry::new();
        registry2
            .create(
                "tester",
                TagSettings {
                    name: "X".into(),
                    data_type: DataType::FloatingPoint,
                    units: "".into(),
                    description: String::new(),
                    state_set_name: None,
                    exception_cfg: FilterConfig::disabled(),
                    compression_cfg: FilterConfig::disabled(),
                    owner: "tester".into(),
                    policies: vec![],
                },
            )
            .unwrap();
        let storage: Arc<dyn StorageAdapter> = Arc::new(MemoryStorage::new());
        let hub = SubscriptionHub::new(8);
        let small = WritePipeline::new(registry2, storage, hub, config);
        let err = small
            .write_snapshot("tester", "X", vec![sample_at(0, 1.0), sample_at(1, 2.0)], &cancel)
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        let _ = pipeline;
    }
}
