//! Per-tag serial dispatch.
//!
//! Grounded on the teacher's `primitives::concurrency::SingleWriter`,
//! generalized from file-region locks to an in-process per-tag dispatch
//! table: each [`TagExecutor`] owns a dedicated worker thread draining a
//! bounded channel in strict arrival order, so writes to the same tag are
//! always processed one at a time (spec.md §5) while writes to different
//! tags run fully in parallel. The teacher's core is thread-based rather
//! than async (it reserves `tokio` for an optional server feature), so the
//! pipeline follows suit: plain `std::thread` + `std::sync::mpsc`, not
//! async tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;

use dashmap::DashMap;

use crate::cancel::CancellationToken;
use crate::error::{CoreError, Result};
use crate::filters::{CompressionFilter, CompressionState, ExceptionFilter, ExceptionOutcome, ExceptionState};
use crate::hub::SubscriptionHub;
use crate::model::uuid_like::TagId;
use crate::model::Sample;
use crate::registry::TagRegistry;
use crate::storage::StorageAdapter;

use super::{SampleDisposition, WriteSummary};

pub(crate) enum Job {
    WriteSnapshot {
        samples: Vec<Sample>,
        cancel: CancellationToken,
        reply: mpsc::Sender<Result<WriteSummary>>,
    },
    InsertArchive {
        samples: Vec<Sample>,
        cancel: CancellationToken,
        reply: mpsc::Sender<Result<WriteSummary>>,
    },
    Reinitialize {
        reply: mpsc::Sender<Result<()>>,
    },
    Flush {
        reply: mpsc::Sender<Result<()>>,
    },
    Shutdown,
}

/// Owns one tag's live filter state and worker thread.
pub(crate) struct TagExecutor {
    sender: mpsc::SyncSender<Job>,
    quarantined: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TagExecutor {
    /// Spawns the worker thread for `tag_id` and returns a handle to it.
    /// `snapshots` is the pipeline's shared latest-value cell (spec.md §5
    /// "Snapshot: publishable via an atomic cell, latest-wins for readers").
    pub(crate) fn spawn(
        tag_id: TagId,
        registry: TagRegistry,
        storage: Arc<dyn StorageAdapter>,
        hub: SubscriptionHub,
        snapshots: Arc<DashMap<TagId, Sample>>,
        queue_depth: usize,
    ) -> Arc<Self> {
        let (sender, receiver) = mpsc::sync_channel::<Job>(queue_depth.max(1));
        let quarantined = Arc::new(AtomicBool::new(false));
        let worker_quarantined = quarantined.clone();
        let handle = std::thread::Builder::new()
            .name(format!("aika-tag-{tag_id}"))
            .spawn(move || run(tag_id, registry, storage, hub, snapshots, worker_quarantined, receiver))
            .expect("failed to spawn per-tag executor thread");
        Arc::new(Self {
            sender,
            quarantined,
            handle: Some(handle),
        })
    }

    pub(crate) fn is_quarantined(&self) -> bool {
        self.quarantined.load(Ordering::Acquire)
    }

    fn dispatch<T>(
        &self,
        build: impl FnOnce(mpsc::Sender<Result<T>>) -> Job,
    ) -> Result<T> {
        let (tx, rx) = mpsc::channel();
        self.sender
            .send(build(tx))
            .map_err(|_| CoreError::Internal("tag executor thread is gone".into()))?;
        rx.recv()
            .map_err(|_| CoreError::Internal("tag executor thread dropped the reply channel".into()))?
    }

    pub(crate) fn write_snapshot(&self, samples: Vec<Sample>, cancel: CancellationToken) -> Result<WriteSummary> {
        self.dispatch(|reply| Job::WriteSnapshot { samples, cancel, reply })
    }

    pub(crate) fn insert_archive(&self, samples: Vec<Sample>, cancel: CancellationToken) -> Result<WriteSummary> {
        self.dispatch(|reply| Job::InsertArchive { samples, cancel, reply })
    }

    pub(crate) fn reinitialize(&self) -> Result<()> {
        self.dispatch(|reply| Job::Reinitialize { reply })
    }

    pub(crate) fn flush(&self) -> Result<()> {
        self.dispatch(|reply| Job::Flush { reply })
    }
}

impl Drop for TagExecutor {
    fn drop(&mut self) {
        let _ = self.sender.send(Job::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run(
    tag_id: TagId,
    registry: TagRegistry,
    storage: Arc<dyn StorageAdapter>,
    hub: SubscriptionHub,
    snapshots: Arc<DashMap<TagId, Sample>>,
    quarantined: Arc<AtomicBool>,
    receiver: mpsc::Receiver<Job>,
) {
    let mut exception_state = ExceptionState::new();
    let mut compression_state = CompressionState::new();

    while let Ok(job) = receiver.recv() {
        match job {
            Job::Shutdown => break,
            Job::Reinitialize { reply } => {
                exception_state = ExceptionState::new();
                compression_state = CompressionState::new();
                quarantined.store(false, Ordering::Release);
                let _ = reply.send(Ok(()));
            }
            Job::Flush { reply } => {
                let result = (|| -> Result<()> {
                    if let Some(pending) = CompressionFilter::flush(&mut compression_state) {
                        storage.insert(&CancellationToken::none(), tag_id, std::slice::from_ref(&pending))?;
                    }
                    Ok(())
                })();
                let _ = reply.send(result);
            }
            Job::WriteSnapshot { mut samples, cancel, reply } => {
                let result = process_write_snapshot(
                    tag_id,
                    &registry,
                    storage.as_ref(),
                    &hub,
                    &snapshots,
                    &quarantined,
                    &mut exception_state,
                    &mut compression_state,
                    &mut samples,
                    &cancel,
                );
                let _ = reply.send(result);
            }
            Job::InsertArchive { mut samples, cancel, reply } => {
                let result = process_insert_archive(
                    tag_id,
                    &registry,
                    storage.as_ref(),
                    &quarantined,
                    &mut samples,
                    &cancel,
                );
                let _ = reply.send(result);
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn process_write_snapshot(
    tag_id: TagId,
    registry: &TagRegistry,
    storage: &dyn StorageAdapter,
    hub: &SubscriptionHub,
    snapshots: &DashMap<TagId, Sample>,
    quarantined: &AtomicBool,
    exception_state: &mut ExceptionState,
    compression_state: &mut CompressionState,
    samples: &mut [Sample],
    cancel: &CancellationToken,
) -> Result<WriteSummary> {
    if quarantined.load(Ordering::Acquire) {
        return Err(CoreError::Internal(format!("tag {tag_id} is quarantined")));
    }
    let def = registry.resolve_id(tag_id).ok_or(CoreError::Deleted)?;
    samples.sort_by_key(|s| s.utc_time);

    let mut summary = WriteSummary::empty();
    for sample in samples.iter() {
        if cancel.is_cancelled() {
            summary.cancelled = true;
            break;
        }
        let mut sample = sample.clone();
        sample.units = def.units.clone();
        summary.count += 1;
        summary.earliest = Some(summary.earliest.map_or(sample.utc_time, |t| t.min(sample.utc_time)));
        summary.latest = Some(summary.latest.map_or(sample.utc_time, |t| t.max(sample.utc_time)));

        match ExceptionFilter::process(&def.exception_cfg, def.data_type, exception_state, &sample) {
            ExceptionOutcome::Drop(reason) => {
                summary.notes.push(SampleDisposition::DroppedByException {
                    reason,
                    utc_time: sample.utc_time,
                });
                continue;
            }
            ExceptionOutcome::Pass => {
                snapshots.insert(tag_id, sample.clone());
                hub.publish(tag_id, &sample);
            }
        }

        let emitted = CompressionFilter::process(&def.compression_cfg, def.data_type, compression_state, &sample);
        if emitted.is_empty() {
            summary.notes.push(SampleDisposition::DroppedByCompression {
                utc_time: sample.utc_time,
            });
            continue;
        }
        if let Err(e) = storage.insert(cancel, tag_id, &emitted) {
            if e.quarantines_tag() {
                quarantined.store(true, Ordering::Release);
            }
            return Err(e);
        }
        summary.notes.push(SampleDisposition::Accepted);
    }
    summary.success = !summary.cancelled;
    Ok(summary)
}

fn process_insert_archive(
    tag_id: TagId,
    registry: &TagRegistry,
    storage: &dyn StorageAdapter,
    quarantined: &AtomicBool,
    samples: &mut [Sample],
    cancel: &CancellationToken,
) -> Result<WriteSummary> {
    if quarantined.load(Ordering::Acquire) {
        return Err(CoreError::Internal(format!("tag {tag_id} is quarantined")));
    }
    let def = registry.resolve_id(tag_id).ok_or(CoreError::Deleted)?;
    samples.sort_by_key(|s| s.utc_time);

    let mut summary = WriteSummary::empty();
    for sample in samples.iter() {
        if cancel.is_cancelled() {
            summary.cancelled = true;
            break;
        }
        let mut sample = sample.clone();
        sample.units = def.units.clone();
        summary.count += 1;
        summary.earliest = Some(summary.earliest.map_or(sample.utc_time, |t| t.min(sample.utc_time)));
        summary.latest = Some(summary.latest.map_or(sample.utc_time, |t| t.max(sample.utc_time)));

        if let Err(e) = storage.insert(cancel, tag_id, std::slice::from_ref(&sample)) {
            if e.quarantines_tag() {
                quarantined.store(true, Ordering::Release);
            }
            return Err(e);
        }
        summary.notes.push(SampleDisposition::Accepted);
    }
    summary.success = !summary.cancelled;
    Ok(summary)
}
