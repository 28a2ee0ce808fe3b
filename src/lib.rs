//! # Aika Core — ingestion filters, aggregation, and snapshot fan-out
//!
//! This crate is the data-engineering core of Aika, a time-series
//! historian for industrial/process data. It owns three things:
//!
//! - **Ingestion** ([`filters`], [`pipeline`]): a two-stage swinging-door
//!   style filter pipeline deciding which incoming samples update a tag's
//!   snapshot, which are forwarded to archive, and how the filters' own
//!   state evolves.
//! - **Aggregation** ([`aggregate`], [`reader`]): pure, CPU-bound
//!   transforms deriving interpolated, interval-bucketed statistical, and
//!   "plot" views over archived raw samples.
//! - **Fan-out** ([`hub`]): delivery of post-filter snapshot updates to
//!   observers with backpressure-safe, per-tag-ordered semantics.
//!
//! HTTP controllers, authentication/authorization policy, DTO/JSON shapes,
//! persistence backends, process lifecycle, and CLI/configuration loading
//! are deliberately out of scope — this crate exposes an in-process API,
//! not a wire protocol, and treats those as external collaborators.
//!
//! ## Quick start
//!
//! ```rust
//! use aika_core::config::HistorianConfig;
//! use aika_core::hub::SubscriptionHub;
//! use aika_core::model::{DataType, DeviationKind, FilterConfig, Quality, Sample, TagSettings};
//! use aika_core::pipeline::WritePipeline;
//! use aika_core::registry::TagRegistry;
//! use aika_core::storage::memory::MemoryStorage;
//! use aika_core::cancel::CancellationToken;
//! use chrono::{Duration, Utc};
//! use std::sync::Arc;
//!
//! let registry = TagRegistry::new();
//! let def = registry.create(
//!     "admin",
//!     TagSettings {
//!         name: "Reactor.Temp".into(),
//!         data_type: DataType::FloatingPoint,
//!         units: "degC".into(),
//!         description: "primary reactor temperature".into(),
//!         state_set_name: None,
//!         exception_cfg: FilterConfig {
//!             enabled: true,
//!             deviation_kind: DeviationKind::Absolute,
//!             limit: 0.5,
//!             window: Duration::hours(1),
//!         },
//!         compression_cfg: FilterConfig {
//!             enabled: true,
//!             deviation_kind: DeviationKind::Absolute,
//!             limit: 1.0,
//!             window: Duration::hours(1),
//!         },
//!         owner: "admin".into(),
//!         policies: vec![],
//!     },
//! )?;
//!
//! let storage: Arc<dyn aika_core::storage::StorageAdapter> = Arc::new(MemoryStorage::new());
//! let hub = SubscriptionHub::new(8);
//! let pipeline = WritePipeline::new(registry, storage, hub, HistorianConfig::default());
//!
//! let cancel = CancellationToken::none();
//! let summary = pipeline.write_snapshot(
//!     "admin",
//!     "Reactor.Temp",
//!     vec![Sample::numeric(Utc::now(), 42.0, Quality::Good, "degC")],
//!     &cancel,
//! )?;
//! assert!(summary.success);
//! # Ok::<(), aika_core::error::CoreError>(())
//! ```

pub mod aggregate;
pub mod cancel;
pub mod config;
pub mod error;
pub mod filters;
pub mod hub;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod reader;
pub mod registry;
pub mod storage;
pub mod time;

pub use crate::error::{CoreError, Result};
pub use crate::pipeline::{SampleDisposition, WritePipeline, WriteSummary};
pub use crate::reader::TagDataReader;
pub use crate::registry::TagRegistry;
