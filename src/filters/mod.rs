//! Per-tag stateful filters applied on the ingestion path.
//!
//! [`exception`] decides whether an incoming sample is significant enough to
//! update the snapshot; [`compression`] decides which of those samples are
//! worth archiving. Both are pure, CPU-bound structs with no I/O — see
//! spec.md §5 ("Filters ... are purely CPU-bound and non-suspending").

pub mod compression;
pub mod exception;

pub use compression::{CompressionFilter, CompressionState};
pub use exception::{DropReason, ExceptionFilter, ExceptionOutcome, ExceptionState};
