//! Crate-wide error type.
//!
//! Mirrors the error kinds specified for the historian core: validation,
//! lookup, authorization, cancellation, storage availability, and the
//! terminal `Deleted`/`Internal` conditions. Every fallible public operation
//! in this crate returns [`Result`] with [`CoreError`] as the error type;
//! nothing is recovered silently.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CoreError>;

/// The error kinds a historian-core operation can fail with.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    /// Input failed validation (non-retriable).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The referenced tag, state set, or subscription does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A tag or state-set mutation would violate an invariant.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The principal is not authorized to perform the requested operation.
    #[error("unauthorized")]
    Unauthorized,

    /// The operation was cancelled by the caller; this is benign.
    #[error("cancelled")]
    Cancelled,

    /// The storage backend is temporarily unavailable; the caller may retry.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A write targeted a tag that has since been deleted.
    #[error("tag deleted")]
    Deleted,

    /// A write was rejected because its timestamp did not advance the
    /// tag's archive strictly monotonically.
    #[error("rejected: out of order")]
    RejectedOutOfOrder,

    /// An internal invariant was violated; the affected tag is quarantined.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// True when the tag producing this error should be considered
    /// quarantined (no further writes accepted until reinitialization).
    pub fn quarantines_tag(&self) -> bool {
        matches!(self, CoreError::Internal(_))
    }
}
