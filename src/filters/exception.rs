//! The exception filter: significance gate from raw input to snapshot.
//!
//! See spec.md §4.2. The algorithm runs in strict step order; the first
//! step that applies decides the outcome.

use crate::model::{DataType, FilterConfig, Sample};

/// Why a sample was dropped by the exception filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The sample's time did not strictly advance past the last retained value.
    OutOfOrder,
    /// The sample's deviation from the last retained value did not exceed `limit_abs`.
    WithinBand,
}

/// The result of running a sample through the exception filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionOutcome {
    /// The sample is significant and updates the snapshot.
    Pass,
    /// The sample is rejected; the snapshot is unchanged.
    Drop(DropReason),
}

impl ExceptionOutcome {
    /// True for [`ExceptionOutcome::Pass`].
    pub fn is_pass(self) -> bool {
        matches!(self, ExceptionOutcome::Pass)
    }
}

/// Live per-tag state: the last sample the filter retained.
#[derive(Debug, Clone, Default)]
pub struct ExceptionState {
    /// The last value the filter passed, if any.
    pub last_exception_value: Option<Sample>,
}

impl ExceptionState {
    /// A fresh state with no retained sample, as used on tag creation or
    /// reinitialization (spec.md §4 "Lifecycles").
    pub fn new() -> Self {
        Self::default()
    }
}

/// The exception filter itself holds no state; all state lives in
/// [`ExceptionState`], owned by the tag's serial executor (spec.md §5).
#[derive(Debug, Clone, Copy, Default)]
pub struct ExceptionFilter;

impl ExceptionFilter {
    /// Runs one sample through the filter, per spec.md §4.2 steps 1-7.
    pub fn process(
        cfg: &FilterConfig,
        data_type: DataType,
        state: &mut ExceptionState,
        incoming: &Sample,
    ) -> ExceptionOutcome {
        // Step 1: disabled filters always pass.
        if !cfg.enabled {
            state.last_exception_value = Some(incoming.clone());
            return ExceptionOutcome::Pass;
        }

        let prior = match &state.last_exception_value {
            // Step 2: the first sample is always retained.
            None => {
                state.last_exception_value = Some(incoming.clone());
                return ExceptionOutcome::Pass;
            }
            Some(p) => p.clone(),
        };

        // Step 3: reject samples that do not strictly advance time.
        if incoming.utc_time <= prior.utc_time {
            return ExceptionOutcome::Drop(DropReason::OutOfOrder);
        }

        // Step 4: the window forces a heartbeat regardless of deviation.
        if incoming.utc_time - prior.utc_time >= cfg.window {
            state.last_exception_value = Some(incoming.clone());
            return ExceptionOutcome::Pass;
        }

        // Step 5: quality transitions are always significant.
        if incoming.quality != prior.quality {
            state.last_exception_value = Some(incoming.clone());
            return ExceptionOutcome::Pass;
        }

        // Step 6: discrete types (Text/State) emit on any value change.
        if data_type.is_discrete() {
            let changed = incoming.text != prior.text || !incoming.numeric_bits_eq(&prior);
            if changed {
                state.last_exception_value = Some(incoming.clone());
                return ExceptionOutcome::Pass;
            }
            return ExceptionOutcome::Drop(DropReason::WithinBand);
        }

        // Step 7: deviation-band comparison. A non-finite operand forces
        // visibility of the transition rather than participating in the
        // inequality (spec.md §4.2).
        if !incoming.numeric.is_finite() || !prior.numeric.is_finite() {
            state.last_exception_value = Some(incoming.clone());
            return ExceptionOutcome::Pass;
        }

        let limit_abs = cfg.limit_abs(prior.numeric);
        if (incoming.numeric - prior.numeric).abs() > limit_abs {
            state.last_exception_value = Some(incoming.clone());
            ExceptionOutcome::Pass
        } else {
            ExceptionOutcome::Drop(DropReason::WithinBand)
        }
    }
}
