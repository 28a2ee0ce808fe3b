//! The compression filter: swinging-door archival gate.
//!
//! Given samples that already passed the exception filter, retains only the
//! subset needed to reconstruct the signal within `limit_abs` of every input
//! (spec.md §4.3). The "door" is a pair of slopes anchored at the last
//! archived point; each candidate narrows the door until a point would close
//! it, at which point the prior candidate is archived and the door reopens.

use chrono::Duration;

use crate::model::{DataType, FilterConfig, Sample};

/// Live per-tag state for the swinging-door algorithm.
#[derive(Debug, Clone, Default)]
pub struct CompressionState {
    /// The last sample actually written to archive.
    pub last_archived: Option<Sample>,
    /// The current candidate: received but not yet archived.
    pub last_received: Option<Sample>,
    /// Lower door slope (units per second), valid only when `last_received` is `Some`.
    pub slope_min: f64,
    /// Upper door slope (units per second), valid only when `last_received` is `Some`.
    pub slope_max: f64,
}

impl CompressionState {
    /// A fresh state, as used on tag creation or reinitialization.
    pub fn new() -> Self {
        Self::default()
    }

    fn open_door(&mut self, anchor: &Sample, limit_abs: f64, candidate: Sample) {
        let (lo, hi) = door_slopes(anchor, &candidate, limit_abs);
        self.slope_min = lo;
        self.slope_max = hi;
        self.last_received = Some(candidate);
    }
}

/// Slope (units/sec) from `anchor` to `(target.utc_time, target_numeric)`.
/// Returns `None` when the two points share a timestamp, which the exception
/// filter upstream is expected never to produce.
fn slope(anchor: &Sample, at: chrono::DateTime<chrono::Utc>, value: f64) -> Option<f64> {
    let dt = seconds_between(anchor.utc_time, at);
    if dt <= 0.0 {
        return None;
    }
    Some((value - anchor.numeric) / dt)
}

fn seconds_between(a: chrono::DateTime<chrono::Utc>, b: chrono::DateTime<chrono::Utc>) -> f64 {
    let d: Duration = b - a;
    d.num_nanoseconds().unwrap_or(i64::MAX) as f64 / 1_000_000_000.0
}

/// Returns `(s_lo, s_hi)`: the slopes through the candidate's lower and
/// upper deviation bounds.
fn door_slopes(anchor: &Sample, candidate: &Sample, limit_abs: f64) -> (f64, f64) {
    let hi = slope(anchor, candidate.utc_time, candidate.numeric + limit_abs).unwrap_or(f64::INFINITY);
    let lo = slope(anchor, candidate.utc_time, candidate.numeric - limit_abs).unwrap_or(f64::NEG_INFINITY);
    (lo, hi)
}

/// The swinging-door filter. Stateless; all state lives in [`CompressionState`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CompressionFilter;

impl CompressionFilter {
    /// Runs one exception-passed sample through the filter, emitting 0, 1,
    /// or 2 archive samples (spec.md §4.3 steps 1-7).
    pub fn process(
        cfg: &FilterConfig,
        data_type: DataType,
        state: &mut CompressionState,
        x: &Sample,
    ) -> Vec<Sample> {
        if data_type.is_discrete() {
            return Self::process_discrete(state, x);
        }

        // Step 1: disabled filters archive everything.
        if !cfg.enabled {
            state.last_archived = Some(x.clone());
            state.last_received = None;
            return vec![x.clone()];
        }

        let anchor = match state.last_archived.clone() {
            // Step 2: the first sample establishes the anchor outright.
            None => {
                state.last_archived = Some(x.clone());
                state.last_received = None;
                return vec![x.clone()];
            }
            Some(a) => a,
        };

        // Step 7 (checked first): a quality transition forces closure.
        let reference_quality = state
            .last_received
            .as_ref()
            .map(|r| r.quality)
            .unwrap_or(anchor.quality);
        if x.quality != reference_quality {
            return Self::force_close(state, cfg, x);
        }

        // Step 3-4: compute the candidate's door slopes against the anchor.
        let limit_abs = cfg.limit_abs(anchor.numeric);
        let (s_lo, s_hi) = door_slopes(&anchor, x, limit_abs);

        match state.last_received.clone() {
            // Step 5: the first candidate after (re)establishing an anchor
            // simply opens the door; nothing to compare against yet.
            None => {
                state.open_door(&anchor, limit_abs, x.clone());
                vec![]
            }
            Some(received) => {
                let new_min = state.slope_min.max(s_lo);
                let new_max = state.slope_max.min(s_hi);
                if new_min > new_max {
                    // Step 6, door-closed branch: archive the previous
                    // candidate, re-anchor there, and open a fresh door
                    // using `x` as the next candidate.
                    state.last_archived = Some(received.clone());
                    let new_limit = cfg.limit_abs(received.numeric);
                    state.open_door(&received, new_limit, x.clone());
                    vec![received]
                } else {
                    // Step 6, door-open branch: narrow and keep waiting.
                    state.slope_min = new_min;
                    state.slope_max = new_max;
                    state.last_received = Some(x.clone());
                    vec![]
                }
            }
        }
    }

    fn force_close(state: &mut CompressionState, cfg: &FilterConfig, x: &Sample) -> Vec<Sample> {
        match state.last_received.take() {
            Some(received) => {
                state.last_archived = Some(received.clone());
                let limit_abs = cfg.limit_abs(received.numeric);
                state.open_door(&received, limit_abs, x.clone());
                vec![received]
            }
            None => {
                state.last_archived = Some(x.clone());
                state.last_received = None;
                vec![x.clone()]
            }
        }
    }

    /// `Text`/`State` tags degenerate to "emit on change" (spec.md §4.3).
    /// Only changed values reach the compression filter (the exception
    /// filter already suppresses repeats), so every call here archives.
    fn process_discrete(state: &mut CompressionState, x: &Sample) -> Vec<Sample> {
        state.last_archived = Some(x.clone());
        state.last_received = None;
        vec![x.clone()]
    }

    /// Flushes any pending candidate on tag deletion, shutdown, or
    /// reconfiguration (spec.md §4.3 step 8).
    pub fn flush(state: &mut CompressionState) -> Option<Sample> {
        let pending = state.last_received.take()?;
        state.last_archived = Some(pending.clone());
        Some(pending)
    }
}
