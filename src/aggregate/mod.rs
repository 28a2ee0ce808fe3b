//! The aggregation engine (C5): pure transforms from a raw series to a
//! processed one, over a bounded time window.
//!
//! No shared state crosses a call to [`apply`] — this module is the one
//! part of the crate spec.md promises is "purely CPU-bound and
//! non-suspending" with no exceptions. Submodules hold the heavier
//! algorithms so each keeps its own doc comments and tests: [`bucket`] for
//! `Average`/`Minimum`/`Maximum`, [`interpolate`] for `Interpolated`,
//! [`plot`] for `Plot`.

pub mod bucket;
pub mod interpolate;
pub mod plot;

use chrono::{DateTime, Duration, Utc};

use crate::error::{CoreError, Result};
use crate::model::{DataType, Quality, Sample};

/// The aggregation function requested of [`apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFn {
    /// Pass-through, filtered to `[t0, t1]`.
    Raw,
    /// Last-known-value sampling at each step.
    Interval,
    /// Linear interpolation in `(time, numeric)` at each step.
    Interpolated,
    /// Bucketed arithmetic mean over `(step - interval, step]`.
    Average,
    /// Bucketed minimum, ignoring non-finite values.
    Minimum,
    /// Bucketed maximum, ignoring non-finite values.
    Maximum,
    /// Visually-significant subsampling: bucket size `4 x interval`.
    Plot,
}

/// Folds qualities the way spec.md §4.5 requires for every derived sample:
/// the worst of all contributing inputs, defaulting to `Good` for none.
pub fn worst_quality_of<'a, I: IntoIterator<Item = &'a Sample>>(samples: I) -> Quality {
    samples
        .into_iter()
        .fold(Quality::Good, |acc, s| acc.worst(s.quality))
}

/// Generates the step times `t0, t0+interval, ..., t1`, always ending
/// exactly at `t1` even when `(t1 - t0)` is not an exact multiple of
/// `interval` (spec.md §4.5's "terminal sample synthesized by closing the
/// bucket at t1").
pub(crate) fn generate_steps(
    t0: DateTime<Utc>,
    t1: DateTime<Utc>,
    interval: Duration,
) -> Vec<DateTime<Utc>> {
    if interval <= Duration::zero() || t0 >= t1 {
        return vec![t0];
    }
    let mut out = Vec::new();
    let mut t = t0;
    while t <= t1 {
        out.push(t);
        t = t + interval;
    }
    match out.last() {
        Some(&last) if last < t1 => out.push(t1),
        None => out.push(t0),
        _ => {}
    }
    out
}

/// Resolves `point_count` into an effective `interval`, per spec.md §4.5:
/// `point_count -> interval = (t1 - t0) / point_count`; a degenerate
/// `t0 == t1` window defaults to `1s`.
pub fn interval_from_point_count(
    t0: DateTime<Utc>,
    t1: DateTime<Utc>,
    point_count: usize,
) -> Result<Duration> {
    if point_count == 0 {
        return Err(CoreError::Validation("point_count must be >= 1".into()));
    }
    if t0 == t1 {
        return Ok(Duration::seconds(1));
    }
    let total_nanos = (t1 - t0).num_nanoseconds().unwrap_or(i64::MAX);
    Ok(Duration::nanoseconds(total_nanos / point_count as i64))
}

/// The pass-through transform: samples within `[t0, t1]`, ascending,
/// optionally truncated to `point_count`.
fn apply_raw(
    t0: DateTime<Utc>,
    t1: DateTime<Utc>,
    point_count: Option<usize>,
    raw: &[Sample],
) -> Vec<Sample> {
    let mut out: Vec<Sample> = raw
        .iter()
        .filter(|s| s.utc_time >= t0 && s.utc_time <= t1)
        .cloned()
        .collect();
    if let Some(n) = point_count {
        out.truncate(n);
    }
    out
}

/// Last-known-value sampling: at each step, the sample with the greatest
/// `utc_time <= step`. Steps for which no such sample exists (the raw
/// series starts after the step) produce no output (spec.md §4.5 edge-case
/// policy). Mandatory for `Text`/`State` tags.
fn apply_interval(
    t0: DateTime<Utc>,
    t1: DateTime<Utc>,
    interval: Duration,
    raw: &[Sample],
) -> Vec<Sample> {
    generate_steps(t0, t1, interval)
        .into_iter()
        .filter_map(|step| {
            raw.iter()
                .rev()
                .find(|s| s.utc_time <= step)
                .map(|s| Sample {
                    utc_time: step,
                    numeric: s.numeric,
                    text: s.text.clone(),
                    quality: s.quality,
                    units: s.units.clone(),
                })
        })
        .collect()
}

/// Runs `fn_kind` over `raw` between `[t0, t1]` with the given `interval`,
/// per spec.md §4.5. `data_type` forces `Interval` semantics for
/// `Text`/`State` tags regardless of the requested function.
pub fn apply(
    fn_kind: AggFn,
    data_type: DataType,
    t0: DateTime<Utc>,
    t1: DateTime<Utc>,
    interval: Duration,
    raw: &[Sample],
) -> Result<Vec<Sample>> {
    if t1 < t0 {
        return Err(CoreError::Validation("t1 must be >= t0".into()));
    }
    let effective = if data_type.is_discrete() && fn_kind != AggFn::Raw {
        AggFn::Interval
    } else {
        fn_kind
    };
    let out = match effective {
        AggFn::Raw => apply_raw(t0, t1, None, raw),
        AggFn::Interval => apply_interval(t0, t1, interval, raw),
        AggFn::Interpolated => interpolate::apply(t0, t1, interval, raw),
        AggFn::Average => bucket::apply(bucket::BucketFn::Average, t0, t1, interval, raw),
        AggFn::Minimum => bucket::apply(bucket::BucketFn::Minimum, t0, t1, interval, raw),
        AggFn::Maximum => bucket::apply(bucket::BucketFn::Maximum, t0, t1, interval, raw),
        AggFn::Plot => plot::apply(t0, t1, interval, raw),
    };
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Quality;
    use chrono::TimeZone;

    fn sample_at(secs: i64, v: f64) -> Sample {
        Sample::numeric(
            Utc.timestamp_opt(0, 0).unwrap() + Duration::seconds(secs),
            v,
            Quality::Good,
            "degC",
        )
    }

    /// Universal property: output times lie within `[t0, t1]`.
    #[test]
    fn outputs_stay_within_window() {
        let raw: Vec<Sample> = (0..20).map(|i| sample_at(i, i as f64)).collect();
        let t0 = sample_at(2, 0.0).utc_time;
        let t1 = sample_at(15, 0.0).utc_time;
        for f in [AggFn::Interval, AggFn::Interpolated, AggFn::Average, AggFn::Minimum, AggFn::Maximum] {
            let out = apply(f, DataType::FloatingPoint, t0, t1, Duration::seconds(3), &raw).unwrap();
            for s in &out {
                assert!(s.utc_time >= t0 && s.utc_time <= t1, "{:?} out of window for {:?}", s, f);
            }
        }
    }

    /// `Raw` is idempotent: applying it twice equals applying it once.
    #[test]
    fn raw_is_idempotent() {
        let raw: Vec<Sample> = (0..10).map(|i| sample_at(i, i as f64)).collect();
        let t0 = sample_at(0, 0.0).utc_time;
        let t1 = sample_at(9, 0.0).utc_time;
        let once = apply(AggFn::Raw, DataType::FloatingPoint, t0, t1, Duration::seconds(1), &raw).unwrap();
        let twice = apply(AggFn::Raw, DataType::FloatingPoint, t0, t1, Duration::seconds(1), &once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn discrete_type_forces_interval_semantics() {
        let off = Sample::textual(sample_at(0, 0.0).utc_time, 0.0, "OFF", Quality::Good, "");
        let on = Sample::textual(sample_at(7, 0.0).utc_time, 1.0, "ON", Quality::Good, "");
        let raw = vec![off, on];
        let t0 = sample_at(0, 0.0).utc_time;
        let t1 = sample_at(10, 0.0).utc_time;
        let out = apply(AggFn::Average, DataType::State, t0, t1, Duration::seconds(2), &raw).unwrap();
        let texts: Vec<_> = out.iter().map(|s| s.text.clone().unwrap()).collect();
        assert_eq!(texts, vec!["OFF", "OFF", "OFF", "OFF", "ON", "ON"]);
    }

    #[test]
    fn point_count_converts_to_interval() {
        let t0 = sample_at(0, 0.0).utc_time;
        let t1 = sample_at(10, 0.0).utc_time;
        let interval = interval_from_point_count(t0, t1, 5).unwrap();
        assert_eq!(interval, Duration::seconds(2));
    }

    #[test]
    fn degenerate_window_defaults_to_one_second() {
        let t0 = sample_at(5, 0.0).utc_time;
        let interval = interval_from_point_count(t0, t0, 4).unwrap();
        assert_eq!(interval, Duration::seconds(1));
    }
}
