//! Linear interpolation in `(time, numeric)` (spec.md §4.5).
//!
//! At each step, the two raw samples bracketing it are linearly
//! interpolated. A step before the first sample or after the last produces
//! no output, except the terminal step at `t1`, which is synthesized by
//! extrapolating the last two samples when the series ends early.

use chrono::{DateTime, Duration, Utc};

use super::{generate_steps, worst_quality_of};
use crate::model::Sample;

fn interpolate_at(step: DateTime<Utc>, left: &Sample, right: &Sample) -> Sample {
    let quality = worst_quality_of([left, right]);
    if left.utc_time == right.utc_time || !left.numeric.is_finite() || !right.numeric.is_finite() {
        // Non-finite neighbor: output the earlier neighbor's value verbatim
        // (spec.md §4.5).
        return Sample {
            utc_time: step,
            numeric: left.numeric,
            text: left.text.clone(),
            quality,
            units: left.units.clone(),
        };
    }
    let total = (right.utc_time - left.utc_time).num_nanoseconds().unwrap_or(1) as f64;
    let elapsed = (step - left.utc_time).num_nanoseconds().unwrap_or(0) as f64;
    let frac = elapsed / total;
    let numeric = left.numeric + (right.numeric - left.numeric) * frac;
    Sample {
        utc_time: step,
        numeric,
        text: None,
        quality,
        units: left.units.clone(),
    }
}

/// Interpolates a single point, if two raw samples straddle it (or one sits
/// exactly on it). Used by [`super::plot`] to synthesize `t0`/`t1` anchors.
pub(crate) fn at(point: DateTime<Utc>, raw: &[Sample]) -> Option<Sample> {
    let left = raw.iter().rev().find(|s| s.utc_time <= point)?;
    let right = raw.iter().find(|s| s.utc_time >= point)?;
    Some(interpolate_at(point, left, right))
}

/// Interpolates `raw` at each step in `generate_steps(t0, t1, interval)`.
pub fn apply(t0: DateTime<Utc>, t1: DateTime<Utc>, interval: Duration, raw: &[Sample]) -> Vec<Sample> {
    let steps = generate_steps(t0, t1, interval);
    let mut out = Vec::with_capacity(steps.len());
    for step in steps {
        let left = raw.iter().rev().find(|s| s.utc_time <= step);
        let right = raw.iter().find(|s| s.utc_time >= step);
        match (left, right) {
            (Some(l), Some(r)) => out.push(interpolate_at(step, l, r)),
            (Some(l), None) if step == t1 && raw.len() >= 2 => {
                let prev = &raw[raw.len() - 2];
                out.push(extrapolate_terminal(step, prev, l));
            }
            _ => {}
        }
    }
    out
}

fn extrapolate_terminal(step: DateTime<Utc>, prev: &Sample, last: &Sample) -> Sample {
    let quality = worst_quality_of([prev, last]);
    if !prev.numeric.is_finite() || !last.numeric.is_finite() {
        return Sample {
            utc_time: step,
            numeric: last.numeric,
            text: last.text.clone(),
            quality,
            units: last.units.clone(),
        };
    }
    let total = (last.utc_time - prev.utc_time).num_nanoseconds().unwrap_or(1) as f64;
    let ahead = (step - last.utc_time).num_nanoseconds().unwrap_or(0) as f64;
    let slope = (last.numeric - prev.numeric) / total;
    Sample {
        utc_time: step,
        numeric: last.numeric + slope * ahead,
        text: None,
        quality,
        units: last.units.clone(),
    }
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

    /// spec.md §8 scenario 4: a 10s gap, sampled every 2s, linearly ramps.
    #[test]
    fn interpolates_across_a_gap() {
        let raw = vec![sample_at(0, 0.0), sample_at(10, 10.0)];
        let t0 = sample_at(0, 0.0).utc_time;
        let t1 = sample_at(10, 0.0).utc_time;
        let out = apply(t0, t1, Duration::seconds(2), &raw);
        let values: Vec<f64> = out.iter().map(|s| s.numeric).collect();
        assert_eq!(values, vec![0.0, 2.0, 4.0, 6.0, 8.0, 10.0]);
    }

    /// Universal property: a constant series interpolates to the same constant.
    #[test]
    fn constant_series_interpolates_to_constant() {
        let raw: Vec<Sample> = (0..5).map(|i| sample_at(i * 3, 7.5)).collect();
        let t0 = sample_at(0, 0.0).utc_time;
        let t1 = sample_at(12, 0.0).utc_time;
        let out = apply(t0, t1, Duration::seconds(1), &raw);
        for s in out {
            assert_eq!(s.numeric, 7.5);
        }
    }

    #[test]
    fn non_finite_neighbor_outputs_earlier_value() {
        let raw = vec![sample_at(0, f64::NAN), sample_at(4, 4.0)];
        let t0 = sample_at(0, 0.0).utc_time;
        let t1 = sample_at(4, 0.0).utc_time;
        let out = apply(t0, t1, Duration::seconds(2), &raw);
        assert!(out[0].numeric.is_nan());
        assert!(out[1].numeric.is_nan(), "step at 2s brackets the NaN neighbor");
    }

    #[test]
    fn quality_is_worst_of_neighbors() {
        let mut degraded = sample_at(2, 2.0);
        degraded.quality = Quality::Uncertain;
        let raw = vec![sample_at(0, 0.0), degraded];
        let t0 = sample_at(0, 0.0).utc_time;
        let t1 = sample_at(2, 0.0).utc_time;
        let out = apply(t0, t1, Duration::seconds(1), &raw);
        assert!(out.iter().any(|s| s.quality == Quality::Uncertain));
    }
}
