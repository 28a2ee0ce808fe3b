//! Bucketed `Average`/`Minimum`/`Maximum` (spec.md §4.5).
//!
//! Each step's bucket is the half-open interval `(step - interval, step]`.
//! An empty bucket carries the previous aggregate's value forward (with the
//! new step's timestamp) if one exists; otherwise it produces no output.

use chrono::{DateTime, Duration, Utc};

use super::{generate_steps, worst_quality_of};
use crate::model::Sample;

/// Which bucketed statistic to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketFn {
    /// Arithmetic mean of finite values in the bucket.
    Average,
    /// Smallest finite value in the bucket.
    Minimum,
    /// Largest finite value in the bucket.
    Maximum,
}

fn reduce(kind: BucketFn, finite: &[f64]) -> f64 {
    match kind {
        BucketFn::Average => finite.iter().sum::<f64>() / finite.len() as f64,
        BucketFn::Minimum => finite.iter().cloned().fold(f64::INFINITY, f64::min),
        BucketFn::Maximum => finite.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
    }
}

/// Runs one bucketed statistic over `raw`, emitting at most one sample per
/// step in `generate_steps(t0, t1, interval)`.
pub fn apply(kind: BucketFn, t0: DateTime<Utc>, t1: DateTime<Utc>, interval: Duration, raw: &[Sample]) -> Vec<Sample> {
    let steps = generate_steps(t0, t1, interval);
    let mut out = Vec::with_capacity(steps.len());
    let mut carry: Option<(f64, crate::model::Quality, String)> = None;

    for step in steps {
        let lo = step - interval;
        let bucket: Vec<&Sample> = raw
            .iter()
            .filter(|s| s.utc_time > lo && s.utc_time <= step)
            .collect();

        if bucket.is_empty() {
            if let Some((value, quality, units)) = carry.clone() {
                out.push(Sample {
                    utc_time: step,
                    numeric: value,
                    text: None,
                    quality,
                    units,
                });
            }
            continue;
        }

        let finite: Vec<f64> = bucket.iter().map(|s| s.numeric).filter(|v| v.is_finite()).collect();
        let quality = worst_quality_of(bucket.iter().copied());
        let units = bucket.last().unwrap().units.clone();
        let value = if finite.is_empty() { f64::NAN } else { reduce(kind, &finite) };
        out.push(Sample {
            utc_time: step,
            numeric: value,
            text: None,
            quality,
            units: units.clone(),
        });
        carry = Some((value, quality, units));
    }
    out
}
