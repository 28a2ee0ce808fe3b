//! `Plot`: visually-significant subsampling (spec.md §4.5).
//!
//! Bucket size is `4 x interval`. Each bucket emits `{first, last,
//! argmin(numeric), argmax(numeric)}`, sorted by time and deduplicated,
//! unless every value in the bucket is non-numeric, in which case every
//! value is emitted. `t0`/`t1` get a synthesized interpolated anchor when no
//! raw sample lands exactly there and two samples straddle it. The output is
//! not uniformly spaced.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

use super::interpolate;
use crate::model::Sample;

fn bucket_edges(t0: DateTime<Utc>, t1: DateTime<Utc>, bucket_size: Duration) -> Vec<DateTime<Utc>> {
    if bucket_size <= Duration::zero() {
        return vec![t0, t1];
    }
    let mut edges = vec![t0];
    let mut t = t0 + bucket_size;
    while t < t1 {
        edges.push(t);
        t = t + bucket_size;
    }
    edges.push(t1);
    edges
}

fn significant_points(bucket: &[&Sample]) -> Vec<Sample> {
    let all_non_numeric = bucket.iter().all(|s| !s.numeric.is_finite());
    if all_non_numeric {
        return bucket.iter().map(|s| (*s).clone()).collect();
    }

    let mut by_time: BTreeMap<DateTime<Utc>, Sample> = BTreeMap::new();
    let first = bucket.first().unwrap();
    let last = bucket.last().unwrap();
    by_time.insert(first.utc_time, (*first).clone());
    by_time.insert(last.utc_time, (*last).clone());

    // argmin/argmax are drawn from the interior so that, on the common case
    // where the bucket's true extremes sit at its edges, `first`/`last`
    // already cover them instead of being redundantly repeated.
    let interior = if bucket.len() > 2 { &bucket[1..bucket.len() - 1] } else { &[][..] };
    if let Some(argmin) = interior
        .iter()
        .filter(|s| s.numeric.is_finite())
        .min_by(|a, b| a.numeric.partial_cmp(&b.numeric).unwrap())
    {
        by_time.insert(argmin.utc_time, (*argmin).clone());
    }
    if let Some(argmax) = interior
        .iter()
        .filter(|s| s.numeric.is_finite())
        .max_by(|a, b| a.numeric.partial_cmp(&b.numeric).unwrap())
    {
        by_time.insert(argmax.utc_time, (*argmax).clone());
    }

    by_time.into_values().collect()
}

/// Runs the `Plot` transform over `raw` within `[t0, t1]`.
pub fn apply(t0: DateTime<Utc>, t1: DateTime<Utc>, interval: Duration, raw: &[Sample]) -> Vec<Sample> {
    let bucket_size = interval * 4;
    let edges = bucket_edges(t0, t1, bucket_size);
    let mut out = Vec::new();

    for (i, window) in edges.windows(2).enumerate() {
        let (lo, hi) = (window[0], window[1]);
        let bucket: Vec<&Sample> = raw
            .iter()
            .filter(|s| {
                if i == 0 {
                    s.utc_time >= lo && s.utc_time <= hi
                } else {
                    s.utc_time > lo && s.utc_time <= hi
                }
            })
            .collect();
        if bucket.is_empty() {
            continue;
        }
        out.extend(significant_points(&bucket));
    }

    if !out.iter().any(|s| s.utc_time == t0) {
        if let Some(anchor) = interpolate::at(t0, raw) {
            out.push(anchor);
        }
    }
    if !out.iter().any(|s| s.utc_time == t1) {
        if let Some(anchor) = interpolate::at(t1, raw) {
            out.push(anchor);
        }
    }

    out.sort_by_key(|s| s.utc_time);
    out.dedup_by_key(|s| s.utc_time);
    out
}
