//! Time arithmetic and the relative-time / interval grammar.
//!
//! The historian's external callers (see spec.md §6) express times and
//! windows using a small textual grammar instead of raw durations:
//!
//! - relative time: `"* [+-] <n>[ms|s|m|h|d|y]"`, case- and
//!   whitespace-insensitive, chained (`"1h30m"`), with `1y = 365d`.
//! - intervals/windows: the same `<n><unit>` grammar, or a standard
//!   `[d.]hh:mm:ss[.fff]` clock expression.
//!
//! Internally, time arithmetic is done in 100-nanosecond ticks ([`Ticks`])
//! to match the persisted-format granularity the historian's storage layer
//! assumes, the way the teacher's on-disk formats fix a byte-level encoding
//! once and convert at the edges rather than at every call site.

use chrono::{DateTime, Duration, Utc};

use crate::error::{CoreError, Result};

/// One tick is 100 nanoseconds.
const TICKS_PER_SECOND: i64 = 10_000_000;

/// A duration or instant offset expressed in 100-nanosecond ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticks(pub i64);

impl Ticks {
    /// Converts a [`chrono::Duration`] to ticks, truncating sub-tick remainders.
    pub fn from_duration(d: Duration) -> Self {
        let nanos = d.num_nanoseconds().unwrap_or(i64::MAX);
        Ticks(nanos / 100)
    }

    /// Converts ticks back to a [`chrono::Duration`].
    pub fn to_duration(self) -> Duration {
        Duration::nanoseconds(self.0.saturating_mul(100))
    }

    /// Ticks since the Unix epoch for the given instant.
    pub fn from_datetime(t: DateTime<Utc>) -> Self {
        Ticks::from_duration(t - DateTime::<Utc>::from_timestamp(0, 0).unwrap())
    }

    /// The instant `ticks` after the Unix epoch.
    pub fn to_datetime(self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(0, 0).unwrap() + self.to_duration()
    }
}

/// Parses the `<n><unit>` duration grammar (chained, e.g. `"1h30m"`), or a
/// standard `[d.]hh:mm:ss[.fff]` clock expression.
///
/// Units: `ms`, `s`, `m`, `h`, `d`, `y` (`1y = 365d`), case-insensitive.
pub fn parse_duration_expr(expr: &str) -> Result<Duration> {
    let trimmed: String = expr.chars().filter(|c| !c.is_whitespace()).collect();
    if trimmed.is_empty() {
        return Err(CoreError::Validation("empty duration expression".into()));
    }
    if let Some(d) = parse_clock_expr(&trimmed) {
        return Ok(d);
    }
    parse_unit_chain(&trimmed)
}

/// Parses an interval/window expression. Semantically identical to
/// [`parse_duration_expr`]; kept as a distinct name because callers (the
/// aggregation engine, filter windows) reach for it by that name.
pub fn parse_interval(expr: &str) -> Result<Duration> {
    parse_duration_expr(expr)
}

/// Parses `"* [+-] <n><unit>..."` relative to `now`. A bare `"*"` returns
/// `now` unchanged.
pub fn parse_relative_time(expr: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let trimmed: String = expr.chars().filter(|c| !c.is_whitespace()).collect();
    let lowered = trimmed.to_ascii_lowercase();
    let rest = lowered
        .strip_prefix('*')
        .ok_or_else(|| CoreError::Validation(format!("relative time must start with '*': {expr}")))?;
    if rest.is_empty() {
        return Ok(now);
    }
    let (sign, magnitude) = match rest.as_bytes()[0] {
        b'+' => (1i64, &rest[1..]),
        b'-' => (-1i64, &rest[1..]),
        _ => {
            return Err(CoreError::Validation(format!(
                "expected '+' or '-' after '*' in relative time: {expr}"
            )))
        }
    };
    let delta = parse_unit_chain(magnitude)?;
    Ok(now + delta * sign as i32)
}

fn parse_unit_chain(s: &str) -> Result<Duration> {
    let lowered = s.to_ascii_lowercase();
    let bytes = lowered.as_bytes();
    let mut i = 0usize;
    let mut total = Duration::zero();
    let mut saw_any = false;
    while i < bytes.len() {
        let start = i;
        while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
            i += 1;
        }
        if i == start {
            return Err(CoreError::Validation(format!(
                "expected a number at position {i} in duration expression: {s}"
            )));
        }
        let number: f64 = lowered[start..i]
            .parse()
            .map_err(|_| CoreError::Validation(format!("invalid number in duration: {s}")))?;
        let unit_start = i;
        while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
            i += 1;
        }
        let unit = &lowered[unit_start..i];
        total = total + unit_duration(unit, number, s)?;
        saw_any = true;
    }
    if !saw_any {
        return Err(CoreError::Validation(format!(
            "empty duration expression: {s}"
        )));
    }
    Ok(total)
}

fn unit_duration(unit: &str, n: f64, original: &str) -> Result<Duration> {
    let seconds = match unit {
        "ms" => n / 1000.0,
        "s" => n,
        "m" => n * 60.0,
        "h" => n * 3600.0,
        "d" => n * 86400.0,
        "y" => n * 365.0 * 86400.0,
        other => {
            return Err(CoreError::Validation(format!(
                "unknown duration unit '{other}' in: {original}"
            )))
        }
    };
    Ok(Duration::nanoseconds((seconds * 1_000_000_000.0) as i64))
}

/// Parses `[d.]hh:mm:ss[.fff]`. Returns `None` (not an error) when the
/// expression does not look like a clock expression, so callers can fall
/// back to the unit-chain grammar.
fn parse_clock_expr(s: &str) -> Option<Duration> {
    if !s.contains(':') {
        return None;
    }
    let (days, rest) = match s.split_once('.') {
        Some((d, r)) if r.contains(':') => (d.parse::<i64>().ok()?, r),
        _ => (0, s),
    };
    let parts: Vec<&str> = rest.split(':').collect();
    if parts.len() != 3 {
        return None;
    }
    let hours: i64 = parts[0].parse().ok()?;
    let minutes: i64 = parts[1].parse().ok()?;
    let (seconds, millis) = match parts[2].split_once('.') {
        Some((sec, ms)) => (sec.parse::<i64>().ok()?, pad_millis(ms)?),
        None => (parts[2].parse::<i64>().ok()?, 0),
    };
    let mut total = Duration::days(days)
        + Duration::hours(hours)
        + Duration::minutes(minutes)
        + Duration::seconds(seconds)
        + Duration::milliseconds(millis);
    if s.starts_with('-') {
        total = -total;
    }
    Some(total)
}

fn pad_millis(ms: &str) -> Option<i64> {
    let mut digits: String = ms.chars().take(3).collect();
    while digits.len() < 3 {
        digits.push('0');
    }
    digits.parse().ok()
}

/// Ticks-per-second constant, exposed for callers that encode durations in
/// the same unit persisted storage layers use.
pub const fn ticks_per_second() -> i64 {
    TICKS_PER_SECOND
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn relative_time_subtracts_compound_duration() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let parsed = parse_relative_time("* - 1h30m", now).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 1, 1, 10, 30, 0).unwrap());
    }

    #[test]
    fn bare_star_is_now() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(parse_relative_time("*", now).unwrap(), now);
    }

    #[test]
    fn fractional_interval() {
        let d = parse_interval("1.5h").unwrap();
        assert_eq!(d.num_seconds(), 5400);
    }

    #[test]
    fn clock_expression_with_days() {
        let d = parse_interval("1.12:30:00.500").unwrap();
        assert_eq!(d, Duration::days(1) + Duration::hours(12) + Duration::minutes(30) + Duration::milliseconds(500));
    }

    #[test]
    fn year_is_365_days() {
        let d = parse_interval("1y").unwrap();
        assert_eq!(d, Duration::days(365));
    }

    #[test]
    fn whitespace_is_ignored() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let a = parse_relative_time("* + 1 d", now).unwrap();
        let b = parse_relative_time("*+1d", now).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn ticks_roundtrip_datetime() {
        let t = Utc.with_ymd_and_hms(2024, 6, 1, 8, 30, 15).unwrap();
        let ticks = Ticks::from_datetime(t);
        assert_eq!(ticks.to_datetime(), t);
    }
}
