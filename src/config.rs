//! Historian-wide tunables.
//!
//! Mirrors the teacher's `Config::production()/balanced()/benchmark()`
//! preset pattern: a plain `Default`-able struct with named presets rather
//! than a builder, since the knobs here are independent and few enough that
//! a builder would add indirection without buying anything.

use chrono::Duration;

/// Tunables governing executor queue depth, observer inbox sizing, and
/// default filter windows for a historian instance.
#[derive(Debug, Clone)]
pub struct HistorianConfig {
    /// Bounded channel depth for each tag's serial write executor.
    pub executor_queue_depth: usize,

    /// Default per-observer inbox capacity for new subscriptions.
    pub observer_inbox_capacity: usize,

    /// Consecutive delivery failures before a subscription is force-closed.
    pub max_consecutive_observer_failures: u32,

    /// Default exception/compression heartbeat window applied when a tag's
    /// `FilterConfig` does not specify one explicitly.
    pub default_filter_window: Duration,

    /// Maximum samples a single `write_snapshot` call accepts per tag, to
    /// bound per-call latency on a saturated executor.
    pub max_batch_size: usize,
}

impl Default for HistorianConfig {
    fn default() -> Self {
        Self {
            executor_queue_depth: 1024,
            observer_inbox_capacity: 256,
            max_consecutive_observer_failures: 8,
            default_filter_window: Duration::hours(1),
            max_batch_size: 10_000,
        }
    }
}

impl HistorianConfig {
    /// Tuned for interactive/SCADA-style workloads: small queues and inboxes
    /// so a stuck observer or executor surfaces backpressure quickly rather
    /// than letting it build up silently.
    pub fn low_latency() -> Self {
        Self {
            executor_queue_depth: 64,
            observer_inbox_capacity: 32,
            max_consecutive_observer_failures: 4,
            default_filter_window: Duration::minutes(10),
            max_batch_size: 256,
        }
    }

    /// Tuned for bulk backfill / high-rate ingestion: deep queues that
    /// absorb bursts, at the cost of higher worst-case publish latency.
    pub fn high_throughput() -> Self {
        Self {
            executor_queue_depth: 65_536,
            observer_inbox_capacity: 4096,
            max_consecutive_observer_failures: 32,
            default_filter_window: Duration::hours(24),
            max_batch_size: 100_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_differ_from_default() {
        let default = HistorianConfig::default();
        let low = HistorianConfig::low_latency();
        let high = HistorianConfig::high_throughput();
        assert!(low.executor_queue_depth < default.executor_queue_depth);
        assert!(high.executor_queue_depth > default.executor_queue_depth);
    }
}
