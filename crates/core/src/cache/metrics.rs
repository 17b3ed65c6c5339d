//! Hit/miss counters and on-demand metric snapshots.
//!
//! The collector keeps running hit/miss counters for the process lifetime
//! (reset on cache re-initialization). Totals and size are never tracked as
//! running values; `ProductCache::metrics` recomputes them from the record
//! store on every call so the snapshot cannot drift.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregated cache statistics, freshly computed per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMetrics {
    pub total_records: i64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub approx_size_bytes: i64,
    /// hits / (hits + misses); 0 when both are 0.
    pub hit_ratio: f64,
}

/// Running hit/miss counters.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MetricsCollector {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

/// Derived ratio, always in [0, 1] and 0 exactly when no reads happened.
pub fn hit_ratio(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_ratio_zero_when_empty() {
        assert_eq!(hit_ratio(0, 0), 0.0);
    }

    #[test]
    fn test_hit_ratio_three_hits_one_miss() {
        assert_eq!(hit_ratio(3, 1), 0.75);
    }

    #[test]
    fn test_hit_ratio_in_range() {
        for (hits, misses) in [(0u64, 5u64), (5, 0), (7, 3), (1, 1)] {
            let ratio = hit_ratio(hits, misses);
            assert!((0.0..=1.0).contains(&ratio));
        }
    }

    #[test]
    fn test_collector_counts_and_resets() {
        let collector = MetricsCollector::default();
        collector.record_hit();
        collector.record_hit();
        collector.record_miss();
        assert_eq!(collector.hits(), 2);
        assert_eq!(collector.misses(), 1);

        collector.reset();
        assert_eq!(collector.hits(), 0);
        assert_eq!(collector.misses(), 0);
    }
}
