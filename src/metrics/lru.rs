//! LRU Cache Metrics
//!
//! Metrics specific to the reference-counted LRU cache.

extern crate alloc;

use super::{CacheMetrics, CoreCacheMetrics};
use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};

/// LRU-specific metrics (extends [`CoreCacheMetrics`]).
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LruCacheMetrics {
    /// Core metrics common to all cache flavours.
    pub core: CoreCacheMetrics,

    /// Inserts that displaced an entry with the same key.
    pub replacements: u64,

    /// Successful `erase` calls.
    pub erasures: u64,

    /// Inserts into a zero-capacity cache, which are never registered.
    pub pass_through_inserts: u64,

    /// Entries whose last reference was released and whose deleter ran.
    pub destroyed: u64,

    /// Inserts rejected because the entry could not be allocated.
    pub failed_inserts: u64,

    /// Number of cached entries (gauge).
    pub entries: u64,

    /// Cached entries with at least one outstanding handle (gauge).
    pub in_use_entries: u64,

    /// Bucket array length of the hash table (gauge).
    pub table_buckets: u64,

    /// Completed bucket array resizes.
    pub table_resizes: u64,

    /// Bucket array growths skipped because allocation failed.
    pub table_resize_failures: u64,
}

impl LruCacheMetrics {
    /// Creates a metrics block for a cache of the given capacity.
    pub fn new(capacity: u64) -> Self {
        Self {
            core: CoreCacheMetrics::new(capacity),
            ..Default::default()
        }
    }

    /// Adds another block's counters and gauges into this one.
    pub fn accumulate(&mut self, other: &LruCacheMetrics) {
        self.core.accumulate(&other.core);
        self.replacements += other.replacements;
        self.erasures += other.erasures;
        self.pass_through_inserts += other.pass_through_inserts;
        self.destroyed += other.destroyed;
        self.failed_inserts += other.failed_inserts;
        self.entries += other.entries;
        self.in_use_entries += other.in_use_entries;
        self.table_buckets += other.table_buckets;
        self.table_resizes += other.table_resizes;
        self.table_resize_failures += other.table_resize_failures;
    }

    /// Converts LRU metrics to a `BTreeMap` for reporting.
    pub fn to_btreemap(&self) -> BTreeMap<String, f64> {
        let mut metrics = self.core.to_btreemap();

        metrics.insert("replacements".to_string(), self.replacements as f64);
        metrics.insert("erasures".to_string(), self.erasures as f64);
        metrics.insert(
            "pass_through_inserts".to_string(),
            self.pass_through_inserts as f64,
        );
        metrics.insert("destroyed".to_string(), self.destroyed as f64);
        metrics.insert("failed_inserts".to_string(), self.failed_inserts as f64);

        metrics.insert("entries".to_string(), self.entries as f64);
        metrics.insert("in_use_entries".to_string(), self.in_use_entries as f64);
        metrics.insert(
            "lru_entries".to_string(),
            self.entries.saturating_sub(self.in_use_entries) as f64,
        );

        metrics.insert("table_buckets".to_string(), self.table_buckets as f64);
        metrics.insert("table_resizes".to_string(), self.table_resizes as f64);
        metrics.insert(
            "table_resize_failures".to_string(),
            self.table_resize_failures as f64,
        );

        metrics
    }
}

impl CacheMetrics for LruCacheMetrics {
    fn metrics(&self) -> BTreeMap<String, f64> {
        self.to_btreemap()
    }

    fn algorithm_name(&self) -> &'static str {
        "LRU"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_contains_lru_keys() {
        let mut metrics = LruCacheMetrics::new(64);
        metrics.entries = 5;
        metrics.in_use_entries = 2;
        metrics.replacements = 1;

        let report = metrics.metrics();
        assert_eq!(report["capacity"], 64.0);
        assert_eq!(report["entries"], 5.0);
        assert_eq!(report["lru_entries"], 3.0);
        assert_eq!(report["replacements"], 1.0);
        assert!(report.contains_key("table_resize_failures"));
        assert_eq!(metrics.algorithm_name(), "LRU");
    }
}
