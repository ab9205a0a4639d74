//! Cache Metrics System
//!
//! Counters describing what a cache has been doing, reported through the
//! [`CacheMetrics`] trait as a `BTreeMap<String, f64>`.
//!
//! # Why BTreeMap over HashMap?
//!
//! Metrics always come out in the same key order, which keeps test
//! assertions, logs and exported snapshots stable between runs. With a
//! couple of dozen keys the lookup cost difference is irrelevant.
//!
//! # Counters vs. gauges
//!
//! Counters (`lookups`, `evictions`, ...) only ever grow and are bumped on
//! the operation that causes them. Gauges (`usage`, `capacity`, `entries`,
//! `in_use_entries`, ...) describe current state and are filled in from the
//! cache at the moment a report is produced, so they can never drift from
//! the real value.

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};

pub mod lru;

pub use lru::LruCacheMetrics;

/// Metrics shared by every cache flavour.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CoreCacheMetrics {
    /// Number of `lookup` calls.
    pub lookups: u64,

    /// Lookups that found an entry.
    pub cache_hits: u64,

    /// Successful inserts (including pass-through inserts at capacity 0).
    pub inserts: u64,

    /// Entries removed because usage exceeded capacity, or by `prune`/`clear`.
    pub evictions: u64,

    /// Sum of the charges of all evicted entries.
    pub evicted_charge: u64,

    /// Current total charge of cached entries (gauge).
    pub usage: u64,

    /// Configured capacity in charge units (gauge).
    pub capacity: u64,
}

impl CoreCacheMetrics {
    /// Creates a metrics block for a cache of the given capacity.
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    /// Records a lookup that found its key.
    #[inline]
    pub fn record_hit(&mut self) {
        self.lookups += 1;
        self.cache_hits += 1;
    }

    /// Records a lookup that missed.
    #[inline]
    pub fn record_miss(&mut self) {
        self.lookups += 1;
    }

    /// Records a successful insert.
    #[inline]
    pub fn record_insertion(&mut self) {
        self.inserts += 1;
    }

    /// Records one evicted entry and its charge.
    #[inline]
    pub fn record_eviction(&mut self, charge: usize) {
        self.evictions += 1;
        self.evicted_charge += charge as u64;
    }

    /// Adds another block's counters and gauges into this one.
    pub fn accumulate(&mut self, other: &CoreCacheMetrics) {
        self.lookups += other.lookups;
        self.cache_hits += other.cache_hits;
        self.inserts += other.inserts;
        self.evictions += other.evictions;
        self.evicted_charge += other.evicted_charge;
        self.usage += other.usage;
        self.capacity += other.capacity;
    }

    /// Lookup hit rate in `0.0..=1.0`, or `0.0` before the first lookup.
    pub fn hit_rate(&self) -> f64 {
        if self.lookups > 0 {
            self.cache_hits as f64 / self.lookups as f64
        } else {
            0.0
        }
    }

    /// Lookup miss rate in `0.0..=1.0`, or `0.0` before the first lookup.
    pub fn miss_rate(&self) -> f64 {
        if self.lookups > 0 {
            (self.lookups - self.cache_hits) as f64 / self.lookups as f64
        } else {
            0.0
        }
    }

    /// `usage / capacity`. May exceed `1.0` while pinned entries hold the
    /// cache over capacity; `0.0` for a zero-capacity cache.
    pub fn utilization(&self) -> f64 {
        if self.capacity > 0 {
            self.usage as f64 / self.capacity as f64
        } else {
            0.0
        }
    }

    /// Converts the core metrics to a `BTreeMap` for reporting.
    pub fn to_btreemap(&self) -> BTreeMap<String, f64> {
        let mut metrics = BTreeMap::new();

        metrics.insert("lookups".to_string(), self.lookups as f64);
        metrics.insert("cache_hits".to_string(), self.cache_hits as f64);
        metrics.insert(
            "cache_misses".to_string(),
            (self.lookups - self.cache_hits) as f64,
        );
        metrics.insert("inserts".to_string(), self.inserts as f64);
        metrics.insert("evictions".to_string(), self.evictions as f64);
        metrics.insert("evicted_charge".to_string(), self.evicted_charge as f64);

        metrics.insert("hit_rate".to_string(), self.hit_rate());
        metrics.insert("miss_rate".to_string(), self.miss_rate());

        metrics.insert("usage".to_string(), self.usage as f64);
        metrics.insert("capacity".to_string(), self.capacity as f64);
        metrics.insert("utilization".to_string(), self.utilization());

        metrics
    }
}

/// Uniform metrics reporting for cache implementations.
pub trait CacheMetrics {
    /// Returns all metrics as key-value pairs in deterministic order.
    fn metrics(&self) -> BTreeMap<String, f64>;

    /// Name identifying the cache implementation (e.g. `"LRU"`).
    fn algorithm_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates_before_any_lookup() {
        let metrics = CoreCacheMetrics::new(100);
        assert_eq!(metrics.hit_rate(), 0.0);
        assert_eq!(metrics.miss_rate(), 0.0);
        assert_eq!(metrics.utilization(), 0.0);
    }

    #[test]
    fn test_hit_and_miss_accounting() {
        let mut metrics = CoreCacheMetrics::new(100);
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_miss();
        assert_eq!(metrics.lookups, 4);
        assert_eq!(metrics.hit_rate(), 0.75);
        assert_eq!(metrics.miss_rate(), 0.25);

        let report = metrics.to_btreemap();
        assert_eq!(report["cache_misses"], 1.0);
        assert_eq!(report["cache_hits"], 3.0);
    }

    #[test]
    fn test_eviction_accounting() {
        let mut metrics = CoreCacheMetrics::new(10);
        metrics.record_eviction(4);
        metrics.record_eviction(6);
        assert_eq!(metrics.evictions, 2);
        assert_eq!(metrics.evicted_charge, 10);
    }

    #[test]
    fn test_accumulate_sums_shards() {
        let mut total = CoreCacheMetrics::new(10);
        let mut shard = CoreCacheMetrics::new(10);
        shard.record_hit();
        shard.record_miss();
        shard.usage = 4;
        total.record_hit();
        total.accumulate(&shard);
        assert_eq!(total.lookups, 3);
        assert_eq!(total.cache_hits, 2);
        assert_eq!(total.capacity, 20);
        assert_eq!(total.usage, 4);
    }

    #[test]
    fn test_utilization_can_exceed_one() {
        let mut metrics = CoreCacheMetrics::new(10);
        metrics.usage = 15;
        assert_eq!(metrics.utilization(), 1.5);
        assert_eq!(CoreCacheMetrics::new(0).utilization(), 0.0);
    }
}
