//! Cache Metrics Demonstration
//!
//! Runs a small workload against `LruCache` and prints the metrics report,
//! showing counters (lookups, evictions, replacements) next to gauges read
//! from live state (usage, in-use entries, bucket count).

use handle_lru::config::LruCacheConfig;
use handle_lru::metrics::CacheMetrics;
use handle_lru::LruCache;
use std::collections::BTreeMap;

fn hash(key: &str) -> u32 {
    key.bytes()
        .fold(0x811c_9dc5u32, |h, b| (h ^ b as u32).wrapping_mul(0x0100_0193))
}

fn main() {
    println!("Cache Metrics Demonstration");
    println!("===========================\n");

    let mut cache: LruCache<&'static str, i32> = LruCache::init(LruCacheConfig { capacity: 3 });

    // Insert 5 items: the first two are evicted.
    for (i, key) in ["apple", "banana", "cherry", "date", "elderberry"].iter().enumerate() {
        let h = cache.insert(*key, hash(key), i as i32, 1).expect("entry allocation");
        cache.release(h);
    }

    // Access pattern with hits and misses.
    for key in ["cherry", "date", "apple", "cherry", "fig"] {
        if let Some(h) = cache.lookup(key, hash(key)) {
            cache.release(h);
        }
    }

    // Replace a key while holding a handle on the old value.
    let old = cache.lookup("date", hash("date")).expect("date is cached");
    let new = cache.insert("date", hash("date"), 42, 1).expect("entry allocation");
    println!(
        "old 'date' still readable: {} (cached: {}), new value: {}\n",
        cache.value(&old),
        cache.is_cached(&old),
        cache.value(&new)
    );
    cache.release(old);
    cache.release(new);

    display_metrics(cache.algorithm_name(), &cache.metrics());

    cache.prune();
    println!("\nAfter prune:");
    display_metrics(cache.algorithm_name(), &cache.metrics());
}

fn display_metrics(name: &str, metrics: &BTreeMap<String, f64>) {
    println!("{name} metrics (deterministic order):");
    for (key, value) in metrics {
        if value.fract() == 0.0 {
            println!("   {key:<24} {value:>8}");
        } else {
            println!("   {key:<24} {value:>8.3}");
        }
    }
}
