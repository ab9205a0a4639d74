//! Concurrent Cache Usage Examples
//!
//! Multi-threaded usage patterns for `ConcurrentLruCache`.
//!
//! Run with: cargo run --example concurrent_usage --features concurrent

use handle_lru::config::{ConcurrentCacheConfig, ConcurrentLruCacheConfig, LruCacheConfig};
use handle_lru::metrics::CacheMetrics;
use handle_lru::ConcurrentLruCache;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

fn lru_config(capacity: usize, segments: usize) -> ConcurrentLruCacheConfig {
    ConcurrentCacheConfig {
        base: LruCacheConfig { capacity },
        segments,
    }
}

fn hash(key: u64) -> u32 {
    (key.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 32) as u32
}

fn main() {
    println!("Concurrent Cache Usage Examples");
    println!("================================\n");

    basic_concurrent_usage();
    handles_across_threads();
    segment_comparison();
}

/// Several threads reading through the cache, filling misses themselves.
fn basic_concurrent_usage() {
    println!("1. Read-through from 4 threads");

    let cache: Arc<ConcurrentLruCache<u64, String>> =
        Arc::new(ConcurrentLruCache::init(lru_config(500, 8)));

    let workers: Vec<_> = (0..4u64)
        .map(|t| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                let mut misses = 0;
                for i in 0..1000u64 {
                    let key = (t * 250 + i) % 800;
                    let h = match cache.lookup(&key, hash(key)) {
                        Some(h) => h,
                        None => {
                            misses += 1;
                            cache
                                .insert(key, hash(key), format!("row-{key}"), 1)
                                .expect("entry allocation")
                        }
                    };
                    cache.with_value(&h, |row| assert!(row.starts_with("row-")));
                    cache.release(h);
                }
                misses
            })
        })
        .collect();

    let misses: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();
    let metrics = cache.metrics();
    println!(
        "   entries: {}, usage: {}/{}, misses: {}, hit rate: {:.2}\n",
        cache.len(),
        cache.usage(),
        cache.capacity(),
        misses,
        metrics["hit_rate"]
    );
}

/// A handle obtained on one thread and released on another.
fn handles_across_threads() {
    println!("2. Handing pinned entries to a consumer thread");

    let cache: Arc<ConcurrentLruCache<u64, Vec<u8>>> =
        Arc::new(ConcurrentLruCache::init(lru_config(64 * 1024, 4)));
    let (tx, rx) = mpsc::channel();

    let consumer = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || {
            let mut bytes = 0;
            for h in rx {
                bytes += cache.with_value(&h, |block: &Vec<u8>| block.len());
                cache.release(h);
            }
            bytes
        })
    };

    for key in 0..32u64 {
        let h = cache
            .insert(key, hash(key), vec![key as u8; 1024], 1024)
            .expect("entry allocation");
        tx.send(h).expect("consumer alive");
    }
    drop(tx);

    let bytes = consumer.join().unwrap();
    println!(
        "   consumer read {} bytes; pinned after consumer: {}\n",
        bytes,
        cache.metrics_snapshot().in_use_entries
    );
}

/// Throughput with different segment counts.
fn segment_comparison() {
    println!("3. Segment count comparison (8 threads x 20k ops)");

    for segments in [1, 4, 16, 64] {
        let cache: Arc<ConcurrentLruCache<u64, u64>> =
            Arc::new(ConcurrentLruCache::init(lru_config(10_000, segments)));
        let start = Instant::now();

        let workers: Vec<_> = (0..8u64)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..20_000u64 {
                        let key = (t * 7919 + i) % 12_000;
                        let h = match cache.lookup(&key, hash(key)) {
                            Some(h) => h,
                            None => cache.insert(key, hash(key), i, 1).expect("entry allocation"),
                        };
                        cache.release(h);
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        println!(
            "   {:>2} segments: {:>8.2?}, {} entries",
            segments,
            start.elapsed(),
            cache.len()
        );
    }
}
