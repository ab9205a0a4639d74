//! Stress Tests for the Concurrent Cache
//!
//! These tests verify thread safety and accounting under high contention.
//! Workers run on a `scoped_threadpool` pool so they can borrow the cache
//! directly instead of going through an `Arc`.

#![cfg(feature = "concurrent")]

use handle_lru::config::{ConcurrentCacheConfig, ConcurrentLruCacheConfig, LruCacheConfig};
use handle_lru::ConcurrentLruCache;
use scoped_threadpool::Pool;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const NUM_THREADS: u32 = 16;
const OPS_PER_THREAD: u64 = 10_000;

fn lru_config(capacity: usize, segments: usize) -> ConcurrentLruCacheConfig {
    ConcurrentCacheConfig {
        base: LruCacheConfig { capacity },
        segments,
    }
}

fn spread_hash(key: u64) -> u32 {
    (key.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 32) as u32
}

/// Many threads hammering the same ten keys.
#[test]
fn stress_lru_high_contention() {
    let cache: ConcurrentLruCache<u64, u64> = ConcurrentLruCache::init(lru_config(100, 16));
    let mut pool = Pool::new(NUM_THREADS);

    pool.scoped(|scope| {
        for t in 0..NUM_THREADS as u64 {
            let cache = &cache;
            scope.execute(move || {
                for i in 0..OPS_PER_THREAD {
                    let key = i % 10;
                    if t % 2 == 0 {
                        let h = cache.insert(key, spread_hash(key), t, 1).unwrap();
                        cache.release(h);
                    } else if let Some(h) = cache.lookup(&key, spread_hash(key)) {
                        cache.with_value(&h, |v| assert!(*v < NUM_THREADS as u64));
                        cache.release(h);
                    }
                }
            });
        }
    });

    assert!(cache.len() <= 10);
    cache.check_invariants().unwrap();
}

/// Various segment counts, including a single segment.
#[test]
fn stress_segment_counts() {
    for segments in [1, 2, 4, 8, 16, 32] {
        let cache: ConcurrentLruCache<u64, u64> =
            ConcurrentLruCache::init(lru_config(1024, segments));
        let mut pool = Pool::new(8);

        pool.scoped(|scope| {
            for t in 0..8u64 {
                let cache = &cache;
                scope.execute(move || {
                    for i in 0..1000u64 {
                        let key = t * 1000 + i;
                        let h = cache.insert(key, spread_hash(key), i, 1).unwrap();
                        cache.release(h);
                        if let Some(h) = cache.lookup(&key, spread_hash(key)) {
                            cache.release(h);
                        }
                    }
                });
            }
        });

        assert_eq!(cache.segment_count(), segments);
        assert!(cache.usage() <= cache.capacity());
        cache.check_invariants().unwrap();
    }
}

/// Threads holding handles for a while, releasing them in a different order.
#[test]
fn stress_held_handles() {
    let cache: ConcurrentLruCache<u64, Vec<u8>> = ConcurrentLruCache::init(lru_config(512, 8));
    let mut pool = Pool::new(NUM_THREADS);

    pool.scoped(|scope| {
        for t in 0..NUM_THREADS as u64 {
            let cache = &cache;
            scope.execute(move || {
                let mut held = Vec::new();
                for i in 0..2000u64 {
                    let key = (t * 131 + i * 7) % 400;
                    let h = match cache.lookup(&key, spread_hash(key)) {
                        Some(h) => h,
                        None => cache
                            .insert(key, spread_hash(key), vec![key as u8; 8], 8)
                            .unwrap(),
                    };
                    held.push(h);
                    if held.len() == 8 {
                        while let Some(h) = held.pop() {
                            cache.release(h);
                        }
                    }
                }
                for h in held {
                    cache.release(h);
                }
            });
        }
    });

    cache.check_invariants().unwrap();
    cache.evict_to_capacity();
    assert!(cache.usage() <= cache.capacity());
    assert_eq!(cache.metrics_snapshot().in_use_entries, 0);
}

/// Concurrent insert, erase, prune and charge changes with deleter accounting.
#[test]
fn stress_mixed_operations() {
    let cache: ConcurrentLruCache<u64, u64> = ConcurrentLruCache::init(lru_config(256, 16));
    let inserted = Arc::new(AtomicUsize::new(0));
    let deleted = Arc::new(AtomicUsize::new(0));
    let mut pool = Pool::new(NUM_THREADS);

    pool.scoped(|scope| {
        for t in 0..NUM_THREADS as u64 {
            let cache = &cache;
            let inserted = &inserted;
            let deleted = &deleted;
            scope.execute(move || {
                for i in 0..OPS_PER_THREAD / 4 {
                    let key = (t * 17 + i * 13) % 500;
                    let hash = spread_hash(key);
                    match i % 8 {
                        0 => {
                            cache.erase(&key, hash);
                        }
                        1 if t == 0 && i % 512 == 1 => {
                            cache.prune();
                        }
                        2 => {
                            if let Some(h) = cache.lookup(&key, hash) {
                                cache.add_charge(&h, 1);
                                cache.release(h);
                            }
                        }
                        _ => {
                            let counter = Arc::clone(deleted);
                            let h = cache
                                .insert_with_deleter(key, hash, i, 1, move |_, _| {
                                    counter.fetch_add(1, Ordering::Relaxed);
                                })
                                .unwrap();
                            inserted.fetch_add(1, Ordering::Relaxed);
                            cache.release(h);
                        }
                    }
                }
            });
        }
    });

    cache.check_invariants().unwrap();
    cache.clear();
    assert!(cache.is_empty());
    assert_eq!(cache.usage(), 0);
    assert_eq!(
        deleted.load(Ordering::Relaxed),
        inserted.load(Ordering::Relaxed)
    );
}

/// Operations on an empty cache from many threads.
#[test]
fn stress_empty_cache() {
    let cache: ConcurrentLruCache<u64, u64> = ConcurrentLruCache::init(lru_config(100, 16));
    let mut pool = Pool::new(NUM_THREADS);

    pool.scoped(|scope| {
        for _ in 0..NUM_THREADS {
            let cache = &cache;
            scope.execute(move || {
                for key in 0..1000u64 {
                    assert!(cache.lookup(&key, spread_hash(key)).is_none());
                    assert!(!cache.erase(&key, spread_hash(key)));
                }
                cache.prune();
            });
        }
    });

    assert!(cache.is_empty());
    let metrics = cache.metrics_snapshot();
    assert_eq!(metrics.core.lookups, NUM_THREADS as u64 * 1000);
    assert_eq!(metrics.core.cache_hits, 0);
}
