use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use handle_lru::config::LruCacheConfig;
use handle_lru::LruCache;

fn make_lru<V>(capacity: usize) -> LruCache<u64, V> {
    LruCache::init(LruCacheConfig { capacity })
}

fn hash(key: u64) -> u32 {
    (key.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 32) as u32
}

pub fn criterion_benchmark(c: &mut Criterion) {
    const CACHE_SIZE: u64 = 1000;
    let mut group = c.benchmark_group("Cache Operations");

    {
        let mut cache = make_lru(CACHE_SIZE as usize);
        for i in 0..CACHE_SIZE {
            let h = cache.insert(i, hash(i), i, 1).unwrap();
            cache.release(h);
        }

        group.bench_function("LRU lookup hit", |b| {
            b.iter(|| {
                for i in 0..100 {
                    let key = i % CACHE_SIZE;
                    if let Some(h) = cache.lookup(&key, hash(key)) {
                        black_box(cache.value(&h));
                        cache.release(h);
                    }
                }
            });
        });

        group.bench_function("LRU lookup miss", |b| {
            b.iter(|| {
                for i in 0..100 {
                    let key = i + CACHE_SIZE;
                    black_box(cache.lookup(&key, hash(key)).is_none());
                }
            });
        });

        group.bench_function("LRU insert with eviction", |b| {
            let mut next = CACHE_SIZE;
            b.iter(|| {
                for _ in 0..100 {
                    let h = cache.insert(next, hash(next), next, 1).unwrap();
                    cache.release(h);
                    next += 1;
                }
            });
        });

        group.bench_function("LRU replace existing key", |b| {
            b.iter(|| {
                let key = black_box(7);
                let h = cache.insert(key, hash(key), key, 1).unwrap();
                cache.release(h);
            });
        });
    }

    {
        let mut cache = make_lru::<u64>(usize::MAX);
        group.bench_function("LRU insert/erase table resize", |b| {
            b.iter(|| {
                for i in 0..1024 {
                    let h = cache.insert(i, hash(i), i, 1).unwrap();
                    cache.release(h);
                }
                for i in 0..1024 {
                    black_box(cache.erase(&i, hash(i)));
                }
            });
        });
    }

    group.finish();
}

pub fn charge_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("Charged Blocks");

    for block in [512usize, 4096, 65536] {
        group.bench_with_input(BenchmarkId::new("block cache", block), &block, |b, &block| {
            let mut cache: LruCache<u64, Vec<u8>> = make_lru(64 * block);
            let mut key = 0u64;
            b.iter(|| {
                let k = key % 256;
                let h = match cache.lookup(&k, hash(k)) {
                    Some(h) => h,
                    None => cache.insert(k, hash(k), vec![0; block], block).unwrap(),
                };
                black_box(cache.value(&h).len());
                cache.release(h);
                key += 1;
            });
        });
    }

    group.finish();
}

criterion_group!(benches, criterion_benchmark, charge_benchmark);
criterion_main!(benches);
