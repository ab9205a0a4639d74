//! Concurrent LRU Cache Implementation
//!
//! A thread-safe LRU cache using lock striping over independent
//! [`LruCache`](crate::LruCache) instances.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                      ConcurrentLruCache                              │
//! │                                                                      │
//! │  hash >> (32 - log2 N)  ──▶  Segment Selection                       │
//! │                                                                      │
//! │  ┌──────────────┐ ┌──────────────┐     ┌──────────────┐              │
//! │  │  Segment 0   │ │  Segment 1   │ ... │  Segment N-1 │              │
//! │  │  ┌────────┐  │ │  ┌────────┐  │     │  ┌────────┐  │              │
//! │  │  │ Mutex  │  │ │  │ Mutex  │  │     │  │ Mutex  │  │              │
//! │  │  └────┬───┘  │ │  └────┬───┘  │     │  └────┬───┘  │              │
//! │  │  ┌────▼───┐  │ │  ┌────▼───┐  │     │  ┌────▼───┐  │              │
//! │  │  │LruCache│  │ │  │LruCache│  │     │  │LruCache│  │              │
//! │  │  └────────┘  │ │  └────────┘  │     │  └────────┘  │              │
//! │  └──────────────┘ └──────────────┘     └──────────────┘              │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Trade-offs
//!
//! - **Pros**: Near-linear scaling with thread count, no global lock
//! - **Cons**: LRU order and capacity are per segment. An entry can be
//!   evicted from one segment while another holds older entries, and one
//!   segment can evict while the cache as a whole is under capacity.

extern crate alloc;

use crate::config::ConcurrentLruCacheConfig;
use crate::entry::Handle;
use crate::error::{CacheError, InsertError};
use crate::lru::LruCache;
use crate::metrics::{CacheMetrics, LruCacheMetrics};
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::borrow::Borrow;
use core::fmt;
use parking_lot::Mutex;

/// A handle on an entry of a [`ConcurrentLruCache`].
///
/// Like [`Handle`], it must be passed back to
/// [`ConcurrentLruCache::release`] exactly once. It can be sent to another
/// thread and released there.
#[must_use = "a ConcurrentHandle must be passed back to `release`, otherwise the entry is pinned"]
#[derive(Debug, PartialEq, Eq)]
pub struct ConcurrentHandle {
    shard: usize,
    inner: Handle,
}

impl ConcurrentHandle {
    /// Index of the segment holding the entry.
    #[inline]
    pub fn segment(&self) -> usize {
        self.shard
    }
}

/// A thread-safe, sharded, reference-counted LRU cache.
///
/// The API mirrors [`LruCache`] but takes `&self`; value access goes through
/// closures so the segment lock is never held by the caller.
///
/// # Example
///
/// ```rust
/// use handle_lru::concurrent::ConcurrentLruCache;
/// use handle_lru::config::{ConcurrentCacheConfig, LruCacheConfig};
///
/// let cache: ConcurrentLruCache<String, Vec<u8>> = ConcurrentLruCache::init(ConcurrentCacheConfig {
///     base: LruCacheConfig { capacity: 1 << 20 },
///     segments: 8,
/// });
///
/// let h = cache.insert("blob".to_string(), 0xdead_beef, vec![1, 2, 3], 3).unwrap();
/// assert_eq!(cache.with_value(&h, |v| v.len()), 3);
/// cache.release(h);
/// ```
pub struct ConcurrentLruCache<K, V> {
    segments: Box<[Mutex<LruCache<K, V>>]>,
    shift: u32,
}

impl<K: Eq, V> ConcurrentLruCache<K, V> {
    /// Creates a concurrent cache, validating the configuration.
    ///
    /// The total capacity is divided evenly across segments, rounding up, so
    /// the summed segment capacity may exceed the configured capacity by less
    /// than one unit per segment.
    ///
    /// # Errors
    ///
    /// [`CacheError::InvalidConfig`] unless `segments` is a power of two.
    pub fn try_init(config: ConcurrentLruCacheConfig) -> Result<Self, CacheError> {
        let segment_count = config.segments;
        if !segment_count.is_power_of_two() || segment_count > 1 << 16 {
            return Err(CacheError::InvalidConfig(format!(
                "segments must be a power of two between 1 and 65536, got {segment_count}"
            )));
        }

        let segment_capacity = config.base.capacity.div_ceil(segment_count);
        let segments: Vec<_> = (0..segment_count)
            .map(|_| Mutex::new(LruCache::new(segment_capacity)))
            .collect();

        tracing::debug!(
            segments = segment_count,
            segment_capacity,
            "created concurrent lru cache"
        );
        Ok(Self {
            segments: segments.into_boxed_slice(),
            shift: 32 - segment_count.trailing_zeros(),
        })
    }

    /// Creates a concurrent cache.
    ///
    /// # Panics
    ///
    /// If the configuration is rejected by [`try_init`](Self::try_init).
    pub fn init(config: ConcurrentLruCacheConfig) -> Self {
        match Self::try_init(config) {
            Ok(cache) => cache,
            Err(err) => panic!("{err}"),
        }
    }

    /// Creates a cache with `capacity` total charge and the default segment count.
    pub fn new(capacity: usize) -> Self {
        Self::init(ConcurrentLruCacheConfig {
            base: crate::config::LruCacheConfig { capacity },
            segments: super::default_segment_count(),
        })
    }

    /// Segment for a hash: its top `log2(segments)` bits.
    #[inline]
    fn segment_index(&self, hash: u32) -> usize {
        hash.checked_shr(self.shift).unwrap_or(0) as usize
    }

    #[inline]
    fn segment_of(&self, handle: &ConcurrentHandle) -> &Mutex<LruCache<K, V>> {
        &self.segments[handle.shard]
    }

    /// Number of segments.
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Total capacity across all segments.
    pub fn capacity(&self) -> usize {
        self.segments.iter().map(|s| s.lock().capacity()).sum()
    }

    /// Total usage across all segments.
    ///
    /// Segments are locked one after another, so the result may be stale
    /// under concurrent modification.
    pub fn usage(&self) -> usize {
        self.segments.iter().map(|s| s.lock().usage()).sum()
    }

    /// Total number of cached entries across all segments.
    pub fn len(&self) -> usize {
        self.segments.iter().map(|s| s.lock().len()).sum()
    }

    /// Returns `true` if no segment holds a cached entry.
    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(|s| s.lock().is_empty())
    }

    /// See [`LruCache::lookup`].
    pub fn lookup<Q>(&self, key: &Q, hash: u32) -> Option<ConcurrentHandle>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        let shard = self.segment_index(hash);
        let inner = self.segments[shard].lock().lookup(key, hash)?;
        Some(ConcurrentHandle { shard, inner })
    }

    /// See [`LruCache::insert`].
    pub fn insert(
        &self,
        key: K,
        hash: u32,
        value: V,
        charge: usize,
    ) -> Result<ConcurrentHandle, InsertError<K, V>> {
        let shard = self.segment_index(hash);
        let inner = self.segments[shard].lock().insert(key, hash, value, charge)?;
        Ok(ConcurrentHandle { shard, inner })
    }

    /// See [`LruCache::insert_with_deleter`]. The deleter runs under the
    /// segment lock.
    pub fn insert_with_deleter<F>(
        &self,
        key: K,
        hash: u32,
        value: V,
        charge: usize,
        deleter: F,
    ) -> Result<ConcurrentHandle, InsertError<K, V>>
    where
        F: FnOnce(K, V) + Send + 'static,
    {
        let shard = self.segment_index(hash);
        let inner = self.segments[shard]
            .lock()
            .insert_with_deleter(key, hash, value, charge, deleter)?;
        Ok(ConcurrentHandle { shard, inner })
    }

    /// See [`LruCache::release`].
    pub fn release(&self, handle: ConcurrentHandle) {
        self.segment_of(&handle).lock().release(handle.inner);
    }

    /// See [`LruCache::erase`].
    pub fn erase<Q>(&self, key: &Q, hash: u32) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        self.segments[self.segment_index(hash)].lock().erase(key, hash)
    }

    /// Runs `f` on the value behind `handle` while holding its segment lock.
    pub fn with_value<F, R>(&self, handle: &ConcurrentHandle, f: F) -> R
    where
        F: FnOnce(&V) -> R,
    {
        let segment = self.segment_of(handle).lock();
        f(segment.value(&handle.inner))
    }

    /// Runs `f` on a mutable reference to the value behind `handle`.
    pub fn with_value_mut<F, R>(&self, handle: &ConcurrentHandle, f: F) -> R
    where
        F: FnOnce(&mut V) -> R,
    {
        let mut segment = self.segment_of(handle).lock();
        f(segment.value_mut(&handle.inner))
    }

    /// See [`LruCache::charge`].
    pub fn charge(&self, handle: &ConcurrentHandle) -> usize {
        self.segment_of(handle).lock().charge(&handle.inner)
    }

    /// See [`LruCache::is_cached`].
    pub fn is_cached(&self, handle: &ConcurrentHandle) -> bool {
        self.segment_of(handle).lock().is_cached(&handle.inner)
    }

    /// See [`LruCache::adjust_charge`].
    pub fn adjust_charge(&self, handle: &ConcurrentHandle, new_charge: usize) {
        self.segment_of(handle)
            .lock()
            .adjust_charge(&handle.inner, new_charge);
    }

    /// See [`LruCache::add_charge`].
    pub fn add_charge(&self, handle: &ConcurrentHandle, delta: i64) {
        self.segment_of(handle).lock().add_charge(&handle.inner, delta);
    }

    /// Evicts over-capacity entries in every segment. Returns the total evicted.
    pub fn evict_to_capacity(&self) -> usize {
        self.segments
            .iter()
            .map(|s| s.lock().evict_to_capacity())
            .sum()
    }

    /// Evicts every unreferenced entry in every segment.
    pub fn prune(&self) -> usize {
        self.segments.iter().map(|s| s.lock().prune()).sum()
    }

    /// Clears every segment.
    ///
    /// # Panics
    ///
    /// If any segment still has cached entries referenced by handles.
    /// Segments before the offending one have already been cleared.
    pub fn clear(&self) {
        for segment in self.segments.iter() {
            segment.lock().clear();
        }
    }

    /// Checks the invariants of every segment.
    pub fn check_invariants(&self) -> Result<(), CacheError> {
        for (index, segment) in self.segments.iter().enumerate() {
            segment.lock().check_invariants().map_err(|err| {
                CacheError::InvariantViolation(format!("segment {index}: {err}"))
            })?;
        }
        Ok(())
    }

    /// Metrics summed over all segments.
    pub fn metrics_snapshot(&self) -> LruCacheMetrics {
        let mut total = LruCacheMetrics::default();
        for segment in self.segments.iter() {
            total.accumulate(&segment.lock().metrics_snapshot());
        }
        total
    }
}

impl<K: Eq, V> CacheMetrics for ConcurrentLruCache<K, V> {
    fn metrics(&self) -> BTreeMap<String, f64> {
        self.metrics_snapshot().to_btreemap()
    }

    fn algorithm_name(&self) -> &'static str {
        "ConcurrentLRU"
    }
}

impl<K, V> fmt::Debug for ConcurrentLruCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentLruCache")
            .field("segment_count", &self.segments.len())
            .finish()
    }
}
