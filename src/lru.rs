//! Reference-Counted LRU Cache
//!
//! A charge-bounded cache in the style of a storage engine block cache.
//! Callers hold entries through [`Handle`]s; while a handle is outstanding
//! the entry is pinned and cannot be evicted. Eviction is exact LRU over the
//! entries nobody references.
//!
//! # Structure
//!
//! ```text
//!                 ┌────────────────────── HashTable ───────────────────────┐
//!                 │  (hash, key) ──▶ slot                                  │
//!                 └────────────────────────────────────────────────────────┘
//!                                          │
//!   Slab<LruEntry>  ┌──────┬──────┬──────┬─┴────┬──────┐
//!                   │  A   │  B   │  C   │  D   │  E   │
//!                   └──────┴──────┴──────┴──────┴──────┘
//!
//!   in-use list:  B ◄──► E              (refs >= 2: cache + handles)
//!   lru list:     A ◄──► C ◄──► D       (refs == 1: cache only)
//!                 ▲ evicted first        ▲ most recently released
//! ```
//!
//! Every cached entry is in exactly one of the two lists. An entry that has
//! been erased or replaced while handles are still out is in neither list
//! and not in the table; it is destroyed when the last handle is released.
//!
//! # Hashing
//!
//! The cache never hashes keys. Every call takes the caller's 32-bit hash of
//! the key, and the caller must use the same hash function for the same key
//! on every call.
//!
//! # Thread Safety
//!
//! `LruCache` performs no locking. Wrap it in a mutex, or use
//! `ConcurrentLruCache` (feature `concurrent`) which shards the key space
//! over independently locked instances. Handles are plain data and may cross
//! threads freely.
//!
//! # Example
//!
//! ```
//! use handle_lru::LruCache;
//!
//! let mut cache: LruCache<&str, Vec<u8>> = LruCache::new(1024);
//!
//! let handle = cache.insert("block-7", 0x07, vec![0u8; 512], 512).unwrap();
//! assert_eq!(cache.value(&handle).len(), 512);
//! cache.release(handle);
//!
//! let handle = cache.lookup("block-7", 0x07).unwrap();
//! cache.release(handle);
//! assert!(cache.lookup("block-9", 0x09).is_none());
//! ```

extern crate alloc;

use crate::config::LruCacheConfig;
use crate::entry::{Deleter, Handle, LruEntry};
use crate::error::{CacheError, InsertError};
use crate::list::List;
use crate::metrics::{CacheMetrics, LruCacheMetrics};
use crate::slab::{Slab, SlotId};
use crate::table::HashTable;
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::String;
use core::borrow::Borrow;
use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

static NEXT_CACHE_ID: AtomicU32 = AtomicU32::new(1);

/// A fixed-capacity LRU cache with reference-counted entries.
///
/// Capacity and charges are in caller-defined units (usually bytes). The
/// summed charge of cached entries is the cache's *usage*; after every insert
/// the cache evicts unreferenced entries, least recently used first, until
/// usage fits the capacity or nothing evictable is left.
///
/// A capacity of `0` turns caching off: [`insert`](Self::insert) still
/// returns a usable handle, but the entry is never registered and is
/// destroyed as soon as that handle is released.
pub struct LruCache<K, V> {
    id: u32,
    config: LruCacheConfig,
    usage: usize,
    entries: Slab<LruEntry<K, V>>,
    table: HashTable,
    /// Cached entries with at least one outstanding handle, in no particular order.
    in_use: List,
    /// Cached entries only the cache references, least recently used first.
    lru: List,
    metrics: LruCacheMetrics,
}

impl<K: Eq, V> LruCache<K, V> {
    /// Creates a cache from a configuration.
    ///
    /// No heap memory is allocated until the first insert.
    pub fn init(config: LruCacheConfig) -> Self {
        LruCache {
            id: NEXT_CACHE_ID.fetch_add(1, Ordering::Relaxed),
            config,
            usage: 0,
            entries: Slab::new(),
            table: HashTable::new(),
            in_use: List::new(),
            lru: List::new(),
            metrics: LruCacheMetrics::new(config.capacity as u64),
        }
    }

    /// Creates a cache holding at most `capacity` charge units.
    pub fn new(capacity: usize) -> Self {
        Self::init(LruCacheConfig { capacity })
    }

    /// Configured capacity in charge units.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Summed charge of all cached entries.
    #[inline]
    pub fn usage(&self) -> usize {
        self.usage
    }

    /// `false` for a zero-capacity (pass-through) cache.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.config.capacity > 0
    }

    /// Number of cached entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if no entries are cached.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.table.len() == 0
    }

    /// Cached entries pinned by at least one handle.
    #[inline]
    pub fn in_use_len(&self) -> usize {
        self.in_use.len()
    }

    /// Cached entries eligible for eviction.
    #[inline]
    pub fn lru_len(&self) -> usize {
        self.lru.len()
    }

    /// Current bucket array length of the underlying hash table.
    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.table.bucket_count()
    }

    /// Looks up `key` and returns a handle on its entry.
    ///
    /// The entry stays pinned until the handle is released. An entry that
    /// was only held by the cache moves from the lru list to the in-use list.
    pub fn lookup<Q>(&mut self, key: &Q, hash: u32) -> Option<Handle>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        match self.table.find(&self.entries, key, hash) {
            Some(id) => {
                self.metrics.core.record_hit();
                self.ref_entry(id);
                Some(Handle::new(self.id, id))
            }
            None => {
                self.metrics.core.record_miss();
                None
            }
        }
    }

    /// Inserts `key` → `value` with the given charge and returns a handle on
    /// the new entry.
    ///
    /// An existing entry with the same key is replaced immediately; its value
    /// is dropped now if nothing references it, or when its last handle is
    /// released. Unreferenced entries are then evicted until usage fits the
    /// capacity. The new entry is pinned by the returned handle, so it is
    /// kept even if its charge alone exceeds the capacity.
    ///
    /// # Errors
    ///
    /// [`InsertError`] if the entry could not be allocated. The cache is left
    /// unchanged and the error gives `key` and `value` back.
    pub fn insert(
        &mut self,
        key: K,
        hash: u32,
        value: V,
        charge: usize,
    ) -> Result<Handle, InsertError<K, V>> {
        self.insert_entry(key, hash, value, charge, None)
    }

    /// Like [`insert`](Self::insert), but hands key and value to `deleter`
    /// instead of dropping them when the entry is destroyed.
    ///
    /// The deleter runs exactly once, while the cache is mutably borrowed,
    /// so it cannot call back into this cache. If the entry cannot be
    /// allocated the deleter is dropped without running and the key and
    /// value come back in the error.
    pub fn insert_with_deleter<F>(
        &mut self,
        key: K,
        hash: u32,
        value: V,
        charge: usize,
        deleter: F,
    ) -> Result<Handle, InsertError<K, V>>
    where
        F: FnOnce(K, V) + Send + 'static,
    {
        self.insert_entry(key, hash, value, charge, Some(Box::new(deleter)))
    }

    fn insert_entry(
        &mut self,
        key: K,
        hash: u32,
        value: V,
        charge: usize,
        deleter: Option<Deleter<K, V>>,
    ) -> Result<Handle, InsertError<K, V>> {
        let entry = LruEntry::new(key, hash, value, charge, deleter);
        let id = match self.entries.try_insert(entry) {
            Ok(id) => id,
            Err(entry) => {
                self.metrics.failed_inserts += 1;
                tracing::warn!(charge, "cache entry allocation failed");
                let (key, value) = entry.into_parts();
                return Err(InsertError::new(key, value, charge));
            }
        };
        self.metrics.core.record_insertion();

        if self.is_enabled() {
            let entry = &mut self.entries[id];
            entry.refs += 1;
            entry.in_cache = true;
            self.in_use.push_back(&mut self.entries, id);
            self.usage += charge;
            if let Some(old) = self.table.insert(&mut self.entries, id) {
                self.metrics.replacements += 1;
                tracing::trace!(hash, "replacing entry with duplicate key");
                self.finish_erase(old);
            }
        } else {
            self.metrics.pass_through_inserts += 1;
        }

        self.evict_to_capacity();
        Ok(Handle::new(self.id, id))
    }

    /// Gives back the reference held by `handle`.
    ///
    /// If this was the last reference to an entry that is no longer cached
    /// the entry is destroyed. If only the cache still references it, the
    /// entry becomes the most recently used eviction candidate.
    ///
    /// # Panics
    ///
    /// If `handle` was issued by a different cache.
    pub fn release(&mut self, handle: Handle) {
        let id = self.resolve(&handle);
        self.unref_entry(id);
    }

    /// Same as [`release`](Self::release).
    #[inline]
    pub fn unref(&mut self, handle: Handle) {
        self.release(handle);
    }

    /// Removes `key` from the cache. Returns `false` if it was not present.
    ///
    /// Outstanding handles on the entry stay valid; the entry is destroyed
    /// when the last of them is released.
    pub fn erase<Q>(&mut self, key: &Q, hash: u32) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        match self.table.remove(&mut self.entries, key, hash) {
            Some(id) => {
                self.metrics.erasures += 1;
                self.finish_erase(id);
                true
            }
            None => false,
        }
    }

    /// Evicts least recently used entries while usage exceeds capacity.
    /// Returns the number of entries evicted.
    ///
    /// Runs automatically after every insert; call it after changing
    /// charges.
    pub fn evict_to_capacity(&mut self) -> usize {
        let mut evicted = 0;
        while self.usage > self.config.capacity {
            let Some(id) = self.lru.front() else {
                break;
            };
            self.evict(id);
            evicted += 1;
        }
        if evicted > 0 {
            tracing::debug!(
                evicted,
                usage = self.usage,
                capacity = self.config.capacity,
                "evicted entries to fit capacity"
            );
        }
        evicted
    }

    /// Evicts every entry no handle references, regardless of capacity.
    /// Returns the number of entries evicted.
    pub fn prune(&mut self) -> usize {
        let mut pruned = 0;
        while let Some(id) = self.lru.front() {
            self.evict(id);
            pruned += 1;
        }
        tracing::debug!(pruned, usage = self.usage, "pruned unreferenced entries");
        pruned
    }

    /// Empties the cache and releases the hash table's bucket storage.
    ///
    /// Handles on entries that were already erased or replaced may still be
    /// outstanding and released later.
    ///
    /// # Panics
    ///
    /// If any cached entry is still referenced by a handle.
    pub fn clear(&mut self) {
        assert!(
            self.in_use.is_empty(),
            "clear() called while {} cached entries are still referenced by handles",
            self.in_use.len()
        );
        self.prune();
        self.table.reset();
    }

    /// Sets the charge of the entry behind `handle`, adjusting usage if the
    /// entry is cached. Does not evict.
    pub fn adjust_charge(&mut self, handle: &Handle, new_charge: usize) {
        let id = self.resolve(handle);
        let entry = &mut self.entries[id];
        let old_charge = core::mem::replace(&mut entry.charge, new_charge);
        if entry.in_cache {
            self.usage = self.usage - old_charge + new_charge;
        }
    }

    /// Same as [`adjust_charge`](Self::adjust_charge).
    #[inline]
    pub fn change_charge(&mut self, handle: &Handle, new_charge: usize) {
        self.adjust_charge(handle, new_charge);
    }

    /// Adds a signed delta to the charge of the entry behind `handle`.
    /// Does not evict.
    ///
    /// # Panics
    ///
    /// If the resulting charge would be negative or overflow.
    pub fn add_charge(&mut self, handle: &Handle, delta: i64) {
        let id = self.resolve(handle);
        let charge = self.entries[id].charge;
        let magnitude = delta.unsigned_abs() as usize;
        let new_charge = if delta >= 0 {
            charge.checked_add(magnitude)
        } else {
            charge.checked_sub(magnitude)
        };
        match new_charge {
            Some(new_charge) => self.adjust_charge(handle, new_charge),
            None => panic!("charge {charge} cannot be adjusted by {delta}"),
        }
    }

    /// The value of the entry behind `handle`.
    #[inline]
    pub fn value(&self, handle: &Handle) -> &V {
        &self.entries[self.resolve(handle)].value
    }

    /// Mutable access to the value of the entry behind `handle`.
    #[inline]
    pub fn value_mut(&mut self, handle: &Handle) -> &mut V {
        let id = self.resolve(handle);
        &mut self.entries[id].value
    }

    /// The key of the entry behind `handle`.
    #[inline]
    pub fn key(&self, handle: &Handle) -> &K {
        &self.entries[self.resolve(handle)].key
    }

    /// The charge of the entry behind `handle`.
    #[inline]
    pub fn charge(&self, handle: &Handle) -> usize {
        self.entries[self.resolve(handle)].charge
    }

    /// The hash the entry behind `handle` was inserted with.
    #[inline]
    pub fn hash(&self, handle: &Handle) -> u32 {
        self.entries[self.resolve(handle)].hash
    }

    /// Number of live references to the entry, including the cache's own.
    #[inline]
    pub fn ref_count(&self, handle: &Handle) -> u32 {
        self.entries[self.resolve(handle)].refs
    }

    /// Whether the entry is still a member of the cache (not erased,
    /// replaced or evicted).
    #[inline]
    pub fn is_cached(&self, handle: &Handle) -> bool {
        self.entries[self.resolve(handle)].in_cache
    }

    /// Current metrics, with gauges filled in from live state.
    pub fn metrics_snapshot(&self) -> LruCacheMetrics {
        let mut metrics = self.metrics.clone();
        let table = self.table.stats();
        metrics.core.usage = self.usage as u64;
        metrics.core.capacity = self.config.capacity as u64;
        metrics.entries = self.table.len() as u64;
        metrics.in_use_entries = self.in_use.len() as u64;
        metrics.table_buckets = self.table.bucket_count() as u64;
        metrics.table_resizes = table.resizes;
        metrics.table_resize_failures = table.failed_resizes;
        metrics
    }

    /// Verifies every structural invariant of the cache:
    ///
    /// - cached entries are in the table and in exactly one list;
    /// - uncached entries are in neither the table nor a list;
    /// - lru entries have one reference, in-use entries two or more;
    /// - usage equals the summed charge of cached entries;
    /// - the table's element count matches its chains.
    ///
    /// Walks every entry; meant for tests and debugging.
    pub fn check_invariants(&self) -> Result<(), CacheError> {
        const IN_LRU: u8 = 1;
        const IN_USE: u8 = 2;
        const IN_TABLE: u8 = 4;

        let mut marks: BTreeMap<SlotId, u8> = BTreeMap::new();

        let mut walked = 0;
        for id in self.lru.iter(&self.entries) {
            let entry = &self.entries[id];
            if !entry.in_cache {
                return Err(CacheError::invariant("lru list holds an uncached entry"));
            }
            if entry.refs != 1 {
                return Err(CacheError::invariant(format!(
                    "lru list holds an entry with {} references",
                    entry.refs
                )));
            }
            *marks.entry(id).or_default() |= IN_LRU;
            walked += 1;
        }
        if walked != self.lru.len() {
            return Err(CacheError::invariant(format!(
                "lru list records {} entries but links {walked}",
                self.lru.len()
            )));
        }

        walked = 0;
        for id in self.in_use.iter(&self.entries) {
            let entry = &self.entries[id];
            if !entry.in_cache {
                return Err(CacheError::invariant("in-use list holds an uncached entry"));
            }
            if entry.refs < 2 {
                return Err(CacheError::invariant(format!(
                    "in-use list holds an entry with {} references",
                    entry.refs
                )));
            }
            *marks.entry(id).or_default() |= IN_USE;
            walked += 1;
        }
        if walked != self.in_use.len() {
            return Err(CacheError::invariant(format!(
                "in-use list records {} entries but links {walked}",
                self.in_use.len()
            )));
        }

        self.table
            .check_chains(&self.entries, |id| *marks.entry(id).or_default() |= IN_TABLE)?;

        let mut usage = 0usize;
        let mut cached = 0usize;
        let mut live = 0usize;
        for (id, entry) in self.entries.iter() {
            live += 1;
            let mark = marks.get(&id).copied().unwrap_or(0);
            if entry.refs == 0 {
                return Err(CacheError::invariant("live entry with zero references"));
            }
            if entry.in_cache {
                cached += 1;
                usage += entry.charge;
                if mark & IN_TABLE == 0 {
                    return Err(CacheError::invariant("cached entry missing from the table"));
                }
                match mark & (IN_LRU | IN_USE) {
                    IN_LRU | IN_USE => {}
                    0 => return Err(CacheError::invariant("cached entry is in neither list")),
                    _ => return Err(CacheError::invariant("cached entry is in both lists")),
                }
            } else if mark != 0 {
                return Err(CacheError::invariant(
                    "uncached entry is still linked into the table or a list",
                ));
            }
        }

        if live != self.entries.len() {
            return Err(CacheError::invariant(format!(
                "entry arena counts {} live entries but holds {live}",
                self.entries.len()
            )));
        }
        if usage != self.usage {
            return Err(CacheError::invariant(format!(
                "usage is {} but cached charges sum to {usage}",
                self.usage
            )));
        }
        if cached != self.table.len() {
            return Err(CacheError::invariant(format!(
                "{cached} cached entries but the table holds {}",
                self.table.len()
            )));
        }
        if !self.is_enabled() && cached != 0 {
            return Err(CacheError::invariant("zero-capacity cache holds entries"));
        }
        Ok(())
    }

    /// Maps a handle to its slot, failing fast on handles that do not
    /// belong to this cache.
    #[track_caller]
    fn resolve(&self, handle: &Handle) -> SlotId {
        assert_eq!(
            handle.cache_id(),
            self.id,
            "handle was issued by a different cache"
        );
        let id = handle.slot();
        assert!(
            self.entries.contains(id),
            "handle refers to an entry that has already been destroyed"
        );
        id
    }

    fn ref_entry(&mut self, id: SlotId) {
        let entry = &mut self.entries[id];
        let first_handle = entry.in_cache && entry.refs == 1;
        entry.refs += 1;
        if first_handle {
            self.lru.unlink(&mut self.entries, id);
            self.in_use.push_back(&mut self.entries, id);
        }
    }

    fn unref_entry(&mut self, id: SlotId) {
        let entry = &mut self.entries[id];
        assert!(entry.refs > 0, "released an entry with no references");
        entry.refs -= 1;
        match (entry.refs, entry.in_cache) {
            (0, true) => panic!("cached entry dropped to zero references"),
            (0, false) => {
                if let Some(entry) = self.entries.remove(id) {
                    entry.destroy();
                    self.metrics.destroyed += 1;
                }
            }
            (1, true) => {
                self.in_use.unlink(&mut self.entries, id);
                self.lru.push_back(&mut self.entries, id);
            }
            _ => {}
        }
    }

    /// Evicts the lru entry `id` as `erase` would.
    fn evict(&mut self, id: SlotId) {
        let entry = &self.entries[id];
        assert_eq!(entry.refs, 1, "lru list holds a referenced entry");
        let charge = entry.charge;
        let removed = self.table.remove_slot(&mut self.entries, id);
        assert!(removed, "lru entry missing from the hash table");
        self.metrics.core.record_eviction(charge);
        self.finish_erase(id);
    }

    /// Completes removal of an entry already unlinked from the table: takes
    /// it off its list, subtracts its charge and drops the cache's reference.
    fn finish_erase(&mut self, id: SlotId) {
        let entry = &mut self.entries[id];
        assert!(entry.in_cache, "erasing an entry that is not cached");
        entry.in_cache = false;
        let charge = entry.charge;
        let list = if entry.refs == 1 {
            &mut self.lru
        } else {
            &mut self.in_use
        };
        list.unlink(&mut self.entries, id);
        self.usage -= charge;
        self.unref_entry(id);
    }
}

impl<K, V> Drop for LruCache<K, V> {
    fn drop(&mut self) {
        if !self.in_use.is_empty() {
            tracing::debug!(
                in_use = self.in_use.len(),
                "dropping cache with outstanding handles"
            );
        }
        for entry in self.entries.drain() {
            entry.destroy();
        }
    }
}

impl<K: Eq, V> CacheMetrics for LruCache<K, V> {
    fn metrics(&self) -> BTreeMap<String, f64> {
        self.metrics_snapshot().to_btreemap()
    }

    fn algorithm_name(&self) -> &'static str {
        "LRU"
    }
}

impl<K, V> fmt::Debug for LruCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruCache")
            .field("capacity", &self.config.capacity)
            .field("usage", &self.usage)
            .field("len", &self.table.len())
            .field("in_use", &self.in_use.len())
            .field("lru", &self.lru.len())
            .finish()
    }
}
