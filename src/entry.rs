//! Cache entries and the handles callers hold on them.
//!
//! An [`LruEntry`] carries the caller's key and value together with all of the
//! bookkeeping the cache needs: the caller-supplied hash, the charge, a
//! reference count, the `in_cache` flag, the hash-chain link used by
//! [`HashTable`](crate::table::HashTable) and the prev/next links used by the
//! in-use and lru lists.
//!
//! # Reference counting
//!
//! ```text
//!   refs == 1, in_cache      ──▶ lru list    (only the cache holds it)
//!   refs >= 2, in_cache      ──▶ in-use list (cache + at least one Handle)
//!   refs >= 1, !in_cache     ──▶ no list     (erased, Handles outstanding)
//!   refs == 0                ──▶ destroyed   (deleter has run)
//! ```
//!
//! A [`Handle`] is one counted reference. It is deliberately neither `Clone`
//! nor `Copy`: the only way to give the reference back is to pass the handle
//! by value to [`LruCache::release`](crate::LruCache::release), after which it
//! is gone.

extern crate alloc;

use crate::list::{Linked, Links};
use crate::slab::SlotId;
use crate::table::Chained;
use alloc::boxed::Box;
use core::fmt;

/// Callback run with the entry's key and value once its last reference is
/// released.
pub type Deleter<K, V> = Box<dyn FnOnce(K, V) + Send>;

pub(crate) struct LruEntry<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
    deleter: Option<Deleter<K, V>>,
    pub(crate) hash: u32,
    pub(crate) charge: usize,
    pub(crate) refs: u32,
    pub(crate) in_cache: bool,
    next_hash: Option<SlotId>,
    links: Links,
}

impl<K, V> LruEntry<K, V> {
    /// Creates an entry holding a single reference, owned by the caller.
    pub(crate) fn new(
        key: K,
        hash: u32,
        value: V,
        charge: usize,
        deleter: Option<Deleter<K, V>>,
    ) -> Self {
        LruEntry {
            key,
            value,
            deleter,
            hash,
            charge,
            refs: 1,
            in_cache: false,
            next_hash: None,
            links: Links::default(),
        }
    }

    /// Takes key and value back out without running the deleter.
    pub(crate) fn into_parts(self) -> (K, V) {
        (self.key, self.value)
    }

    /// Hands key and value to the deleter, or drops them if there is none.
    pub(crate) fn destroy(self) {
        let LruEntry {
            key,
            value,
            deleter,
            ..
        } = self;
        match deleter {
            Some(deleter) => deleter(key, value),
            None => drop((key, value)),
        }
    }
}

impl<K, V> Chained for LruEntry<K, V> {
    type Key = K;

    #[inline]
    fn chain_hash(&self) -> u32 {
        self.hash
    }

    #[inline]
    fn chain_key(&self) -> &K {
        &self.key
    }

    #[inline]
    fn next_in_chain(&self) -> Option<SlotId> {
        self.next_hash
    }

    #[inline]
    fn set_next_in_chain(&mut self, next: Option<SlotId>) {
        self.next_hash = next;
    }
}

impl<K, V> Linked for LruEntry<K, V> {
    #[inline]
    fn links(&self) -> &Links {
        &self.links
    }

    #[inline]
    fn links_mut(&mut self) -> &mut Links {
        &mut self.links
    }
}

impl<K: fmt::Debug, V> fmt::Debug for LruEntry<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruEntry")
            .field("key", &self.key)
            .field("hash", &self.hash)
            .field("charge", &self.charge)
            .field("refs", &self.refs)
            .field("in_cache", &self.in_cache)
            .finish()
    }
}

/// An owned reference to a cache entry, returned by
/// [`LruCache::lookup`](crate::LruCache::lookup) and
/// [`LruCache::insert`](crate::LruCache::insert).
///
/// While a handle is outstanding the entry cannot be evicted and its value
/// stays alive even if the key is erased or replaced. Every handle must be
/// returned with [`LruCache::release`](crate::LruCache::release) exactly
/// once; dropping it instead pins the entry until the cache itself is
/// dropped.
///
/// Handles are plain data and may be moved to other threads; only the final
/// `release` needs access to the owning cache.
#[must_use = "a Handle must be passed back to `release`, otherwise the entry is pinned"]
#[derive(PartialEq, Eq)]
pub struct Handle {
    cache: u32,
    slot: SlotId,
}

impl Handle {
    #[inline]
    pub(crate) fn new(cache: u32, slot: SlotId) -> Self {
        Handle { cache, slot }
    }

    #[inline]
    pub(crate) fn cache_id(&self) -> u32 {
        self.cache
    }

    #[inline]
    pub(crate) fn slot(&self) -> SlotId {
        self.slot
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("cache", &self.cache)
            .field("slot", &self.slot.index())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use core::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_new_entry_state() {
        let entry: LruEntry<&str, i32> = LruEntry::new("key", 7, 42, 3, None);
        assert_eq!(entry.refs, 1);
        assert!(!entry.in_cache);
        assert_eq!(entry.chain_hash(), 7);
        assert_eq!(*entry.chain_key(), "key");
        assert_eq!(entry.next_in_chain(), None);
        assert_eq!(entry.charge, 3);
    }

    #[test]
    fn test_destroy_runs_deleter_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let entry = LruEntry::new(
            "key",
            1,
            10,
            1,
            Some(Box::new(move |k: &str, v: i32| {
                assert_eq!(k, "key");
                assert_eq!(v, 10);
                seen.fetch_add(1, Ordering::SeqCst);
            }) as Deleter<&str, i32>),
        );
        entry.destroy();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_destroy_without_deleter_drops_value() {
        let value = Arc::new(());
        let entry = LruEntry::new(1u64, 1, Arc::clone(&value), 1, None);
        assert_eq!(Arc::strong_count(&value), 2);
        entry.destroy();
        assert_eq!(Arc::strong_count(&value), 1);
    }
}
