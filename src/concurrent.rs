//! Concurrent Cache
//!
//! [`LruCache`](crate::LruCache) does no locking of its own. This module
//! layers the usual deployment pattern on top of it: the key space is split
//! across N independent caches ("segments" or shards), each behind its own
//! `parking_lot::Mutex`.
//!
//! # Architecture
//!
//! - The shard is picked from the **top** bits of the caller-supplied hash.
//!   Each shard's table buckets on the low bits of the same hash, so the two
//!   choices stay independent.
//! - Each operation locks exactly one shard.
//! - Handles are tagged with their shard, so `release` goes straight back to
//!   the right lock without needing the key or hash.
//!
//! ## Why Mutex Instead of RwLock?
//!
//! Every `lookup` mutates its shard: it bumps a reference count and moves
//! the entry between lists. A read lock would never be enough, so a plain
//! `Mutex` is both cheaper and more honest.
//!
//! ## Deleters
//!
//! Deleters run while their shard's lock is held. A deleter that calls back
//! into the same `ConcurrentLruCache` will deadlock if it lands on that
//! shard.
//!
//! # Example
//!
//! ```rust
//! use handle_lru::concurrent::ConcurrentLruCache;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let cache: Arc<ConcurrentLruCache<u64, u64>> = Arc::new(ConcurrentLruCache::new(1000));
//!
//! let workers: Vec<_> = (0..4u64)
//!     .map(|t| {
//!         let cache = Arc::clone(&cache);
//!         thread::spawn(move || {
//!             for i in 0..100u64 {
//!                 let key = t * 1000 + i;
//!                 let hash = (key.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 32) as u32;
//!                 let handle = cache.insert(key, hash, i, 1).unwrap();
//!                 cache.release(handle);
//!             }
//!         })
//!     })
//!     .collect();
//!
//! for w in workers {
//!     w.join().unwrap();
//! }
//! assert!(cache.usage() <= cache.capacity());
//! ```

mod lru;

pub use self::lru::{ConcurrentHandle, ConcurrentLruCache};

/// Default number of segments used by [`ConcurrentLruCache::new`].
#[inline]
pub fn default_segment_count() -> usize {
    16
}
