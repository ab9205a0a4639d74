#![doc = include_str!("../README.md")]
//!
//! ---
//!
//! # Code Reference
//!
//! ## Entry lifecycle
//!
//! ```text
//!            insert                 release (last handle)
//!   ─────────────────▶ in-use ───────────────────────────▶ lru
//!                        ▲  │                                │
//!                 lookup │  │ erase / replaced               │ evicted / erase / prune
//!                        │  ▼                                ▼
//!                       lru  detached ── release (last) ──▶ destroyed
//! ```
//!
//! ## Quick Reference
//!
//! | Operation | Cost | Notes |
//! |-----------|------|-------|
//! | [`LruCache::lookup`] | O(1) avg | pins the entry, returns a [`Handle`] |
//! | [`LruCache::insert`] | O(1) avg + evictions | replaces an equal key |
//! | [`LruCache::release`] | O(1) | consumes the handle |
//! | [`LruCache::erase`] | O(1) avg | outstanding handles stay valid |
//! | [`LruCache::prune`] | O(unreferenced entries) | evicts everything unpinned |
//!
//! ## Example
//!
//! ```rust
//! use handle_lru::LruCache;
//! use handle_lru::config::LruCacheConfig;
//!
//! let mut cache: LruCache<u64, String> = LruCache::init(LruCacheConfig { capacity: 2 });
//!
//! // The caller supplies the hash; here the key is its own hash.
//! let a = cache.insert(1, 1, "one".to_string(), 1).unwrap();
//! cache.release(a);
//! let b = cache.insert(2, 2, "two".to_string(), 1).unwrap();
//! cache.release(b);
//!
//! // Touch 1, so 2 becomes the eviction candidate.
//! let h = cache.lookup(&1, 1).unwrap();
//! cache.release(h);
//!
//! let c = cache.insert(3, 3, "three".to_string(), 1).unwrap();
//! cache.release(c);
//!
//! assert!(cache.lookup(&2, 2).is_none());
//! let h = cache.lookup(&1, 1).unwrap();
//! assert_eq!(cache.value(&h), "one");
//! cache.release(h);
//! ```

#![no_std]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

/// Generational slot arena owning every cache entry.
pub(crate) mod slab;

/// Intrusive doubly linked list threaded through arena slots.
pub(crate) mod list;

/// Chained hash table with an inline bucket array and incremental resize.
pub(crate) mod table;

/// Cache entries and the [`Handle`] type callers hold on them.
pub mod entry;

/// Cache configuration structures.
pub mod config;

/// The reference-counted LRU cache.
pub mod lru;

/// Cache metrics system.
///
/// Provides a deterministic, `BTreeMap`-based report of counters and gauges
/// through the [`CacheMetrics`](metrics::CacheMetrics) trait.
pub mod metrics;

/// Error types.
pub mod error;

/// Sharded, independently locked caches for multi-threaded use.
///
/// Available when the `concurrent` feature is enabled.
#[cfg(feature = "concurrent")]
pub mod concurrent;

pub use entry::{Deleter, Handle};
pub use error::{CacheError, InsertError};
pub use lru::LruCache;

#[cfg(feature = "concurrent")]
pub use concurrent::{ConcurrentHandle, ConcurrentLruCache};
