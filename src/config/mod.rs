//! Cache Configuration Module
//!
//! Configuration structs have all public fields for simple instantiation:
//!
//! - **Simple**: Just create the struct with all fields set
//! - **Type safety**: All parameters must be provided at construction
//! - **No boilerplate**: No constructors or builder methods needed
//!
//! # Sizing
//!
//! Capacity is expressed in *charge units*, the same unit callers pass as the
//! `charge` of each insert. For a block cache that is usually bytes:
//!
//! ```text
//! capacity = memory budget for cached blocks
//! charge   = size of the block held by the entry
//! ```
//!
//! Per-entry bookkeeping (key, links, refcount) is not included in the
//! charge unless the caller adds it.
//!
//! A capacity of `0` turns caching off: inserts still hand back a working
//! handle, but nothing is retained once the handle is released.
//!
//! # Configs
//!
//! | Config | Cache |
//! |--------|-------|
//! | `LruCacheConfig` | [`LruCache`](crate::LruCache) |
//! | `ConcurrentLruCacheConfig` | `ConcurrentLruCache` (requires `concurrent` feature) |
//!
//! # Examples
//!
//! ```
//! use handle_lru::config::LruCacheConfig;
//! use handle_lru::LruCache;
//!
//! // 8MB block cache
//! let config = LruCacheConfig {
//!     capacity: 8 * 1024 * 1024,
//! };
//! let cache: LruCache<u64, Vec<u8>> = LruCache::init(config);
//! assert_eq!(cache.capacity(), 8 * 1024 * 1024);
//! ```

pub mod lru;

pub use lru::LruCacheConfig;

/// Generic configuration wrapper for concurrent caches.
///
/// Wraps a base cache configuration and adds the number of independently
/// locked shards. Shards are selected by the top bits of the caller-supplied
/// hash, so `segments` must be a power of two.
///
/// # Example
///
/// ```ignore
/// use handle_lru::config::{ConcurrentCacheConfig, ConcurrentLruCacheConfig, LruCacheConfig};
///
/// let config: ConcurrentLruCacheConfig = ConcurrentCacheConfig {
///     base: LruCacheConfig { capacity: 64 * 1024 * 1024 },
///     segments: 16,
/// };
/// ```
#[cfg(feature = "concurrent")]
#[derive(Clone, Copy)]
pub struct ConcurrentCacheConfig<C> {
    /// Base configuration; its capacity is the total across all shards.
    pub base: C,
    /// Number of shards. Must be a power of two.
    pub segments: usize,
}

#[cfg(feature = "concurrent")]
impl<C: core::fmt::Debug> core::fmt::Debug for ConcurrentCacheConfig<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ConcurrentCacheConfig")
            .field("base", &self.base)
            .field("segments", &self.segments)
            .finish()
    }
}

#[cfg(feature = "concurrent")]
/// Configuration for a concurrent LRU cache.
/// Type alias for `ConcurrentCacheConfig<LruCacheConfig>`.
pub type ConcurrentLruCacheConfig = ConcurrentCacheConfig<LruCacheConfig>;
