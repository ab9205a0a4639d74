//! Configuration for the reference-counted LRU cache.

use core::fmt;

/// Configuration for an [`LruCache`](crate::LruCache).
///
/// # Fields
///
/// - `capacity`: Upper bound on the summed charge of entries the cache keeps
///   once nothing references them. Entries pinned by outstanding handles are
///   never evicted, so usage can temporarily exceed this bound. `0` disables
///   caching entirely.
///
/// # Examples
///
/// ```
/// use handle_lru::config::LruCacheConfig;
/// use handle_lru::LruCache;
///
/// // Count-based cache: charge every entry as 1.
/// let config = LruCacheConfig { capacity: 1000 };
/// let cache: LruCache<String, i32> = LruCache::init(config);
///
/// // Pass-through mode.
/// let config = LruCacheConfig { capacity: 0 };
/// let cache: LruCache<String, i32> = LruCache::init(config);
/// assert!(!cache.is_enabled());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct LruCacheConfig {
    /// Total charge the cache retains before evicting.
    pub capacity: usize,
}

impl fmt::Debug for LruCacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruCacheConfig")
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_config_creation() {
        let config = LruCacheConfig {
            capacity: 10 * 1024 * 1024,
        };
        assert_eq!(config.capacity, 10 * 1024 * 1024);
    }

    #[test]
    fn test_lru_config_default_disables_caching() {
        assert_eq!(LruCacheConfig::default().capacity, 0);
    }
}
