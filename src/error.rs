//! Error types for the cache.
//!
//! Only conditions a caller can act on are reported through [`CacheError`].
//! Misuse of the handle protocol (releasing a handle twice, clearing a cache
//! that still has handles outstanding, driving a charge negative) is a
//! programming error and panics instead.
//!
//! A failed insert reports [`InsertError`], which gives the key and value
//! back to the caller. It converts into [`CacheError`] for callers that only
//! need the reason.

extern crate alloc;

use alloc::string::String;
use core::fmt;

/// Errors reported by cache construction, insertion and invariant checking.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// The entry arena could not grow to hold a new entry.
    ///
    /// The cache state is exactly as it was before the failed insert.
    /// Produced from [`InsertError`].
    #[error("failed to allocate a cache entry (charge {charge})")]
    EntryAllocation {
        /// Charge of the entry that could not be created.
        charge: usize,
    },

    /// An internal invariant did not hold. Produced by `check_invariants`.
    #[error("cache invariant violated: {0}")]
    InvariantViolation(String),

    /// A configuration parameter was rejected.
    #[error("invalid cache configuration: {0}")]
    InvalidConfig(String),
}

/// Returned by `insert` when the entry could not be allocated.
///
/// The cache never took ownership of the value, so no deleter has run. The
/// key and value are handed back through [`into_inner`](Self::into_inner).
#[derive(thiserror::Error)]
#[error("failed to allocate a cache entry (charge {charge})")]
pub struct InsertError<K, V> {
    key: K,
    value: V,
    charge: usize,
}

impl<K, V> InsertError<K, V> {
    pub(crate) fn new(key: K, value: V, charge: usize) -> Self {
        InsertError { key, value, charge }
    }

    /// Charge of the entry that could not be created.
    pub fn charge(&self) -> usize {
        self.charge
    }

    /// Returns the rejected key and value.
    pub fn into_inner(self) -> (K, V) {
        (self.key, self.value)
    }
}

impl<K, V> fmt::Debug for InsertError<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InsertError")
            .field("charge", &self.charge)
            .finish_non_exhaustive()
    }
}

impl<K, V> From<InsertError<K, V>> for CacheError {
    fn from(err: InsertError<K, V>) -> Self {
        CacheError::EntryAllocation { charge: err.charge }
    }
}

impl CacheError {
    pub(crate) fn invariant(msg: impl Into<String>) -> Self {
        CacheError::InvariantViolation(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_error_messages() {
        let err = CacheError::EntryAllocation { charge: 42 };
        assert_eq!(
            err.to_string(),
            "failed to allocate a cache entry (charge 42)"
        );

        let err = CacheError::invariant("usage mismatch");
        assert_eq!(err.to_string(), "cache invariant violated: usage mismatch");
        assert!(matches!(err, CacheError::InvariantViolation(_)));
    }

    #[test]
    fn test_insert_error_returns_key_and_value() {
        let err = InsertError::new("block-7", alloc::vec![7u8; 3], 3);
        assert_eq!(err.charge(), 3);
        assert_eq!(
            err.to_string(),
            "failed to allocate a cache entry (charge 3)"
        );
        assert_eq!(alloc::format!("{err:?}"), "InsertError { charge: 3, .. }");

        let (key, value) = err.into_inner();
        assert_eq!(key, "block-7");
        assert_eq!(value, alloc::vec![7, 7, 7]);
    }

    #[test]
    fn test_insert_error_converts_to_cache_error() {
        let err: CacheError = InsertError::new(1u64, (), 42).into();
        assert_eq!(err, CacheError::EntryAllocation { charge: 42 });
    }
}
