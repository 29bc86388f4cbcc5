// In-memory cache layer
//
// This module provides the byte-bounded LRU engine and the concurrent
// wrapper the group controller reads and writes through.

pub mod lru;

use parking_lot::RwLock;

use crate::cache::lru::ByteLru;
use crate::types::ByteView;

/// Values stored in the byte-bounded cache report their own size
pub trait Measured {
    /// Size of the value in bytes
    fn size(&self) -> usize;
}

/// Concurrent cache wrapper around [`ByteLru`]
///
/// The LRU is built lazily on the first write so an idle group costs
/// nothing. A `get` takes the write lock: a hit must promote the entry to
/// most-recently-used, and recency updates need exclusive access. The trade
/// is exact LRU order for lower read concurrency.
pub(crate) struct MainCache {
    cache_bytes: usize,
    lru: RwLock<Option<ByteLru<ByteView>>>,
}

impl MainCache {
    /// Create a wrapper with the given byte budget (0 disables the cap)
    pub fn new(cache_bytes: usize) -> Self {
        Self {
            cache_bytes,
            lru: RwLock::new(None),
        }
    }

    /// Get a value, promoting it to most-recently-used on a hit
    pub fn get(&self, key: &str) -> Option<ByteView> {
        let mut guard = self.lru.write();
        guard.as_mut()?.get(key).cloned()
    }

    /// Look at a value without touching recency
    #[allow(dead_code)]
    pub fn peek(&self, key: &str) -> Option<ByteView> {
        let guard = self.lru.read();
        guard.as_ref()?.peek(key).cloned()
    }

    /// Add a value, building the LRU on first use
    pub fn add(&self, key: &str, value: ByteView) {
        let mut guard = self.lru.write();
        guard
            .get_or_insert_with(|| ByteLru::new(self.cache_bytes, None))
            .add(key, value);
    }

    /// Delete a value; vacuous success when nothing was ever cached
    pub fn delete(&self, key: &str) -> bool {
        let mut guard = self.lru.write();
        match guard.as_mut() {
            Some(lru) => lru.delete(key),
            None => true,
        }
    }

    /// Number of live entries
    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.lru.read().as_ref().map_or(0, |lru| lru.len())
    }
}
