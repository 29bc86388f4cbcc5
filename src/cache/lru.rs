// Byte-bounded LRU engine
//
// Accounts entries as key length plus value size and evicts from the cold
// end until the budget holds. Not safe for concurrent use; `MainCache`
// serializes access.

use lru::LruCache;

use crate::cache::Measured;

/// Invoked with the evicted entry after it has been removed
pub type EvictionCallback<V> = Box<dyn Fn(String, V) + Send + Sync>;

/// LRU cache bounded by total byte size
///
/// An entry accounts for `key.len() + value.size()` bytes. `max_bytes == 0`
/// disables the cap. The recency list is `lru::LruCache`; this type layers
/// the byte accounting and the eviction callback on top of it.
pub struct ByteLru<V: Measured> {
    max_bytes: usize,
    used_bytes: usize,
    entries: LruCache<String, V>,
    on_evicted: Option<EvictionCallback<V>>,
}

impl<V: Measured> ByteLru<V> {
    /// Create a cache with the given byte budget
    pub fn new(max_bytes: usize, on_evicted: Option<EvictionCallback<V>>) -> Self {
        Self {
            max_bytes,
            used_bytes: 0,
            entries: LruCache::unbounded(),
            on_evicted,
        }
    }

    /// Look up a key, promoting it to most-recently-used on a hit
    pub fn get(&mut self, key: &str) -> Option<&V> {
        self.entries.get(key)
    }

    /// Look up a key without touching recency
    #[allow(dead_code)]
    pub fn peek(&self, key: &str) -> Option<&V> {
        self.entries.peek(key)
    }

    /// Insert or update a value, then evict until the budget holds
    pub fn add(&mut self, key: &str, value: V) {
        let incoming = value.size();
        match self.entries.put(key.to_string(), value) {
            Some(old) => {
                self.used_bytes = self.used_bytes - old.size() + incoming;
            }
            None => {
                self.used_bytes += key.len() + incoming;
            }
        }
        while self.max_bytes > 0 && self.used_bytes > self.max_bytes {
            self.remove_oldest();
        }
    }

    /// Remove an entry, reporting whether it existed
    pub fn delete(&mut self, key: &str) -> bool {
        match self.entries.pop(key) {
            Some(value) => {
                self.used_bytes -= key.len() + value.size();
                true
            }
            None => false,
        }
    }

    /// Evict the least-recently-used entry and fire the eviction callback
    pub fn remove_oldest(&mut self) {
        if let Some((key, value)) = self.entries.pop_lru() {
            self.used_bytes -= key.len() + value.size();
            if let Some(on_evicted) = &self.on_evicted {
                on_evicted(key, value);
            }
        }
    }

    /// Number of live entries
    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Bytes currently accounted to live entries
    #[allow(dead_code)]
    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }
}
