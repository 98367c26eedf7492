//! Decrypted content cache.
//!
//! Keyed by the string a location derives from its locator (and, for
//! remote content, the expected content hash). The cache has no
//! eviction policy of its own; writes are last-write-wins.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::{Result, StoreError};

/// Memoizes decrypted message content by locator.
pub trait ContentCache: Send + Sync {
    /// Look up plaintext for `locator`. `Ok(None)` is a miss.
    fn get(&self, locator: &str) -> Result<Option<Vec<u8>>>;

    /// Store plaintext for `locator`, replacing any previous entry.
    fn put(&self, locator: &str, plaintext: &[u8]) -> Result<()>;
}

/// In-memory [`ContentCache`].
#[derive(Debug, Default)]
pub struct MemoryContentCache {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryContentCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ContentCache for MemoryContentCache {
    fn get(&self, locator: &str) -> Result<Option<Vec<u8>>> {
        let entries = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(entries.get(locator).cloned())
    }

    fn put(&self, locator: &str, plaintext: &[u8]) -> Result<()> {
        self.entries
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .insert(locator.to_string(), plaintext.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_miss_then_hit() {
        let cache = MemoryContentCache::new();
        assert_eq!(cache.get("ipfs://a").unwrap(), None);

        cache.put("ipfs://a", b"hello").unwrap();
        assert_eq!(cache.get("ipfs://a").unwrap(), Some(b"hello".to_vec()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_last_write_wins() {
        let cache = MemoryContentCache::new();
        cache.put("k", b"one").unwrap();
        cache.put("k", b"two").unwrap();
        assert_eq!(cache.get("k").unwrap(), Some(b"two".to_vec()));
    }

    #[test]
    fn test_concurrent_access() {
        let cache = std::sync::Arc::new(MemoryContentCache::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    let locator = format!("loc-{}", i);
                    cache.put(&locator, &[i as u8]).unwrap();
                    cache.get(&locator).unwrap()
                })
            })
            .collect();
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.join().unwrap(), Some(vec![i as u8]));
        }
        assert_eq!(cache.len(), 8);
    }
}
