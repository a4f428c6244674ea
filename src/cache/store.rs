//! Volatile (in-process) cache tier.
//!
//! Holds only the rendered blob per key. There is no TTL, no capacity bound
//! and no eviction: entries live until they are invalidated or the process
//! exits.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::keys::CacheKey;
use super::lock::{read_or_recover, write_or_recover};

const SOURCE: &str = "cache::store";

/// Rendered content shared between the volatile tier and its readers.
pub type Content = Arc<str>;

/// Process-local mapping from [`CacheKey`] to rendered content.
///
/// Guards are never held across an `.await`, so every operation is a short
/// synchronous critical section.
#[derive(Default)]
pub struct VolatileStore {
    entries: RwLock<HashMap<CacheKey, Content>>,
}

impl VolatileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<Content> {
        read_or_recover(&self.entries, SOURCE, "get")
            .get(key)
            .cloned()
    }

    /// Store `content` under `key`, replacing any previous value.
    ///
    /// The shared handle is stored as-is; readers observe the same allocation.
    pub fn set(&self, key: CacheKey, content: Content) {
        write_or_recover(&self.entries, SOURCE, "set").insert(key, content);
    }

    pub fn delete(&self, key: &CacheKey) {
        write_or_recover(&self.entries, SOURCE, "delete").remove(key);
    }

    /// Snapshot of the keys present at the time of the call.
    pub fn keys(&self) -> Vec<CacheKey> {
        read_or_recover(&self.entries, SOURCE, "keys")
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        read_or_recover(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;
    use crate::cache::keys::normalize;

    #[test]
    fn set_then_get_returns_value_until_overwritten() {
        let store = VolatileStore::new();
        let key = normalize("/foo/bar");

        assert!(store.get(&key).is_none());

        store.set(key.clone(), Content::from("<html>1</html>"));
        assert_eq!(store.get(&key).as_deref(), Some("<html>1</html>"));

        store.set(key.clone(), Content::from("<html>2</html>"));
        assert_eq!(store.get(&key).as_deref(), Some("<html>2</html>"));
    }

    #[test]
    fn set_shares_the_stored_allocation() {
        let store = VolatileStore::new();
        let key = normalize("/shared");
        let content = Content::from("body");

        store.set(key.clone(), content.clone());
        let cached = store.get(&key).expect("cached content");

        assert!(Arc::ptr_eq(&content, &cached));
    }

    #[test]
    fn delete_missing_key_is_noop() {
        let store = VolatileStore::new();
        store.delete(&normalize("/missing"));
        assert!(store.is_empty());
    }

    #[test]
    fn keys_is_a_snapshot() {
        let store = VolatileStore::new();
        store.set(normalize("/a"), Content::from("a"));
        store.set(normalize("/b"), Content::from("b"));

        let mut snapshot = store.keys();
        store.set(normalize("/c"), Content::from("c"));
        store.delete(&normalize("/a"));

        snapshot.sort();
        assert_eq!(snapshot, vec![normalize("/a"), normalize("/b")]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn recovers_from_poisoned_lock() {
        let store = VolatileStore::new();

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = store
                .entries
                .write()
                .expect("entries lock should be acquired");
            panic!("poison entries lock");
        }));

        store.set(normalize("/after"), Content::from("ok"));
        assert_eq!(store.get(&normalize("/after")).as_deref(), Some("ok"));
    }
}
