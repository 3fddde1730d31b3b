// SharedCache - Thread-safe LRU cache
// Used by the user directory so likers/feed resolution does not re-fetch
// the same profiles over and over within and across requests.

use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Mutex;

pub struct SharedCache<K, V> {
    inner: Mutex<LruCache<K, V>>,
}

impl<K: Hash + Eq, V: Clone> SharedCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is at least 1");
        SharedCache {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut cache = self.inner.lock().expect("cache lock poisoned");
        cache.get(key).cloned()
    }

    pub fn insert(&self, key: K, value: V) {
        let mut cache = self.inner.lock().expect("cache lock poisoned");
        cache.put(key, value);
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let mut cache = self.inner.lock().expect("cache lock poisoned");
        cache.pop(key)
    }

    pub fn clear(&self) {
        let mut cache = self.inner.lock().expect("cache lock poisoned");
        cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used() {
        let cache = SharedCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.get(&"a"), Some(1));
        cache.insert("c", 3);
        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"c"), Some(3));
    }

    #[test]
    fn remove_and_clear() {
        let cache = SharedCache::new(4);
        cache.insert("a", 1);
        assert_eq!(cache.remove(&"a"), Some(1));
        cache.insert("b", 2);
        cache.clear();
        assert_eq!(cache.get(&"b"), None);
    }
}
