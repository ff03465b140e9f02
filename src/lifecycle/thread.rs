//! Per-thread cache registry.
//!
//! The thread-local lifecycle keeps one object cache per OS thread,
//! created lazily on that thread's first access. Lookup uses the
//! read-then-write double-checked pattern so steady-state access takes
//! only the read lock.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::thread::ThreadId;

use crate::lifecycle::ObjectCache;

/// Lazily-populated map of thread id to cache.
#[derive(Default)]
pub struct ThreadLocalCaches {
    caches: RwLock<HashMap<ThreadId, Arc<ObjectCache>>>,
}

impl ThreadLocalCaches {
    pub fn new() -> Self {
        Self::default()
    }

    /// The calling thread's cache, created on first access.
    pub fn for_current(&self) -> Arc<ObjectCache> {
        let id = std::thread::current().id();

        // Fast path: the cache already exists (read lock only)
        {
            let caches = self.caches.read().unwrap();
            if let Some(cache) = caches.get(&id) {
                return cache.clone();
            }
        }

        // Slow path: create under the write lock
        let mut caches = self.caches.write().unwrap();

        // Double-check after acquiring write lock
        if let Some(cache) = caches.get(&id) {
            return cache.clone();
        }

        let cache = Arc::new(ObjectCache::new("thread"));
        caches.insert(id, cache.clone());
        cache
    }

    /// Dispose and drop every thread's cache.
    pub fn dispose_all(&self) {
        let drained: Vec<Arc<ObjectCache>> = {
            let mut caches = self.caches.write().unwrap();
            caches.drain().map(|(_, c)| c).collect()
        };
        for cache in drained {
            cache.dispose_and_clear();
        }
    }

    /// Number of threads that have a cache.
    pub fn thread_count(&self) -> usize {
        self.caches.read().unwrap().len()
    }
}
