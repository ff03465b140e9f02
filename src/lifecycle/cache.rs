//! The object cache.
//!
//! One cache exists per lifecycle scope (singleton root, container,
//! thread, ambient). The cache is a memoization table: misses always
//! fall back to building, and a failed build leaves the entry empty so
//! a later attempt can retry. Construction is serialized per entry,
//! never per cache, so distinct entries build concurrently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::build::BuildError;
use crate::core::TypeKey;
use crate::instance::SharedObject;
use crate::util::InternedString;

/// Cache entry identity: plugin type plus instance name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub plugin_type: TypeKey,
    pub instance: InternedString,
}

impl CacheKey {
    pub fn new(plugin_type: TypeKey, instance: InternedString) -> Self {
        CacheKey {
            plugin_type,
            instance,
        }
    }
}

type Slot = Arc<Mutex<Option<SharedObject>>>;

/// A lifecycle scope's cache of built objects.
pub struct ObjectCache {
    label: &'static str,
    slots: Mutex<HashMap<CacheKey, Slot>>,
}

impl ObjectCache {
    pub fn new(label: &'static str) -> Self {
        ObjectCache {
            label,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Peek at a cached object without building.
    pub fn get(&self, key: CacheKey) -> Option<SharedObject> {
        let slot = {
            let slots = self.slots.lock().unwrap();
            slots.get(&key)?.clone()
        };
        let entry = slot.lock().unwrap();
        entry.clone()
    }

    /// Return the cached object, or build and store it.
    ///
    /// The entry's own lock is held for the duration of build + store,
    /// so concurrent first access builds exactly once. A failed build
    /// stores nothing; the entry stays retryable.
    pub fn get_or_build(
        &self,
        key: CacheKey,
        build: impl FnOnce() -> Result<SharedObject, BuildError>,
    ) -> Result<SharedObject, BuildError> {
        let slot = self.slot(key);
        let mut entry = slot.lock().unwrap();

        if let Some(object) = entry.as_ref() {
            tracing::trace!(
                "{} cache hit for {} (instance `{}`)",
                self.label,
                key.plugin_type,
                key.instance
            );
            return Ok(object.clone());
        }

        let object = build()?;
        *entry = Some(object.clone());
        tracing::debug!(
            "{} cache stored {} (instance `{}`)",
            self.label,
            key.plugin_type,
            key.instance
        );
        Ok(object)
    }

    /// Dispose every cached object and empty the cache.
    ///
    /// Disposal is best-effort: one failing disposer must not block
    /// freeing the rest, so errors are logged and swallowed.
    pub fn dispose_and_clear(&self) {
        let slots: Vec<Slot> = {
            let mut map = self.slots.lock().unwrap();
            map.drain().map(|(_, slot)| slot).collect()
        };

        for slot in slots {
            let object = slot.lock().unwrap().take();
            if let Some(object) = object {
                if let Err(e) = object.dispose() {
                    tracing::warn!("disposal failed in {} cache: {}", self.label, e);
                }
            }
        }
    }

    /// Dispose and drop every entry for one plugin type.
    pub fn eject(&self, plugin_type: TypeKey) {
        let slots: Vec<Slot> = {
            let mut map = self.slots.lock().unwrap();
            let keys: Vec<CacheKey> = map
                .keys()
                .filter(|k| k.plugin_type == plugin_type)
                .copied()
                .collect();
            keys.into_iter().filter_map(|k| map.remove(&k)).collect()
        };

        for slot in slots {
            let object = slot.lock().unwrap().take();
            if let Some(object) = object {
                if let Err(e) = object.dispose() {
                    tracing::warn!("disposal failed in {} cache: {}", self.label, e);
                }
            }
        }
    }

    /// Number of live cached objects.
    pub fn len(&self) -> usize {
        let slots: Vec<Slot> = {
            let map = self.slots.lock().unwrap();
            map.values().cloned().collect()
        };
        slots
            .iter()
            .filter(|slot| slot.lock().unwrap().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, key: CacheKey) -> Slot {
        let mut slots = self.slots.lock().unwrap();
        slots.entry(key).or_default().clone()
    }
}
