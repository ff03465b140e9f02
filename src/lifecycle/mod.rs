//! Lifecycles and scope context.
//!
//! A lifecycle is the caching policy a family is permanently bound to
//! at registration. The policy itself is just a selector: given the
//! explicit [`ScopeContext`] handle threaded through a resolution
//! call, it picks which cache (if any) backs the build. There is no
//! ambient environment detection; the hybrid policy consults the
//! caller-supplied ambient cache and falls back to thread-local.

pub mod cache;
pub mod thread;

pub use cache::{CacheKey, ObjectCache};
pub use thread::ThreadLocalCaches;

use std::sync::{Arc, Mutex};

use crate::instance::SharedObject;

/// Per-family caching policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// No cache; every resolution builds anew
    Transient,
    /// One object per container root, shared by child containers
    Singleton,
    /// One object per OS thread
    ThreadLocal,
    /// One object per container instance (root, child, or nested)
    ContainerScoped,
    /// Ambient scope when the caller supplies one, else thread-local
    Hybrid,
}

impl Lifecycle {
    pub fn describe(&self) -> &'static str {
        match self {
            Lifecycle::Transient => "transient",
            Lifecycle::Singleton => "singleton",
            Lifecycle::ThreadLocal => "thread-local",
            Lifecycle::ContainerScoped => "container-scoped",
            Lifecycle::Hybrid => "hybrid (ambient, else thread-local)",
        }
    }

    /// The cache backing this lifecycle in a given scope, if any.
    pub fn cache_for(&self, scope: &ScopeContext) -> Option<Arc<ObjectCache>> {
        match self {
            Lifecycle::Transient => None,
            Lifecycle::Singleton => Some(scope.singletons.clone()),
            Lifecycle::ThreadLocal => Some(scope.threads.for_current()),
            Lifecycle::ContainerScoped => Some(scope.local.clone()),
            Lifecycle::Hybrid => scope
                .ambient
                .clone()
                .or_else(|| Some(scope.threads.for_current())),
        }
    }
}

type ReleaseList = Arc<Mutex<Vec<SharedObject>>>;

/// The explicit scope handle threaded through resolution calls.
///
/// Child scopes share the root singleton cache and the thread cache
/// registry, but own a fresh container cache, so disposing a child
/// never touches objects owned by its parent or siblings.
pub struct ScopeContext {
    singletons: Arc<ObjectCache>,
    local: Arc<ObjectCache>,
    threads: Arc<ThreadLocalCaches>,
    ambient: Option<Arc<ObjectCache>>,
    released: Option<ReleaseList>,
}

impl ScopeContext {
    /// A fresh root scope.
    pub fn root() -> Self {
        ScopeContext {
            singletons: Arc::new(ObjectCache::new("singleton")),
            local: Arc::new(ObjectCache::new("container")),
            threads: Arc::new(ThreadLocalCaches::new()),
            ambient: None,
            released: None,
        }
    }

    /// A child scope: shared singletons, fresh container cache.
    pub fn child(&self) -> Self {
        ScopeContext {
            singletons: self.singletons.clone(),
            local: Arc::new(ObjectCache::new("container")),
            threads: self.threads.clone(),
            ambient: None,
            released: None,
        }
    }

    /// A view of this scope with an ambient cache for the hybrid
    /// lifecycle (e.g. one cache per request).
    pub fn with_ambient(&self, ambient: Arc<ObjectCache>) -> Self {
        ScopeContext {
            singletons: self.singletons.clone(),
            local: self.local.clone(),
            threads: self.threads.clone(),
            ambient: Some(ambient),
            released: self.released.clone(),
        }
    }

    /// Start tracking disposable transients for explicit release.
    pub fn enable_transient_tracking(&mut self) {
        if self.released.is_none() {
            self.released = Some(Arc::new(Mutex::new(Vec::new())));
        }
    }

    /// Record a transient for later release; only disposables are
    /// worth holding.
    pub fn track_transient(&self, object: &SharedObject) {
        if let Some(list) = &self.released {
            if object.has_disposer() {
                list.lock().unwrap().push(object.clone());
            }
        }
    }

    /// Dispose every tracked transient, best-effort.
    pub fn release_transients(&self) {
        let Some(list) = &self.released else {
            return;
        };
        let drained: Vec<SharedObject> = {
            let mut list = list.lock().unwrap();
            list.drain(..).collect()
        };
        for object in drained {
            if let Err(e) = object.dispose() {
                tracing::warn!("transient disposal failed: {}", e);
            }
        }
    }

    pub fn singletons(&self) -> &Arc<ObjectCache> {
        &self.singletons
    }

    pub fn local_cache(&self) -> &Arc<ObjectCache> {
        &self.local
    }

    pub fn thread_caches(&self) -> &Arc<ThreadLocalCaches> {
        &self.threads
    }

    pub fn ambient(&self) -> Option<&Arc<ObjectCache>> {
        self.ambient.as_ref()
    }
}
