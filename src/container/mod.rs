//! The container facade.
//!
//! A [`Container`] wires a sealed [`PluginGraph`] to a
//! [`ScopeContext`] and exposes the resolution surface. Child
//! containers share the root's singleton cache but own their
//! container-scoped cache, so disposing a child touches only what the
//! child built.

use std::sync::{Arc, RwLock};

use crate::build::{BuildError, BuildSession, ExplicitArguments};
use crate::core::{ConfigError, GraphError, PluginGraph, PluginGraphBuilder, TypeKey};
use crate::instance::SharedObject;
use crate::lifecycle::{ObjectCache, ScopeContext};
use crate::util::{ContainerConfig, InternedString};

/// The resolution entry point.
pub struct Container {
    graph: Arc<PluginGraph>,
    scope: ScopeContext,
    profile: RwLock<Option<InternedString>>,
    root: bool,
}

impl Container {
    /// Seal a builder and stand up a root container.
    pub fn new(builder: PluginGraphBuilder) -> Result<Self, ConfigError> {
        let graph = builder.seal()?;
        Ok(Self::from_graph(graph))
    }

    /// Seal a builder with config-driven profile selection: the
    /// configured default and machine profiles merge at seal, and the
    /// configured active profile (env var first) is selected if the
    /// graph knows it.
    pub fn with_config(
        mut builder: PluginGraphBuilder,
        config: &ContainerConfig,
    ) -> Result<Self, ConfigError> {
        builder.apply_config(config);
        let container = Self::new(builder)?;

        if let Some(name) = config.active_profile() {
            let name = InternedString::new(name);
            if container.graph.has_profile(name) {
                *container.profile.write().unwrap() = Some(name);
            } else {
                tracing::warn!("configured profile `{}` is not defined; using base defaults", name);
            }
        }

        Ok(container)
    }

    /// Wrap an already-sealed graph.
    pub fn from_graph(graph: PluginGraph) -> Self {
        Container {
            graph: Arc::new(graph),
            scope: ScopeContext::root(),
            profile: RwLock::new(None),
            root: true,
        }
    }

    /// A child container: same graph, shared singletons, fresh
    /// container-scoped cache. The active profile is inherited.
    pub fn child(&self) -> Container {
        Container {
            graph: self.graph.clone(),
            scope: self.scope.child(),
            profile: RwLock::new(*self.profile.read().unwrap()),
            root: false,
        }
    }

    /// A view of this container with an ambient cache for the hybrid
    /// lifecycle (e.g. one per request).
    pub fn scoped(&self, ambient: Arc<ObjectCache>) -> Container {
        Container {
            graph: self.graph.clone(),
            scope: self.scope.with_ambient(ambient),
            profile: RwLock::new(*self.profile.read().unwrap()),
            root: false,
        }
    }

    /// Track disposable transients this container builds, for
    /// deterministic release.
    pub fn enable_transient_tracking(&mut self) {
        self.scope.enable_transient_tracking();
    }

    // ------------------------------------------------------------------
    // Typed resolution
    // ------------------------------------------------------------------

    /// Resolve the default instance of `T`.
    pub fn get_instance<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, BuildError> {
        let object = self.resolve_keyed(TypeKey::of::<T>())?;
        self.downcast::<T>(TypeKey::of::<T>(), object)
    }

    /// Resolve a named instance of `T`.
    pub fn get_instance_named<T: Send + Sync + 'static>(
        &self,
        name: impl Into<InternedString>,
    ) -> Result<Arc<T>, BuildError> {
        let object = self.resolve_keyed_named(TypeKey::of::<T>(), name)?;
        self.downcast::<T>(TypeKey::of::<T>(), object)
    }

    /// Resolve the default instance of `T` with explicit argument
    /// overrides.
    pub fn get_instance_with<T: Send + Sync + 'static>(
        &self,
        arguments: ExplicitArguments,
    ) -> Result<Arc<T>, BuildError> {
        let object = self.resolve_keyed_with(TypeKey::of::<T>(), arguments)?;
        self.downcast::<T>(TypeKey::of::<T>(), object)
    }

    /// Resolve every registered instance of `T`, in registration
    /// order.
    pub fn get_all_instances<T: Send + Sync + 'static>(&self) -> Result<Vec<Arc<T>>, BuildError> {
        let key = TypeKey::of::<T>();
        let objects = self.session().resolve_all(key)?;
        objects
            .into_iter()
            .map(|o| self.downcast::<T>(key, o))
            .collect()
    }

    /// Non-throwing resolve: missing registrations become `None`,
    /// real build failures still propagate.
    pub fn try_get_instance<T: Send + Sync + 'static>(&self) -> Result<Option<Arc<T>>, BuildError> {
        match self.get_instance::<T>() {
            Ok(instance) => Ok(Some(instance)),
            Err(err) if err.is_missing_registration() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Non-throwing named resolve.
    pub fn try_get_instance_named<T: Send + Sync + 'static>(
        &self,
        name: impl Into<InternedString>,
    ) -> Result<Option<Arc<T>>, BuildError> {
        match self.get_instance_named::<T>(name) {
            Ok(instance) => Ok(Some(instance)),
            Err(err) if err.is_missing_registration() => Ok(None),
            Err(err) => Err(err),
        }
    }

    // ------------------------------------------------------------------
    // Keyed (type-erased) resolution
    // ------------------------------------------------------------------

    /// Resolve the default instance for a key.
    pub fn resolve_keyed(&self, plugin_type: TypeKey) -> Result<SharedObject, BuildError> {
        self.session().resolve(plugin_type)
    }

    /// Resolve a named instance for a key.
    pub fn resolve_keyed_named(
        &self,
        plugin_type: TypeKey,
        name: impl Into<InternedString>,
    ) -> Result<SharedObject, BuildError> {
        self.session().resolve_named(plugin_type, name.into())
    }

    /// Resolve the default instance for a key with explicit argument
    /// overrides.
    pub fn resolve_keyed_with(
        &self,
        plugin_type: TypeKey,
        arguments: ExplicitArguments,
    ) -> Result<SharedObject, BuildError> {
        BuildSession::with_arguments(
            self.graph.as_ref(),
            &self.scope,
            *self.profile.read().unwrap(),
            arguments,
        )
        .resolve(plugin_type)
    }

    /// Resolve every registered instance for a key.
    pub fn resolve_all_keyed(&self, plugin_type: TypeKey) -> Result<Vec<SharedObject>, BuildError> {
        self.session().resolve_all(plugin_type)
    }

    // ------------------------------------------------------------------
    // Profiles
    // ------------------------------------------------------------------

    /// Switch the active profile. The base graph is untouched; only
    /// which override map is consulted changes.
    pub fn set_profile(&self, name: impl Into<InternedString>) -> Result<(), GraphError> {
        let name = name.into();
        if !self.graph.has_profile(name) {
            return Err(GraphError::MissingProfile { name });
        }
        *self.profile.write().unwrap() = Some(name);
        Ok(())
    }

    /// Return to the base defaults.
    pub fn clear_profile(&self) {
        *self.profile.write().unwrap() = None;
    }

    pub fn active_profile(&self) -> Option<InternedString> {
        *self.profile.read().unwrap()
    }

    // ------------------------------------------------------------------
    // Scope management
    // ------------------------------------------------------------------

    /// Dispose every tracked transient this container built.
    pub fn release_transients(&self) {
        self.scope.release_transients();
    }

    /// Dispose this container's scope.
    ///
    /// A child disposes only its own container-scoped cache and
    /// tracked transients; the root also disposes the singleton and
    /// thread caches.
    pub fn dispose(&self) {
        tracing::debug!("Disposing {} container scope", if self.root { "root" } else { "child" });
        self.release_transients();
        self.scope.local_cache().dispose_and_clear();
        if self.root {
            self.scope.singletons().dispose_and_clear();
            self.scope.thread_caches().dispose_all();
        }
    }

    /// Dispose and drop cached objects of one plugin type from this
    /// container's own scope.
    pub fn eject_all_of(&self, plugin_type: TypeKey) {
        self.scope.local_cache().eject(plugin_type);
        if self.root {
            self.scope.singletons().eject(plugin_type);
        }
    }

    /// The sealed graph, for the read-only diagnostic surface.
    pub fn graph(&self) -> &PluginGraph {
        self.graph.as_ref()
    }

    fn session(&self) -> BuildSession<'_> {
        BuildSession::new(
            self.graph.as_ref(),
            &self.scope,
            *self.profile.read().unwrap(),
        )
    }

    fn downcast<T: Send + Sync + 'static>(
        &self,
        plugin_type: TypeKey,
        object: SharedObject,
    ) -> Result<Arc<T>, BuildError> {
        let produced = object.produced();
        object.shared::<T>().ok_or(BuildError::TypeMismatch {
            plugin: plugin_type,
            produced,
            requested: TypeKey::of::<T>().to_string(),
        })
    }
}
