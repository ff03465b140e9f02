//! The plugin graph - the registry of families.
//!
//! Registration happens on a mutable [`PluginGraphBuilder`]; sealing
//! validates everything eagerly and produces an immutable
//! [`PluginGraph`] safe for concurrent reads. The only post-seal
//! mutation is synthesizing closed-generic families on first request,
//! behind its own narrowly-scoped lock.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::core::{
    rules, ConfigError, GraphError, PluginFamily, Profile, ProfileManager, SealedProfiles, TypeKey,
};
use crate::instance::{ConstructorPolicy, Instance, InterceptorPolicy};
use crate::lifecycle::Lifecycle;
use crate::util::{ContainerConfig, InternedString};

/// Mutable registration surface, consumed by [`seal`](Self::seal).
#[derive(Default)]
pub struct PluginGraphBuilder {
    families: HashMap<TypeKey, PluginFamily>,
    profiles: ProfileManager,
    constructor_policies: Vec<Arc<dyn ConstructorPolicy>>,
    interceptor_policies: Vec<Arc<dyn InterceptorPolicy>>,
    default_profile: Option<InternedString>,
    machine_profile: Option<InternedString>,
}

impl PluginGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the family for a plugin type.
    pub fn family_mut(&mut self, plugin_type: TypeKey) -> &mut PluginFamily {
        self.families
            .entry(plugin_type)
            .or_insert_with(|| PluginFamily::new(plugin_type))
    }

    /// Register a named instance.
    pub fn add_instance(
        &mut self,
        plugin_type: TypeKey,
        instance: Arc<dyn Instance>,
    ) -> Result<(), ConfigError> {
        self.family_mut(plugin_type).add_instance(instance)
    }

    /// Register an instance and make it the family default.
    pub fn set_default(
        &mut self,
        plugin_type: TypeKey,
        instance: Arc<dyn Instance>,
    ) -> Result<(), ConfigError> {
        self.family_mut(plugin_type).set_default(instance)
    }

    /// Set a family's lifecycle policy.
    pub fn set_lifecycle(&mut self, plugin_type: TypeKey, lifecycle: Lifecycle) {
        self.family_mut(plugin_type).set_lifecycle(lifecycle);
    }

    /// Install a family's missing-instance fallback recipe.
    pub fn set_missing_instance(&mut self, plugin_type: TypeKey, instance: Arc<dyn Instance>) {
        self.family_mut(plugin_type).set_missing_instance(instance);
    }

    /// Get or create a profile.
    pub fn profile_mut(&mut self, name: impl Into<InternedString>) -> &mut Profile {
        self.profiles.profile_mut(name)
    }

    /// Add a global constructor selection policy.
    ///
    /// Policies registered later take precedence.
    pub fn add_constructor_policy(&mut self, policy: Arc<dyn ConstructorPolicy>) {
        self.constructor_policies.push(policy);
    }

    /// Add a graph-level interceptor policy.
    pub fn add_interceptor_policy(&mut self, policy: Arc<dyn InterceptorPolicy>) {
        self.interceptor_policies.push(policy);
    }

    /// Name the profile whose overrides merge into the base defaults.
    pub fn set_default_profile(&mut self, name: impl Into<InternedString>) {
        self.default_profile = Some(name.into());
    }

    /// Name the machine profile merged into the base defaults at seal.
    pub fn set_machine_profile(&mut self, name: impl Into<InternedString>) {
        self.machine_profile = Some(name.into());
    }

    /// Apply profile selection from a config file: the configured
    /// default profile plus this machine's profile, if one matches.
    pub fn apply_config(&mut self, config: &ContainerConfig) {
        if let Some(default) = &config.profiles.default {
            self.set_default_profile(default.as_str());
        }
        if let Some(machine) = config.machine_profile() {
            tracing::info!("Using machine profile `{}`", machine);
            self.set_machine_profile(machine.as_str());
        }
    }

    /// Validate and freeze the graph.
    ///
    /// Profile overrides are resolved and merged first (they may add
    /// recipes to families), then every family is validated and each
    /// recipe's constructor choice is pinned.
    pub fn seal(mut self) -> Result<PluginGraph, ConfigError> {
        let sealed_profiles = self.profiles.seal(
            &mut self.families,
            self.machine_profile,
            self.default_profile,
        )?;

        for family in self.families.values() {
            family.validate(&self.constructor_policies)?;
        }

        tracing::info!(
            "Sealed plugin graph: {} families, {} profiles",
            self.families.len(),
            sealed_profiles.names().count()
        );

        Ok(PluginGraph {
            families: self
                .families
                .into_iter()
                .map(|(k, f)| (k, Arc::new(f)))
                .collect(),
            synthesized: RwLock::new(HashMap::new()),
            profiles: sealed_profiles,
            constructor_policies: self.constructor_policies,
            interceptor_policies: self.interceptor_policies,
        })
    }
}

/// The sealed, immutable registry.
///
/// Freely shared across threads for reads. Closed-generic families
/// synthesized after sealing live in a side table behind a lock that
/// guards only that mutation.
pub struct PluginGraph {
    families: HashMap<TypeKey, Arc<PluginFamily>>,
    synthesized: RwLock<HashMap<TypeKey, Arc<PluginFamily>>>,
    profiles: SealedProfiles,
    constructor_policies: Vec<Arc<dyn ConstructorPolicy>>,
    interceptor_policies: Vec<Arc<dyn InterceptorPolicy>>,
}

impl PluginGraph {
    /// Find the family for a plugin type.
    ///
    /// A closed-generic request with no direct registration is served
    /// by closing the open registration, caching the synthesized
    /// family for subsequent lookups. Missing families are a
    /// recoverable, catchable condition.
    pub fn find_family(&self, plugin_type: TypeKey) -> Result<Arc<PluginFamily>, GraphError> {
        if let Some(family) = self.families.get(&plugin_type) {
            return Ok(family.clone());
        }

        {
            let synthesized = self.synthesized.read().unwrap();
            if let Some(family) = synthesized.get(&plugin_type) {
                return Ok(family.clone());
            }
        }

        if let Some(open_key) = plugin_type.open_base() {
            if rules::closes_from(plugin_type, open_key) {
                if let Some(open) = self.families.get(&open_key) {
                    return self.close_family(open.clone(), plugin_type);
                }
            }
        }

        Err(GraphError::MissingPluginFamily {
            plugin: plugin_type,
        })
    }

    /// Whether a family exists without triggering generic closing.
    pub fn has_family(&self, plugin_type: TypeKey) -> bool {
        self.lookup_no_close(plugin_type).is_some()
    }

    /// Registered or already-synthesized family, without triggering
    /// generic closing. The read-only diagnostic surface goes through
    /// this so describing a graph never mutates it.
    pub fn registered_family(&self, plugin_type: TypeKey) -> Option<Arc<PluginFamily>> {
        self.lookup_no_close(plugin_type)
    }

    /// The lifecycle for a plugin type; absent families are transient.
    pub fn lifecycle_hint(&self, plugin_type: TypeKey) -> Lifecycle {
        self.lookup_no_close(plugin_type)
            .and_then(|f| f.lifecycle())
            .unwrap_or(Lifecycle::Transient)
    }

    /// The active profile's override for a plugin type, if any.
    pub fn profile_default(
        &self,
        profile: Option<InternedString>,
        plugin_type: TypeKey,
    ) -> Option<Arc<dyn Instance>> {
        let profile = profile?;
        self.profiles.default_for(profile, plugin_type).cloned()
    }

    pub fn has_profile(&self, name: InternedString) -> bool {
        self.profiles.has_profile(name)
    }

    /// Snapshot of every family, registered and synthesized, for the
    /// read-only diagnostic surface.
    pub fn families(&self) -> Vec<Arc<PluginFamily>> {
        let mut all: Vec<Arc<PluginFamily>> = self.families.values().cloned().collect();
        all.extend(self.synthesized.read().unwrap().values().cloned());
        all.sort_by_key(|f| f.plugin_type().to_string());
        all
    }

    pub fn constructor_policies(&self) -> &[Arc<dyn ConstructorPolicy>] {
        &self.constructor_policies
    }

    pub fn interceptor_policies(&self) -> &[Arc<dyn InterceptorPolicy>] {
        &self.interceptor_policies
    }

    fn lookup_no_close(&self, plugin_type: TypeKey) -> Option<Arc<PluginFamily>> {
        if let Some(family) = self.families.get(&plugin_type) {
            return Some(family.clone());
        }
        self.synthesized.read().unwrap().get(&plugin_type).cloned()
    }

    /// Synthesize the closed family under the write lock; the race is
    /// resolved by whoever inserts first, and losers pick up the
    /// winner's family.
    fn close_family(
        &self,
        open: Arc<PluginFamily>,
        closed_key: TypeKey,
    ) -> Result<Arc<PluginFamily>, GraphError> {
        let mut synthesized = self.synthesized.write().unwrap();

        if let Some(existing) = synthesized.get(&closed_key) {
            return Ok(existing.clone());
        }

        let family = self.close_into(&open, closed_key)?;
        let family = Arc::new(family);
        synthesized.insert(closed_key, family.clone());

        tracing::debug!("Closed {} from {}", closed_key, open.plugin_type());
        Ok(family)
    }

    fn close_into(
        &self,
        open: &PluginFamily,
        closed_key: TypeKey,
    ) -> Result<PluginFamily, GraphError> {
        let args = closed_key.args();
        let mut family = PluginFamily::new(closed_key);

        if let Some(lifecycle) = open.lifecycle() {
            family.set_lifecycle(lifecycle);
        }

        for instance in open.instances() {
            // Templates close against the arguments; anything else
            // (literals and such) carries over unchanged
            let closed = instance.close_for(args).unwrap_or_else(|| instance.clone());
            family
                .add_instance(closed)
                .map_err(|e| GraphError::CloseFailed {
                    plugin: closed_key,
                    reason: e.to_string(),
                })?;
        }

        if let Some(fallback) = open.missing_instance() {
            let closed = fallback.close_for(args).unwrap_or_else(|| fallback.clone());
            family.set_missing_instance(closed);
        }

        if let Some(name) = open.default_name() {
            family.set_default_name(name);
        }

        family
            .validate(&self.constructor_policies)
            .map_err(|e| GraphError::CloseFailed {
                plugin: closed_key,
                reason: e.to_string(),
            })?;

        Ok(family)
    }
}
