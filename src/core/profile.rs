//! Profiles - named layers of default-instance overrides.
//!
//! A profile maps plugin types to the instance that should be the
//! default while that profile is active. Overrides are recorded
//! loosely during registration (by reference or as a recipe) and
//! resolved into master instances at seal time. The machine profile
//! and the designated default profile merge into the base defaults;
//! every other profile is back-filled with the base defaults it does
//! not override.

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::{ConfigError, PluginFamily, TypeKey};
use crate::instance::Instance;
use crate::util::InternedString;

/// A raw override recorded before sealing.
pub enum ProfileOverride {
    /// Points at an instance registered in the family by name
    Reference(InternedString),
    /// Carries its own recipe, added to the family at seal time
    Recipe(Arc<dyn Instance>),
}

/// A named set of default overrides, pre-seal.
pub struct Profile {
    name: InternedString,
    overrides: HashMap<TypeKey, ProfileOverride>,
    order: Vec<TypeKey>,
}

impl Profile {
    pub fn new(name: impl Into<InternedString>) -> Self {
        Profile {
            name: name.into(),
            overrides: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn name(&self) -> InternedString {
        self.name
    }

    /// Override a plugin type's default with an already-registered
    /// instance, by name.
    pub fn set_reference(&mut self, plugin_type: TypeKey, name: impl Into<InternedString>) {
        self.record(plugin_type, ProfileOverride::Reference(name.into()));
    }

    /// Override a plugin type's default with a recipe of this
    /// profile's own.
    pub fn set_recipe(&mut self, plugin_type: TypeKey, recipe: Arc<dyn Instance>) {
        self.record(plugin_type, ProfileOverride::Recipe(recipe));
    }

    fn record(&mut self, plugin_type: TypeKey, over: ProfileOverride) {
        if self.overrides.insert(plugin_type, over).is_none() {
            self.order.push(plugin_type);
        }
    }
}

/// All profiles recorded during registration.
#[derive(Default)]
pub struct ProfileManager {
    profiles: HashMap<InternedString, Profile>,
    order: Vec<InternedString>,
}

impl ProfileManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create a profile.
    pub fn profile_mut(&mut self, name: impl Into<InternedString>) -> &mut Profile {
        let name = name.into();
        if !self.profiles.contains_key(&name) {
            self.profiles.insert(name, Profile::new(name));
            self.order.push(name);
        }
        self.profiles.get_mut(&name).unwrap()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = InternedString> + '_ {
        self.order.iter().copied()
    }

    /// Resolve and merge everything into an immutable lookup.
    ///
    /// In order: every raw override is resolved to a master instance
    /// in its owning family; the machine profile's defaults merge into
    /// the base; the designated default profile's defaults merge into
    /// the base; every named profile is back-filled with base defaults
    /// it does not override.
    pub(crate) fn seal(
        self,
        families: &mut HashMap<TypeKey, PluginFamily>,
        machine_profile: Option<InternedString>,
        default_profile: Option<InternedString>,
    ) -> Result<SealedProfiles, ConfigError> {
        let mut resolved: HashMap<InternedString, HashMap<TypeKey, Arc<dyn Instance>>> =
            HashMap::new();

        // 1. Resolve raw overrides into master instances
        for name in &self.order {
            let profile = &self.profiles[name];
            let mut map = HashMap::new();

            for plugin_type in &profile.order {
                let over = &profile.overrides[plugin_type];
                let family = families
                    .entry(*plugin_type)
                    .or_insert_with(|| PluginFamily::new(*plugin_type));

                let master: Arc<dyn Instance> = match over {
                    ProfileOverride::Reference(instance_name) => family
                        .named_instance(*instance_name)
                        .cloned()
                        .ok_or(ConfigError::UnknownProfileReference {
                            profile: *name,
                            plugin: *plugin_type,
                            name: *instance_name,
                        })?,
                    ProfileOverride::Recipe(recipe) => {
                        family.add_instance(recipe.clone())?;
                        recipe.clone()
                    }
                };

                map.insert(*plugin_type, master);
            }

            resolved.insert(*name, map);
        }

        // 2. Machine overrides become base defaults
        if let Some(machine) = machine_profile {
            match resolved.get(&machine) {
                Some(map) => {
                    for (plugin_type, instance) in map {
                        if let Some(family) = families.get_mut(plugin_type) {
                            family.set_default_name(instance.name());
                        }
                    }
                }
                None => tracing::warn!("machine profile `{}` has no overrides", machine),
            }
        }

        // 3. The designated default profile merges into the base
        if let Some(default) = default_profile {
            match resolved.get(&default) {
                Some(map) => {
                    for (plugin_type, instance) in map {
                        if let Some(family) = families.get_mut(plugin_type) {
                            family.set_default_name(instance.name());
                        }
                    }
                }
                None => tracing::warn!("default profile `{}` has no overrides", default),
            }
        }

        // 4. Back-fill every profile with the base defaults it does
        //    not override
        for map in resolved.values_mut() {
            for (plugin_type, family) in families.iter() {
                if !map.contains_key(plugin_type) {
                    if let Some(instance) = family.default_instance() {
                        map.insert(*plugin_type, instance.clone());
                    }
                }
            }
        }

        Ok(SealedProfiles { maps: resolved })
    }
}

/// Immutable per-profile default lookup, computed once at seal.
pub struct SealedProfiles {
    maps: HashMap<InternedString, HashMap<TypeKey, Arc<dyn Instance>>>,
}

impl std::fmt::Debug for SealedProfiles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedProfiles")
            .field("profiles", &self.maps.len())
            .finish()
    }
}

impl SealedProfiles {
    /// The active profile's default for a plugin type, if overridden.
    pub fn default_for(
        &self,
        profile: InternedString,
        plugin_type: TypeKey,
    ) -> Option<&Arc<dyn Instance>> {
        self.maps.get(&profile)?.get(&plugin_type)
    }

    pub fn has_profile(&self, name: InternedString) -> bool {
        self.maps.contains_key(&name)
    }

    pub fn names(&self) -> impl Iterator<Item = InternedString> + '_ {
        self.maps.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}
