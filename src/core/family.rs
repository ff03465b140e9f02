//! Plugin families.
//!
//! A family owns everything registered for one plugin type: its
//! lifecycle policy, the ordered named instances, which one is the
//! default, and an optional fallback recipe for unknown names.

use std::sync::Arc;

use crate::core::{rules, ConfigError, TypeKey};
use crate::instance::{ConstructorPolicy, Instance, Interceptor};
use crate::lifecycle::Lifecycle;
use crate::util::InternedString;

/// The set of instances and policy registered for one plugin type.
pub struct PluginFamily {
    plugin_type: TypeKey,
    lifecycle: Option<Lifecycle>,
    default_name: Option<InternedString>,
    instances: Vec<Arc<dyn Instance>>,
    fallback: Option<Arc<dyn Instance>>,
}

impl std::fmt::Debug for PluginFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginFamily")
            .field("plugin_type", &self.plugin_type)
            .field("lifecycle", &self.lifecycle)
            .field("default_name", &self.default_name)
            .field("instances", &self.instances.len())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

impl PluginFamily {
    pub fn new(plugin_type: TypeKey) -> Self {
        PluginFamily {
            plugin_type,
            lifecycle: None,
            default_name: None,
            instances: Vec::new(),
            fallback: None,
        }
    }

    pub fn plugin_type(&self) -> TypeKey {
        self.plugin_type
    }

    /// The lifecycle policy; `None` means transient.
    pub fn lifecycle(&self) -> Option<Lifecycle> {
        self.lifecycle
    }

    pub fn set_lifecycle(&mut self, lifecycle: Lifecycle) {
        self.lifecycle = Some(lifecycle);
    }

    /// Append a named instance.
    ///
    /// Fails fast on duplicate names, interceptor type mismatches, and
    /// recipes that can never build (no usable constructor).
    /// Re-registering the identical recipe is a no-op.
    pub fn add_instance(&mut self, instance: Arc<dyn Instance>) -> Result<(), ConfigError> {
        let name = instance.name();

        if let Some(existing) = self.find(name) {
            if Arc::ptr_eq(existing, &instance) {
                return Ok(());
            }
            return Err(ConfigError::DuplicateInstanceName {
                plugin: self.plugin_type,
                name,
            });
        }

        instance.validate_registration(self.plugin_type)?;
        self.check_interceptors(&instance)?;

        self.instances.push(instance);
        Ok(())
    }

    /// Append an instance and make it the family default.
    pub fn set_default(&mut self, instance: Arc<dyn Instance>) -> Result<(), ConfigError> {
        let name = instance.name();
        self.add_instance(instance)?;
        self.default_name = Some(name);
        Ok(())
    }

    /// Point the default at an already-registered name.
    pub fn set_default_name(&mut self, name: impl Into<InternedString>) {
        self.default_name = Some(name.into());
    }

    pub fn default_name(&self) -> Option<InternedString> {
        self.default_name
    }

    /// Install the fallback recipe consulted when a named lookup
    /// misses.
    pub fn set_missing_instance(&mut self, instance: Arc<dyn Instance>) {
        self.fallback = Some(instance);
    }

    /// Look up an instance by name, consulting the fallback recipe on
    /// a miss.
    pub fn instance(&self, name: InternedString) -> Option<&Arc<dyn Instance>> {
        self.find(name).or(self.fallback.as_ref())
    }

    /// Look up an instance strictly by name, never the fallback.
    pub fn named_instance(&self, name: InternedString) -> Option<&Arc<dyn Instance>> {
        self.find(name)
    }

    /// The fallback recipe, if one is installed.
    pub fn missing_instance(&self) -> Option<&Arc<dyn Instance>> {
        self.fallback.as_ref()
    }

    /// The effective default instance.
    ///
    /// An explicit default wins; a family with exactly one instance
    /// treats it as the implicit default; a multi-instance family with
    /// no explicit default has none.
    pub fn default_instance(&self) -> Option<&Arc<dyn Instance>> {
        if let Some(name) = self.default_name {
            return self.find(name);
        }
        if self.instances.len() == 1 {
            return self.instances.first();
        }
        None
    }

    /// All instances in registration order.
    pub fn instances(&self) -> &[Arc<dyn Instance>] {
        &self.instances
    }

    pub fn has_instance(&self, name: InternedString) -> bool {
        self.find(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Seal-time validation: the default must exist and every recipe
    /// gets its constructor choice pinned.
    pub(crate) fn validate(
        &self,
        policies: &[Arc<dyn ConstructorPolicy>],
    ) -> Result<(), ConfigError> {
        if let Some(name) = self.default_name {
            if self.find(name).is_none() {
                return Err(ConfigError::UnknownDefault {
                    plugin: self.plugin_type,
                    name,
                });
            }
        }

        for instance in &self.instances {
            instance.validate_registration(self.plugin_type)?;
            instance.select_constructor(self.plugin_type, policies);
        }
        if let Some(fallback) = &self.fallback {
            fallback.validate_registration(self.plugin_type)?;
            fallback.select_constructor(self.plugin_type, policies);
        }

        Ok(())
    }

    fn find(&self, name: InternedString) -> Option<&Arc<dyn Instance>> {
        self.instances.iter().find(|i| i.name() == name)
    }

    /// Walk the interceptor chain, checking each declared accepted
    /// type against the type flowing into it.
    fn check_interceptors(&self, instance: &Arc<dyn Instance>) -> Result<(), ConfigError> {
        let mut current = instance.returned_type();

        for interceptor in instance.interceptors() {
            if let (Some(flowing), Some(accepted)) = (current, interceptor.accepts()) {
                if !rules::can_cast(flowing, accepted) {
                    return Err(ConfigError::InterceptorMismatch {
                        plugin: self.plugin_type,
                        name: instance.name(),
                        interceptor: interceptor.describe(),
                        accepts: accepted,
                        produced: flowing,
                    });
                }
            }
            current = current.map(|t| interceptor.produces(t));
        }

        Ok(())
    }
}
