//! Constructor-based recipes.
//!
//! A [`ConstructorInstance`] holds a concrete type, one or more
//! candidate constructor specs, and a dependency map naming the child
//! recipes for specific parameters. Building resolves each parameter of
//! the selected constructor depth-first in declared order, then invokes
//! the constructor closure.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use anyhow::bail;

use crate::build::{BuildError, BuildSession};
use crate::core::{rules, ConfigError, TypeKey};
use crate::instance::selection::{choose_constructor, ConstructorPolicy};
use crate::instance::variants::LiteralInstance;
use crate::instance::{
    disposer_for, DependencyEdge, Disposable, DisposerFn, Instance, InstanceMeta, Interceptor,
    ObjectBox, SharedObject,
};
use crate::util::InternedString;

/// A declared constructor parameter: name plus dependency type.
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: InternedString,
    pub ty: TypeKey,
}

impl ParamSpec {
    pub fn new(name: impl Into<InternedString>, ty: TypeKey) -> Self {
        ParamSpec {
            name: name.into(),
            ty,
        }
    }
}

type InvokeFn = Arc<dyn Fn(&mut ArgumentSet) -> anyhow::Result<ObjectBox> + Send + Sync>;

/// One candidate constructor for a concrete type.
///
/// The invoke closure receives the resolved arguments in declared
/// parameter order and returns the boxed object.
#[derive(Clone)]
pub struct ConstructorSpec {
    params: Vec<ParamSpec>,
    invoke: InvokeFn,
    preferred: bool,
}

impl ConstructorSpec {
    pub fn new(
        params: Vec<ParamSpec>,
        invoke: impl Fn(&mut ArgumentSet) -> anyhow::Result<ObjectBox> + Send + Sync + 'static,
    ) -> Self {
        ConstructorSpec {
            params,
            invoke: Arc::new(invoke),
            preferred: false,
        }
    }

    /// Zero-parameter constructor.
    pub fn nullary(
        invoke: impl Fn() -> anyhow::Result<ObjectBox> + Send + Sync + 'static,
    ) -> Self {
        ConstructorSpec::new(Vec::new(), move |_| invoke())
    }

    /// Mark this candidate as the preferred constructor.
    ///
    /// The marker wins over the greedy heuristic but loses to an
    /// explicit selection policy.
    pub fn preferred(mut self) -> Self {
        self.preferred = true;
        self
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn is_preferred(&self) -> bool {
        self.preferred
    }

    pub(crate) fn invoke(&self, args: &mut ArgumentSet) -> anyhow::Result<ObjectBox> {
        (self.invoke.as_ref())(args)
    }
}

impl std::fmt::Debug for ConstructorSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstructorSpec")
            .field("params", &self.params)
            .field("preferred", &self.preferred)
            .finish()
    }
}

/// Child recipes keyed by parameter name or dependency type.
#[derive(Clone, Default)]
pub struct DependencyMap {
    by_name: HashMap<InternedString, Arc<dyn Instance>>,
    by_type: HashMap<TypeKey, Arc<dyn Instance>>,
}

impl DependencyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a child recipe to a parameter name.
    pub fn set_named(&mut self, name: impl Into<InternedString>, child: Arc<dyn Instance>) {
        self.by_name.insert(name.into(), child);
    }

    /// Bind a child recipe to every parameter of a dependency type.
    pub fn set_typed(&mut self, ty: TypeKey, child: Arc<dyn Instance>) {
        self.by_type.insert(ty, child);
    }

    /// Bind a literal value to a parameter name.
    pub fn set_value<T: Send + Sync + 'static>(
        &mut self,
        name: impl Into<InternedString>,
        value: T,
    ) {
        let name = name.into();
        self.by_name
            .insert(name, Arc::new(LiteralInstance::new(value).named(name)));
    }

    /// The child recipe for a parameter, name binding first.
    pub fn for_param(&self, param: &ParamSpec) -> Option<Arc<dyn Instance>> {
        self.by_name
            .get(&param.name)
            .or_else(|| self.by_type.get(&param.ty))
            .cloned()
    }

    /// Whether a parameter has an inline binding.
    pub fn satisfies(&self, param: &ParamSpec) -> bool {
        self.by_name.contains_key(&param.name) || self.by_type.contains_key(&param.ty)
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty() && self.by_type.is_empty()
    }

    /// Iterate name-bound children.
    pub fn named_entries(&self) -> impl Iterator<Item = (InternedString, &Arc<dyn Instance>)> {
        self.by_name.iter().map(|(n, c)| (*n, c))
    }

    /// Iterate type-bound children.
    pub fn typed_entries(&self) -> impl Iterator<Item = (TypeKey, &Arc<dyn Instance>)> {
        self.by_type.iter().map(|(t, c)| (*t, c))
    }
}

/// Resolved arguments handed to a constructor closure.
///
/// Values are taken out by parameter name; each may be taken once.
pub struct ArgumentSet {
    entries: Vec<(InternedString, Option<SharedObject>)>,
}

impl ArgumentSet {
    pub(crate) fn new(entries: Vec<(InternedString, Option<SharedObject>)>) -> Self {
        ArgumentSet { entries }
    }

    /// Take the raw shared object for a parameter.
    pub fn raw(&mut self, name: &str) -> anyhow::Result<SharedObject> {
        let slot = self
            .entries
            .iter_mut()
            .find(|(n, _)| n.as_str() == name)
            .map(|(_, v)| v);
        match slot {
            Some(value) => match value.take() {
                Some(obj) => Ok(obj),
                None => bail!("argument `{}` was already taken", name),
            },
            None => bail!("no argument named `{}`", name),
        }
    }

    /// Take a service argument as `Arc<T>`.
    pub fn shared<T: Send + Sync + 'static>(&mut self, name: &str) -> anyhow::Result<Arc<T>> {
        let obj = self.raw(name)?;
        match obj.shared::<T>() {
            Some(arc) => Ok(arc),
            None => bail!(
                "argument `{}` holds {}, not the requested type",
                name,
                obj.produced()
            ),
        }
    }

    /// Take a value argument by cloning it out.
    pub fn value<T: Clone + 'static>(&mut self, name: &str) -> anyhow::Result<T> {
        let obj = self.raw(name)?;
        match obj.extract::<T>() {
            Some(value) => Ok(value),
            None => bail!(
                "argument `{}` holds {}, not the requested type",
                name,
                obj.produced()
            ),
        }
    }

    /// Take a sequence argument as `Vec<Arc<T>>`, preserving order.
    pub fn sequence<T: Send + Sync + 'static>(&mut self, name: &str) -> anyhow::Result<Vec<Arc<T>>> {
        let obj = self.raw(name)?;
        let items = match obj.downcast_ref::<Vec<SharedObject>>() {
            Some(items) => items,
            None => bail!("argument `{}` is not a sequence", name),
        };

        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match item.shared::<T>() {
                Some(arc) => out.push(arc),
                None => bail!(
                    "sequence argument `{}` holds {}, not the requested element type",
                    name,
                    item.produced()
                ),
            }
        }
        Ok(out)
    }
}

/// Constructor-based recipe for a concrete type.
pub struct ConstructorInstance {
    meta: InstanceMeta,
    concrete: TypeKey,
    constructors: Vec<ConstructorSpec>,
    dependencies: DependencyMap,
    policy: Option<Arc<dyn ConstructorPolicy>>,
    disposer: Option<DisposerFn>,
    selected: OnceLock<usize>,
}

impl ConstructorInstance {
    pub fn new(concrete: TypeKey) -> Self {
        ConstructorInstance {
            meta: InstanceMeta::anonymous("ctor"),
            concrete,
            constructors: Vec::new(),
            dependencies: DependencyMap::new(),
            policy: None,
            disposer: None,
            selected: OnceLock::new(),
        }
    }

    /// Recipe for a Rust type.
    pub fn of<T: Send + Sync + 'static>() -> Self {
        Self::new(TypeKey::of::<T>())
    }

    pub fn named(mut self, name: impl Into<InternedString>) -> Self {
        self.meta.set_name(name);
        self
    }

    /// Add a candidate constructor.
    pub fn constructor(mut self, spec: ConstructorSpec) -> Self {
        self.constructors.push(spec);
        self
    }

    /// Bind a child recipe to a parameter name.
    pub fn with_dependency(
        mut self,
        name: impl Into<InternedString>,
        child: Arc<dyn Instance>,
    ) -> Self {
        self.dependencies.set_named(name, child);
        self
    }

    /// Bind a child recipe to a dependency type.
    pub fn with_typed_dependency(mut self, ty: TypeKey, child: Arc<dyn Instance>) -> Self {
        self.dependencies.set_typed(ty, child);
        self
    }

    /// Bind a literal value to a parameter name.
    pub fn with_value<T: Send + Sync + 'static>(
        mut self,
        name: impl Into<InternedString>,
        value: T,
    ) -> Self {
        self.dependencies.set_value(name, value);
        self
    }

    /// Attach a per-instance constructor selection policy.
    pub fn with_policy(mut self, policy: Arc<dyn ConstructorPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Append an interceptor.
    pub fn intercept(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.meta.add_interceptor(interceptor);
        self
    }

    /// Register the product type's disposal hook.
    pub fn disposable<T: Disposable + Send + Sync + 'static>(mut self) -> Self {
        self.disposer = Some(disposer_for::<T>());
        self
    }

    /// Carry over an already-erased disposal hook (generic closing).
    pub(crate) fn with_disposer_fn(mut self, disposer: Option<DisposerFn>) -> Self {
        self.disposer = disposer;
        self
    }

    pub fn concrete_type(&self) -> TypeKey {
        self.concrete
    }

    pub fn constructors(&self) -> &[ConstructorSpec] {
        &self.constructors
    }

    pub fn dependency_map(&self) -> &DependencyMap {
        &self.dependencies
    }

    /// The pinned constructor choice, computing the greedy fallback if
    /// no seal pass ran (synthesized instances built directly).
    fn selected_spec(&self) -> Option<&ConstructorSpec> {
        if self.constructors.is_empty() {
            return None;
        }
        let idx = *self.selected.get_or_init(|| {
            choose_constructor(
                self.concrete,
                &self.constructors,
                &self.dependencies,
                self.policy.as_deref(),
                &[],
            )
        });
        self.constructors.get(idx)
    }

    fn resolve_param(
        &self,
        plugin_type: TypeKey,
        param: &ParamSpec,
        session: &mut BuildSession<'_>,
    ) -> Result<SharedObject, BuildError> {
        // Explicit arguments override everything, by name then by type
        if let Some(value) = session.explicit_by_name(param.name) {
            return Ok(value);
        }
        if let Some(value) = session.explicit_by_type(param.ty) {
            return Ok(value);
        }

        if let Some(child) = self.dependencies.for_param(param) {
            return session.build_instance(param.ty, &child);
        }

        if rules::is_value_kind(param.ty) {
            return Err(BuildError::MissingValueArgument {
                param: param.name,
                instance: self.meta.name(),
                plugin: plugin_type,
            });
        }

        session.resolve(param.ty)
    }
}

impl Instance for ConstructorInstance {
    fn name(&self) -> InternedString {
        self.meta.name()
    }

    fn returned_type(&self) -> Option<TypeKey> {
        Some(self.concrete)
    }

    fn build(
        &self,
        plugin_type: TypeKey,
        session: &mut BuildSession<'_>,
    ) -> Result<SharedObject, BuildError> {
        let spec = self.selected_spec().ok_or_else(|| BuildError::ConstructionFailed {
            path: session.stack_path(),
            source: anyhow::anyhow!("{} has no usable constructor", self.concrete),
        })?;

        let mut resolved = Vec::with_capacity(spec.params().len());
        for param in spec.params() {
            let value = self.resolve_param(plugin_type, param, session)?;
            resolved.push((param.name, Some(value)));
        }

        let mut args = ArgumentSet::new(resolved);
        let boxed = spec
            .invoke(&mut args)
            .map_err(|source| BuildError::ConstructionFailed {
                path: session.stack_path(),
                source,
            })?;

        Ok(SharedObject::from_box_with_disposer(
            boxed,
            self.concrete,
            self.disposer.clone(),
        ))
    }

    fn describe(&self) -> String {
        match self.selected_spec() {
            Some(spec) => {
                let params: Vec<String> = spec
                    .params()
                    .iter()
                    .map(|p| format!("{}: {}", p.name, p.ty))
                    .collect();
                format!("new {}({})", self.concrete, params.join(", "))
            }
            None => format!("new {} (no constructor)", self.concrete),
        }
    }

    fn interceptors(&self) -> &[Arc<dyn Interceptor>] {
        self.meta.interceptors()
    }

    fn validate_registration(&self, plugin_type: TypeKey) -> Result<(), ConfigError> {
        if self.constructors.is_empty() {
            return Err(ConfigError::NoUsableConstructor {
                plugin: plugin_type,
                concrete: self.concrete,
                name: self.meta.name(),
            });
        }
        Ok(())
    }

    fn select_constructor(
        &self,
        _plugin_type: TypeKey,
        policies: &[Arc<dyn ConstructorPolicy>],
    ) {
        let _ = self.selected.set(choose_constructor(
            self.concrete,
            &self.constructors,
            &self.dependencies,
            self.policy.as_deref(),
            policies,
        ));
    }

    fn dependencies(&self) -> Vec<DependencyEdge> {
        let Some(spec) = self.selected_spec() else {
            return Vec::new();
        };
        spec.params()
            .iter()
            .map(|p| DependencyEdge {
                param: p.name,
                ty: p.ty,
                inline: self.dependencies.satisfies(p),
            })
            .collect()
    }
}
