//! Open-generic recipes.
//!
//! An open registration (`Repository<>` served by `SqlRepository<>`)
//! cannot build anything by itself. When a closed request arrives, the
//! graph closes the recipe: argument keys are substituted into the
//! concrete type and parameter specs, and the parametrized builder
//! function is curried with the argument list. Dependencies pinned on
//! the open recipe (literal values and such) are carried over as-is;
//! type-shaped parameters are re-resolved against the closed keys.

use std::sync::Arc;

use crate::build::{BuildError, BuildSession};
use crate::core::TypeKey;
use crate::instance::constructor::{
    ArgumentSet, ConstructorInstance, ConstructorSpec, DependencyMap, ParamSpec,
};
use crate::instance::{
    disposer_for, DependencyEdge, Disposable, DisposerFn, Instance, InstanceMeta, Interceptor,
    ObjectBox, SharedObject,
};
use crate::util::InternedString;

type OpenBuildFn =
    Arc<dyn Fn(&[TypeKey], &mut ArgumentSet) -> anyhow::Result<ObjectBox> + Send + Sync>;

/// Template recipe registered against an open generic plugin type.
pub struct OpenGenericInstance {
    meta: InstanceMeta,
    concrete: TypeKey,
    params: Vec<ParamSpec>,
    build_fn: OpenBuildFn,
    pinned: DependencyMap,
    disposer: Option<DisposerFn>,
}

impl OpenGenericInstance {
    /// New template.
    ///
    /// `concrete` and the parameter types may contain
    /// [`TypeKey::parameter`] placeholders; the builder closure
    /// receives the closed argument keys alongside the resolved
    /// constructor arguments.
    pub fn new(
        concrete: TypeKey,
        params: Vec<ParamSpec>,
        build_fn: impl Fn(&[TypeKey], &mut ArgumentSet) -> anyhow::Result<ObjectBox>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        OpenGenericInstance {
            meta: InstanceMeta::anonymous("open"),
            concrete,
            params,
            build_fn: Arc::new(build_fn),
            pinned: DependencyMap::new(),
            disposer: None,
        }
    }

    pub fn named(mut self, name: impl Into<InternedString>) -> Self {
        self.meta.set_name(name);
        self
    }

    /// Pin a literal value; carried unchanged into every closed form.
    pub fn with_value<T: Send + Sync + 'static>(
        mut self,
        name: impl Into<InternedString>,
        value: T,
    ) -> Self {
        self.pinned.set_value(name, value);
        self
    }

    /// Pin a child recipe; carried unchanged into every closed form.
    pub fn with_dependency(
        mut self,
        name: impl Into<InternedString>,
        child: Arc<dyn Instance>,
    ) -> Self {
        self.pinned.set_named(name, child);
        self
    }

    pub fn intercept(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.meta.add_interceptor(interceptor);
        self
    }

    /// Register the closed product's disposal hook.
    pub fn disposable<T: Disposable + Send + Sync + 'static>(mut self) -> Self {
        self.disposer = Some(disposer_for::<T>());
        self
    }
}

impl Instance for OpenGenericInstance {
    fn name(&self) -> InternedString {
        self.meta.name()
    }

    fn returned_type(&self) -> Option<TypeKey> {
        Some(self.concrete)
    }

    fn build(
        &self,
        _plugin_type: TypeKey,
        _session: &mut BuildSession<'_>,
    ) -> Result<SharedObject, BuildError> {
        Err(BuildError::OpenRecipe {
            name: self.meta.name(),
        })
    }

    fn describe(&self) -> String {
        format!("open generic template for {}", self.concrete)
    }

    fn interceptors(&self) -> &[Arc<dyn Interceptor>] {
        self.meta.interceptors()
    }

    fn close_for(&self, args: &[TypeKey]) -> Option<Arc<dyn Instance>> {
        let closed_concrete = self.concrete.substitute(args);
        let closed_params: Vec<ParamSpec> = self
            .params
            .iter()
            .map(|p| ParamSpec::new(p.name, p.ty.substitute(args)))
            .collect();

        let build_fn = self.build_fn.clone();
        let arg_keys: Vec<TypeKey> = args.to_vec();
        let spec =
            ConstructorSpec::new(closed_params, move |set| (build_fn.as_ref())(&arg_keys, set));

        let mut closed = ConstructorInstance::new(closed_concrete)
            .named(self.meta.name())
            .constructor(spec)
            .with_disposer_fn(self.disposer.clone());
        for interceptor in self.meta.interceptors() {
            closed = closed.intercept(interceptor.clone());
        }

        // Pinned dependencies carry over unchanged
        for (name, child) in self.pinned.named_entries() {
            closed = closed.with_dependency(name, child.clone());
        }
        for (ty, child) in self.pinned.typed_entries() {
            closed = closed.with_typed_dependency(ty, child.clone());
        }

        Some(Arc::new(closed))
    }

    fn dependencies(&self) -> Vec<DependencyEdge> {
        self.params
            .iter()
            .map(|p| DependencyEdge {
                param: p.name,
                ty: p.ty,
                inline: self.pinned.satisfies(p),
            })
            .collect()
    }
}
