//! Non-constructor recipe variants.
//!
//! Literal objects, factory closures, by-name references, family
//! defaults, prototype clones, and conditional picks. Each is a thin
//! implementation of [`Instance`]; the heavy lifting (cycle detection,
//! lifecycles, interception) lives in the build session.

use std::sync::Arc;

use crate::build::{BuildError, BuildSession};
use crate::core::TypeKey;
use crate::instance::{
    disposer_for, Disposable, DisposerFn, Instance, InstanceMeta, Interceptor, ObjectBox,
    SharedObject,
};
use crate::util::InternedString;

/// A pre-built object; building is a no-op return.
pub struct LiteralInstance {
    meta: InstanceMeta,
    object: SharedObject,
}

impl LiteralInstance {
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self::of_object(SharedObject::new(value))
    }

    /// Literal that participates in scope disposal.
    pub fn new_disposable<T: Disposable + Send + Sync + 'static>(value: T) -> Self {
        Self::of_object(SharedObject::disposable(value))
    }

    /// Wrap an already-erased object.
    pub fn of_object(object: SharedObject) -> Self {
        LiteralInstance {
            meta: InstanceMeta::anonymous("literal"),
            object,
        }
    }

    pub fn named(mut self, name: impl Into<InternedString>) -> Self {
        self.meta.set_name(name);
        self
    }

    pub fn intercept(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.meta.add_interceptor(interceptor);
        self
    }
}

impl Instance for LiteralInstance {
    fn name(&self) -> InternedString {
        self.meta.name()
    }

    fn returned_type(&self) -> Option<TypeKey> {
        Some(self.object.produced())
    }

    fn build(
        &self,
        _plugin_type: TypeKey,
        _session: &mut BuildSession<'_>,
    ) -> Result<SharedObject, BuildError> {
        Ok(self.object.clone())
    }

    fn describe(&self) -> String {
        format!("literal {}", self.object.produced())
    }

    fn interceptors(&self) -> &[Arc<dyn Interceptor>] {
        self.meta.interceptors()
    }
}

type FactoryFn = Arc<dyn Fn(&mut BuildSession<'_>) -> anyhow::Result<ObjectBox> + Send + Sync>;

/// A factory closure receiving the current build context.
pub struct LambdaInstance {
    meta: InstanceMeta,
    produced: TypeKey,
    factory: FactoryFn,
    disposer: Option<DisposerFn>,
}

impl LambdaInstance {
    pub fn new<T, F>(factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&mut BuildSession<'_>) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        LambdaInstance {
            meta: InstanceMeta::anonymous("lambda"),
            produced: TypeKey::of::<T>(),
            factory: Arc::new(move |session| Ok(Box::new(factory(session)?) as ObjectBox)),
            disposer: None,
        }
    }

    pub fn named(mut self, name: impl Into<InternedString>) -> Self {
        self.meta.set_name(name);
        self
    }

    pub fn intercept(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.meta.add_interceptor(interceptor);
        self
    }

    /// Register the product type's disposal hook.
    pub fn disposable<T: Disposable + Send + Sync + 'static>(mut self) -> Self {
        self.disposer = Some(disposer_for::<T>());
        self
    }
}

impl Instance for LambdaInstance {
    fn name(&self) -> InternedString {
        self.meta.name()
    }

    fn returned_type(&self) -> Option<TypeKey> {
        Some(self.produced)
    }

    fn build(
        &self,
        _plugin_type: TypeKey,
        session: &mut BuildSession<'_>,
    ) -> Result<SharedObject, BuildError> {
        let boxed = (self.factory.as_ref())(session).map_err(|source| BuildError::ConstructionFailed {
            path: session.stack_path(),
            source,
        })?;
        Ok(SharedObject::from_box_with_disposer(
            boxed,
            self.produced,
            self.disposer.clone(),
        ))
    }

    fn describe(&self) -> String {
        format!("factory closure producing {}", self.produced)
    }

    fn interceptors(&self) -> &[Arc<dyn Interceptor>] {
        self.meta.interceptors()
    }
}

/// Defers to another named instance of the same family.
///
/// The target is looked up at build time, not registration time, so a
/// profile can substitute what the name resolves to later.
pub struct ReferencedInstance {
    meta: InstanceMeta,
    target: InternedString,
}

impl ReferencedInstance {
    pub fn new(target: impl Into<InternedString>) -> Self {
        ReferencedInstance {
            meta: InstanceMeta::anonymous("ref"),
            target: target.into(),
        }
    }

    pub fn named(mut self, name: impl Into<InternedString>) -> Self {
        self.meta.set_name(name);
        self
    }

    pub fn target(&self) -> InternedString {
        self.target
    }
}

impl Instance for ReferencedInstance {
    fn name(&self) -> InternedString {
        self.meta.name()
    }

    fn returned_type(&self) -> Option<TypeKey> {
        None
    }

    fn build(
        &self,
        plugin_type: TypeKey,
        session: &mut BuildSession<'_>,
    ) -> Result<SharedObject, BuildError> {
        session.resolve_named(plugin_type, self.target)
    }

    fn describe(&self) -> String {
        format!("reference to `{}`", self.target)
    }

    fn interceptors(&self) -> &[Arc<dyn Interceptor>] {
        self.meta.interceptors()
    }
}

/// Defers to whatever is the registered default for the plugin type.
///
/// Resolution goes back through the family and active profile, never
/// through a captured reference, so profile switches take effect.
pub struct DefaultInstance {
    meta: InstanceMeta,
}

impl DefaultInstance {
    pub fn new() -> Self {
        DefaultInstance {
            meta: InstanceMeta::anonymous("default-of"),
        }
    }

    pub fn named(mut self, name: impl Into<InternedString>) -> Self {
        self.meta.set_name(name);
        self
    }
}

impl Default for DefaultInstance {
    fn default() -> Self {
        Self::new()
    }
}

impl Instance for DefaultInstance {
    fn name(&self) -> InternedString {
        self.meta.name()
    }

    fn returned_type(&self) -> Option<TypeKey> {
        None
    }

    fn build(
        &self,
        plugin_type: TypeKey,
        session: &mut BuildSession<'_>,
    ) -> Result<SharedObject, BuildError> {
        session.resolve(plugin_type)
    }

    fn describe(&self) -> String {
        "the configured default".to_string()
    }

    fn interceptors(&self) -> &[Arc<dyn Interceptor>] {
        self.meta.interceptors()
    }
}

/// Clones a template object on every build.
pub struct PrototypeInstance {
    meta: InstanceMeta,
    produced: TypeKey,
    clone_template: Arc<dyn Fn() -> ObjectBox + Send + Sync>,
}

impl PrototypeInstance {
    pub fn new<T: Clone + Send + Sync + 'static>(template: T) -> Self {
        PrototypeInstance {
            meta: InstanceMeta::anonymous("prototype"),
            produced: TypeKey::of::<T>(),
            clone_template: Arc::new(move || Box::new(template.clone()) as ObjectBox),
        }
    }

    pub fn named(mut self, name: impl Into<InternedString>) -> Self {
        self.meta.set_name(name);
        self
    }

    pub fn intercept(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.meta.add_interceptor(interceptor);
        self
    }
}

impl Instance for PrototypeInstance {
    fn name(&self) -> InternedString {
        self.meta.name()
    }

    fn returned_type(&self) -> Option<TypeKey> {
        Some(self.produced)
    }

    fn build(
        &self,
        _plugin_type: TypeKey,
        _session: &mut BuildSession<'_>,
    ) -> Result<SharedObject, BuildError> {
        Ok(SharedObject::from_box(
            (self.clone_template.as_ref())(),
            self.produced,
        ))
    }

    fn describe(&self) -> String {
        format!("clone of a {} template", self.produced)
    }

    fn interceptors(&self) -> &[Arc<dyn Interceptor>] {
        self.meta.interceptors()
    }
}

type CasePredicate = Arc<dyn Fn(&BuildSession<'_>) -> bool + Send + Sync>;

/// Ordered (predicate, recipe) cases with a designated fallback.
pub struct ConditionalInstance {
    meta: InstanceMeta,
    cases: Vec<(CasePredicate, Arc<dyn Instance>)>,
    fallback: Arc<dyn Instance>,
}

impl ConditionalInstance {
    pub fn new(fallback: Arc<dyn Instance>) -> Self {
        ConditionalInstance {
            meta: InstanceMeta::anonymous("conditional"),
            cases: Vec::new(),
            fallback,
        }
    }

    pub fn named(mut self, name: impl Into<InternedString>) -> Self {
        self.meta.set_name(name);
        self
    }

    /// Append a case; cases are evaluated in the order added.
    pub fn when(
        mut self,
        predicate: impl Fn(&BuildSession<'_>) -> bool + Send + Sync + 'static,
        recipe: Arc<dyn Instance>,
    ) -> Self {
        self.cases.push((Arc::new(predicate), recipe));
        self
    }
}

impl Instance for ConditionalInstance {
    fn name(&self) -> InternedString {
        self.meta.name()
    }

    fn returned_type(&self) -> Option<TypeKey> {
        None
    }

    fn build(
        &self,
        plugin_type: TypeKey,
        session: &mut BuildSession<'_>,
    ) -> Result<SharedObject, BuildError> {
        for (predicate, recipe) in &self.cases {
            if (predicate.as_ref())(session) {
                return session.build_instance(plugin_type, recipe);
            }
        }
        session.build_instance(plugin_type, &self.fallback)
    }

    fn describe(&self) -> String {
        format!(
            "conditional with {} case(s), falling back to `{}`",
            self.cases.len(),
            self.fallback.name()
        )
    }

    fn interceptors(&self) -> &[Arc<dyn Interceptor>] {
        self.meta.interceptors()
    }
}
