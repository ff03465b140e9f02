//! Construction recipes.
//!
//! An [`Instance`] is a named recipe that knows how to produce one
//! object for a plugin type. Recipes are registered into plugin
//! families, selected by name or default, and built through a
//! [`BuildSession`](crate::build::BuildSession). The variants here
//! cover constructor wiring, pre-built literals, factory closures,
//! by-name references, sequences, prototypes, and conditional picks.

pub mod constructor;
pub mod generics;
pub mod interceptor;
pub mod selection;
pub mod sequence;
pub mod variants;

pub use constructor::{ArgumentSet, ConstructorInstance, ConstructorSpec, DependencyMap, ParamSpec};
pub use generics::OpenGenericInstance;
pub use interceptor::{Activator, Decorator, Interceptor, InterceptorPolicy};
pub use selection::{ConstructorPolicy, GreedyPolicy};
pub use sequence::SequenceInstance;
pub use variants::{
    ConditionalInstance, DefaultInstance, LambdaInstance, LiteralInstance, PrototypeInstance,
    ReferencedInstance,
};

use std::any::Any;
use std::sync::Arc;

use crate::build::{BuildError, BuildSession};
use crate::core::{ConfigError, TypeKey};
use crate::util::InternedString;

/// A freshly constructed, type-erased object.
pub type ObjectBox = Box<dyn Any + Send + Sync>;

/// Type-erased disposal hook bound to a cached object's concrete type.
pub type DisposerFn = Arc<dyn Fn(&(dyn Any + Send + Sync)) -> anyhow::Result<()> + Send + Sync>;

/// Objects that release resources when their owning scope is disposed.
pub trait Disposable {
    fn dispose(&self) -> anyhow::Result<()>;
}

/// A shared, type-erased built object.
///
/// This is what flows through the build pipeline, interceptors, and
/// lifecycle caches. Cloning shares the underlying allocation, so a
/// cached singleton hands the same live object to every caller.
#[derive(Clone)]
pub struct SharedObject {
    value: Arc<dyn Any + Send + Sync>,
    produced: TypeKey,
    disposer: Option<DisposerFn>,
}

impl SharedObject {
    /// Wrap a value.
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        SharedObject {
            value: Arc::new(value),
            produced: TypeKey::of::<T>(),
            disposer: None,
        }
    }

    /// Wrap a value that participates in scope disposal.
    pub fn disposable<T: Disposable + Send + Sync + 'static>(value: T) -> Self {
        SharedObject {
            value: Arc::new(value),
            produced: TypeKey::of::<T>(),
            disposer: Some(disposer_for::<T>()),
        }
    }

    /// Wrap an already-boxed value under an explicit key.
    pub fn from_box(value: ObjectBox, produced: TypeKey) -> Self {
        SharedObject {
            value: Arc::from(value),
            produced,
            disposer: None,
        }
    }

    /// Wrap an already-boxed value with a disposal hook.
    pub fn from_box_with_disposer(
        value: ObjectBox,
        produced: TypeKey,
        disposer: Option<DisposerFn>,
    ) -> Self {
        SharedObject {
            value: Arc::from(value),
            produced,
            disposer,
        }
    }

    /// The key of the concrete type this object was built as.
    pub fn produced(&self) -> TypeKey {
        self.produced
    }

    /// Borrow the object as a concrete type.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Clone the object out as an owned value.
    pub fn extract<T: Clone + 'static>(&self) -> Option<T> {
        self.value.downcast_ref::<T>().cloned()
    }

    /// Share the object as an `Arc<T>`.
    pub fn shared<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.value.clone().downcast::<T>().ok()
    }

    /// Whether two handles point at the same live object.
    pub fn same_object(&self, other: &SharedObject) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }

    /// Whether a disposal hook is attached.
    pub fn has_disposer(&self) -> bool {
        self.disposer.is_some()
    }

    /// Run the disposal hook, if any.
    pub fn dispose(&self) -> anyhow::Result<()> {
        match &self.disposer {
            Some(hook) => (hook.as_ref())(self.value.as_ref()),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for SharedObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedObject")
            .field("produced", &self.produced)
            .field("disposable", &self.disposer.is_some())
            .finish()
    }
}

/// Build a disposal hook for a concrete type.
pub fn disposer_for<T: Disposable + Send + Sync + 'static>() -> DisposerFn {
    Arc::new(|any| match any.downcast_ref::<T>() {
        Some(value) => value.dispose(),
        None => Ok(()),
    })
}

/// A declared dependency of a recipe, for diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct DependencyEdge {
    /// Parameter or slot name
    pub param: InternedString,
    /// The dependency's plugin type
    pub ty: TypeKey,
    /// Whether an inline child recipe satisfies it (no graph lookup)
    pub inline: bool,
}

/// A named construction recipe for a plugin type.
///
/// Recipes are immutable once registered; names and interceptor lists
/// are fixed during registration via the variant builders.
pub trait Instance: Send + Sync {
    /// The instance name, unique within its family.
    fn name(&self) -> InternedString;

    /// The concrete type this recipe produces, when known statically.
    ///
    /// Indirect recipes (references, defaults) cannot know until build
    /// time and return `None`.
    fn returned_type(&self) -> Option<TypeKey>;

    /// Produce the object for one resolution request.
    fn build(
        &self,
        plugin_type: TypeKey,
        session: &mut BuildSession<'_>,
    ) -> Result<SharedObject, BuildError>;

    /// One-line human description of the recipe.
    fn describe(&self) -> String;

    /// Interceptors to run, in order, after this recipe builds.
    fn interceptors(&self) -> &[Arc<dyn Interceptor>] {
        &[]
    }

    /// Registration-time validation hook.
    ///
    /// Recipes that can detect a dead configuration (no usable
    /// constructor) fail here rather than at first build.
    fn validate_registration(&self, _plugin_type: TypeKey) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Seal-time hook to pin a constructor choice using the registered
    /// selection policies.
    fn select_constructor(
        &self,
        _plugin_type: TypeKey,
        _policies: &[Arc<dyn ConstructorPolicy>],
    ) {
    }

    /// Close an open-generic recipe against concrete arguments.
    ///
    /// Non-generic recipes return `None` and are carried into the
    /// closed family unchanged.
    fn close_for(&self, _args: &[TypeKey]) -> Option<Arc<dyn Instance>> {
        None
    }

    /// Declared dependencies, for the diagnostic surface.
    fn dependencies(&self) -> Vec<DependencyEdge> {
        Vec::new()
    }
}

/// Name and interceptor bookkeeping shared by every recipe variant.
#[derive(Clone)]
pub struct InstanceMeta {
    name: InternedString,
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InstanceMeta {
    /// Meta with a generated unique name.
    pub fn anonymous(prefix: &str) -> Self {
        InstanceMeta {
            name: InternedString::unique(prefix),
            interceptors: Vec::new(),
        }
    }

    pub fn name(&self) -> InternedString {
        self.name
    }

    pub fn set_name(&mut self, name: impl Into<InternedString>) {
        self.name = name.into();
    }

    pub fn add_interceptor(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.push(interceptor);
    }

    pub fn interceptors(&self) -> &[Arc<dyn Interceptor>] {
        &self.interceptors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_shared_object_round_trip() {
        let obj = SharedObject::new(42u32);

        assert_eq!(obj.extract::<u32>(), Some(42));
        assert!(obj.downcast_ref::<String>().is_none());
        assert_eq!(obj.produced(), TypeKey::of::<u32>());
    }

    #[test]
    fn test_clone_shares_the_object() {
        let obj = SharedObject::new(String::from("widget"));
        let other = obj.clone();

        assert!(obj.same_object(&other));
        let a = obj.shared::<String>().unwrap();
        let b = other.shared::<String>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_disposable_hook_runs() {
        static DISPOSED: AtomicBool = AtomicBool::new(false);

        struct Handle;
        impl Disposable for Handle {
            fn dispose(&self) -> anyhow::Result<()> {
                DISPOSED.store(true, Ordering::SeqCst);
                Ok(())
            }
        }

        let obj = SharedObject::disposable(Handle);
        assert!(obj.has_disposer());
        obj.dispose().unwrap();
        assert!(DISPOSED.load(Ordering::SeqCst));
    }
}
