//! Post-construction interception.
//!
//! Interceptors transform a freshly built object before it reaches the
//! lifecycle cache: activation callbacks observe it, decorators wrap it
//! in something else. Instance-level interceptors run in registration
//! order; graph-level [`InterceptorPolicy`] decorators run after them.

use std::sync::Arc;

use crate::build::BuildSession;
use crate::core::TypeKey;
use crate::instance::{Instance, SharedObject};

/// A post-construction transformation.
pub trait Interceptor: Send + Sync {
    /// The type this interceptor accepts, or `None` for any type.
    ///
    /// A declared accepted type is checked against the recipe's
    /// product at registration time; mismatches fail fast.
    fn accepts(&self) -> Option<TypeKey>;

    /// The type this interceptor hands back given its input type.
    fn produces(&self, input: TypeKey) -> TypeKey {
        input
    }

    /// Transform the built object.
    fn apply(
        &self,
        object: SharedObject,
        session: &mut BuildSession<'_>,
    ) -> anyhow::Result<SharedObject>;

    /// One-line description for diagnostics and error context.
    fn describe(&self) -> String;
}

type ActivateFn<T> = Arc<dyn Fn(&T) -> anyhow::Result<()> + Send + Sync>;

/// Runs a callback against the built object without replacing it.
pub struct Activator<T: Send + Sync + 'static> {
    label: String,
    run: ActivateFn<T>,
}

impl<T: Send + Sync + 'static> Activator<T> {
    pub fn new(
        label: impl Into<String>,
        run: impl Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        Activator {
            label: label.into(),
            run: Arc::new(run),
        }
    }
}

impl<T: Send + Sync + 'static> Interceptor for Activator<T> {
    fn accepts(&self) -> Option<TypeKey> {
        Some(TypeKey::of::<T>())
    }

    fn apply(
        &self,
        object: SharedObject,
        _session: &mut BuildSession<'_>,
    ) -> anyhow::Result<SharedObject> {
        match object.downcast_ref::<T>() {
            Some(value) => (self.run.as_ref())(value)?,
            None => anyhow::bail!(
                "activator `{}` expected {}, got {}",
                self.label,
                TypeKey::of::<T>(),
                object.produced()
            ),
        }
        Ok(object)
    }

    fn describe(&self) -> String {
        format!("activate: {}", self.label)
    }
}

type DecorateFn<T, U> = Arc<dyn Fn(Arc<T>) -> anyhow::Result<U> + Send + Sync>;

/// Replaces the built object with a wrapper.
pub struct Decorator<T: Send + Sync + 'static, U: Send + Sync + 'static> {
    label: String,
    wrap: DecorateFn<T, U>,
}

impl<T: Send + Sync + 'static, U: Send + Sync + 'static> Decorator<T, U> {
    pub fn new(
        label: impl Into<String>,
        wrap: impl Fn(Arc<T>) -> anyhow::Result<U> + Send + Sync + 'static,
    ) -> Self {
        Decorator {
            label: label.into(),
            wrap: Arc::new(wrap),
        }
    }
}

impl<T: Send + Sync + 'static, U: Send + Sync + 'static> Interceptor for Decorator<T, U> {
    fn accepts(&self) -> Option<TypeKey> {
        Some(TypeKey::of::<T>())
    }

    fn produces(&self, _input: TypeKey) -> TypeKey {
        TypeKey::of::<U>()
    }

    fn apply(
        &self,
        object: SharedObject,
        _session: &mut BuildSession<'_>,
    ) -> anyhow::Result<SharedObject> {
        let inner = match object.shared::<T>() {
            Some(inner) => inner,
            None => anyhow::bail!(
                "decorator `{}` expected {}, got {}",
                self.label,
                TypeKey::of::<T>(),
                object.produced()
            ),
        };
        let wrapped = (self.wrap.as_ref())(inner)?;
        Ok(SharedObject::new(wrapped))
    }

    fn describe(&self) -> String {
        format!("decorate: {}", self.label)
    }
}

/// Graph-level interception: contributes decorators for every instance
/// of a plugin type at resolution time, after instance-level
/// interceptors have run.
pub trait InterceptorPolicy: Send + Sync {
    /// One-line description for diagnostics.
    fn describe(&self) -> String;

    /// Interceptors to append for this instance, in application order.
    fn interceptors_for(
        &self,
        plugin_type: TypeKey,
        instance: &dyn Instance,
    ) -> Vec<Arc<dyn Interceptor>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activator_declares_accepted_type() {
        struct Pump;
        let activator = Activator::<Pump>::new("prime the pump", |_| Ok(()));

        assert_eq!(activator.accepts(), Some(TypeKey::of::<Pump>()));
        assert_eq!(activator.produces(TypeKey::of::<Pump>()), TypeKey::of::<Pump>());
    }

    #[test]
    fn test_decorator_declares_output_type() {
        struct Inner;
        struct Wrapper(#[allow(dead_code)] Arc<Inner>);

        let decorator = Decorator::<Inner, Wrapper>::new("wrap", |inner| Ok(Wrapper(inner)));

        assert_eq!(decorator.accepts(), Some(TypeKey::of::<Inner>()));
        assert_eq!(
            decorator.produces(TypeKey::of::<Inner>()),
            TypeKey::of::<Wrapper>()
        );
    }
}
