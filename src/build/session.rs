//! The build session - one resolution request.
//!
//! A session is created per top-level resolution call and never shared
//! across requests. It owns the build stack, knows the active profile
//! and the explicit argument overrides, and drives the pipeline:
//! frame push, cycle check, lifecycle cache consult, recursive
//! dependency construction, interception, cache store, frame pop.

use std::collections::HashMap;

use std::sync::Arc;

use crate::build::stack::{BuildFrame, BuildStack};
use crate::build::BuildError;
use crate::core::{GraphError, PluginGraph, TypeKey};
use crate::instance::{Instance, Interceptor, InterceptorPolicy, SharedObject};
use crate::lifecycle::{CacheKey, ScopeContext};
use crate::util::InternedString;

/// Caller-supplied argument overrides for one resolution request.
///
/// A named override substitutes for any constructor parameter of that
/// name; a typed override substitutes for any parameter of that type.
/// Overrides win over every registered dependency.
#[derive(Clone, Default)]
pub struct ExplicitArguments {
    by_name: HashMap<InternedString, SharedObject>,
    by_type: HashMap<TypeKey, SharedObject>,
}

impl ExplicitArguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a value to a parameter name.
    pub fn with<T: Send + Sync + 'static>(mut self, name: impl Into<InternedString>, value: T) -> Self {
        self.by_name.insert(name.into(), SharedObject::new(value));
        self
    }

    /// Bind a value to every parameter of its type.
    pub fn with_typed<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.by_type.insert(TypeKey::of::<T>(), SharedObject::new(value));
        self
    }

    /// Bind an already-erased object to a parameter name.
    pub fn with_object(mut self, name: impl Into<InternedString>, object: SharedObject) -> Self {
        self.by_name.insert(name.into(), object);
        self
    }

    pub fn named(&self, name: InternedString) -> Option<&SharedObject> {
        self.by_name.get(&name)
    }

    pub fn typed(&self, ty: TypeKey) -> Option<&SharedObject> {
        self.by_type.get(&ty)
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty() && self.by_type.is_empty()
    }
}

/// Per-request build state.
pub struct BuildSession<'g> {
    graph: &'g PluginGraph,
    scope: &'g ScopeContext,
    profile: Option<InternedString>,
    explicit: ExplicitArguments,
    stack: BuildStack,
}

impl<'g> BuildSession<'g> {
    pub fn new(
        graph: &'g PluginGraph,
        scope: &'g ScopeContext,
        profile: Option<InternedString>,
    ) -> Self {
        BuildSession {
            graph,
            scope,
            profile,
            explicit: ExplicitArguments::new(),
            stack: BuildStack::new(),
        }
    }

    pub fn with_arguments(
        graph: &'g PluginGraph,
        scope: &'g ScopeContext,
        profile: Option<InternedString>,
        explicit: ExplicitArguments,
    ) -> Self {
        BuildSession {
            graph,
            scope,
            profile,
            explicit,
            stack: BuildStack::new(),
        }
    }

    pub fn graph(&self) -> &'g PluginGraph {
        self.graph
    }

    pub fn active_profile(&self) -> Option<InternedString> {
        self.profile
    }

    /// The current build-stack path, for error context.
    pub fn stack_path(&self) -> String {
        self.stack.path()
    }

    pub fn explicit_by_name(&self, name: InternedString) -> Option<SharedObject> {
        self.explicit.named(name).cloned()
    }

    pub fn explicit_by_type(&self, ty: TypeKey) -> Option<SharedObject> {
        self.explicit.typed(ty).cloned()
    }

    /// Resolve the default instance for a plugin type.
    ///
    /// The active profile's override wins over the family default. A
    /// sequence request with no registered family falls back to "all
    /// registered instances of the element type".
    pub fn resolve(&mut self, plugin_type: TypeKey) -> Result<SharedObject, BuildError> {
        let family = match self.graph.find_family(plugin_type) {
            Ok(family) => family,
            Err(err @ GraphError::MissingPluginFamily { .. }) => {
                if let Some(element) = plugin_type.sequence_element() {
                    let items = self.resolve_all(element)?;
                    return Ok(SharedObject::from_box(Box::new(items), plugin_type));
                }
                return Err(err.into());
            }
            Err(err) => return Err(err.into()),
        };

        let instance = self
            .graph
            .profile_default(self.profile, plugin_type)
            .or_else(|| family.default_instance().cloned())
            .ok_or(GraphError::MissingDefault {
                plugin: plugin_type,
            })?;

        self.build_instance(plugin_type, &instance)
    }

    /// Resolve a named instance of a plugin type.
    ///
    /// The name is looked up at call time, so references registered
    /// before a profile override still see the substituted instance.
    pub fn resolve_named(
        &mut self,
        plugin_type: TypeKey,
        name: InternedString,
    ) -> Result<SharedObject, BuildError> {
        let family = self.graph.find_family(plugin_type)?;
        let instance = family
            .instance(name)
            .cloned()
            .ok_or(GraphError::MissingInstance {
                plugin: plugin_type,
                name,
            })?;

        self.build_instance(plugin_type, &instance)
    }

    /// Build every registered instance of a plugin type, in
    /// registration order. An unregistered family yields an empty
    /// sequence.
    pub fn resolve_all(&mut self, plugin_type: TypeKey) -> Result<Vec<SharedObject>, BuildError> {
        let family = match self.graph.find_family(plugin_type) {
            Ok(family) => family,
            Err(GraphError::MissingPluginFamily { .. }) => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let instances: Vec<Arc<dyn Instance>> = family.instances().to_vec();
        let mut built = Vec::with_capacity(instances.len());
        for instance in &instances {
            built.push(self.build_instance(plugin_type, instance)?);
        }
        Ok(built)
    }

    /// Run the full build pipeline for one instance.
    pub fn build_instance(
        &mut self,
        plugin_type: TypeKey,
        instance: &Arc<dyn Instance>,
    ) -> Result<SharedObject, BuildError> {
        let frame = BuildFrame::new(
            plugin_type,
            instance.name(),
            instance.returned_type().unwrap_or(plugin_type),
        );

        // Cycle check happens on push, before any construction
        self.stack.push(frame)?;
        let outcome = self.build_pushed(plugin_type, instance);
        // One exit path for success and failure alike: the frame never
        // outlives the attempt
        self.stack.pop();
        outcome
    }

    fn build_pushed(
        &mut self,
        plugin_type: TypeKey,
        instance: &Arc<dyn Instance>,
    ) -> Result<SharedObject, BuildError> {
        let lifecycle = self.graph.lifecycle_hint(plugin_type);

        match lifecycle.cache_for(self.scope) {
            Some(cache) => {
                let key = CacheKey::new(plugin_type, instance.name());
                cache.get_or_build(key, || self.construct(plugin_type, instance))
            }
            None => {
                let object = self.construct(plugin_type, instance)?;
                self.scope.track_transient(&object);
                Ok(object)
            }
        }
    }

    /// Construct and intercept, without touching caches or the stack.
    fn construct(
        &mut self,
        plugin_type: TypeKey,
        instance: &Arc<dyn Instance>,
    ) -> Result<SharedObject, BuildError> {
        tracing::trace!("Building {} (instance `{}`)", plugin_type, instance.name());

        let mut object = instance.build(plugin_type, self)?;

        // Instance-level interceptors in registration order
        for interceptor in instance.interceptors() {
            object = interceptor.apply(object, self).map_err(|source| {
                BuildError::InterceptionFailed {
                    path: self.stack.path(),
                    interceptor: interceptor.describe(),
                    source,
                }
            })?;
        }

        // Graph-level interceptor policies run after instance-level
        let graph = self.graph;
        for policy in graph.interceptor_policies() {
            for interceptor in policy.interceptors_for(plugin_type, instance.as_ref()) {
                object = interceptor.apply(object, self).map_err(|source| {
                    BuildError::InterceptionFailed {
                        path: self.stack.path(),
                        interceptor: interceptor.describe(),
                        source,
                    }
                })?;
            }
        }

        Ok(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::core::PluginGraphBuilder;
    use crate::instance::constructor::{ConstructorSpec, ParamSpec};
    use crate::instance::{
        Activator, ConstructorInstance, Decorator, Interceptor, InterceptorPolicy, LambdaInstance,
        LiteralInstance, ObjectBox, ReferencedInstance,
    };
    use crate::lifecycle::Lifecycle;

    struct Repo {
        label: String,
    }

    struct Service {
        repo: Arc<Repo>,
    }

    fn repo_recipe(label: &str) -> ConstructorInstance {
        let label = label.to_string();
        ConstructorInstance::of::<Repo>()
            .named("repo")
            .constructor(ConstructorSpec::new(
                vec![ParamSpec::new("label", TypeKey::of::<String>())],
                |args| {
                    Ok(Box::new(Repo {
                        label: args.value::<String>("label")?,
                    }) as ObjectBox)
                },
            ))
            .with_value("label", label)
    }

    fn service_recipe() -> ConstructorInstance {
        ConstructorInstance::of::<Service>()
            .named("svc")
            .constructor(ConstructorSpec::new(
                vec![ParamSpec::new("repo", TypeKey::of::<Repo>())],
                |args| {
                    Ok(Box::new(Service {
                        repo: args.shared::<Repo>("repo")?,
                    }) as ObjectBox)
                },
            ))
    }

    fn session_fixture(
        build: impl FnOnce(&mut PluginGraphBuilder),
    ) -> (PluginGraph, ScopeContext) {
        let mut builder = PluginGraphBuilder::new();
        build(&mut builder);
        (builder.seal().unwrap(), ScopeContext::root())
    }

    #[test]
    fn test_constructor_dependencies_resolve_recursively() {
        let (graph, scope) = session_fixture(|b| {
            b.set_default(TypeKey::of::<Repo>(), Arc::new(repo_recipe("orders")))
                .unwrap();
            b.set_default(TypeKey::of::<Service>(), Arc::new(service_recipe()))
                .unwrap();
        });

        let mut session = BuildSession::new(&graph, &scope, None);
        let object = session.resolve(TypeKey::of::<Service>()).unwrap();
        let service = object.shared::<Service>().unwrap();

        assert_eq!(service.repo.label, "orders");
        assert!(session.stack.is_empty());
    }

    #[test]
    fn test_explicit_argument_overrides_registered_dependency() {
        let (graph, scope) = session_fixture(|b| {
            b.set_default(TypeKey::of::<Repo>(), Arc::new(repo_recipe("configured")))
                .unwrap();
        });

        let args = ExplicitArguments::new().with("label", String::from("explicit"));
        let mut session = BuildSession::with_arguments(&graph, &scope, None, args);

        let object = session.resolve(TypeKey::of::<Repo>()).unwrap();
        assert_eq!(object.shared::<Repo>().unwrap().label, "explicit");
    }

    #[test]
    fn test_typed_explicit_argument_substitutes_for_dependency() {
        let (graph, scope) = session_fixture(|b| {
            b.set_default(TypeKey::of::<Repo>(), Arc::new(repo_recipe("configured")))
                .unwrap();
            b.set_default(TypeKey::of::<Service>(), Arc::new(service_recipe()))
                .unwrap();
        });

        let canned = Repo {
            label: "canned".to_string(),
        };
        let args = ExplicitArguments::new().with_object("repo", SharedObject::new(canned));
        let mut session = BuildSession::with_arguments(&graph, &scope, None, args);

        let object = session.resolve(TypeKey::of::<Service>()).unwrap();
        assert_eq!(object.shared::<Service>().unwrap().repo.label, "canned");
    }

    #[test]
    fn test_missing_value_argument_is_a_named_error() {
        struct NeedsUrl;

        let (graph, scope) = session_fixture(|b| {
            b.set_default(
                TypeKey::of::<NeedsUrl>(),
                Arc::new(
                    ConstructorInstance::of::<NeedsUrl>()
                        .named("needs-url")
                        .constructor(ConstructorSpec::new(
                            vec![ParamSpec::new("url", TypeKey::of::<String>())],
                            |_| Ok(Box::new(NeedsUrl) as ObjectBox),
                        )),
                ),
            )
            .unwrap();
        });

        let mut session = BuildSession::new(&graph, &scope, None);
        let err = session.resolve(TypeKey::of::<NeedsUrl>()).unwrap_err();

        match err {
            BuildError::MissingValueArgument { param, instance, .. } => {
                assert_eq!(param.as_str(), "url");
                assert_eq!(instance.as_str(), "needs-url");
            }
            other => panic!("expected a missing-value error, got {other}"),
        }
    }

    #[test]
    fn test_cycle_is_detected_before_construction() {
        struct A;
        struct B;

        let (graph, scope) = session_fixture(|b| {
            b.set_default(
                TypeKey::of::<A>(),
                Arc::new(ConstructorInstance::of::<A>().named("a").constructor(
                    ConstructorSpec::new(
                        vec![ParamSpec::new("b", TypeKey::of::<B>())],
                        |_| Ok(Box::new(A) as ObjectBox),
                    ),
                )),
            )
            .unwrap();
            b.set_default(
                TypeKey::of::<B>(),
                Arc::new(ConstructorInstance::of::<B>().named("b").constructor(
                    ConstructorSpec::new(
                        vec![ParamSpec::new("a", TypeKey::of::<A>())],
                        |_| Ok(Box::new(B) as ObjectBox),
                    ),
                )),
            )
            .unwrap();
        });

        let mut session = BuildSession::new(&graph, &scope, None);
        let err = session.resolve(TypeKey::of::<A>()).unwrap_err();

        match err {
            BuildError::Cyclic { chain } => {
                assert!(chain.contains("A"));
                assert!(chain.contains("B"));
            }
            other => panic!("expected a cyclic error, got {other}"),
        }
        assert!(session.stack.is_empty());
    }

    #[test]
    fn test_literal_leg_breaks_the_cycle_shape() {
        struct A;
        struct B {
            #[allow(dead_code)]
            a: Arc<A>,
        }

        let (graph, scope) = session_fixture(|b| {
            // A depends on B; B's A-leg is satisfied by a literal
            b.set_default(
                TypeKey::of::<A>(),
                Arc::new(ConstructorInstance::of::<A>().named("a").constructor(
                    ConstructorSpec::new(
                        vec![ParamSpec::new("b", TypeKey::of::<B>())],
                        |_| Ok(Box::new(A) as ObjectBox),
                    ),
                )),
            )
            .unwrap();
            b.set_default(
                TypeKey::of::<B>(),
                Arc::new(
                    ConstructorInstance::of::<B>()
                        .named("b")
                        .constructor(ConstructorSpec::new(
                            vec![ParamSpec::new("a", TypeKey::of::<A>())],
                            |args| {
                                Ok(Box::new(B {
                                    a: args.shared::<A>("a")?,
                                }) as ObjectBox)
                            },
                        ))
                        .with_dependency("a", Arc::new(LiteralInstance::new(A).named("canned-a"))),
                ),
            )
            .unwrap();
        });

        let mut session = BuildSession::new(&graph, &scope, None);
        assert!(session.resolve(TypeKey::of::<A>()).is_ok());
    }

    #[test]
    fn test_singleton_failure_retries_cleanly() {
        static ATTEMPTS: AtomicU32 = AtomicU32::new(0);

        struct Flaky;

        let (graph, scope) = session_fixture(|b| {
            b.set_default(
                TypeKey::of::<Flaky>(),
                Arc::new(LambdaInstance::new(|_| {
                    if ATTEMPTS.fetch_add(1, Ordering::SeqCst) == 0 {
                        anyhow::bail!("external fault");
                    }
                    Ok(Flaky)
                })
                .named("flaky")),
            )
            .unwrap();
            b.set_lifecycle(TypeKey::of::<Flaky>(), Lifecycle::Singleton);
        });

        let mut session = BuildSession::new(&graph, &scope, None);
        let first = session.resolve(TypeKey::of::<Flaky>());
        assert!(matches!(first, Err(BuildError::ConstructionFailed { .. })));
        assert!(session.stack.is_empty());

        // The fault cleared; a later attempt must not see residual
        // cycle-detection or cache state from the failed one
        let mut session = BuildSession::new(&graph, &scope, None);
        assert!(session.resolve(TypeKey::of::<Flaky>()).is_ok());
        assert_eq!(ATTEMPTS.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_sequence_request_preserves_registration_order() {
        let (graph, scope) = session_fixture(|b| {
            for (name, v) in [("x", 1u32), ("y", 2), ("z", 3)] {
                b.add_instance(
                    TypeKey::of::<u32>(),
                    Arc::new(LiteralInstance::new(v).named(name)),
                )
                .unwrap();
            }
        });

        let mut session = BuildSession::new(&graph, &scope, None);
        let seq_key = TypeKey::sequence_of(TypeKey::of::<u32>());
        let object = session.resolve(seq_key).unwrap();

        let items = object.downcast_ref::<Vec<SharedObject>>().unwrap();
        let values: Vec<u32> = items.iter().map(|o| o.extract::<u32>().unwrap()).collect();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn test_referenced_instance_resolves_at_build_time() {
        let (graph, scope) = session_fixture(|b| {
            b.add_instance(
                TypeKey::of::<u32>(),
                Arc::new(LiteralInstance::new(7u32).named("seven")),
            )
            .unwrap();
            b.set_default(
                TypeKey::of::<u32>(),
                Arc::new(ReferencedInstance::new("seven").named("alias")),
            )
            .unwrap();
        });

        let mut session = BuildSession::new(&graph, &scope, None);
        let object = session.resolve(TypeKey::of::<u32>()).unwrap();
        assert_eq!(object.extract::<u32>(), Some(7));
    }

    #[test]
    fn test_interceptors_run_in_order_then_policies() {
        struct AppendPolicy;
        impl InterceptorPolicy for AppendPolicy {
            fn describe(&self) -> String {
                "append !".to_string()
            }
            fn interceptors_for(
                &self,
                _plugin_type: TypeKey,
                _instance: &dyn Instance,
            ) -> Vec<Arc<dyn Interceptor>> {
                vec![Arc::new(Decorator::<String, String>::new("bang", |s| {
                    Ok(format!("{}!", s))
                }))]
            }
        }

        let (graph, scope) = session_fixture(|b| {
            b.set_default(
                TypeKey::of::<String>(),
                Arc::new(
                    LiteralInstance::new(String::from("a"))
                        .named("letters")
                        .intercept(Arc::new(Decorator::<String, String>::new("b", |s| {
                            Ok(format!("{}b", s))
                        })))
                        .intercept(Arc::new(Decorator::<String, String>::new("c", |s| {
                            Ok(format!("{}c", s))
                        }))),
                ),
            )
            .unwrap();
            b.add_interceptor_policy(Arc::new(AppendPolicy));
        });

        let mut session = BuildSession::new(&graph, &scope, None);
        let object = session.resolve(TypeKey::of::<String>()).unwrap();

        // Instance interceptors in registration order, then the policy
        assert_eq!(object.extract::<String>().unwrap(), "abc!");
    }

    #[test]
    fn test_interceptor_failure_is_distinct_from_construction_failure() {
        struct Gauge;

        let (graph, scope) = session_fixture(|b| {
            b.set_default(
                TypeKey::of::<Gauge>(),
                Arc::new(LiteralInstance::new(Gauge).named("g").intercept(Arc::new(
                    Activator::<Gauge>::new("explode", |_| anyhow::bail!("activation failed")),
                ))),
            )
            .unwrap();
        });

        let mut session = BuildSession::new(&graph, &scope, None);
        let err = session.resolve(TypeKey::of::<Gauge>()).unwrap_err();

        assert!(err.failed_after_construction());
        assert!(session.stack.is_empty());
    }

    #[test]
    fn test_missing_default_among_many_instances() {
        let (graph, scope) = session_fixture(|b| {
            b.add_instance(
                TypeKey::of::<u32>(),
                Arc::new(LiteralInstance::new(1u32).named("one")),
            )
            .unwrap();
            b.add_instance(
                TypeKey::of::<u32>(),
                Arc::new(LiteralInstance::new(2u32).named("two")),
            )
            .unwrap();
        });

        let mut session = BuildSession::new(&graph, &scope, None);
        let err = session.resolve(TypeKey::of::<u32>()).unwrap_err();
        assert!(err.is_missing_registration());
    }
}
