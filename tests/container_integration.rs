//! End-to-end container tests: realistic wiring through the public
//! surface only.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use rigging::instance::constructor::ParamSpec;
use rigging::instance::ObjectBox;
use rigging::{
    ConstructorInstance, ConstructorSpec, Container, Decorator, Disposable, ExplicitArguments,
    LambdaInstance, Lifecycle, LiteralInstance, OpenGenericInstance, PluginGraphBuilder,
    PrototypeInstance, SequenceInstance, TypeKey,
};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ---------------------------------------------------------------------
// A small application model
// ---------------------------------------------------------------------

trait Sink: Send + Sync {
    fn record(&self, line: &str);
}

#[derive(Default)]
struct MemorySink {
    lines: std::sync::Mutex<Vec<String>>,
}

impl Sink for MemorySink {
    fn record(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }
}

type SinkHandle = Arc<dyn Sink>;

struct OrderStore {
    label: String,
}

struct OrderService {
    store: Arc<OrderStore>,
    sink: Arc<SinkHandle>,
}

impl OrderService {
    fn place(&self, what: &str) {
        self.sink.record(&format!("placed {} in {}", what, self.store.label));
    }
}

fn app_builder(sink: Arc<MemorySink>) -> PluginGraphBuilder {
    let mut builder = PluginGraphBuilder::new();

    builder
        .set_default(
            TypeKey::of::<SinkHandle>(),
            Arc::new(LiteralInstance::new(sink as SinkHandle).named("memory")),
        )
        .unwrap();

    builder
        .set_default(
            TypeKey::of::<OrderStore>(),
            Arc::new(
                ConstructorInstance::of::<OrderStore>()
                    .named("main-store")
                    .constructor(ConstructorSpec::new(
                        vec![ParamSpec::new("label", TypeKey::of::<String>())],
                        |args| {
                            Ok(Box::new(OrderStore {
                                label: args.value::<String>("label")?,
                            }) as ObjectBox)
                        },
                    ))
                    .with_value("label", String::from("primary")),
            ),
        )
        .unwrap();
    builder.set_lifecycle(TypeKey::of::<OrderStore>(), Lifecycle::Singleton);

    builder
        .set_default(
            TypeKey::of::<OrderService>(),
            Arc::new(
                ConstructorInstance::of::<OrderService>()
                    .named("orders")
                    .constructor(ConstructorSpec::new(
                        vec![
                            ParamSpec::new("store", TypeKey::of::<OrderStore>()),
                            ParamSpec::new("sink", TypeKey::of::<SinkHandle>()),
                        ],
                        |args| {
                            Ok(Box::new(OrderService {
                                store: args.shared::<OrderStore>("store")?,
                                sink: args.shared::<SinkHandle>("sink")?,
                            }) as ObjectBox)
                        },
                    )),
            ),
        )
        .unwrap();

    builder
}

#[test]
fn wires_a_three_layer_object_graph() {
    init_logging();
    let sink = Arc::new(MemorySink::default());
    let container = Container::new(app_builder(sink.clone())).unwrap();

    let service = container.get_instance::<OrderService>().unwrap();
    service.place("two crates");

    let lines = sink.lines.lock().unwrap();
    assert_eq!(lines.as_slice(), ["placed two crates in primary"]);
}

#[test]
fn singleton_store_is_shared_across_services_and_children() {
    init_logging();
    let sink = Arc::new(MemorySink::default());
    let container = Container::new(app_builder(sink)).unwrap();

    let a = container.get_instance::<OrderService>().unwrap();
    let b = container.child().get_instance::<OrderService>().unwrap();

    // Transient services, shared singleton store
    assert!(!Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&a.store, &b.store));
}

#[test]
fn concurrent_first_resolution_constructs_the_singleton_once() {
    init_logging();
    static CONSTRUCTIONS: AtomicU32 = AtomicU32::new(0);

    struct Expensive;

    let mut builder = PluginGraphBuilder::new();
    builder
        .set_default(
            TypeKey::of::<Expensive>(),
            Arc::new(
                LambdaInstance::new(|_| {
                    CONSTRUCTIONS.fetch_add(1, Ordering::SeqCst);
                    std::thread::sleep(std::time::Duration::from_millis(20));
                    Ok(Expensive)
                })
                .named("expensive"),
            ),
        )
        .unwrap();
    builder.set_lifecycle(TypeKey::of::<Expensive>(), Lifecycle::Singleton);
    let container = Container::new(builder).unwrap();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| container.get_instance::<Expensive>().unwrap()))
            .collect();
        let first = container.get_instance::<Expensive>().unwrap();
        for handle in handles {
            assert!(Arc::ptr_eq(&first, &handle.join().unwrap()));
        }
    });

    assert_eq!(CONSTRUCTIONS.load(Ordering::SeqCst), 1);
}

#[test]
fn thread_local_lifecycle_builds_per_thread() {
    init_logging();
    static CONSTRUCTIONS: AtomicU32 = AtomicU32::new(0);

    struct PerThread;

    let mut builder = PluginGraphBuilder::new();
    builder
        .set_default(
            TypeKey::of::<PerThread>(),
            Arc::new(
                LambdaInstance::new(|_| {
                    CONSTRUCTIONS.fetch_add(1, Ordering::SeqCst);
                    Ok(PerThread)
                })
                .named("per-thread"),
            ),
        )
        .unwrap();
    builder.set_lifecycle(TypeKey::of::<PerThread>(), Lifecycle::ThreadLocal);
    let container = Container::new(builder).unwrap();

    let here_a = container.get_instance::<PerThread>().unwrap();
    let here_b = container.get_instance::<PerThread>().unwrap();
    assert!(Arc::ptr_eq(&here_a, &here_b));

    std::thread::scope(|scope| {
        scope.spawn(|| {
            container.get_instance::<PerThread>().unwrap();
        });
    });

    assert_eq!(CONSTRUCTIONS.load(Ordering::SeqCst), 2);
}

#[test]
fn open_generic_registration_serves_unseen_argument_lists() {
    init_logging();

    struct Repository {
        element: String,
        table: String,
    }

    let open_key = TypeKey::open("Repository", 1);
    let template = OpenGenericInstance::new(
        TypeKey::open("SqlRepository", 1)
            .close(&[TypeKey::parameter(0)])
            .unwrap(),
        vec![ParamSpec::new("table", TypeKey::of::<String>())],
        |args, set| {
            Ok(Box::new(Repository {
                element: args[0].to_string(),
                table: set.value::<String>("table")?,
            }) as ObjectBox)
        },
    )
    .named("sql")
    .with_value("table", String::from("main"));

    let mut builder = PluginGraphBuilder::new();
    builder.set_default(open_key, Arc::new(template)).unwrap();

    // An explicit closed registration outranks the open template
    let string_key = open_key.close(&[TypeKey::of::<String>()]).unwrap();
    builder
        .set_default(
            string_key,
            Arc::new(
                LambdaInstance::new(|_| {
                    Ok(Repository {
                        element: "special".to_string(),
                        table: "special".to_string(),
                    })
                })
                .named("special"),
            ),
        )
        .unwrap();

    let container = Container::new(builder).unwrap();

    let ints = container
        .resolve_keyed(open_key.close(&[TypeKey::of::<u32>()]).unwrap())
        .unwrap();
    let ints = ints.downcast_ref::<Repository>().unwrap();
    assert_eq!(ints.element, "u32");
    assert_eq!(ints.table, "main"); // pinned value carried over

    let strings = container.resolve_keyed(string_key).unwrap();
    assert_eq!(strings.downcast_ref::<Repository>().unwrap().element, "special");

    let bools = container
        .resolve_keyed(open_key.close(&[TypeKey::of::<bool>()]).unwrap())
        .unwrap();
    assert_eq!(bools.downcast_ref::<Repository>().unwrap().element, "bool");
}

#[test]
fn profiles_substitute_referenced_defaults_and_switch_back() {
    init_logging();

    let mut builder = PluginGraphBuilder::new();
    builder
        .set_default(
            TypeKey::of::<OrderStore>(),
            Arc::new(LambdaInstance::new(|_| {
                Ok(OrderStore {
                    label: "live".to_string(),
                })
            })
            .named("live")),
        )
        .unwrap();
    builder
        .add_instance(
            TypeKey::of::<OrderStore>(),
            Arc::new(LambdaInstance::new(|_| {
                Ok(OrderStore {
                    label: "stub".to_string(),
                })
            })
            .named("stub")),
        )
        .unwrap();
    builder
        .profile_mut("testing")
        .set_reference(TypeKey::of::<OrderStore>(), "stub");

    let container = Container::new(builder).unwrap();

    assert_eq!(container.get_instance::<OrderStore>().unwrap().label, "live");

    container.set_profile("testing").unwrap();
    assert_eq!(container.get_instance::<OrderStore>().unwrap().label, "stub");

    container.clear_profile();
    assert_eq!(container.get_instance::<OrderStore>().unwrap().label, "live");
}

#[test]
fn sequences_feed_constructor_parameters_in_registration_order() {
    init_logging();

    struct Stage {
        tag: &'static str,
    }

    struct Pipeline {
        stages: Vec<Arc<Stage>>,
    }

    let mut builder = PluginGraphBuilder::new();
    for tag in ["parse", "check", "emit"] {
        builder
            .add_instance(
                TypeKey::of::<Stage>(),
                Arc::new(LiteralInstance::new(Stage { tag }).named(tag)),
            )
            .unwrap();
    }

    builder
        .set_default(
            TypeKey::of::<Pipeline>(),
            Arc::new(
                ConstructorInstance::of::<Pipeline>()
                    .named("pipeline")
                    .constructor(ConstructorSpec::new(
                        vec![ParamSpec::new(
                            "stages",
                            TypeKey::sequence_of(TypeKey::of::<Stage>()),
                        )],
                        |args| {
                            Ok(Box::new(Pipeline {
                                stages: args.sequence::<Stage>("stages")?,
                            }) as ObjectBox)
                        },
                    )),
            ),
        )
        .unwrap();

    let container = Container::new(builder).unwrap();
    let pipeline = container.get_instance::<Pipeline>().unwrap();

    let tags: Vec<&str> = pipeline.stages.iter().map(|s| s.tag).collect();
    assert_eq!(tags, vec!["parse", "check", "emit"]);
}

#[test]
fn explicit_sequence_recipe_controls_membership_and_order() {
    init_logging();

    let mut builder = PluginGraphBuilder::new();
    for (name, v) in [("one", 1u32), ("two", 2), ("three", 3)] {
        builder
            .add_instance(
                TypeKey::of::<u32>(),
                Arc::new(LiteralInstance::new(v).named(name)),
            )
            .unwrap();
    }

    let seq_key = TypeKey::sequence_of(TypeKey::of::<u32>());
    let chosen: Vec<Arc<dyn rigging::Instance>> = vec![
        Arc::new(rigging::ReferencedInstance::new("three").named("pick-three")),
        Arc::new(rigging::ReferencedInstance::new("one").named("pick-one")),
    ];
    builder
        .set_default(
            seq_key,
            Arc::new(SequenceInstance::of(TypeKey::of::<u32>(), chosen).named("picked")),
        )
        .unwrap();

    let container = Container::new(builder).unwrap();
    let object = container.resolve_keyed(seq_key).unwrap();
    let items = object.downcast_ref::<Vec<rigging::SharedObject>>().unwrap();
    let values: Vec<u32> = items.iter().map(|o| o.extract::<u32>().unwrap()).collect();

    assert_eq!(values, vec![3, 1]);
}

#[test]
fn prototype_instances_clone_per_resolution() {
    init_logging();

    #[derive(Clone)]
    struct Settings {
        retries: u32,
    }

    let mut builder = PluginGraphBuilder::new();
    builder
        .set_default(
            TypeKey::of::<Settings>(),
            Arc::new(PrototypeInstance::new(Settings { retries: 3 }).named("defaults")),
        )
        .unwrap();
    let container = Container::new(builder).unwrap();

    let a = container.get_instance::<Settings>().unwrap();
    let b = container.get_instance::<Settings>().unwrap();

    assert_eq!(a.retries, 3);
    assert_eq!(b.retries, 3);
    assert!(!Arc::ptr_eq(&a, &b));
}

#[test]
fn missing_instance_fallback_serves_unknown_names() {
    init_logging();

    let mut builder = PluginGraphBuilder::new();
    builder
        .add_instance(
            TypeKey::of::<u32>(),
            Arc::new(LiteralInstance::new(1u32).named("known")),
        )
        .unwrap();
    builder.set_missing_instance(
        TypeKey::of::<u32>(),
        Arc::new(LiteralInstance::new(0u32).named("fallback")),
    );
    let container = Container::new(builder).unwrap();

    assert_eq!(*container.get_instance_named::<u32>("known").unwrap(), 1);
    assert_eq!(*container.get_instance_named::<u32>("mystery").unwrap(), 0);
}

#[test]
fn decorated_instance_is_cached_in_decorated_form() {
    init_logging();
    static WRAPS: AtomicU32 = AtomicU32::new(0);

    struct Inner;
    struct Wrapped(#[allow(dead_code)] Arc<Inner>);

    let mut builder = PluginGraphBuilder::new();
    builder
        .set_default(
            TypeKey::of::<Inner>(),
            Arc::new(
                LambdaInstance::new(|_| Ok(Inner)).named("inner").intercept(Arc::new(
                    Decorator::<Inner, Wrapped>::new("wrap", |inner| {
                        WRAPS.fetch_add(1, Ordering::SeqCst);
                        Ok(Wrapped(inner))
                    }),
                )),
            ),
        )
        .unwrap();
    builder.set_lifecycle(TypeKey::of::<Inner>(), Lifecycle::Singleton);
    let container = Container::new(builder).unwrap();

    let a = container.resolve_keyed(TypeKey::of::<Inner>()).unwrap();
    let b = container.resolve_keyed(TypeKey::of::<Inner>()).unwrap();

    // Decoration ran before caching, exactly once; the cached object
    // is the decorated form
    assert!(a.same_object(&b));
    assert!(a.shared::<Wrapped>().is_some());
    assert_eq!(WRAPS.load(Ordering::SeqCst), 1);
}

#[test]
fn tracked_transients_release_on_container_dispose() {
    init_logging();
    static DISPOSED: AtomicU32 = AtomicU32::new(0);

    struct Conn;
    impl Disposable for Conn {
        fn dispose(&self) -> anyhow::Result<()> {
            DISPOSED.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    let mut builder = PluginGraphBuilder::new();
    builder
        .set_default(
            TypeKey::of::<Conn>(),
            Arc::new(LambdaInstance::new(|_| Ok(Conn)).named("conn").disposable::<Conn>()),
        )
        .unwrap();

    let mut container = Container::new(builder).unwrap();
    container.enable_transient_tracking();

    container.get_instance::<Conn>().unwrap();
    container.get_instance::<Conn>().unwrap();

    container.dispose();
    assert_eq!(DISPOSED.load(Ordering::SeqCst), 2);
}

#[test]
fn conditional_recipe_picks_a_case_from_the_build_context() {
    init_logging();

    let fallback: Arc<dyn rigging::Instance> =
        Arc::new(LiteralInstance::new(1u32).named("base-case"));
    let chooser = rigging::ConditionalInstance::new(fallback)
        .named("chooser")
        .when(
            |session| session.active_profile().is_some(),
            Arc::new(LiteralInstance::new(2u32).named("profiled-case")),
        );

    let mut builder = PluginGraphBuilder::new();
    builder
        .set_default(TypeKey::of::<u32>(), Arc::new(chooser))
        .unwrap();
    builder.profile_mut("loud");

    let container = Container::new(builder).unwrap();

    assert_eq!(*container.get_instance::<u32>().unwrap(), 1);

    container.set_profile("loud").unwrap();
    assert_eq!(*container.get_instance::<u32>().unwrap(), 2);

    container.clear_profile();
    assert_eq!(*container.get_instance::<u32>().unwrap(), 1);
}

#[test]
fn default_of_type_dependency_follows_profile_overrides() {
    init_logging();

    struct Holder {
        value: Arc<u32>,
    }

    let mut builder = PluginGraphBuilder::new();
    builder
        .set_default(
            TypeKey::of::<u32>(),
            Arc::new(LiteralInstance::new(10u32).named("ten")),
        )
        .unwrap();
    builder
        .add_instance(
            TypeKey::of::<u32>(),
            Arc::new(LiteralInstance::new(20u32).named("twenty")),
        )
        .unwrap();
    builder
        .profile_mut("alt")
        .set_reference(TypeKey::of::<u32>(), "twenty");

    // The holder's dependency goes through "whatever is the default",
    // resolved per call rather than captured at registration
    builder
        .set_default(
            TypeKey::of::<Holder>(),
            Arc::new(
                ConstructorInstance::of::<Holder>()
                    .named("holder")
                    .constructor(ConstructorSpec::new(
                        vec![ParamSpec::new("value", TypeKey::of::<u32>())],
                        |args| {
                            Ok(Box::new(Holder {
                                value: args.shared::<u32>("value")?,
                            }) as ObjectBox)
                        },
                    ))
                    .with_dependency("value", Arc::new(rigging::DefaultInstance::new())),
            ),
        )
        .unwrap();

    let container = Container::new(builder).unwrap();

    assert_eq!(*container.get_instance::<Holder>().unwrap().value, 10);

    container.set_profile("alt").unwrap();
    assert_eq!(*container.get_instance::<Holder>().unwrap().value, 20);
}

#[test]
fn explicit_arguments_win_for_one_call_only() {
    init_logging();
    let sink = Arc::new(MemorySink::default());
    let container = Container::new(app_builder(sink)).unwrap();

    let stubbed = container
        .get_instance_with::<OrderService>(ExplicitArguments::new().with_object(
            "store",
            rigging::SharedObject::new(OrderStore {
                label: "stub".to_string(),
            }),
        ))
        .unwrap();
    assert_eq!(stubbed.store.label, "stub");

    let normal = container.get_instance::<OrderService>().unwrap();
    assert_eq!(normal.store.label, "primary");
}
