//! Rigging - a runtime dependency-injection container for Rust
//!
//! This crate provides the core library functionality for rigging:
//! a declarative registry of plugin types and construction recipes,
//! an object-graph build pipeline with cycle detection, per-type
//! lifecycle caching, post-construction interception, and profile-based
//! default overrides.

pub mod build;
pub mod container;
pub mod core;
pub mod diagnostics;
pub mod instance;
pub mod lifecycle;
pub mod util;

pub use build::{BuildError, BuildSession, ExplicitArguments};
pub use container::Container;
pub use core::{
    ConfigError, GraphError, PluginFamily, PluginGraph, PluginGraphBuilder, TypeKey,
};
pub use instance::{
    Activator, ConditionalInstance, ConstructorInstance, ConstructorPolicy, ConstructorSpec,
    Decorator, DefaultInstance, Disposable, Instance, Interceptor, InterceptorPolicy,
    LambdaInstance, LiteralInstance, OpenGenericInstance, PrototypeInstance, ReferencedInstance,
    SequenceInstance, SharedObject,
};
pub use lifecycle::{Lifecycle, ObjectCache, ScopeContext};
pub use util::{ContainerConfig, InternedString};
