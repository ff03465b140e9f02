//! Core data structures for rigging.
//!
//! This module contains the foundational types of the registry:
//! - Interned type identities (TypeKey) and type rules
//! - Plugin families and the graph builder/sealed graph pair
//! - Profiles and their seal-time merge
//! - Registration and lookup error types

pub mod errors;
pub mod family;
pub mod graph;
pub mod profile;
pub mod rules;
pub mod type_key;

pub use errors::{ConfigError, GraphError};
pub use family::PluginFamily;
pub use graph::{PluginGraph, PluginGraphBuilder};
pub use profile::{Profile, ProfileManager, ProfileOverride, SealedProfiles};
pub use type_key::TypeKey;
