//! Graph and registration error types.

use thiserror::Error;

use crate::core::TypeKey;
use crate::diagnostics::Diagnostic;
use crate::util::InternedString;

/// Error during family or instance lookup.
///
/// These are recoverable conditions: `try_get_instance` converts the
/// missing-registration cases into an empty result instead of
/// propagating.
#[derive(Debug, Clone, Error)]
pub enum GraphError {
    #[error("no plugin family registered for {plugin}")]
    MissingPluginFamily { plugin: TypeKey },

    #[error("no instance named `{name}` registered for {plugin}")]
    MissingInstance { plugin: TypeKey, name: InternedString },

    #[error("no default instance configured for {plugin}")]
    MissingDefault { plugin: TypeKey },

    #[error("no profile named `{name}` exists")]
    MissingProfile { name: InternedString },

    #[error("cannot close {plugin} from its open registration: {reason}")]
    CloseFailed { plugin: TypeKey, reason: String },
}

impl GraphError {
    /// Whether this error means "nothing registered" rather than a
    /// malformed request.
    pub fn is_missing_registration(&self) -> bool {
        matches!(
            self,
            GraphError::MissingPluginFamily { .. }
                | GraphError::MissingInstance { .. }
                | GraphError::MissingDefault { .. }
        )
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            GraphError::MissingPluginFamily { plugin } => {
                Diagnostic::error(format!("no plugin family registered for {}", plugin))
                    .with_suggestion(format!(
                        "Register at least one instance for {} before sealing",
                        plugin
                    ))
            }
            GraphError::MissingInstance { plugin, name } => {
                Diagnostic::error(format!("{} has no instance named `{}`", plugin, name))
                    .with_suggestion("Check the instance name, or add a missing-instance fallback")
            }
            GraphError::MissingDefault { plugin } => {
                Diagnostic::error(format!("no default instance configured for {}", plugin))
                    .with_context("the family has multiple instances and none is marked default")
                    .with_suggestion(format!("Call set_default for {}", plugin))
            }
            GraphError::MissingProfile { name } => {
                Diagnostic::error(format!("no profile named `{}` exists", name))
                    .with_suggestion("Profiles must be declared before the graph is sealed")
            }
            GraphError::CloseFailed { plugin, reason } => {
                Diagnostic::error(format!("cannot close {}: {}", plugin, reason))
            }
        }
    }
}

/// Error raised at registration or seal time.
///
/// Configuration errors always carry the plugin type and instance name
/// so a misconfiguration can be located without a debugger.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("duplicate instance name `{name}` for {plugin}")]
    DuplicateInstanceName { plugin: TypeKey, name: InternedString },

    #[error("{concrete} has no usable constructor (instance `{name}` of {plugin})")]
    NoUsableConstructor {
        plugin: TypeKey,
        concrete: TypeKey,
        name: InternedString,
    },

    #[error(
        "interceptor `{interceptor}` on instance `{name}` of {plugin} accepts {accepts} \
         but the recipe produces {produced}"
    )]
    InterceptorMismatch {
        plugin: TypeKey,
        name: InternedString,
        interceptor: String,
        accepts: TypeKey,
        produced: TypeKey,
    },

    #[error("profile `{profile}` references unknown instance `{name}` of {plugin}")]
    UnknownProfileReference {
        profile: InternedString,
        plugin: TypeKey,
        name: InternedString,
    },

    #[error("default name `{name}` for {plugin} matches no registered instance")]
    UnknownDefault { plugin: TypeKey, name: InternedString },
}

impl ConfigError {
    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            ConfigError::DuplicateInstanceName { plugin, name } => {
                Diagnostic::error(format!("duplicate instance name `{}` for {}", name, plugin))
                    .with_suggestion("Instance names must be unique within a family")
            }
            ConfigError::NoUsableConstructor {
                plugin,
                concrete,
                name,
            } => Diagnostic::error(format!("{} has no usable constructor", concrete))
                .with_context(format!("registered as instance `{}` of {}", name, plugin))
                .with_suggestion("Add at least one constructor spec to the recipe"),
            ConfigError::InterceptorMismatch {
                plugin,
                name,
                interceptor,
                accepts,
                produced,
            } => Diagnostic::error(format!(
                "interceptor `{}` cannot apply to instance `{}` of {}",
                interceptor, name, plugin
            ))
            .with_context(format!("interceptor accepts {}, recipe produces {}", accepts, produced))
            .with_suggestion("Match the interceptor's accepted type to the recipe's product"),
            ConfigError::UnknownProfileReference {
                profile,
                plugin,
                name,
            } => Diagnostic::error(format!(
                "profile `{}` references unknown instance `{}` of {}",
                profile, name, plugin
            ))
            .with_suggestion("Register the instance in the family before referencing it"),
            ConfigError::UnknownDefault { plugin, name } => Diagnostic::error(format!(
                "default name `{}` for {} matches no registered instance",
                name, plugin
            )),
        }
    }
}
