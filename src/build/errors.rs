//! Build error types and diagnostics.

use thiserror::Error;

use crate::core::{GraphError, TypeKey};
use crate::diagnostics::Diagnostic;
use crate::util::InternedString;

/// Error during one resolution request.
///
/// Structural errors (cycles) are detected from the build stack before
/// a constructor runs; runtime failures are wrapped exactly once with
/// the build-stack path at the layer where they happened.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("bidirectional dependency detected: {chain}")]
    Cyclic { chain: String },

    #[error("construction failed while building {path}")]
    ConstructionFailed {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("interceptor `{interceptor}` failed after building {path}")]
    InterceptionFailed {
        path: String,
        interceptor: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(
        "no value for constructor argument `{param}` on instance `{instance}` of {plugin}; \
         value-kind arguments must be set on the recipe or passed explicitly"
    )]
    MissingValueArgument {
        param: InternedString,
        instance: InternedString,
        plugin: TypeKey,
    },

    #[error("resolved {plugin} to a {produced}, but the caller requested {requested}")]
    TypeMismatch {
        plugin: TypeKey,
        produced: TypeKey,
        requested: String,
    },

    #[error("open generic recipe `{name}` cannot be built directly; close it first")]
    OpenRecipe { name: InternedString },

    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl BuildError {
    /// Whether the failure is "nothing registered" rather than a
    /// broken build.
    pub fn is_missing_registration(&self) -> bool {
        matches!(self, BuildError::Graph(g) if g.is_missing_registration())
    }

    /// Whether the object was constructed and only decoration failed.
    pub fn failed_after_construction(&self) -> bool {
        matches!(self, BuildError::InterceptionFailed { .. })
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            BuildError::Cyclic { chain } => {
                Diagnostic::error("bidirectional dependency detected")
                    .with_context(chain.clone())
                    .with_suggestion(
                        "Break the cycle by satisfying one leg with a literal or factory recipe",
                    )
            }
            BuildError::ConstructionFailed { path, source } => {
                Diagnostic::error("construction failed")
                    .with_context(format!("while building {}", path))
                    .with_context(format!("caused by: {}", source))
            }
            BuildError::InterceptionFailed {
                path,
                interceptor,
                source,
            } => Diagnostic::error("object built, but decoration failed")
                .with_context(format!("interceptor `{}` on {}", interceptor, path))
                .with_context(format!("caused by: {}", source)),
            BuildError::MissingValueArgument {
                param,
                instance,
                plugin,
            } => Diagnostic::error(format!(
                "no value for constructor argument `{}` on instance `{}` of {}",
                param, instance, plugin
            ))
            .with_suggestion(format!("Set `{}` on the recipe with with_value", param))
            .with_suggestion("Or pass it at resolve time as an explicit argument"),
            BuildError::TypeMismatch {
                plugin,
                produced,
                requested,
            } => Diagnostic::error(format!(
                "resolved {} to a {}, but the caller requested {}",
                plugin, produced, requested
            )),
            BuildError::OpenRecipe { name } => Diagnostic::error(format!(
                "open generic recipe `{}` cannot be built directly",
                name
            )),
            BuildError::Graph(g) => g.to_diagnostic(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interception_failure_is_distinct_from_construction() {
        let built_then_failed = BuildError::InterceptionFailed {
            path: "A (instance `default`)".to_string(),
            interceptor: "decorate: audit".to_string(),
            source: anyhow::anyhow!("boom"),
        };
        let never_built = BuildError::ConstructionFailed {
            path: "A (instance `default`)".to_string(),
            source: anyhow::anyhow!("boom"),
        };

        assert!(built_then_failed.failed_after_construction());
        assert!(!never_built.failed_after_construction());
    }

    #[test]
    fn test_missing_registration_flows_through() {
        let err = BuildError::from(GraphError::MissingDefault {
            plugin: TypeKey::named("Gauge"),
        });
        assert!(err.is_missing_registration());

        let cyclic = BuildError::Cyclic {
            chain: "A -> B -> A".to_string(),
        };
        assert!(!cyclic.is_missing_registration());
    }
}
