//! User-friendly diagnostics.
//!
//! Read-only views over a sealed graph: render a family's build plan
//! as text, and sweep the whole graph for defined-but-unresolvable
//! dependencies and configuration-time cycles. Nothing here mutates
//! graph or cache state.

use std::collections::HashMap;
use std::fmt;

use miette::Diagnostic as MietteDiagnostic;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;

use crate::core::{PluginGraph, TypeKey};
use crate::instance::Instance;

/// Common suggestion messages for consistent error handling.
pub mod suggestions {
    /// Suggestion when a plugin family is missing.
    pub const MISSING_FAMILY: &str =
        "help: Register at least one instance for the plugin type before sealing";

    /// Suggestion when a family has instances but no default.
    pub const NO_DEFAULT: &str =
        "help: Call set_default, or register exactly one instance";

    /// Suggestion when a value-kind argument is unbound.
    pub const UNBOUND_VALUE: &str =
        "help: Bind the value on the recipe with with_value, or pass it explicitly at resolve time";

    /// Suggestion when the graph contains a cycle.
    pub const CYCLE: &str =
        "help: Break the cycle by satisfying one leg with a literal or factory recipe";
}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
    Help,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Note => write!(f, "note"),
            Severity::Help => write!(f, "help"),
        }
    }
}

/// A diagnostic message with optional suggestions.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Primary message
    pub message: String,
    /// Severity level
    pub severity: Severity,
    /// Additional context lines
    pub context: Vec<String>,
    /// Suggested fixes
    pub suggestions: Vec<String>,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            severity: Severity::Error,
            context: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    /// Create a new warning diagnostic.
    pub fn warning(message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            severity: Severity::Warning,
            context: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    /// Add context to the diagnostic.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    /// Add a suggestion for fixing the issue.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Format the diagnostic for terminal output.
    pub fn format(&self, color: bool) -> String {
        let mut output = String::new();

        let severity_str = if color {
            match self.severity {
                Severity::Error => "\x1b[1;31merror\x1b[0m",
                Severity::Warning => "\x1b[1;33mwarning\x1b[0m",
                Severity::Note => "\x1b[1;36mnote\x1b[0m",
                Severity::Help => "\x1b[1;32mhelp\x1b[0m",
            }
        } else {
            match self.severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
                Severity::Note => "note",
                Severity::Help => "help",
            }
        };

        output.push_str(&format!("{}: {}\n", severity_str, self.message));

        for ctx in &self.context {
            output.push_str(&format!("  -> {}\n", ctx));
        }

        if !self.suggestions.is_empty() {
            output.push('\n');
            let help_prefix = if color {
                "\x1b[1;32mhelp\x1b[0m"
            } else {
                "help"
            };
            output.push_str(&format!("{}: consider:\n", help_prefix));
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, suggestion));
            }
        }

        output
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format(false))
    }
}

/// Cyclic dependency error with rich rendering.
#[derive(Debug, Error, MietteDiagnostic)]
#[error("bidirectional dependency detected: {chain}")]
#[diagnostic(
    code(rigging::build::cycle),
    help("Break the cycle by satisfying one leg with a literal or factory recipe")
)]
pub struct CyclicDependencyError {
    pub chain: String,
}

/// Missing plugin family error with rich rendering.
#[derive(Debug, Error, MietteDiagnostic)]
#[error("no plugin family registered for `{plugin}`")]
#[diagnostic(
    code(rigging::graph::missing_family),
    help("Register at least one instance for the plugin type before sealing")
)]
pub struct MissingFamilyError {
    pub plugin: String,
}

/// Render one family's wiring as a plain-text build plan.
///
/// Shows lifecycle, the default marker, each instance's recipe, and
/// its declared dependencies.
pub fn describe_family(graph: &PluginGraph, plugin_type: TypeKey) -> Option<String> {
    let family = graph.registered_family(plugin_type)?;

    let lifecycle = family
        .lifecycle()
        .map(|l| l.describe())
        .unwrap_or("transient");
    let mut out = format!("{} [{}]\n", family.plugin_type(), lifecycle);

    let default_name = family.default_name().or_else(|| {
        family.default_instance().map(|i| i.name())
    });

    for instance in family.instances() {
        let marker = if Some(instance.name()) == default_name {
            "  [default]"
        } else {
            ""
        };
        out.push_str(&format!(
            "  * {}: {}{}\n",
            instance.name(),
            instance.describe(),
            marker
        ));
        for dep in instance.dependencies() {
            let source = if dep.inline { "inline" } else { "graph" };
            out.push_str(&format!("      - {}: {} ({})\n", dep.param, dep.ty, source));
        }
    }

    if let Some(fallback) = family.missing_instance() {
        out.push_str(&format!("  ? unknown names: {}\n", fallback.describe()));
    }

    Some(out)
}

/// Render every family in the graph.
pub fn describe_graph(graph: &PluginGraph) -> String {
    graph
        .families()
        .iter()
        .filter_map(|f| describe_family(graph, f.plugin_type()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Sweep the sealed graph for configuration problems.
///
/// Reports unregistered dependencies, value-kind arguments with no
/// binding, and dependency cycles visible from the registered wiring.
pub fn graph_report(graph: &PluginGraph) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let families = graph.families();

    let mut dep_graph: DiGraph<TypeKey, ()> = DiGraph::new();
    let mut nodes: HashMap<TypeKey, NodeIndex> = HashMap::new();
    for family in &families {
        let key = family.plugin_type();
        nodes.insert(key, dep_graph.add_node(key));
    }

    for family in &families {
        let from = nodes[&family.plugin_type()];

        for instance in family.instances() {
            for dep in instance.dependencies() {
                if dep.inline {
                    continue;
                }

                if dep.ty.is_value_kind() {
                    diagnostics.push(
                        Diagnostic::warning(format!(
                            "instance `{}` of {} needs an explicit value for `{}`",
                            instance.name(),
                            family.plugin_type(),
                            dep.param
                        ))
                        .with_suggestion(suggestions::UNBOUND_VALUE),
                    );
                    continue;
                }

                // Sequence dependencies tolerate an empty element family
                let target = dep.ty.sequence_element().unwrap_or(dep.ty);

                match nodes.get(&target) {
                    Some(&to) => {
                        dep_graph.add_edge(from, to, ());
                    }
                    None if dep.ty.sequence_element().is_some() => {}
                    None => {
                        diagnostics.push(
                            Diagnostic::error(format!(
                                "instance `{}` of {} depends on unregistered {}",
                                instance.name(),
                                family.plugin_type(),
                                dep.ty
                            ))
                            .with_suggestion(suggestions::MISSING_FAMILY),
                        );
                    }
                }
            }
        }

        if family.instances().len() > 1 && family.default_name().is_none() {
            diagnostics.push(
                Diagnostic::warning(format!(
                    "{} has {} instances and no default",
                    family.plugin_type(),
                    family.instances().len()
                ))
                .with_suggestion(suggestions::NO_DEFAULT),
            );
        }
    }

    for scc in tarjan_scc(&dep_graph) {
        let cyclic = scc.len() > 1
            || (scc.len() == 1 && dep_graph.contains_edge(scc[0], scc[0]));
        if cyclic {
            let mut members: Vec<String> =
                scc.iter().map(|&n| dep_graph[n].to_string()).collect();
            members.sort();
            diagnostics.push(
                Diagnostic::warning(format!(
                    "dependency cycle among: {}",
                    members.join(", ")
                ))
                .with_suggestion(suggestions::CYCLE),
            );
        }
    }

    diagnostics
}
