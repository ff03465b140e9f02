//! Constructor selection.
//!
//! When a concrete type declares several candidate constructors,
//! exactly one must be picked. Precedence: an explicit policy
//! (per-instance first, then global policies with the most recently
//! registered winning), a `preferred` marker on a candidate, then the
//! greedy heuristic.

use std::sync::Arc;

use crate::core::{rules, TypeKey};
use crate::instance::constructor::{ConstructorSpec, DependencyMap};

/// Pluggable constructor selection policy.
///
/// Returning `None` passes the decision to the next policy in the
/// chain.
pub trait ConstructorPolicy: Send + Sync {
    /// One-line description for diagnostics.
    fn describe(&self) -> String;

    /// Pick a candidate index, or decline.
    fn select(
        &self,
        concrete: TypeKey,
        candidates: &[ConstructorSpec],
        dependencies: &DependencyMap,
    ) -> Option<usize>;
}

/// The default heuristic: greediest constructor whose value-kind
/// parameters are all satisfiable from the registered dependencies.
///
/// Candidates are tried from most parameters to fewest; a candidate
/// with an unsatisfiable value-kind parameter is skipped. If nothing
/// qualifies, the greediest candidate overall is kept so explicit
/// arguments at resolve time can still satisfy it.
pub struct GreedyPolicy;

impl ConstructorPolicy for GreedyPolicy {
    fn describe(&self) -> String {
        "greediest constructor with satisfiable value parameters".to_string()
    }

    fn select(
        &self,
        _concrete: TypeKey,
        candidates: &[ConstructorSpec],
        dependencies: &DependencyMap,
    ) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }

        let mut order: Vec<usize> = (0..candidates.len()).collect();
        // Most parameters first; earlier declaration breaks ties
        order.sort_by_key(|&i| (std::cmp::Reverse(candidates[i].params().len()), i));

        for &i in &order {
            let qualifies = candidates[i]
                .params()
                .iter()
                .filter(|p| rules::is_value_kind(p.ty))
                .all(|p| dependencies.satisfies(p));
            if qualifies {
                return Some(i);
            }
        }

        // Nothing qualifies; keep the greediest and let resolve-time
        // explicit arguments (or a build error) sort it out
        order.first().copied()
    }
}

/// Run the full selection chain and return the chosen index.
///
/// Only call with a non-empty candidate list.
pub(crate) fn choose_constructor(
    concrete: TypeKey,
    candidates: &[ConstructorSpec],
    dependencies: &DependencyMap,
    instance_policy: Option<&dyn ConstructorPolicy>,
    global_policies: &[Arc<dyn ConstructorPolicy>],
) -> usize {
    if let Some(policy) = instance_policy {
        if let Some(i) = policy.select(concrete, candidates, dependencies) {
            return i;
        }
    }

    // Most recently registered global policy wins
    for policy in global_policies.iter().rev() {
        if let Some(i) = policy.select(concrete, candidates, dependencies) {
            return i;
        }
    }

    if let Some(i) = candidates.iter().position(ConstructorSpec::is_preferred) {
        return i;
    }

    GreedyPolicy
        .select(concrete, candidates, dependencies)
        .unwrap_or(0)
}
