//! Component B: the binding environment (`spec.md` §4.B).
//!
//! `spec.md` §9's design note calls out that the original threads `bindings`
//! as an in-out parameter, and that a systems-language reimplementation
//! should instead return it from each recursive call. Every `compile_*`
//! function in this crate follows that: it takes a read-only [`Scope`]
//! (inherited `context` plus the `projection` this call must surface) and
//! returns `(Operator, Bindings)` — the bindings it actually produced.

use rustc_hash::{FxHashMap, FxHashSet};
use sq_model::VariableId;
use sq_runtime::Register;

/// `variable-id -> register` for whatever is actually materialized by a
/// compiled subtree.
pub type Bindings = FxHashMap<VariableId, Register>;

/// The read-only half of the binding environment a `compile_*` call
/// receives: the `context` bindings inherited from an enclosing join (never
/// re-emitted into this call's own `Bindings`) and the `projection` this
/// call's caller needs surfaced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    pub context: Bindings,
    pub projection: FxHashSet<VariableId>,
}

impl Scope {
    pub fn new(context: Bindings, projection: FxHashSet<VariableId>) -> Self {
        Self { context, projection }
    }

    /// A variable bound by the enclosing context is treated as pre-bound:
    /// visible to children, but not re-emitted into the child's own
    /// bindings on lookup.
    pub fn context_register(&self, var: VariableId) -> Option<Register> {
        self.context.get(&var).copied()
    }

    pub fn is_projected(&self, var: VariableId) -> bool {
        self.projection.contains(&var)
    }

    /// A scope identical to this one but with a different projection —
    /// used when a component extends the downstream projection before
    /// recursing (e.g. the join builder adding `joinVars`).
    pub fn with_projection(&self, projection: FxHashSet<VariableId>) -> Scope {
        Scope {
            context: self.context.clone(),
            projection,
        }
    }
}

/// Merges two sibling bindings produced by a join's children: keeps the
/// left side's register for variables present on both sides, and brings in
/// right-only bindings that are in `projection` (`spec.md` §4.B).
pub fn merge_join_bindings(
    left: &Bindings,
    right: &Bindings,
    projection: &FxHashSet<VariableId>,
) -> Bindings {
    let mut merged = left.clone();
    for (&var, &register) in right {
        if !merged.contains_key(&var) && projection.contains(&var) {
            merged.insert(var, register);
        }
    }
    merged
}

/// Removes bindings that exist solely because a filter's free variables
/// needed them, and that the filter's enclosing scope does not itself
/// project (`spec.md` §4.F: "After compilation, remove bindings that were
/// introduced solely for the filter's free variables and are not in the
/// outer projection.").
pub fn remove_filter_only_bindings(
    bindings: &mut Bindings,
    filter_vars: &[VariableId],
    outer_projection: &FxHashSet<VariableId>,
) {
    for var in filter_vars {
        if !outer_projection.contains(var) {
            bindings.remove(var);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_left_register_on_overlap() {
        let mut left = Bindings::default();
        left.insert(1, Register { slot: 0, domain: 0 });
        let mut right = Bindings::default();
        right.insert(1, Register { slot: 9, domain: 0 });
        right.insert(2, Register { slot: 10, domain: 0 });

        let projection: FxHashSet<_> = [1, 2].into_iter().collect();
        let merged = merge_join_bindings(&left, &right, &projection);

        assert_eq!(merged[&1], Register { slot: 0, domain: 0 });
        assert_eq!(merged[&2], Register { slot: 10, domain: 0 });
    }

    #[test]
    fn merge_drops_right_only_binding_outside_projection() {
        let left = Bindings::default();
        let mut right = Bindings::default();
        right.insert(2, Register { slot: 10, domain: 0 });

        let projection = FxHashSet::default();
        let merged = merge_join_bindings(&left, &right, &projection);
        assert!(merged.is_empty());
    }

    #[test]
    fn filter_cleanup_keeps_projected_variable() {
        let mut bindings = Bindings::default();
        bindings.insert(1, Register { slot: 0, domain: 0 });
        bindings.insert(2, Register { slot: 1, domain: 0 });
        let projection: FxHashSet<_> = [1].into_iter().collect();

        remove_filter_only_bindings(&mut bindings, &[1, 2], &projection);

        assert!(bindings.contains_key(&1));
        assert!(!bindings.contains_key(&2));
    }
}
