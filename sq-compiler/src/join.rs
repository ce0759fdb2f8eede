//! Component D: the join builder (`spec.md` §4.D).

use crate::bindings::{merge_join_bindings, Bindings, Scope};
use crate::vars::free_variables;
use rustc_hash::FxHashSet;
use sq_model::{CResult, CompileError, VariableId};
use sq_plan::Plan;
use sq_runtime::{Operator, Register, SelectionPredicate};

/// The join variable set plus the extended projection both children must be
/// compiled against (`spec.md` §4.D steps 1–2).
struct JoinVars {
    join_vars: Vec<VariableId>,
    extended_projection: FxHashSet<VariableId>,
}

fn compute_join_vars(left: &Plan, right: &Plan, scope: &Scope) -> JoinVars {
    let context: FxHashSet<VariableId> = scope.context.keys().copied().collect();
    let left_vars = free_variables(left, &context);
    let right_vars = free_variables(right, &context);
    let mut join_vars: Vec<VariableId> = left_vars.intersection(&right_vars).copied().collect();
    join_vars.sort_unstable();

    let mut extended_projection = scope.projection.clone();
    extended_projection.extend(join_vars.iter().copied());

    JoinVars {
        join_vars,
        extended_projection,
    }
}

/// Builds the AND-chain of `(left.reg = right.reg)` equalities used as a
/// join's residual selection, for every join variable not already consumed
/// as the join's primary driving key.
fn residual_equalities(
    join_vars: &[VariableId],
    primary: Option<VariableId>,
    left_bindings: &Bindings,
    right_bindings: &Bindings,
) -> Vec<SelectionPredicate> {
    join_vars
        .iter()
        .filter(|&&var| Some(var) != primary)
        .filter_map(|&var| {
            let left_register = *left_bindings.get(&var)?;
            let right_register = *right_bindings.get(&var)?;
            Some(SelectionPredicate::Equal(
                Box::new(SelectionPredicate::Variable(left_register)),
                Box::new(SelectionPredicate::Variable(right_register)),
            ))
        })
        .collect()
}

fn and_chain(predicates: Vec<SelectionPredicate>) -> Option<SelectionPredicate> {
    let mut iter = predicates.into_iter();
    let first = iter.next()?;
    Some(iter.fold(first, |acc, next| {
        SelectionPredicate::And(Box::new(acc), Box::new(next))
    }))
}

fn wrap_residual(operator: Operator, residual: Vec<SelectionPredicate>) -> Operator {
    match and_chain(residual) {
        None => operator,
        Some(predicate) => Operator::Selection {
            input: Box::new(operator),
            predicate,
        },
    }
}

/// The tail register list for a side of a `CartProd`: every register that
/// side's bindings materialize, in a deterministic (sorted by variable id)
/// order.
fn tail_registers(bindings: &Bindings) -> Vec<Register> {
    let mut entries: Vec<_> = bindings.iter().collect();
    entries.sort_by_key(|(&var, _)| var);
    entries.into_iter().map(|(_, &register)| register).collect()
}

/// Everything a join builder needs from its children, already compiled.
pub struct JoinChildren {
    pub left_operator: Operator,
    pub left_bindings: Bindings,
    pub right_operator: Operator,
    pub right_bindings: Bindings,
}

/// Compiles the `Singleton` edge case: an empty-binding child plan
/// (`spec.md` §4.D: "an empty-binding child is legal and results in
/// `Singleton` feeding the join").
pub fn compile_singleton() -> (Operator, Bindings) {
    (Operator::Singleton, Bindings::default())
}

/// Component D entry point: computes `joinVars`/extended projection for
/// `left_plan`/`right_plan` (`spec.md` §4.D steps 1–2). Callers recurse into
/// both children with the returned scope before calling one of
/// [`compile_nested_loop_join`]/[`compile_merge_join`]/[`compile_hash_join`]
/// /[`compile_cart_prod`].
pub fn child_scope(left_plan: &Plan, right_plan: &Plan, scope: &Scope) -> (Vec<VariableId>, Scope) {
    let computed = compute_join_vars(left_plan, right_plan, scope);
    let child_scope = scope.with_projection(computed.extended_projection);
    (computed.join_vars, child_scope)
}

/// **NestedLoopJoin** (`spec.md` §4.D step 4): Cartesian product filtered by
/// an equality residual over every join variable (no primary key).
pub fn compile_nested_loop_join(
    join_vars: &[VariableId],
    children: JoinChildren,
    outer_projection: &FxHashSet<VariableId>,
) -> (Operator, Bindings) {
    let residual = residual_equalities(join_vars, None, &children.left_bindings, &children.right_bindings);
    let operator = Operator::NestedLoopJoin {
        left: Box::new(children.left_operator),
        right: Box::new(children.right_operator),
    };
    let bindings = merge_join_bindings(&children.left_bindings, &children.right_bindings, outer_projection);
    (wrap_residual(operator, residual), bindings)
}

/// **MergeJoin** (`spec.md` §4.D step 5): `join_variable` names the primary
/// driving key; it must be one of `join_vars`.
pub fn compile_merge_join(
    join_vars: &[VariableId],
    join_variable: VariableId,
    left_optional: bool,
    right_optional: bool,
    children: JoinChildren,
    outer_projection: &FxHashSet<VariableId>,
) -> CResult<(Operator, Bindings)> {
    if join_vars.is_empty() {
        return Err(CompileError::EmptyJoinVariables);
    }
    if !join_vars.contains(&join_variable) {
        return Err(CompileError::JoinKeyNotInJoinVariables(join_variable));
    }

    let left_key = *children
        .left_bindings
        .get(&join_variable)
        .ok_or(CompileError::JoinKeyNotInJoinVariables(join_variable))?;
    let right_key = *children
        .right_bindings
        .get(&join_variable)
        .ok_or(CompileError::JoinKeyNotInJoinVariables(join_variable))?;

    let left_tail = tail_registers_excluding(&children.left_bindings, join_variable);
    let right_tail = tail_registers_excluding(&children.right_bindings, join_variable);

    let residual = residual_equalities(
        join_vars,
        Some(join_variable),
        &children.left_bindings,
        &children.right_bindings,
    );
    let operator = Operator::MergeJoin {
        left: Box::new(children.left_operator),
        left_key,
        left_tail,
        right: Box::new(children.right_operator),
        right_key,
        right_tail,
        left_optional,
        right_optional,
    };
    let bindings = merge_join_bindings(&children.left_bindings, &children.right_bindings, outer_projection);
    Ok((wrap_residual(operator, residual), bindings))
}

/// **HashJoin** (`spec.md` §4.D step 6): the primary join variable is
/// deterministically the smallest-id element of `join_vars`. `bitset` is the
/// 3-bit position mask recording whether the join variable appears in the
/// right child's scan at subject/predicate/object.
pub fn compile_hash_join(
    join_vars: &[VariableId],
    left_cost: f64,
    right_cost: f64,
    left_optional: bool,
    right_optional: bool,
    bitset: u8,
    children: JoinChildren,
    outer_projection: &FxHashSet<VariableId>,
) -> CResult<(Operator, Bindings)> {
    let join_variable = *join_vars.iter().min().ok_or(CompileError::EmptyJoinVariables)?;

    let left_key = *children
        .left_bindings
        .get(&join_variable)
        .ok_or(CompileError::JoinKeyNotInJoinVariables(join_variable))?;
    let right_key = *children
        .right_bindings
        .get(&join_variable)
        .ok_or(CompileError::JoinKeyNotInJoinVariables(join_variable))?;

    let left_tail = tail_registers_excluding(&children.left_bindings, join_variable);
    let right_tail = tail_registers_excluding(&children.right_bindings, join_variable);

    let residual = residual_equalities(
        join_vars,
        Some(join_variable),
        &children.left_bindings,
        &children.right_bindings,
    );
    let operator = Operator::HashJoin {
        left: Box::new(children.left_operator),
        left_key,
        left_tail,
        right: Box::new(children.right_operator),
        right_key,
        right_tail,
        left_cost,
        right_cost,
        left_optional,
        right_optional,
        bitset,
    };
    let bindings = merge_join_bindings(&children.left_bindings, &children.right_bindings, outer_projection);
    Ok((wrap_residual(operator, residual), bindings))
}

/// **CartProd** (`spec.md` §4.D step 7): no join variables required; each
/// side's whole binding list becomes its tail; no residual selection.
pub fn compile_cart_prod(
    children: JoinChildren,
    outer_projection: &FxHashSet<VariableId>,
) -> (Operator, Bindings) {
    let left_tail = tail_registers(&children.left_bindings);
    let right_tail = tail_registers(&children.right_bindings);
    let operator = Operator::CartProd {
        left: Box::new(children.left_operator),
        left_tail,
        right: Box::new(children.right_operator),
        right_tail,
    };
    let bindings = merge_join_bindings(&children.left_bindings, &children.right_bindings, outer_projection);
    (operator, bindings)
}

/// Computes the `bitset` a `HashJoin` carries (`spec.md` §4.D step 6): the
/// OR of bit 0 (subject) / bit 1 (predicate) / bit 2 (object) for every
/// position `var` occupies across every scan leaf of `right_plan`. Walks the
/// whole subtree rather than a single scan, since the right child of a hash
/// join is itself frequently a joined tree.
pub fn compute_bitset(var: VariableId, right_plan: &Plan) -> u8 {
    match right_plan {
        Plan::IndexScan { pattern, .. }
        | Plan::AggregatedIndexScan { pattern, .. }
        | Plan::FullyAggregatedIndexScan { pattern, .. } => {
            let mut bits = 0u8;
            for (index, position) in pattern.positions().iter().enumerate() {
                if position.as_variable() == Some(var) {
                    bits |= 1 << index;
                }
            }
            bits
        }
        Plan::ValuesScan { values, .. } => {
            if values.variables.contains(&var) {
                0b111
            } else {
                0
            }
        }
        Plan::TableFunction { input, function, .. } => {
            let mut bits = compute_bitset(var, input);
            if function.outputs.contains(&var) {
                bits |= 0b111;
            }
            bits
        }
        Plan::Singleton => 0,
        Plan::NestedLoopJoin { left, right, .. }
        | Plan::MergeJoin { left, right, .. }
        | Plan::HashJoin { left, right, .. }
        | Plan::CartProd { left, right, .. }
        | Plan::MergeUnion { left, right, .. }
        | Plan::Minus { left, right, .. } => compute_bitset(var, left) | compute_bitset(var, right),
        Plan::HashGroupify { input, .. }
        | Plan::Filter { input, .. }
        | Plan::Having { input, .. }
        | Plan::GroupBy { input, .. }
        | Plan::Aggregates { input, .. } => compute_bitset(var, input),
        Plan::Union { left, right, .. } => {
            let mut bits = compute_bitset(var, left);
            if let Some(right) = right {
                bits |= compute_bitset(var, right);
            }
            bits
        }
        Plan::Subselect { inner, .. } => {
            if inner.projection.contains(&var) {
                0b111
            } else {
                0
            }
        }
    }
}

fn tail_registers_excluding(bindings: &Bindings, excluded: VariableId) -> Vec<Register> {
    let mut entries: Vec<_> = bindings.iter().filter(|(&var, _)| var != excluded).collect();
    entries.sort_by_key(|(&var, _)| var);
    entries.into_iter().map(|(_, &register)| register).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sq_runtime::Register;

    fn reg(slot: usize) -> Register {
        Register { slot, domain: 0 }
    }

    fn bindings_of(pairs: &[(VariableId, Register)]) -> Bindings {
        pairs.iter().copied().collect()
    }

    #[test]
    fn merge_join_rejects_key_outside_join_vars() {
        let left = bindings_of(&[(0, reg(0))]);
        let right = bindings_of(&[(0, reg(1))]);
        let children = JoinChildren {
            left_operator: Operator::Singleton,
            left_bindings: left,
            right_operator: Operator::Singleton,
            right_bindings: right,
        };
        let err = compile_merge_join(&[0], 99, false, false, children, &FxHashSet::default())
            .unwrap_err();
        assert!(matches!(err, CompileError::JoinKeyNotInJoinVariables(99)));
    }

    #[test]
    fn merge_join_with_single_join_var_has_no_residual() {
        let left = bindings_of(&[(0, reg(0)), (1, reg(1))]);
        let right = bindings_of(&[(0, reg(2)), (2, reg(3))]);
        let children = JoinChildren {
            left_operator: Operator::Singleton,
            left_bindings: left,
            right_operator: Operator::Singleton,
            right_bindings: right,
        };
        let projection: FxHashSet<_> = [0, 1, 2].into_iter().collect();
        let (operator, bindings) =
            compile_merge_join(&[0], 0, false, false, children, &projection).unwrap();
        assert!(matches!(operator, Operator::MergeJoin { .. }));
        assert_eq!(bindings.len(), 3);
    }

    #[test]
    fn hash_join_picks_smallest_id_join_variable() {
        let left = bindings_of(&[(3, reg(0)), (5, reg(1))]);
        let right = bindings_of(&[(3, reg(2)), (5, reg(3))]);
        let children = JoinChildren {
            left_operator: Operator::Singleton,
            left_bindings: left,
            right_operator: Operator::Singleton,
            right_bindings: right,
        };
        let (operator, _) =
            compile_hash_join(&[5, 3], 1.0, 1.0, false, false, 0, children, &FxHashSet::default())
                .unwrap();
        match operator {
            Operator::HashJoin { left_key, right_key, .. } => {
                assert_eq!(left_key, reg(0));
                assert_eq!(right_key, reg(2));
            }
            other => panic!("expected HashJoin, got {other:?}"),
        }
    }

    #[test]
    fn nested_loop_join_residual_covers_every_join_var() {
        let left = bindings_of(&[(0, reg(0)), (1, reg(1))]);
        let right = bindings_of(&[(0, reg(2)), (1, reg(3))]);
        let children = JoinChildren {
            left_operator: Operator::Singleton,
            left_bindings: left,
            right_operator: Operator::Singleton,
            right_bindings: right,
        };
        let (operator, _) = compile_nested_loop_join(&[0, 1], children, &FxHashSet::default());
        match operator {
            Operator::Selection {
                predicate: SelectionPredicate::And(_, _),
                ..
            } => {}
            other => panic!("expected a Selection wrapping an And-chain, got {other:?}"),
        }
    }

    #[test]
    fn compute_bitset_ors_positions_across_nested_scans() {
        use sq_plan::{IndexOrder, PlanStats};
        use sq_query_graph::{NodeTerm, TriplePattern};

        let stats = PlanStats { cardinality: 1.0, cost: 1.0 };
        let left = Plan::IndexScan {
            pattern: TriplePattern::new(NodeTerm::Variable(0), NodeTerm::Constant(1), NodeTerm::Variable(2)),
            order: IndexOrder::Spo,
            stats,
            optional: false,
        };
        let right = Plan::IndexScan {
            pattern: TriplePattern::new(NodeTerm::Variable(2), NodeTerm::Variable(0), NodeTerm::Constant(9)),
            order: IndexOrder::Spo,
            stats,
            optional: false,
        };
        let tree = Plan::NestedLoopJoin {
            left: Box::new(left),
            right: Box::new(right),
            stats,
            optional: false,
        };
        // var 0 appears at subject (bit 0) of the left leaf and predicate
        // (bit 1) of the right leaf.
        assert_eq!(compute_bitset(0, &tree), 0b011);
        // var 2 appears only at object (bit 2) of the left leaf / subject
        // (bit 0) of the right leaf.
        assert_eq!(compute_bitset(2, &tree), 0b101);
    }

    #[test]
    fn cart_prod_has_no_residual_and_full_tails() {
        let left = bindings_of(&[(0, reg(0))]);
        let right = bindings_of(&[(1, reg(1))]);
        let children = JoinChildren {
            left_operator: Operator::Singleton,
            left_bindings: left,
            right_operator: Operator::Singleton,
            right_bindings: right,
        };
        let (operator, _) = compile_cart_prod(children, &FxHashSet::default());
        match operator {
            Operator::CartProd {
                left_tail,
                right_tail,
                ..
            } => {
                assert_eq!(left_tail, vec![reg(0)]);
                assert_eq!(right_tail, vec![reg(1)]);
            }
            other => panic!("expected CartProd, got {other:?}"),
        }
    }
}
