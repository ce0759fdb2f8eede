//! Component E: the set-operation builder (`spec.md` §4.E) — `Union`,
//! `MergeUnion`, `Minus`.

use crate::bindings::Bindings;
use rustc_hash::FxHashSet;
use sq_model::{CResult, CompileError, VariableId};
use sq_plan::Plan;
use sq_runtime::{Operator, Register, UnionBranch};

/// Flattens a right-nested chain of `Union` plan nodes into its leaf
/// branches.
///
/// `spec.md` §9 Open Question 1 flags a quirk in the original: a chain
/// terminator (a `right` child that is itself not a `Union`) is pushed as a
/// branch *twice* rather than once — "the comment 'Not sure why this second
/// operator should be added' suggests a possible over-push". This is
/// preserved deliberately rather than fixed; see `DESIGN.md`.
pub fn flatten_union_chain(plan: &Plan) -> Vec<&Plan> {
    match plan {
        Plan::Union { left, right, .. } => {
            let mut branches = flatten_union_chain(left);
            if let Some(right) = right {
                if matches!(right.as_ref(), Plan::Union { .. }) {
                    branches.extend(flatten_union_chain(right));
                } else {
                    branches.push(right.as_ref());
                    branches.push(right.as_ref());
                }
            }
            branches
        }
        other => vec![other],
    }
}

/// Builds the `Union` operator from its already-compiled branches
/// (`spec.md` §4.E): chooses one canonical register per variable (the first
/// branch that binds it), then for every branch emits either a `copy`
/// instruction (its local register differs from canonical) or an `init`
/// instruction (it does not bind the variable at all).
pub fn compile_union(branches: Vec<(Operator, Bindings)>) -> (Operator, Bindings) {
    let mut canonical = Bindings::default();
    for (_, bindings) in &branches {
        for (&var, &register) in bindings {
            canonical.entry(var).or_insert(register);
        }
    }

    let compiled_branches = branches
        .into_iter()
        .map(|(operator, bindings)| {
            let mut copies = Vec::new();
            let mut inits = Vec::new();
            for (&var, &canonical_register) in &canonical {
                match bindings.get(&var) {
                    Some(&branch_register) if branch_register != canonical_register => {
                        copies.push((branch_register, canonical_register));
                    }
                    Some(_) => {}
                    None => inits.push(canonical_register),
                }
            }
            copies.sort_by_key(|(_, c)| c.slot);
            inits.sort_by_key(|r| r.slot);
            UnionBranch {
                operator: Box::new(operator),
                copies,
                inits,
            }
        })
        .collect();

    (Operator::Union { branches: compiled_branches }, canonical)
}

/// Builds the `MergeUnion` operator (`spec.md` §4.E): exactly one variable
/// per side, both branches already sorted on it; the output register is the
/// left branch's.
pub fn compile_merge_union(
    left: (Operator, Bindings),
    right: (Operator, Bindings),
) -> CResult<(Operator, Bindings)> {
    let (left_operator, left_bindings) = left;
    let (right_operator, right_bindings) = right;

    if left_bindings.len() != 1 || right_bindings.len() != 1 {
        return Err(CompileError::MergeUnionArity {
            left: left_bindings.len(),
            right: right_bindings.len(),
        });
    }

    let (&var, &left_key) = left_bindings.iter().next().expect("checked len == 1 above");
    let (_, &right_key) = right_bindings.iter().next().expect("checked len == 1 above");

    let operator = Operator::MergeUnion {
        left: Box::new(left_operator),
        left_key,
        right: Box::new(right_operator),
        right_key,
        output: left_key,
    };
    let mut bindings = Bindings::default();
    bindings.insert(var, left_key);
    Ok((operator, bindings))
}

/// Computes `commonVars = vars(left) ∩ vars(right)` for a `Minus` node
/// (`spec.md` §4.E), used to extend the left side's projection before
/// compiling either child.
pub fn common_vars(left_vars: &FxHashSet<VariableId>, right_vars: &FxHashSet<VariableId>) -> Vec<VariableId> {
    let mut common: Vec<VariableId> = left_vars.intersection(right_vars).copied().collect();
    common.sort_unstable();
    common
}

/// Builds the `Minus` operator (`spec.md` §4.E): pairs `(leftRegister,
/// rightRegister)` for each common variable; the runtime emits only left
/// rows with no matching right row.
pub fn compile_minus(
    left: (Operator, Bindings),
    right: (Operator, Bindings),
    common: &[VariableId],
) -> CResult<(Operator, Bindings)> {
    let (left_operator, left_bindings) = left;
    let (right_operator, right_bindings) = right;

    let pairs: Vec<(Register, Register)> = common
        .iter()
        .map(|&var| {
            let left_register = *left_bindings
                .get(&var)
                .ok_or(CompileError::MinusVariableNotBound(var))?;
            let right_register = *right_bindings
                .get(&var)
                .ok_or(CompileError::MinusVariableNotBound(var))?;
            Ok((left_register, right_register))
        })
        .collect::<CResult<_>>()?;

    let operator = Operator::Minus {
        left: Box::new(left_operator),
        right: Box::new(right_operator),
        pairs,
    };
    Ok((operator, left_bindings))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reg(slot: usize) -> Register {
        Register { slot, domain: 0 }
    }

    #[test]
    fn union_picks_first_branch_as_canonical_and_copies_the_rest() {
        let mut b1 = Bindings::default();
        b1.insert(0, reg(0));
        b1.insert(1, reg(1));
        let mut b2 = Bindings::default();
        b2.insert(0, reg(2));
        b2.insert(1, reg(3));

        let (operator, canonical) =
            compile_union(vec![(Operator::Singleton, b1), (Operator::Singleton, b2)]);

        assert_eq!(canonical[&0], reg(0));
        assert_eq!(canonical[&1], reg(1));
        match operator {
            Operator::Union { branches } => {
                assert!(branches[0].copies.is_empty());
                assert!(branches[0].inits.is_empty());
                assert_eq!(branches[1].copies.len(), 2);
                assert!(branches[1].inits.is_empty());
            }
            other => panic!("expected Union, got {other:?}"),
        }
    }

    #[test]
    fn union_branch_missing_a_variable_gets_an_init() {
        let mut b1 = Bindings::default();
        b1.insert(0, reg(0));
        b1.insert(1, reg(1));
        let mut b2 = Bindings::default();
        b2.insert(0, reg(2));

        let (operator, _) = compile_union(vec![(Operator::Singleton, b1), (Operator::Singleton, b2)]);
        match operator {
            Operator::Union { branches } => {
                assert_eq!(branches[1].inits, vec![reg(1)]);
            }
            other => panic!("expected Union, got {other:?}"),
        }
    }

    #[test]
    fn merge_union_rejects_multi_variable_sides() {
        let mut left = Bindings::default();
        left.insert(0, reg(0));
        left.insert(1, reg(1));
        let mut right = Bindings::default();
        right.insert(0, reg(2));

        let err = compile_merge_union((Operator::Singleton, left), (Operator::Singleton, right))
            .unwrap_err();
        assert!(matches!(err, CompileError::MergeUnionArity { left: 2, right: 1 }));
    }

    #[test]
    fn merge_union_output_register_is_lefts() {
        let mut left = Bindings::default();
        left.insert(0, reg(5));
        let mut right = Bindings::default();
        right.insert(0, reg(9));

        let (operator, bindings) =
            compile_merge_union((Operator::Singleton, left), (Operator::Singleton, right)).unwrap();
        match operator {
            Operator::MergeUnion { output, .. } => assert_eq!(output, reg(5)),
            other => panic!("expected MergeUnion, got {other:?}"),
        }
        assert_eq!(bindings[&0], reg(5));
    }

    #[test]
    fn flatten_union_chain_duplicates_a_non_union_terminator() {
        let leaf_a = Plan::Singleton;
        let leaf_b = Plan::Singleton;
        let stats = sq_plan::PlanStats { cardinality: 1.0, cost: 1.0 };
        let chain = Plan::Union {
            left: Box::new(leaf_a),
            right: Some(Box::new(leaf_b)),
            stats,
        };
        let branches = flatten_union_chain(&chain);
        // left contributes 1, right (non-Union terminator) contributes 2 —
        // the preserved over-push quirk.
        assert_eq!(branches.len(), 3);
    }
}
