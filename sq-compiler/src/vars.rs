//! The `vars(plan)` computation used by the join builder (`spec.md` §4.D
//! step 1) and the `collectVariables` utility `spec.md` §6 lists as a
//! consumed interface for `NOT EXISTS` compilation.

use rustc_hash::FxHashSet;
use sq_model::VariableId;
use sq_plan::Plan;

/// Every variable mentioned anywhere in `plan`, with no context filtering.
/// `spec.md` §6: "`collectVariables(out set, plan)` — utility for callers
/// (NOT EXISTS compilation)".
pub fn collect_variables(plan: &Plan) -> FxHashSet<VariableId> {
    let mut out = FxHashSet::default();
    walk(plan, &mut out);
    out
}

/// `vars(plan)` as the join builder uses it (`spec.md` §4.D step 1):
/// every variable mentioned in `plan`, excluding constants (which never
/// appear here in the first place) and anything already bound by
/// `context`.
pub fn free_variables(plan: &Plan, context: &FxHashSet<VariableId>) -> FxHashSet<VariableId> {
    let mut out = collect_variables(plan);
    out.retain(|var| !context.contains(var));
    out
}

fn walk(plan: &Plan, out: &mut FxHashSet<VariableId>) {
    match plan {
        Plan::IndexScan { pattern, .. }
        | Plan::AggregatedIndexScan { pattern, .. }
        | Plan::FullyAggregatedIndexScan { pattern, .. } => {
            for position in pattern.positions() {
                if let Some(var) = position.as_variable() {
                    out.insert(var);
                }
            }
        }
        Plan::ValuesScan { values, .. } => out.extend(values.variables.iter().copied()),
        Plan::TableFunction { input, function, .. } => {
            walk(input, out);
            out.extend(function.outputs.iter().copied());
            for arg in &function.inputs {
                let mut vars = Vec::new();
                arg.collect_variables(&mut vars);
                out.extend(vars);
            }
        }
        Plan::Singleton => {}
        Plan::NestedLoopJoin { left, right, .. }
        | Plan::HashJoin { left, right, .. }
        | Plan::CartProd { left, right, .. }
        | Plan::MergeJoin { left, right, .. }
        | Plan::MergeUnion { left, right, .. }
        | Plan::Minus { left, right, .. } => {
            walk(left, out);
            walk(right, out);
        }
        Plan::HashGroupify { input, .. } | Plan::Aggregates { input, .. } => walk(input, out),
        Plan::Filter { input, filter, .. } | Plan::Having { input, filter, .. } => {
            walk(input, out);
            let mut vars = Vec::new();
            filter.collect_variables(&mut vars);
            out.extend(vars);
        }
        Plan::Union { left, right, .. } => {
            walk(left, out);
            if let Some(right) = right {
                walk(right, out);
            }
        }
        Plan::GroupBy {
            input,
            group_variables,
            ..
        } => {
            walk(input, out);
            out.extend(group_variables.iter().copied());
        }
        Plan::Subselect { inner, .. } => out.extend(inner.projection.iter().copied()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sq_plan::{IndexOrder, PlanStats};
    use sq_query_graph::{NodeTerm, TriplePattern};

    fn stats() -> PlanStats {
        PlanStats {
            cardinality: 1.0,
            cost: 1.0,
        }
    }

    #[test]
    fn scan_vars_exclude_constants() {
        let plan = Plan::IndexScan {
            pattern: TriplePattern::new(
                NodeTerm::Variable(0),
                NodeTerm::Constant(7),
                NodeTerm::Variable(1),
            ),
            order: IndexOrder::Spo,
            stats: stats(),
            optional: false,
        };
        let vars = collect_variables(&plan);
        assert_eq!(vars, [0, 1].into_iter().collect());
    }

    #[test]
    fn free_variables_excludes_context() {
        let plan = Plan::IndexScan {
            pattern: TriplePattern::new(
                NodeTerm::Variable(0),
                NodeTerm::Variable(1),
                NodeTerm::Variable(2),
            ),
            order: IndexOrder::Spo,
            stats: stats(),
            optional: false,
        };
        let context: FxHashSet<_> = [0].into_iter().collect();
        let vars = free_variables(&plan, &context);
        assert_eq!(vars, [1, 2].into_iter().collect());
    }
}
