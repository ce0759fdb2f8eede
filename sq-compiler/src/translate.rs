//! Component H plus the crate's external entry points (`spec.md` §4.H, §6):
//! `prepare_runtime`, `translate_inner`, `compile`, and the `translate_plan`
//! dispatcher that ties components A–G together over every [`Plan`] variant.

use crate::aggregates;
use crate::bindings::{Bindings, Scope};
use crate::filter;
use crate::join;
use crate::scan::{self, ScanKind};
use crate::set_ops;
use crate::slots::{self, QuerySlots, SlotAllocation};
use crate::vars::free_variables;
use rustc_hash::FxHashSet;
use sq_model::{CResult, CompileError, VariableId};
use sq_plan::Plan;
use sq_query_graph::{DuplicatePolicy, Filter, NotExistsTarget, QueryGraph};
use sq_runtime::{AggregateHandler, DuplicateHandling, Operator, Register, Runtime, SortKey, SubselectDuplicates};

/// Component A + I entry point (`spec.md` §4.A, §4.I): allocates slots for
/// the whole query, then turns the allocation into a live [`Runtime`] plus
/// the missing-binding fallback register.
pub fn prepare_runtime(query: &QueryGraph) -> (Runtime, SlotAllocation, Register) {
    let allocation = slots::allocate(query);
    let (runtime, fallback) =
        Runtime::allocate_from_slot_map(allocation.total, allocation.domain_classes.iter());
    (runtime, allocation, fallback)
}

/// `spec.md` §6: `translateInner(runtime, queryGraph, plan, out
/// outputRegisters, slotMap) -> operatorTree`. Used both as the top-level
/// translator (before `compile` wraps the result in `Sort`/`ResultsPrinter`)
/// and, recursively, to compile a `Subselect`'s inner query sharing the
/// outer runtime and slot allocation.
pub fn translate_inner(
    runtime: &Runtime,
    query: &QueryGraph,
    query_slots: &QuerySlots,
    plan: &Plan,
    slots: &SlotAllocation,
    fallback: Register,
) -> CResult<(Operator, Vec<Register>)> {
    let (operator, bindings) = translate_body(runtime, query, query_slots, Some(plan), slots, fallback)?;
    let output_registers = project_registers(query, &bindings, fallback);
    Ok((operator, output_registers))
}

/// `spec.md` §6: `compile(runtime, queryGraph, plan, silent) ->
/// operatorTree`. The crate's top-level entry point: translates the body,
/// injects `Sort` when the query has an `ORDER BY`, and wraps everything in
/// the root `ResultsPrinter`.
///
/// Unlike the original, this always produces an `Operator` rather than
/// occasionally signalling "no tree" — see `DESIGN.md` for why the
/// degenerate case the original's external-interface note alludes to has no
/// counterpart once `is_known_empty`/`SingletonScan` are modeled as ordinary
/// plan-less bodies.
pub fn compile(
    runtime: &Runtime,
    query: &QueryGraph,
    query_slots: &QuerySlots,
    plan: Option<&Plan>,
    slots: &SlotAllocation,
    fallback: Register,
    silent: bool,
) -> CResult<Operator> {
    let (body, bindings) = translate_body(runtime, query, query_slots, plan, slots, fallback)?;
    let output_registers = project_registers(query, &bindings, fallback);

    let sorted = if query.order_by.is_empty() {
        body
    } else {
        let keys = query
            .order_by
            .iter()
            .map(|key| SortKey {
                register: bindings.get(&key.variable).copied(),
                descending: key.descending,
            })
            .collect();
        Operator::Sort {
            input: Box::new(body),
            output: output_registers.clone(),
            keys,
        }
    };

    Ok(Operator::ResultsPrinter {
        input: Box::new(sorted),
        output: output_registers,
        duplicates: DuplicateHandling::from(query.duplicate_handling),
        limit: query.limit,
        offset: query.offset,
        silent,
    })
}

fn project_registers(query: &QueryGraph, bindings: &Bindings, fallback: Register) -> Vec<Register> {
    query
        .projection
        .iter()
        .map(|var| bindings.get(var).copied().unwrap_or(fallback))
        .collect()
}

/// The un-wrapped translation of `plan` (or, if `plan` is `None`, the
/// `spec.md` §4.H root fallback): a fresh root [`Scope`] over `query`'s own
/// projection, dispatched through [`translate_plan`].
fn translate_body(
    runtime: &Runtime,
    query: &QueryGraph,
    query_slots: &QuerySlots,
    plan: Option<&Plan>,
    slots: &SlotAllocation,
    fallback: Register,
) -> CResult<(Operator, Bindings)> {
    match plan {
        Some(plan) => {
            let projection: FxHashSet<VariableId> = query.projection.iter().copied().collect();
            let scope = Scope::new(Bindings::default(), projection);
            translate_plan(runtime, query, query_slots, plan, &scope, slots, fallback)
        }
        None => {
            let body = if query.is_known_empty() {
                Operator::EmptyScan
            } else {
                Operator::SingletonScan
            };
            Ok((body, Bindings::default()))
        }
    }
}

/// The recursive dispatcher driving components B–G over every [`Plan`]
/// variant (`spec.md` §2: "`translatePlan(plan)` recursively dispatches on
/// plan-node kind into B–G").
///
/// `query`/`query_slots` always describe the *currently active* query graph
/// — the root query until a `Subselect` boundary switches them to the
/// nested one — since `Plan::Aggregates`/`Plan::GroupBy` carry no
/// back-reference to the aggregate descriptor/group-by list that applies to
/// them; that context has to travel alongside the plan rather than be read
/// off it.
fn translate_plan(
    runtime: &Runtime,
    query: &QueryGraph,
    query_slots: &QuerySlots,
    plan: &Plan,
    scope: &Scope,
    slots: &SlotAllocation,
    fallback: Register,
) -> CResult<(Operator, Bindings)> {
    match plan {
        Plan::IndexScan { pattern, order, .. } => {
            scan::compile_scan(pattern, *order, ScanKind::Plain, scope, runtime, slots)
        }
        Plan::AggregatedIndexScan { pattern, order, .. } => {
            scan::compile_scan(pattern, *order, ScanKind::Aggregated, scope, runtime, slots)
        }
        Plan::FullyAggregatedIndexScan { pattern, order, .. } => {
            scan::compile_scan(pattern, *order, ScanKind::FullyAggregated, scope, runtime, slots)
        }

        Plan::ValuesScan { values, .. } => {
            let value_slots = slots
                .values_slots
                .get(values)
                .ok_or(CompileError::MissingSlotAllocation)?;
            let mut bindings = Bindings::default();
            let mut registers = Vec::with_capacity(value_slots.len());
            for (&var, &slot) in values.variables.iter().zip(value_slots) {
                let register = match scope.context_register(var) {
                    Some(context_register) => context_register,
                    None => {
                        let register = runtime.register(slot);
                        if scope.is_projected(var) {
                            bindings.insert(var, register);
                        }
                        register
                    }
                };
                registers.push(register);
            }
            let operator = Operator::ValuesScan {
                variables: registers,
                rows: values.rows.clone(),
            };
            Ok((operator, bindings))
        }

        Plan::TableFunction { input, function, .. } => {
            let (input_operator, mut bindings) =
                translate_plan(runtime, query, query_slots, input, scope, slots, fallback)?;
            let args = function
                .inputs
                .iter()
                .map(|arg| filter::build_predicate(arg, &bindings, None))
                .collect::<CResult<_>>()?;
            let output_slots = slots
                .table_function_slots
                .get(function)
                .ok_or(CompileError::MissingSlotAllocation)?;
            let mut outputs = Vec::with_capacity(output_slots.len());
            for (&var, &slot) in function.outputs.iter().zip(output_slots) {
                let register = runtime.register(slot);
                if scope.is_projected(var) {
                    bindings.insert(var, register);
                }
                outputs.push(register);
            }
            let operator = Operator::TableFunction {
                input: Box::new(input_operator),
                name: function.name.clone(),
                args,
                outputs,
            };
            Ok((operator, bindings))
        }

        Plan::Singleton => Ok(join::compile_singleton()),

        Plan::NestedLoopJoin { left, right, .. } => {
            let (join_vars, child_scope) = join::child_scope(left, right, scope);
            let children = translate_join_children(
                runtime, query, query_slots, left, right, &child_scope, slots, fallback,
            )?;
            Ok(join::compile_nested_loop_join(&join_vars, children, &scope.projection))
        }

        Plan::MergeJoin {
            left,
            right,
            join_variable,
            ..
        } => {
            let (join_vars, child_scope) = join::child_scope(left, right, scope);
            let children = translate_join_children(
                runtime, query, query_slots, left, right, &child_scope, slots, fallback,
            )?;
            join::compile_merge_join(
                &join_vars,
                *join_variable,
                left.is_optional(),
                right.is_optional(),
                children,
                &scope.projection,
            )
        }

        Plan::HashJoin {
            left, right, stats, ..
        } => {
            let (join_vars, child_scope) = join::child_scope(left, right, scope);
            let join_variable = *join_vars.iter().min().ok_or(CompileError::EmptyJoinVariables)?;
            let bitset = join::compute_bitset(join_variable, right);
            let left_cost = left.stats().map(|s| s.cost).unwrap_or(0.0);
            let right_cost = right.stats().map(|s| s.cost).unwrap_or(stats.cost);
            let children = translate_join_children(
                runtime, query, query_slots, left, right, &child_scope, slots, fallback,
            )?;
            join::compile_hash_join(
                &join_vars,
                left_cost,
                right_cost,
                left.is_optional(),
                right.is_optional(),
                bitset,
                children,
                &scope.projection,
            )
        }

        Plan::CartProd { left, right, .. } => {
            let (_, child_scope) = join::child_scope(left, right, scope);
            let children = translate_join_children(
                runtime, query, query_slots, left, right, &child_scope, slots, fallback,
            )?;
            Ok(join::compile_cart_prod(children, &scope.projection))
        }

        Plan::HashGroupify { input, .. } => {
            let (input_operator, bindings) =
                translate_plan(runtime, query, query_slots, input, scope, slots, fallback)?;
            Ok((
                Operator::HashGroupify {
                    input: Box::new(input_operator),
                },
                bindings,
            ))
        }

        Plan::Filter {
            input,
            filter,
            not_exists_plan,
            ..
        } => {
            let mut filter_vars = Vec::new();
            filter.collect_variables(&mut filter_vars);
            let mut extended_projection = scope.projection.clone();
            extended_projection.extend(filter_vars.iter().copied());
            let child_scope = scope.with_projection(extended_projection);
            let (input_operator, input_bindings) =
                translate_plan(runtime, query, query_slots, input, &child_scope, slots, fallback)?;

            let not_exists_compiled = match find_not_exists(filter) {
                Some(target) => Some(compile_not_exists(
                    runtime,
                    query,
                    query_slots,
                    target,
                    not_exists_plan.as_deref(),
                    &input_bindings,
                    slots,
                    fallback,
                )?),
                None => None,
            };
            filter::compile_filter(
                filter,
                input_operator,
                input_bindings,
                &scope.projection,
                not_exists_compiled.as_ref(),
            )
        }

        Plan::Having { input, filter, .. } => {
            let mut filter_vars = Vec::new();
            filter.collect_variables(&mut filter_vars);
            let mut extended_projection = scope.projection.clone();
            extended_projection.extend(filter_vars.iter().copied());
            let child_scope = scope.with_projection(extended_projection);
            let (input_operator, input_bindings) =
                translate_plan(runtime, query, query_slots, input, &child_scope, slots, fallback)?;
            filter::compile_having(filter, input_operator, input_bindings, &scope.projection, None)
        }

        Plan::Union { .. } => {
            let branches = set_ops::flatten_union_chain(plan);
            let compiled = branches
                .into_iter()
                .map(|branch| translate_plan(runtime, query, query_slots, branch, scope, slots, fallback))
                .collect::<CResult<Vec<_>>>()?;
            Ok(set_ops::compile_union(compiled))
        }

        Plan::MergeUnion { left, right, .. } => {
            let left_result = translate_plan(runtime, query, query_slots, left, scope, slots, fallback)?;
            let right_result = translate_plan(runtime, query, query_slots, right, scope, slots, fallback)?;
            set_ops::compile_merge_union(left_result, right_result)
        }

        Plan::Minus { left, right, .. } => {
            let context: FxHashSet<VariableId> = scope.context.keys().copied().collect();
            let left_vars = free_variables(left, &context);
            let right_vars = free_variables(right, &context);
            let common = set_ops::common_vars(&left_vars, &right_vars);

            let mut left_projection = scope.projection.clone();
            left_projection.extend(common.iter().copied());
            let left_scope = scope.with_projection(left_projection);
            let left_result = translate_plan(runtime, query, query_slots, left, &left_scope, slots, fallback)?;

            let right_projection: FxHashSet<VariableId> = common.iter().copied().collect();
            let right_scope = scope.with_projection(right_projection);
            let right_result = translate_plan(runtime, query, query_slots, right, &right_scope, slots, fallback)?;

            set_ops::compile_minus(left_result, right_result, &common)
        }

        Plan::GroupBy {
            input,
            group_variables,
            distinct,
            ..
        } => {
            let input_result = translate_plan(runtime, query, query_slots, input, scope, slots, fallback)?;
            Ok(aggregates::compile_group_by(input_result, group_variables, *distinct))
        }

        Plan::Aggregates { input, .. } => {
            let descriptor = query.aggregate.as_ref().ok_or_else(|| {
                CompileError::UnknownPlanOp(
                    "Aggregates plan node with no aggregate descriptor on its query graph".to_string(),
                )
            })?;
            let mut handler = AggregateHandler::new();
            for call in &descriptor.calls {
                handler.register(*call)?;
            }
            handler.prepare();

            let extended_projection = aggregates::extend_projection_for_aggregates(&handler, &scope.projection);
            let child_scope = scope.with_projection(extended_projection);
            let input_result = translate_plan(runtime, query, query_slots, input, &child_scope, slots, fallback)?;

            let group_keys: Vec<Register> = query
                .group_by
                .iter()
                .filter_map(|var| input_result.1.get(var).copied())
                .collect();
            Ok(aggregates::compile_aggregates(
                handler,
                &query_slots.aggregate_outputs,
                runtime,
                input_result,
                group_keys,
            ))
        }

        Plan::Subselect { inner, plan, .. } => {
            let inner_slots = slots
                .subquery_slots
                .get(inner.as_ref())
                .ok_or(CompileError::MissingSlotAllocation)?;
            let (inner_operator, inner_outputs) =
                translate_inner(runtime, inner, inner_slots, plan, slots, fallback)?;

            let mut bindings = Bindings::default();
            for (&var, &register) in inner.projection.iter().zip(&inner_outputs) {
                if scope.is_projected(var) {
                    bindings.insert(var, register);
                }
            }

            let duplicates = if matches!(inner.duplicate_handling, DuplicatePolicy::NoDuplicates) {
                SubselectDuplicates::NoDuplicates
            } else {
                SubselectDuplicates::Duplicates
            };
            let operator = Operator::DuplLimit {
                input: Box::new(inner_operator),
                output: inner_outputs,
                duplicates,
                limit: inner.limit,
                offset: inner.offset,
            };
            Ok((operator, bindings))
        }
    }
}

fn translate_join_children(
    runtime: &Runtime,
    query: &QueryGraph,
    query_slots: &QuerySlots,
    left: &Plan,
    right: &Plan,
    scope: &Scope,
    slots: &SlotAllocation,
    fallback: Register,
) -> CResult<join::JoinChildren> {
    let (left_operator, left_bindings) =
        translate_plan(runtime, query, query_slots, left, scope, slots, fallback)?;
    let (right_operator, right_bindings) =
        translate_plan(runtime, query, query_slots, right, scope, slots, fallback)?;
    Ok(join::JoinChildren {
        left_operator,
        left_bindings,
        right_operator,
        right_bindings,
    })
}

/// Finds the (at most one) `NOT EXISTS` target a filter expression carries —
/// `Plan::Filter::not_exists_plan` holds a single optional pre-planned
/// subtree, so a filter can contain at most one such target.
fn find_not_exists(filter: &Filter) -> Option<&NotExistsTarget> {
    match filter {
        Filter::NotExists(target) => Some(target),
        Filter::And(a, b)
        | Filter::Or(a, b)
        | Filter::Equal(a, b)
        | Filter::NotEqual(a, b)
        | Filter::Less(a, b)
        | Filter::LessOrEqual(a, b)
        | Filter::Greater(a, b)
        | Filter::GreaterOrEqual(a, b)
        | Filter::Plus(a, b)
        | Filter::Minus(a, b)
        | Filter::Mul(a, b)
        | Filter::Div(a, b)
        | Filter::LangMatches(a, b)
        | Filter::Contains(a, b)
        | Filter::SameTerm(a, b) => find_not_exists(a).or_else(|| find_not_exists(b)),
        Filter::Not(a)
        | Filter::UnaryPlus(a)
        | Filter::UnaryMinus(a)
        | Filter::Str(a)
        | Filter::Lang(a)
        | Filter::Datatype(a)
        | Filter::IsIri(a)
        | Filter::IsBlank(a)
        | Filter::IsLiteral(a)
        | Filter::XsdDecimal(a) => find_not_exists(a),
        Filter::Regex(a, b, c) => find_not_exists(a)
            .or_else(|| find_not_exists(b))
            .or_else(|| c.as_deref().and_then(find_not_exists)),
        Filter::Replace(a, b, c, d) => find_not_exists(a)
            .or_else(|| find_not_exists(b))
            .or_else(|| c.as_deref().and_then(find_not_exists))
            .or_else(|| d.as_deref().and_then(find_not_exists)),
        Filter::Function { args, .. } => args.iter().find_map(find_not_exists),
        Filter::In(needle, haystack) => {
            find_not_exists(needle).or_else(|| haystack.iter().find_map(find_not_exists))
        }
        Filter::NotIn(needle, _) => find_not_exists(needle),
        Filter::Literal(_)
        | Filter::Iri(_)
        | Filter::Variable(_)
        | Filter::Null
        | Filter::Bound(_)
        | Filter::Aggregate(_) => None,
    }
}

/// Compiles a filter's `NOT EXISTS` target (`spec.md` §4.F's two subforms)
/// into the register pairing [`filter::NotExistsCompiled`] carries.
/// `outer_bindings` are the bindings of the `Filter` plan node's own input
/// subtree — not the whole query's bindings — matching "paired against the
/// outer bindings" in `spec.md` §4.F.
fn compile_not_exists(
    runtime: &Runtime,
    query: &QueryGraph,
    query_slots: &QuerySlots,
    target: &NotExistsTarget,
    not_exists_plan: Option<&Plan>,
    outer_bindings: &Bindings,
    slots: &SlotAllocation,
    fallback: Register,
) -> CResult<filter::NotExistsCompiled> {
    match target {
        NotExistsTarget::Subquery(inner) => {
            let inner_slots = slots
                .subquery_slots
                .get(inner.as_ref())
                .ok_or(CompileError::MissingSlotAllocation)?;
            let plan = not_exists_plan.ok_or(CompileError::NotExistsMissingTarget)?;
            let (tree, inner_outputs) = translate_inner(runtime, inner, inner_slots, plan, slots, fallback)?;

            let mut inner_bindings = Bindings::default();
            for (&var, &register) in inner.projection.iter().zip(&inner_outputs) {
                inner_bindings.insert(var, register);
            }
            let (regs_to_load, regs_to_check) =
                filter::pair_subquery_registers(&inner.projection, &inner_bindings, outer_bindings);
            Ok(filter::NotExistsCompiled {
                tree,
                regs_to_load,
                regs_to_check,
            })
        }
        NotExistsTarget::Subpattern(group) => {
            let plan = not_exists_plan.ok_or(CompileError::NotExistsMissingTarget)?;
            let projection: FxHashSet<VariableId> =
                filter::subpattern_free_variables(group).into_iter().collect();
            let scope = Scope::new(Bindings::default(), projection);
            let (tree, inner_bindings) =
                translate_plan(runtime, query, query_slots, plan, &scope, slots, fallback)?;
            let (regs_to_load, regs_to_check) =
                filter::pair_subpattern_registers(group, &inner_bindings, outer_bindings);
            Ok(filter::NotExistsCompiled {
                tree,
                regs_to_load,
                regs_to_check,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sq_plan::{IndexOrder, PlanStats};
    use sq_query_graph::{NodeTerm, SubQuery, TriplePattern};

    fn stats() -> PlanStats {
        PlanStats {
            cardinality: 1.0,
            cost: 1.0,
        }
    }

    fn scan_plan(pattern: TriplePattern) -> Plan {
        Plan::IndexScan {
            pattern,
            order: IndexOrder::Spo,
            stats: stats(),
            optional: false,
        }
    }

    #[test]
    fn single_pattern_query_compiles_to_results_printer_over_index_scan() {
        let pattern = TriplePattern::new(
            NodeTerm::Variable(0),
            NodeTerm::Variable(1),
            NodeTerm::Variable(2),
        );
        let mut root = SubQuery::new();
        root.patterns.push(pattern);
        let query = QueryGraph::new(root, vec![0, 1, 2]);

        let (runtime, allocation, fallback) = prepare_runtime(&query);
        let plan = scan_plan(pattern);

        let operator = compile(
            &runtime,
            &query,
            &allocation.query,
            Some(&plan),
            &allocation,
            fallback,
            false,
        )
        .unwrap();

        match operator {
            Operator::ResultsPrinter { input, output, .. } => {
                assert_eq!(output.len(), 3);
                assert!(matches!(*input, Operator::IndexScan { .. }));
            }
            other => panic!("expected ResultsPrinter, got {other:?}"),
        }
    }

    #[test]
    fn query_known_empty_compiles_to_empty_scan_when_plan_is_none() {
        let mut root = SubQuery::new();
        root.values.push(sq_query_graph::ValuesNode::new(vec![], vec![]));
        let query = QueryGraph::new(root, vec![]);
        assert!(query.is_known_empty());

        let (runtime, allocation, fallback) = prepare_runtime(&query);
        let operator = compile(&runtime, &query, &allocation.query, None, &allocation, fallback, false).unwrap();
        match operator {
            Operator::ResultsPrinter { input, .. } => assert!(matches!(*input, Operator::EmptyScan)),
            other => panic!("expected ResultsPrinter, got {other:?}"),
        }
    }

    #[test]
    fn group_concat_aggregate_surfaces_not_implemented() {
        let mut root = SubQuery::new();
        root.patterns.push(TriplePattern::new(
            NodeTerm::Variable(0),
            NodeTerm::Variable(1),
            NodeTerm::Variable(2),
        ));
        let mut query = QueryGraph::new(root, vec![0]);
        query.aggregate = Some(sq_query_graph::AggregateDescriptor {
            calls: vec![sq_query_graph::AggregateCall {
                function: sq_query_graph::AggregateFunctionKind::GroupConcat,
                input: 2,
                output: 3,
            }],
        });

        let (runtime, allocation, fallback) = prepare_runtime(&query);
        let input_plan = scan_plan(TriplePattern::new(
            NodeTerm::Variable(0),
            NodeTerm::Variable(1),
            NodeTerm::Variable(2),
        ));
        let plan = Plan::Aggregates {
            input: Box::new(input_plan),
            stats: stats(),
        };

        let err = compile(&runtime, &query, &allocation.query, Some(&plan), &allocation, fallback, false)
            .unwrap_err();
        assert!(matches!(err, CompileError::AggregateNotImplemented(_)));
    }
}
