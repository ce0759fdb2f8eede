//! End-to-end compilation scenarios (`spec.md` §8, S1-S6): a `QueryGraph` +
//! `Plan` pair in, the shape of the compiled `Operator` tree out.

mod support;

use sq_compiler::{compile, prepare_runtime};
use sq_model::LiteralValue;
use sq_plan::{IndexOrder, Plan};
use sq_query_graph::{
    AggregateCall, AggregateDescriptor, AggregateFunctionKind, DuplicatePolicy, Filter, NotExistsTarget,
    QueryGraph, SubQuery,
};
use sq_runtime::{DuplicateHandling, Operator, SubselectDuplicates};
use support::{iri, pattern, scan, stats, var};

/// S1: single triple pattern, no filters, full projection.
#[test]
fn s1_single_pattern_projects_all_three_positions() {
    let triple = pattern(var(0), var(1), var(2));
    let mut root = SubQuery::new();
    root.patterns.push(triple);
    let query = QueryGraph::new(root, vec![0, 1, 2]);

    let (runtime, allocation, fallback) = prepare_runtime(&query);
    let plan = scan(triple, IndexOrder::Spo);

    let operator = compile(&runtime, &query, &allocation.query, Some(&plan), &allocation, fallback, false).unwrap();

    match operator {
        Operator::ResultsPrinter {
            input,
            output,
            duplicates,
            limit,
            offset,
            silent,
        } => {
            assert_eq!(output.len(), 3);
            assert_eq!(output[0].slot, 0);
            assert_eq!(output[1].slot, 1);
            assert_eq!(output[2].slot, 2);
            assert_eq!(duplicates, DuplicateHandling::ExpandDuplicates);
            assert_eq!(limit, None);
            assert_eq!(offset, None);
            assert!(!silent);
            assert!(matches!(*input, Operator::IndexScan { order: IndexOrder::Spo, .. }));
        }
        other => panic!("expected ResultsPrinter, got {other:?}"),
    }
}

/// S2: two-pattern join on `?s`, both sides plain SPO scans, no residual
/// selection since there is only one join variable.
#[test]
fn s2_two_pattern_merge_join_on_shared_subject() {
    // ?s ex:p ?x . ?s ex:q ?y
    let triple1 = pattern(var(0), iri(100), var(1));
    let triple2 = pattern(var(0), iri(200), var(2));

    let mut root = SubQuery::new();
    root.patterns.push(triple1);
    root.patterns.push(triple2);
    let query = QueryGraph::new(root, vec![0, 1, 2]);

    let (runtime, allocation, fallback) = prepare_runtime(&query);
    let plan = Plan::MergeJoin {
        left: Box::new(scan(triple1, IndexOrder::Spo)),
        right: Box::new(scan(triple2, IndexOrder::Spo)),
        join_variable: 0,
        stats: stats(),
        optional: false,
    };

    let operator = compile(&runtime, &query, &allocation.query, Some(&plan), &allocation, fallback, false).unwrap();

    match operator {
        Operator::ResultsPrinter { input, output, .. } => {
            assert_eq!(output.len(), 3);
            match *input {
                Operator::MergeJoin {
                    left_key,
                    left_tail,
                    right_key,
                    right_tail,
                    left_optional,
                    right_optional,
                    ..
                } => {
                    assert_eq!(left_key.slot, 0, "left ?s is triple1's base slot");
                    assert_eq!(right_key.slot, 3, "right ?s is triple2's base slot");
                    assert_eq!(left_tail.len(), 1, "only ?x is left over on the left side");
                    assert_eq!(right_tail.len(), 1, "only ?y is left over on the right side");
                    assert!(!left_optional);
                    assert!(!right_optional);
                }
                other => panic!("expected MergeJoin, got {other:?}"),
            }
        }
        other => panic!("expected ResultsPrinter, got {other:?}"),
    }
}

/// S3: `FILTER (?x = "foo")` with `?x` bound by the scan takes the
/// `InFilter` fast path rather than a generic `Selection`.
#[test]
fn s3_bound_equality_filter_takes_in_filter_fast_path() {
    // ?s ex:p ?x FILTER (?x = "foo")
    let triple = pattern(var(0), iri(100), var(1));
    let filter = Filter::Equal(
        Box::new(Filter::Variable(1)),
        Box::new(Filter::Literal(LiteralValue::Resolved(42))),
    );

    let mut root = SubQuery::new();
    root.patterns.push(triple);
    root.filters.push(filter.clone());
    let query = QueryGraph::new(root, vec![1]);

    let (runtime, allocation, fallback) = prepare_runtime(&query);
    let plan = Plan::Filter {
        input: Box::new(scan(triple, IndexOrder::Spo)),
        filter,
        not_exists_plan: None,
        stats: stats(),
    };

    let operator = compile(&runtime, &query, &allocation.query, Some(&plan), &allocation, fallback, false).unwrap();

    match operator {
        Operator::ResultsPrinter { input, output, .. } => {
            assert_eq!(output.len(), 1);
            match *input {
                Operator::InFilter { values, negated, .. } => {
                    assert_eq!(values, vec![42]);
                    assert!(!negated);
                }
                other => panic!("expected InFilter, got {other:?} (no generic Selection should be built)"),
            }
        }
        other => panic!("expected ResultsPrinter, got {other:?}"),
    }
}

/// S4: `SELECT (COUNT(?x) AS ?c) WHERE { ?s ?p ?x } GROUP BY ?s`.
#[test]
fn s4_count_aggregate_grouped_by_subject() {
    let triple = pattern(var(0), var(1), var(2));

    let mut root = SubQuery::new();
    root.patterns.push(triple);
    let mut query = QueryGraph::new(root, vec![3]);
    query.group_by = vec![0];
    query.aggregate = Some(AggregateDescriptor {
        calls: vec![AggregateCall {
            function: AggregateFunctionKind::Count,
            input: 2,
            output: 3,
        }],
    });

    let (runtime, allocation, fallback) = prepare_runtime(&query);
    let plan = Plan::Aggregates {
        input: Box::new(Plan::GroupBy {
            input: Box::new(scan(triple, IndexOrder::Spo)),
            group_variables: vec![0],
            distinct: false,
            stats: stats(),
        }),
        stats: stats(),
    };

    let operator = compile(&runtime, &query, &allocation.query, Some(&plan), &allocation, fallback, false).unwrap();

    match operator {
        Operator::ResultsPrinter { input, output, .. } => {
            assert_eq!(output.len(), 1, "only ?c is projected");
            match *input {
                Operator::AggrFunctions { input, group_keys, .. } => {
                    assert_eq!(group_keys.len(), 1, "?s survived as the single group key");
                    match *input {
                        Operator::GroupBy {
                            group_registers,
                            distinct,
                            ..
                        } => {
                            assert_eq!(group_registers.len(), 1);
                            assert!(!distinct);
                        }
                        other => panic!("expected GroupBy, got {other:?}"),
                    }
                }
                other => panic!("expected AggrFunctions, got {other:?}"),
            }
        }
        other => panic!("expected ResultsPrinter, got {other:?}"),
    }
}

/// S5: `{ ?s ex:a ?x } UNION { ?s ex:b ?x }`, both branches bind both
/// variables so no branch needs an init instruction.
#[test]
fn s5_union_of_two_patterns_binding_the_same_variables() {
    let triple1 = pattern(var(0), iri(1), var(1));
    let triple2 = pattern(var(0), iri(2), var(1));

    let mut left_group = SubQuery::new();
    left_group.patterns.push(triple1);
    let mut right_group = SubQuery::new();
    right_group.patterns.push(triple2);

    let mut root = SubQuery::new();
    root.unions.push(left_group);
    root.unions.push(right_group);
    let query = QueryGraph::new(root, vec![0, 1]);

    let (runtime, allocation, fallback) = prepare_runtime(&query);
    let plan = Plan::Union {
        left: Box::new(scan(triple1, IndexOrder::Spo)),
        right: Some(Box::new(scan(triple2, IndexOrder::Spo))),
        stats: stats(),
    };

    let operator = compile(&runtime, &query, &allocation.query, Some(&plan), &allocation, fallback, false).unwrap();

    match operator {
        Operator::ResultsPrinter { input, output, .. } => {
            assert_eq!(output.len(), 2);
            match *input {
                Operator::Union { branches } => {
                    // The union-chain flattening quirk (DESIGN.md) pushes
                    // the lone non-Union terminator twice.
                    assert_eq!(branches.len(), 3);
                    for branch in &branches {
                        assert!(branch.inits.is_empty(), "every branch binds both ?s and ?x");
                    }
                }
                other => panic!("expected Union, got {other:?}"),
            }
        }
        other => panic!("expected ResultsPrinter, got {other:?}"),
    }
}

/// S6: `FILTER NOT EXISTS { ?s ex:p ?o }` with outer `?s` bound; inner `?o`
/// is neither loaded nor checked since it has no outer counterpart.
#[test]
fn s6_not_exists_subpattern_pairs_only_the_shared_variable() {
    let outer_triple = pattern(var(0), iri(1), var(1));
    let inner_triple = pattern(var(0), iri(2), var(2));

    let mut inner_group = SubQuery::new();
    inner_group.patterns.push(inner_triple);
    let not_exists = Filter::NotExists(NotExistsTarget::Subpattern(Box::new(inner_group)));

    let mut root = SubQuery::new();
    root.patterns.push(outer_triple);
    root.filters.push(not_exists.clone());
    let query = QueryGraph::new(root, vec![0]);

    let (runtime, allocation, fallback) = prepare_runtime(&query);
    let plan = Plan::Filter {
        input: Box::new(scan(outer_triple, IndexOrder::Spo)),
        filter: not_exists,
        not_exists_plan: Some(Box::new(scan(inner_triple, IndexOrder::Spo))),
        stats: stats(),
    };

    let operator = compile(&runtime, &query, &allocation.query, Some(&plan), &allocation, fallback, false).unwrap();

    match operator {
        Operator::ResultsPrinter { input, .. } => match *input {
            Operator::Selection { predicate, .. } => match predicate {
                sq_runtime::SelectionPredicate::NotExists {
                    regs_to_load,
                    regs_to_check,
                    ..
                } => {
                    assert_eq!(regs_to_load.len(), 1, "only ?s is shared with the outer scope");
                    assert_eq!(regs_to_check.len(), 1);
                }
                other => panic!("expected NotExists predicate, got {other:?}"),
            },
            other => panic!("expected Selection, got {other:?}"),
        },
        other => panic!("expected ResultsPrinter, got {other:?}"),
    }
}

/// A `Subselect` wraps its inner tree in `DuplLimit` and carries the
/// inner's `DISTINCT`-ness through as `SubselectDuplicates`.
#[test]
fn subselect_wraps_inner_tree_with_dupl_limit() {
    let inner_triple = pattern(var(1), iri(1), var(2));
    let mut inner_root = SubQuery::new();
    inner_root.patterns.push(inner_triple);
    let mut inner_query = QueryGraph::new(inner_root, vec![1, 2]);
    inner_query.duplicate_handling = DuplicatePolicy::NoDuplicates;
    inner_query.limit = Some(10);

    let mut root = SubQuery::new();
    root.subqueries.push(inner_query.clone());
    let query = QueryGraph::new(root, vec![1]);

    let (runtime, allocation, fallback) = prepare_runtime(&query);
    let inner_plan = Box::new(scan(inner_triple, IndexOrder::Spo));
    let plan = Plan::Subselect {
        inner: Box::new(inner_query),
        plan: inner_plan,
        stats: stats(),
        optional: false,
    };

    let operator = compile(&runtime, &query, &allocation.query, Some(&plan), &allocation, fallback, false).unwrap();

    match operator {
        Operator::ResultsPrinter { input, output, .. } => {
            assert_eq!(output.len(), 1);
            match *input {
                Operator::DuplLimit {
                    duplicates, limit, ..
                } => {
                    assert_eq!(duplicates, SubselectDuplicates::NoDuplicates);
                    assert_eq!(limit, Some(10));
                }
                other => panic!("expected DuplLimit, got {other:?}"),
            }
        }
        other => panic!("expected ResultsPrinter, got {other:?}"),
    }
}
