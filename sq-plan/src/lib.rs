//! The physical plan: the tree the (external) optimizer hands the compiler
//! once it has picked concrete algorithms and index orders for a
//! [`sq_query_graph::QueryGraph`].
//!
//! Cost estimation, plan selection, and adaptive execution are all out of
//! scope for this crate (`spec.md` §1 Non-goals) — `Plan` only needs to be
//! rich enough to *describe* a chosen plan. The compiler trusts every
//! invariant the optimizer is documented to uphold (e.g. that `MergeJoin`
//! and `MergeUnion` children are already sorted on their join key,
//! `spec.md` §5) and raises [`sq_model::CompileError`] when a plan violates
//! one of the few invariants it does check.

use sq_model::VariableId;
use sq_query_graph::{Filter, QueryGraph, TableFunction, TriplePattern, ValuesNode};

/// One of the six permutations of (subject, predicate, object); selects
/// which triple-store index is scanned and implies the scan's output
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOrder {
    Spo,
    Sop,
    Pso,
    Pos,
    Osp,
    Ops,
}

impl IndexOrder {
    /// The position (0 = subject, 1 = predicate, 2 = object) visited last
    /// by this order — the position an `AggregatedIndexScan` leaves
    /// unmaterialized.
    pub fn last_position(self) -> usize {
        self.as_positions()[2]
    }

    /// The position visited first by this order — the only position a
    /// `FullyAggregatedIndexScan` materializes.
    pub fn first_position(self) -> usize {
        self.as_positions()[0]
    }

    /// This order as (subject/predicate/object) position indices, in scan
    /// order.
    pub fn as_positions(self) -> [usize; 3] {
        match self {
            IndexOrder::Spo => [0, 1, 2],
            IndexOrder::Sop => [0, 2, 1],
            IndexOrder::Pso => [1, 0, 2],
            IndexOrder::Pos => [1, 2, 0],
            IndexOrder::Osp => [2, 0, 1],
            IndexOrder::Ops => [2, 1, 0],
        }
    }
}

/// Cost/cardinality figures the optimizer attaches to a plan node. Carried
/// through to the operator tree for the runtime's benefit; this crate never
/// interprets them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanStats {
    pub cardinality: f64,
    pub cost: f64,
}

/// The physical plan tree. Each variant owns exactly the payload the
/// corresponding operator needs — a discriminated union in place of the
/// original's single node type with an `opArg` whose meaning depends on
/// `op`, and `left`/`right` pointers whose type depends on `op` too
/// (`spec.md` §9's design note: "a faithful reimplementation should use
/// discriminated unions").
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    IndexScan {
        pattern: TriplePattern,
        order: IndexOrder,
        stats: PlanStats,
        optional: bool,
    },
    AggregatedIndexScan {
        pattern: TriplePattern,
        order: IndexOrder,
        stats: PlanStats,
        optional: bool,
    },
    FullyAggregatedIndexScan {
        pattern: TriplePattern,
        order: IndexOrder,
        stats: PlanStats,
        optional: bool,
    },
    ValuesScan {
        values: ValuesNode,
        stats: PlanStats,
        optional: bool,
    },
    TableFunction {
        input: Box<Plan>,
        function: TableFunction,
        stats: PlanStats,
        optional: bool,
    },
    Singleton,
    NestedLoopJoin {
        left: Box<Plan>,
        right: Box<Plan>,
        stats: PlanStats,
        /// Whether this join as a whole sits under an `OPTIONAL` (read by an
        /// enclosing join's `left_optional`/`right_optional`, `spec.md`
        /// §4.D), mirroring the flag scans and subselects carry directly.
        optional: bool,
    },
    MergeJoin {
        left: Box<Plan>,
        right: Box<Plan>,
        /// The join variable the merge join drives on (`opArg` in the
        /// original).
        join_variable: VariableId,
        stats: PlanStats,
        optional: bool,
    },
    HashJoin {
        left: Box<Plan>,
        right: Box<Plan>,
        stats: PlanStats,
        optional: bool,
    },
    CartProd {
        left: Box<Plan>,
        right: Box<Plan>,
        stats: PlanStats,
        optional: bool,
    },
    HashGroupify {
        input: Box<Plan>,
        stats: PlanStats,
    },
    Filter {
        input: Box<Plan>,
        filter: Filter,
        /// The physical plan the optimizer chose for this filter's `NOT
        /// EXISTS` target, if it has one (subquery or subpattern form
        /// alike). `None` when the filter contains no `NOT EXISTS`.
        not_exists_plan: Option<Box<Plan>>,
        stats: PlanStats,
    },
    Having {
        input: Box<Plan>,
        filter: Filter,
        stats: PlanStats,
    },
    Union {
        left: Box<Plan>,
        /// `None` only for a chain terminator with no trailing sibling;
        /// see `spec.md` §9 Open Question 1 on the union-chain flattening
        /// quirk this mirrors.
        right: Option<Box<Plan>>,
        stats: PlanStats,
    },
    MergeUnion {
        left: Box<Plan>,
        right: Box<Plan>,
        stats: PlanStats,
    },
    Minus {
        left: Box<Plan>,
        right: Box<Plan>,
        stats: PlanStats,
    },
    GroupBy {
        input: Box<Plan>,
        group_variables: Vec<VariableId>,
        distinct: bool,
        stats: PlanStats,
    },
    Aggregates {
        input: Box<Plan>,
        stats: PlanStats,
    },
    Subselect {
        inner: Box<QueryGraph>,
        /// The physical plan chosen for `inner`. The optimizer picks this
        /// independently of the outer query's plan, so it has to travel
        /// alongside the query graph rather than be re-derived from it.
        plan: Box<Plan>,
        stats: PlanStats,
        optional: bool,
    },
}

impl Plan {
    pub fn stats(&self) -> Option<PlanStats> {
        match self {
            Plan::Singleton => None,
            Plan::IndexScan { stats, .. }
            | Plan::AggregatedIndexScan { stats, .. }
            | Plan::FullyAggregatedIndexScan { stats, .. }
            | Plan::ValuesScan { stats, .. }
            | Plan::TableFunction { stats, .. }
            | Plan::NestedLoopJoin { stats, .. }
            | Plan::MergeJoin { stats, .. }
            | Plan::HashJoin { stats, .. }
            | Plan::CartProd { stats, .. }
            | Plan::HashGroupify { stats, .. }
            | Plan::Filter { stats, .. }
            | Plan::Having { stats, .. }
            | Plan::Union { stats, .. }
            | Plan::MergeUnion { stats, .. }
            | Plan::Minus { stats, .. }
            | Plan::GroupBy { stats, .. }
            | Plan::Aggregates { stats, .. }
            | Plan::Subselect { stats, .. } => Some(*stats),
        }
    }

    /// Whether this plan node sits under an `OPTIONAL`. `Singleton` and
    /// internal operators (`GroupBy`, `Aggregates`, `Having`, ...) never
    /// carry the flag directly in the original either — it is only ever
    /// read off scan, join, and subselect nodes.
    pub fn is_optional(&self) -> bool {
        match self {
            Plan::IndexScan { optional, .. }
            | Plan::AggregatedIndexScan { optional, .. }
            | Plan::FullyAggregatedIndexScan { optional, .. }
            | Plan::ValuesScan { optional, .. }
            | Plan::TableFunction { optional, .. }
            | Plan::NestedLoopJoin { optional, .. }
            | Plan::MergeJoin { optional, .. }
            | Plan::HashJoin { optional, .. }
            | Plan::CartProd { optional, .. }
            | Plan::Subselect { optional, .. } => *optional,
            _ => false,
        }
    }
}
