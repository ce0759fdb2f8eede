//! Component A: the slot allocator (`spec.md` §4.A).
//!
//! The original keys its `SlotMap` by node pointer: a `Plan` scan node holds
//! a back-reference to the `QueryGraph` node it scans, so `SlotMap[ptr]`
//! resolves directly. This crate's [`sq_plan::Plan`] instead embeds owned
//! value copies of the `QueryGraph` nodes it scans (a discriminated union in
//! place of the original's back-pointers, `spec.md` §9's design note), which
//! has no pointer identity to key a lookup by.
//!
//! [`GroupSlots`]/[`QuerySlots`] still mirror the shape of
//! [`sq_query_graph::SubQuery`]/[`QueryGraph`] for bookkeeping (and because
//! `spec.md`'s fixed pre-order makes that the natural walk order for
//! allocation itself), but the lookup the scan/table-function/values
//! builders (components C and onward) actually need is keyed by the node's
//! *value*: [`SlotAllocation::pattern_slots`],
//! [`SlotAllocation::table_function_slots`], and
//! [`SlotAllocation::values_slots`] map a [`TriplePattern`]/[`TableFunction`]
//! /[`ValuesNode`] directly to the slot(s) reserved for it, since a `Plan`
//! leaf carries an equal copy of the same value the allocator walked.
//!
//! This is a known, deliberate limitation: two syntactically identical
//! triple patterns/table functions/`VALUES` blocks in two different scopes
//! of the same query (e.g. the same `?s rdf:type ex:Foo` appearing both
//! inside and outside an `OPTIONAL`) would collide in these maps and
//! resolve to the same slot. See `DESIGN.md`.

use rustc_hash::FxHashMap;
use sq_model::{SlotId, VariableId};
use sq_query_graph::{
    Filter, NotExistsTarget, QueryGraph, SubQuery, TableFunction, TriplePattern, ValuesNode,
};

/// Slots reserved within one [`SubQuery`] group, in the same shape as the
/// group itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupSlots {
    /// One base slot per triple pattern (reserves 3 consecutive slots each),
    /// in `group.patterns` order.
    pub patterns: Vec<SlotId>,
    pub optional: Vec<GroupSlots>,
    pub unions: Vec<GroupSlots>,
    /// One slot per output variable, per table function, in declaration
    /// order.
    pub table_functions: Vec<Vec<SlotId>>,
    /// One slot per column variable, per `VALUES` node, in declaration
    /// order.
    pub values: Vec<Vec<SlotId>>,
    pub subqueries: Vec<QuerySlots>,
    pub minuses: Vec<QuerySlots>,
}

/// Slots reserved for a whole [`QueryGraph`] (its root group plus its own
/// assignment targets and aggregate outputs).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySlots {
    pub root: GroupSlots,
    /// One slot per global `BIND`-style assignment target, keyed by
    /// variable. Not named among the slot-reserving node kinds in
    /// `spec.md` §4.A's enumeration, but the allocator is explicitly said
    /// to "walk global assignments" — an assignment target needs a
    /// register like any other newly-bound variable, so this crate reserves
    /// one the same way aggregate outputs do.
    pub assignments: FxHashMap<VariableId, SlotId>,
    /// One slot per distinct aggregate output variable.
    pub aggregate_outputs: FxHashMap<VariableId, SlotId>,
}

/// The allocator's full result: `spec.md`'s `(SlotMap, DomainClasses,
/// totalSlots)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotAllocation {
    pub query: QuerySlots,
    /// `variable-id -> slots`, built globally across the whole query
    /// (including nested subqueries/minuses/`NOT EXISTS` targets) since all
    /// registers live in one runtime register pool for the query
    /// (`spec.md` §5).
    pub domain_classes: FxHashMap<VariableId, Vec<SlotId>>,
    /// The base slot reserved for each triple pattern, keyed by the
    /// pattern's value. A `Plan::IndexScan`/`AggregatedIndexScan`/
    /// `FullyAggregatedIndexScan` leaf looks its three slots up here by its
    /// own (equal) copy of the pattern.
    pub pattern_slots: FxHashMap<TriplePattern, SlotId>,
    /// The output slots reserved for each table function, keyed by the table
    /// function's value, in the same order as `function.outputs`.
    pub table_function_slots: FxHashMap<TableFunction, Vec<SlotId>>,
    /// The column slots reserved for each `VALUES` block, keyed by the
    /// block's value, in the same order as `values.variables`.
    pub values_slots: FxHashMap<ValuesNode, Vec<SlotId>>,
    /// The high-water mark plus one spare slot reserved for subquery
    /// projection fall-through (`spec.md` §4.A).
    pub total: usize,
    /// The [`QuerySlots`] computed for every [`QueryGraph`] visited while
    /// allocating — the root query itself plus every nested subquery/`MINUS`/
    /// `NOT EXISTS` subquery target — keyed by the graph's value for the same
    /// reason `pattern_slots` et al. are: a `Plan::Subselect` leaf carries an
    /// owned copy of the `QueryGraph` it plans, not a back-pointer, so the
    /// translator looks its slots up by that copy. Subject to the same
    /// value-identity caveat as the other maps in this module.
    pub subquery_slots: FxHashMap<QueryGraph, QuerySlots>,
}

struct Allocator {
    next_slot: SlotId,
    domain_classes: FxHashMap<VariableId, Vec<SlotId>>,
    pattern_slots: FxHashMap<TriplePattern, SlotId>,
    table_function_slots: FxHashMap<TableFunction, Vec<SlotId>>,
    values_slots: FxHashMap<ValuesNode, Vec<SlotId>>,
    subquery_slots: FxHashMap<QueryGraph, QuerySlots>,
}

impl Allocator {
    fn fresh_slot(&mut self) -> SlotId {
        let slot = self.next_slot;
        self.next_slot += 1;
        slot
    }

    fn fresh_slot_for(&mut self, var: VariableId) -> SlotId {
        let slot = self.fresh_slot();
        self.domain_classes.entry(var).or_default().push(slot);
        slot
    }

    fn allocate_pattern(&mut self, pattern: &TriplePattern) -> SlotId {
        let base = self.next_slot;
        for position in pattern.positions() {
            let slot = self.fresh_slot();
            if let Some(var) = position.as_variable() {
                self.domain_classes.entry(var).or_default().push(slot);
            }
        }
        self.pattern_slots.insert(*pattern, base);
        base
    }

    fn allocate_group(&mut self, group: &SubQuery) -> GroupSlots {
        let patterns = group
            .patterns
            .iter()
            .map(|p| self.allocate_pattern(p))
            .collect();
        let optional = group
            .optional
            .iter()
            .map(|g| self.allocate_group(g))
            .collect();
        let unions = group.unions.iter().map(|g| self.allocate_group(g)).collect();
        let table_functions = group
            .table_functions
            .iter()
            .map(|tf| {
                let slots: Vec<SlotId> = tf.outputs.iter().map(|&v| self.fresh_slot_for(v)).collect();
                self.table_function_slots.insert(tf.clone(), slots.clone());
                slots
            })
            .collect();
        let subqueries = group
            .subqueries
            .iter()
            .map(|q| self.allocate_query(q))
            .collect();
        let minuses = group.minuses.iter().map(|q| self.allocate_query(q)).collect();
        let values = group
            .values
            .iter()
            .map(|v| {
                let slots: Vec<SlotId> = v.variables.iter().map(|&var| self.fresh_slot_for(var)).collect();
                self.values_slots.insert(v.clone(), slots.clone());
                slots
            })
            .collect();
        for filter in &group.filters {
            self.allocate_filter(filter);
        }
        GroupSlots {
            patterns,
            optional,
            unions,
            table_functions,
            values,
            subqueries,
            minuses,
        }
    }

    /// Walks a filter expression purely to reach any nested `NOT EXISTS`
    /// subquery/subpattern, whose own triple patterns/nested constructs need
    /// slots too. Everything else about a filter's shape needs no slots of
    /// its own — a filter evaluates against already-bound registers.
    fn allocate_filter(&mut self, filter: &Filter) {
        match filter {
            Filter::NotExists(NotExistsTarget::Subquery(inner)) => {
                self.allocate_query(inner);
            }
            Filter::NotExists(NotExistsTarget::Subpattern(inner)) => {
                self.allocate_group(inner);
            }
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
            | Filter::SameTerm(a, b) => {
                self.allocate_filter(a);
                self.allocate_filter(b);
            }
            Filter::Not(a)
            | Filter::UnaryPlus(a)
            | Filter::UnaryMinus(a)
            | Filter::Str(a)
            | Filter::Lang(a)
            | Filter::Datatype(a)
            | Filter::IsIri(a)
            | Filter::IsBlank(a)
            | Filter::IsLiteral(a)
            | Filter::XsdDecimal(a) => self.allocate_filter(a),
            Filter::Regex(a, b, c) => {
                self.allocate_filter(a);
                self.allocate_filter(b);
                if let Some(c) = c {
                    self.allocate_filter(c);
                }
            }
            Filter::Replace(a, b, c, d) => {
                self.allocate_filter(a);
                self.allocate_filter(b);
                if let Some(c) = c {
                    self.allocate_filter(c);
                }
                if let Some(d) = d {
                    self.allocate_filter(d);
                }
            }
            Filter::Function { args, .. } => {
                for arg in args {
                    self.allocate_filter(arg);
                }
            }
            Filter::In(needle, haystack) => {
                self.allocate_filter(needle);
                for arg in haystack {
                    self.allocate_filter(arg);
                }
            }
            Filter::NotIn(needle, _) => self.allocate_filter(needle),
            Filter::Literal(_)
            | Filter::Iri(_)
            | Filter::Variable(_)
            | Filter::Null
            | Filter::Bound(_)
            | Filter::Aggregate(_) => {}
        }
    }

    fn allocate_query(&mut self, query: &QueryGraph) -> QuerySlots {
        let root = self.allocate_group(&query.root);
        let mut assignments = FxHashMap::default();
        for (var, filter) in &query.assignments {
            assignments.entry(*var).or_insert_with(|| self.fresh_slot_for(*var));
            self.allocate_filter(filter);
        }
        let mut aggregate_outputs = FxHashMap::default();
        if let Some(descriptor) = &query.aggregate {
            for call in &descriptor.calls {
                aggregate_outputs
                    .entry(call.output)
                    .or_insert_with(|| self.fresh_slot_for(call.output));
            }
        }
        let slots = QuerySlots {
            root,
            assignments,
            aggregate_outputs,
        };
        self.subquery_slots.insert(query.clone(), slots.clone());
        slots
    }
}

/// Runs the slot allocator over a whole query graph (`spec.md` §4.A).
pub fn allocate(query: &QueryGraph) -> SlotAllocation {
    let mut allocator = Allocator {
        next_slot: 0,
        domain_classes: FxHashMap::default(),
        pattern_slots: FxHashMap::default(),
        table_function_slots: FxHashMap::default(),
        values_slots: FxHashMap::default(),
        subquery_slots: FxHashMap::default(),
    };
    let slots = allocator.allocate_query(query);
    allocator.fresh_slot(); // the spare slot for subquery projection fall-through
    SlotAllocation {
        query: slots,
        domain_classes: allocator.domain_classes,
        pattern_slots: allocator.pattern_slots,
        table_function_slots: allocator.table_function_slots,
        values_slots: allocator.values_slots,
        total: allocator.next_slot,
        subquery_slots: allocator.subquery_slots,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sq_query_graph::{NodeTerm, SubQuery, TriplePattern};

    fn var(id: VariableId) -> NodeTerm {
        NodeTerm::Variable(id)
    }

    #[test]
    fn single_pattern_reserves_three_distinct_slots() {
        let mut root = SubQuery::new();
        root.patterns.push(TriplePattern::new(var(0), var(1), var(2)));
        let query = QueryGraph::new(root, vec![0, 1, 2]);

        let allocation = allocate(&query);
        assert_eq!(allocation.query.root.patterns, vec![0]);
        // high-water mark (3) + 1 spare.
        assert_eq!(allocation.total, 4);
        assert!(allocation.domain_classes.values().all(|slots| slots.len() == 1));
    }

    #[test]
    fn repeated_variable_forms_a_domain_class() {
        let mut root = SubQuery::new();
        root.patterns.push(TriplePattern::new(var(0), NodeTerm::Constant(7), var(1)));
        root.patterns.push(TriplePattern::new(var(0), NodeTerm::Constant(8), var(2)));
        let query = QueryGraph::new(root, vec![0, 1, 2]);

        let allocation = allocate(&query);
        assert_eq!(allocation.query.root.patterns, vec![0, 3]);
        assert_eq!(allocation.domain_classes[&0], vec![0, 3]);
        assert_eq!(allocation.domain_classes[&1], vec![2]);
        assert_eq!(allocation.domain_classes[&2], vec![5]);
    }
}
