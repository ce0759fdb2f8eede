use crate::{AggregateDescriptor, Filter, TableFunction, TriplePattern, ValuesNode};
use sq_model::VariableId;

/// How the query wants duplicate solutions handled, per `spec.md` §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DuplicatePolicy {
    AllDuplicates,
    CountDuplicates,
    ReducedDuplicates,
    NoDuplicates,
    ShowDuplicates,
}

/// One `ORDER BY` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OrderKey {
    pub variable: VariableId,
    pub descending: bool,
}

/// A group of triple patterns together with the nested constructs that
/// apply to it: `OPTIONAL` groups, `UNION` branches, table functions,
/// `VALUES` blocks, nested subqueries/`MINUS`, and `FILTER`s.
///
/// This is the recursive body shared by the root of a [`QueryGraph`] and by
/// every nested group (an `OPTIONAL` branch, a `UNION` alternative, or a
/// `NOT EXISTS` subpattern).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SubQuery {
    /// The basic graph pattern's triple nodes.
    pub patterns: Vec<TriplePattern>,
    /// `OPTIONAL { ... }` groups nested directly in this group.
    pub optional: Vec<SubQuery>,
    /// `UNION` alternatives: each entry is one branch of the union.
    pub unions: Vec<SubQuery>,
    pub table_functions: Vec<TableFunction>,
    pub values: Vec<ValuesNode>,
    /// Nested `SELECT` subqueries (each a full, independently-scoped
    /// [`QueryGraph`]).
    pub subqueries: Vec<QueryGraph>,
    /// `MINUS { ... }` groups, each a full [`QueryGraph`].
    pub minuses: Vec<QueryGraph>,
    pub filters: Vec<Filter>,
}

impl SubQuery {
    pub fn new() -> Self {
        Self::default()
    }
}

/// The full logical query tree the compiler consumes: a root [`SubQuery`]
/// body plus the solution modifiers (`SELECT` projection, `ORDER BY`,
/// `GROUP BY`/aggregate descriptor, `DISTINCT`/duplicate policy,
/// `LIMIT`/`OFFSET`) that apply to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct QueryGraph {
    pub root: SubQuery,
    /// Variables the caller requires this query to expose, in projection
    /// order.
    pub projection: Vec<VariableId>,
    pub order_by: Vec<OrderKey>,
    /// Global `BIND`-style assignments evaluated after the body.
    pub assignments: Vec<(VariableId, Filter)>,
    pub aggregate: Option<AggregateDescriptor>,
    pub group_by: Vec<VariableId>,
    pub duplicate_handling: DuplicatePolicy,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl QueryGraph {
    pub fn new(root: SubQuery, projection: Vec<VariableId>) -> Self {
        Self {
            root,
            projection,
            order_by: Vec::new(),
            assignments: Vec::new(),
            aggregate: None,
            group_by: Vec::new(),
            duplicate_handling: DuplicatePolicy::AllDuplicates,
            limit: None,
            offset: None,
        }
    }

    /// Whether the query is known, syntactically, to produce no solutions
    /// (an empty `VALUES` clause with no rows and nothing else in scope).
    ///
    /// This is deliberately conservative: it only recognizes the single
    /// degenerate shape named in `spec.md` §4.H ("if the query is known
    /// empty the root is an `EmptyScan`"); anything else falls through to
    /// the normal compiled tree, whose operators may still turn out to
    /// produce zero rows at evaluation time.
    pub fn is_known_empty(&self) -> bool {
        self.root.patterns.is_empty()
            && self.root.optional.is_empty()
            && self.root.unions.is_empty()
            && self.root.table_functions.is_empty()
            && self.root.subqueries.is_empty()
            && self.root.minuses.is_empty()
            && self.root.values.len() == 1
            && self.root.values[0].rows.is_empty()
    }
}
