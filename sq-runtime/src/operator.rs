use crate::predicate::SelectionPredicate;
use crate::register::Register;
use sq_model::DictId;
use sq_plan::IndexOrder;

/// How a scan builder resolved one (subject/predicate/object) position of a
/// triple pattern (`spec.md` §4.C).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPosition {
    /// Bound by a constant; the runtime pre-loads `register` with the
    /// constant's dictionary id before the scan opens.
    Constant(Register),
    /// Bound by an outer-context register, reused directly rather than
    /// re-materialized.
    Context(Register),
    /// Free: materialized into `register` by the scan itself.
    Free(Register),
    /// Not materialized at all — the last position of an
    /// `AggregatedIndexScan`'s order, or any position but the first of a
    /// `FullyAggregatedIndexScan`'s order.
    Unused,
}

/// How the root (or a subselect's `DuplLimit` wrapper) handles duplicate
/// solutions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateHandling {
    ExpandDuplicates,
    CountDuplicates,
    ReduceDuplicates,
    ShowDuplicates,
}

impl From<sq_query_graph::DuplicatePolicy> for DuplicateHandling {
    /// `spec.md` §4.H's mapping: `AllDuplicates`→`ExpandDuplicates`,
    /// `CountDuplicates`→`CountDuplicates`, `ReducedDuplicates` and
    /// `NoDuplicates` both →`ReduceDuplicates`, `ShowDuplicates`→itself.
    fn from(policy: sq_query_graph::DuplicatePolicy) -> Self {
        use sq_query_graph::DuplicatePolicy::*;
        match policy {
            AllDuplicates => DuplicateHandling::ExpandDuplicates,
            CountDuplicates => DuplicateHandling::CountDuplicates,
            ReducedDuplicates | NoDuplicates => DuplicateHandling::ReduceDuplicates,
            ShowDuplicates => DuplicateHandling::ShowDuplicates,
        }
    }
}

/// The simpler two-valued duplicate policy a `Subselect`'s `DuplLimit`
/// wrapper carries (`spec.md` §4.H): distinct from the five-valued
/// [`DuplicateHandling`] the root `ResultsPrinter` uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubselectDuplicates {
    NoDuplicates,
    Duplicates,
}

/// One `ORDER BY` key as compiled for the root `Sort` operator. `register`
/// is `None` for an order-by variable with no binding — `spec.md` §4.H's
/// "sentinel null register for unbound order keys".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub register: Option<Register>,
    pub descending: bool,
}

/// One branch of a compiled `Union`: its own operator subtree, the
/// register-copy instructions that move its locally-bound variables onto
/// the union's canonical registers, and the register-init instructions that
/// reset canonical registers this branch leaves unbound (`spec.md` §4.E).
#[derive(Debug, Clone, PartialEq)]
pub struct UnionBranch {
    pub operator: Box<Operator>,
    /// `(branch register, canonical register)` pairs to copy after a row is
    /// pulled from this branch.
    pub copies: Vec<(Register, Register)>,
    /// Canonical registers this branch does not bind, to be reset to
    /// unbound so stale values from a previous branch don't leak through.
    pub inits: Vec<Register>,
}

/// The compiled operator tree: a Volcano-style pull iterator
/// (`open`/`next`/`close`, `spec.md` §5 — not modeled here, since execution
/// itself is out of scope; this type only describes the tree's shape).
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    IndexScan {
        positions: [ScanPosition; 3],
        order: IndexOrder,
    },
    AggregatedIndexScan {
        positions: [ScanPosition; 3],
        order: IndexOrder,
    },
    FullyAggregatedIndexScan {
        positions: [ScanPosition; 3],
        order: IndexOrder,
    },
    ValuesScan {
        variables: Vec<Register>,
        rows: Vec<Vec<Option<DictId>>>,
    },
    TableFunction {
        input: Box<Operator>,
        name: String,
        args: Vec<SelectionPredicate>,
        outputs: Vec<Register>,
    },
    /// The join-identity operator: one empty row, no registers. Fed to a
    /// join in place of an empty-binding child (`spec.md` §4.D edge case).
    Singleton,
    /// The root-level fallback when `compile` is handed no plan at all
    /// (`spec.md` §4.H).
    SingletonScan,
    /// The root-level fallback for a query known, syntactically, to
    /// produce no solutions (`spec.md` §4.H).
    EmptyScan,

    NestedLoopJoin {
        left: Box<Operator>,
        right: Box<Operator>,
    },
    MergeJoin {
        left: Box<Operator>,
        left_key: Register,
        left_tail: Vec<Register>,
        right: Box<Operator>,
        right_key: Register,
        right_tail: Vec<Register>,
        left_optional: bool,
        right_optional: bool,
    },
    HashJoin {
        left: Box<Operator>,
        left_key: Register,
        left_tail: Vec<Register>,
        right: Box<Operator>,
        right_key: Register,
        right_tail: Vec<Register>,
        left_cost: f64,
        right_cost: f64,
        left_optional: bool,
        right_optional: bool,
        /// 3-bit mask: whether the join key appears in the right child's
        /// scan at subject (bit 0), predicate (bit 1), object (bit 2).
        bitset: u8,
    },
    CartProd {
        left: Box<Operator>,
        left_tail: Vec<Register>,
        right: Box<Operator>,
        right_tail: Vec<Register>,
    },

    Union {
        branches: Vec<UnionBranch>,
    },
    MergeUnion {
        left: Box<Operator>,
        left_key: Register,
        right: Box<Operator>,
        right_key: Register,
        /// The left branch's register — `spec.md` §4.E: "the output
        /// register is the left branch's register".
        output: Register,
    },
    Minus {
        left: Box<Operator>,
        right: Box<Operator>,
        pairs: Vec<(Register, Register)>,
    },

    /// The fast-path filter recognized by `spec.md` §4.F before falling
    /// back to a generic `Selection`.
    InFilter {
        input: Box<Operator>,
        register: Register,
        values: Vec<DictId>,
        negated: bool,
    },
    Selection {
        input: Box<Operator>,
        predicate: SelectionPredicate,
    },
    /// `HAVING`'s selection — never takes the `InFilter` fast path
    /// (`spec.md` §4.F: "Identical to Filter except the fast paths are not
    /// taken").
    Having {
        input: Box<Operator>,
        predicate: SelectionPredicate,
    },

    HashGroupify {
        input: Box<Operator>,
    },
    GroupBy {
        input: Box<Operator>,
        group_registers: Vec<Register>,
        distinct: bool,
    },
    AggrFunctions {
        input: Box<Operator>,
        handler: crate::aggregate::AggregateHandler,
        group_keys: Vec<Register>,
    },

    /// The wrapper a compiled `Subselect` gets (`spec.md` §4.H).
    DuplLimit {
        input: Box<Operator>,
        output: Vec<Register>,
        duplicates: SubselectDuplicates,
        limit: Option<u64>,
        offset: Option<u64>,
    },
    Sort {
        input: Box<Operator>,
        output: Vec<Register>,
        keys: Vec<SortKey>,
    },
    ResultsPrinter {
        input: Box<Operator>,
        output: Vec<Register>,
        duplicates: DuplicateHandling,
        limit: Option<u64>,
        offset: Option<u64>,
        silent: bool,
    },
}
