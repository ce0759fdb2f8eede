use std::error::Error;

/// Errors raised while compiling a query graph and plan into an operator
/// tree.
///
/// Every variant here is, per design, a sign that the (external) optimizer
/// handed the compiler something it promised never to: an empty join
/// variable set, a join key outside the join variable set, an unknown plan
/// op, a `MINUS` without a right subplan, `NOT EXISTS` with neither a
/// subquery nor a subpattern, or a request for an aggregate function that
/// isn't implemented. None of these are recoverable; compilation of the
/// whole query aborts.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CompileError {
    /// `MergeJoin`/`HashJoin`/`NestedLoopJoin` computed an empty
    /// join-variable set for two children that are not independent.
    #[error("merge/hash join has no shared variables between its children")]
    EmptyJoinVariables,

    /// A `MergeJoin`'s `opArg` names a variable that is not in the
    /// join-variable set.
    #[error("merge join key variable {0} is not among the computed join variables")]
    JoinKeyNotInJoinVariables(u32),

    /// `plan->right` for a `Minus` node was not a sub-plan.
    #[error("MINUS plan node is missing its right subplan")]
    MinusMissingSubplan,

    /// `NOT EXISTS` carried neither a `subquery` nor a `subpattern`.
    #[error("NOT EXISTS filter has neither a subquery nor a subpattern")]
    NotExistsMissingTarget,

    /// The plan carried an op kind the compiler does not recognize.
    #[error("unknown plan operator kind: {0}")]
    UnknownPlanOp(String),

    /// `GROUP_CONCAT`/`SAMPLE` (or any other not-yet-implemented aggregate).
    #[error("aggregate function is not implemented: {0}")]
    AggregateNotImplemented(String),

    /// The aggregate evaluator's 64-bit `inputmask` ran out of bits
    /// (`spec.md` §9: "Document this as an explicit limit").
    #[error("aggregate evaluator exceeded its 64-variable limit")]
    TooManyAggregateVariables,

    /// The slot allocator has no entry for a triple pattern/table function/
    /// `VALUES` node a `Plan` leaf carries. Since slots are looked up by the
    /// node's value rather than its identity (`DESIGN.md`), this signals
    /// either a plan/query-graph mismatch from the optimizer, or two
    /// syntactically identical nodes in different scopes of the same query
    /// — a documented limitation of this lookup strategy.
    #[error("no slot allocation found for a plan leaf; plan and query graph are out of sync")]
    MissingSlotAllocation,

    /// `MergeUnion` requires exactly one bound variable per side (`spec.md`
    /// §9 Open Question 2: "a latent crash" in the original if the optimizer
    /// ever emits a multi-variable `MergeUnion"). Surfaced here as a regular
    /// compile error rather than a panic.
    #[error("MergeUnion requires exactly one bound variable per side, got {left} and {right}")]
    MergeUnionArity { left: usize, right: usize },

    /// A variable named in `MINUS`'s common-variable set was not actually
    /// bound on one side.
    #[error("expected variable {0} to be bound on both sides of MINUS")]
    MinusVariableNotBound(u32),

    /// Wraps a lower-level error from one of the collaborating crates.
    #[error(transparent)]
    Other(#[from] Box<dyn Error + Send + Sync>),
}

/// Result alias used throughout the compilation core.
pub type CResult<T> = Result<T, CompileError>;
