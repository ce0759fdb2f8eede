use sq_model::VariableId;

/// The aggregate functions this core implements end to end.
///
/// `GroupConcat`/`Sample` are recognized (so the compiler can name them in
/// an error) but have no accumulator in `sq-runtime` — the evaluator
/// surfaces [`sq_model::CompileError::AggregateNotImplemented`] for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AggregateFunctionKind {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    GroupConcat,
    Sample,
}

/// One `(function, input-variable) -> output-variable` mapping declared by
/// the query, e.g. the `COUNT(?x) AS ?c` in `SELECT (COUNT(?x) AS ?c) ...`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AggregateCall {
    pub function: AggregateFunctionKind,
    pub input: VariableId,
    pub output: VariableId,
}

/// The declarative aggregate surface of a query: which aggregate calls it
/// makes. Turned into a live `AggregateHandler` (`sq-runtime`) by the
/// aggregate & group-by compiler (`sq-compiler`'s component G).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct AggregateDescriptor {
    pub calls: Vec<AggregateCall>,
}

impl AggregateDescriptor {
    /// Every output variable this descriptor declares, in declaration order.
    pub fn output_variables(&self) -> Vec<VariableId> {
        self.calls.iter().map(|c| c.output).collect()
    }

    /// Every distinct input variable this descriptor reads.
    pub fn input_variables(&self) -> Vec<VariableId> {
        let mut vars: Vec<VariableId> = self.calls.iter().map(|c| c.input).collect();
        vars.sort_unstable();
        vars.dedup();
        vars
    }
}
