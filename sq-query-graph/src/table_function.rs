use crate::Filter;
use sq_model::VariableId;

/// A `BIND`-like table function: zero or more input argument expressions,
/// and one or more output variables it materializes per input row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableFunction {
    pub name: String,
    pub inputs: Vec<Filter>,
    pub outputs: Vec<VariableId>,
}
