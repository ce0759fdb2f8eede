use sq_model::{DictId, VariableId};

/// A `VALUES` clause: a fixed column list and a set of rows, each cell
/// either a constant or `UNDEF` (`None`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValuesNode {
    pub variables: Vec<VariableId>,
    pub rows: Vec<Vec<Option<DictId>>>,
}

impl ValuesNode {
    pub fn new(variables: Vec<VariableId>, rows: Vec<Vec<Option<DictId>>>) -> Self {
        Self { variables, rows }
    }
}
