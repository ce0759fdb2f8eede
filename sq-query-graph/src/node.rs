use sq_model::{DictId, VariableId};

/// One position (subject, predicate, or object) of a triple pattern.
///
/// The original represents this as an `is-constant` flag plus a `uint64`
/// that is read one way or the other depending on the flag; a discriminated
/// union says the same thing without the reader having to remember which
/// field means what.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeTerm {
    /// A fixed dictionary id.
    Constant(DictId),
    /// A variable occurrence.
    Variable(VariableId),
}

impl NodeTerm {
    pub fn as_variable(self) -> Option<VariableId> {
        match self {
            NodeTerm::Variable(v) => Some(v),
            NodeTerm::Constant(_) => None,
        }
    }

    pub fn is_constant(self) -> bool {
        matches!(self, NodeTerm::Constant(_))
    }
}

/// A triple pattern: three positions, each either bound to a constant or
/// carrying a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TriplePattern {
    pub subject: NodeTerm,
    pub predicate: NodeTerm,
    pub object: NodeTerm,
}

impl TriplePattern {
    pub fn new(subject: NodeTerm, predicate: NodeTerm, object: NodeTerm) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }

    /// The three positions in subject/predicate/object order, the order the
    /// slot allocator reserves slots in.
    pub fn positions(&self) -> [NodeTerm; 3] {
        [self.subject, self.predicate, self.object]
    }
}
