//! Identifier and value types shared by every crate in the compilation core.
//!
//! These are the smallest building blocks: dictionary ids handed to us by the
//! (external) triple-store dictionary, variable ids handed to us by the
//! (external) SPARQL parser, and the small set of runtime value shapes the
//! aggregate evaluator needs to do typed arithmetic.

pub mod error;

pub use error::{CompileError, CResult};

/// A 64-bit dictionary id, as minted by the (external) triple-store
/// dictionary. Constants in a [`sq_query_graph`]-crate node carry one of
/// these; a variable position does not.
pub type DictId = u64;

/// The id the (external) parser/optimizer assigns to a SPARQL variable.
///
/// Distinct variable occurrences that refer to the same named variable share
/// a `VariableId`; the slot allocator is what turns repeated occurrences of
/// the same id into a [domain class](crate::DomainClassId).
pub type VariableId = u32;

/// A contiguous register index assigned by the slot allocator.
pub type SlotId = usize;

/// The id of a domain class (a set of slots known to share one variable).
pub type DomainClassId = usize;

/// A literal or IRI value that either already has a dictionary id, or is
/// "temporary": a raw string the runtime must resolve into a dictionary id
/// the first time it is evaluated.
///
/// This mirrors `QueryGraph::Filter::Literal`/`IRI` in the original: a
/// constant with `~id == 0` (i.e. a valid id) compiles to the resolved form,
/// everything else compiles to the temporary form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LiteralValue {
    /// The value has already been resolved to a dictionary id.
    Resolved(DictId),
    /// The value is not (yet) known to the dictionary; carries the raw
    /// lexical form so the runtime can resolve it on first evaluation.
    Unresolved(String),
}

/// The typed value an aggregate's input/output register holds between
/// `startUpdate`/`stopUpdate` cycles.
///
/// `Symbol` is a dictionary id treated opaquely (used for `SAMPLE`-like
/// passthrough and equality comparisons); `Null` models "not bound in the
/// current row".
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RuntimeValue {
    Int(i64),
    Decimal(f64),
    Symbol(DictId),
    Null,
}

impl RuntimeValue {
    pub fn is_null(self) -> bool {
        matches!(self, RuntimeValue::Null)
    }

    /// Numeric value of this runtime value, promoting ints to `f64`.
    ///
    /// Returns `None` for `Symbol`/`Null`, which have no numeric reading.
    pub fn as_f64(self) -> Option<f64> {
        match self {
            RuntimeValue::Int(v) => Some(v as f64),
            RuntimeValue::Decimal(v) => Some(v),
            RuntimeValue::Symbol(_) | RuntimeValue::Null => None,
        }
    }
}
