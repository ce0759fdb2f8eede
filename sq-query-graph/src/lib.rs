//! The logical query graph: the input the (external) SPARQL parser and
//! optimizer hand to the compilation core.
//!
//! Everything in this crate is a plain, owned data structure — no behavior
//! beyond the small structural helpers a consumer needs (free-variable
//! collection, a known-empty check). The compiler (`sq-compiler`) is what
//! walks these types to build an operator tree.

mod aggregate;
mod filter;
mod node;
mod query_graph;
mod table_function;
mod values;

pub use aggregate::{AggregateCall, AggregateDescriptor, AggregateFunctionKind};
pub use filter::{Filter, NotExistsTarget};
pub use node::{NodeTerm, TriplePattern};
pub use query_graph::{DuplicatePolicy, OrderKey, QueryGraph, SubQuery};
pub use table_function::TableFunction;
pub use values::ValuesNode;
