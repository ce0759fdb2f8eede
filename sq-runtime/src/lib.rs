//! The runtime's register pool, domain descriptors, compiled operator tree,
//! selection-predicate tree, and aggregate evaluator.
//!
//! This crate models the data the compiler (`sq-compiler`) hands back to
//! the (external) runtime, plus the one piece of runtime *behavior* this
//! spec does define end to end: the aggregate evaluator (`spec.md` §4.G,
//! component I). Everything else about operator execution — `open`/`next`/
//! `close`, the triple-store dictionary, the actual index scans — belongs
//! to the out-of-scope runtime register machine (`spec.md` §1) and is not
//! modeled here.

mod aggregate;
mod operator;
mod predicate;
mod register;

pub use aggregate::AggregateHandler;
pub use operator::{
    DuplicateHandling, Operator, ScanPosition, SortKey, SubselectDuplicates, UnionBranch,
};
pub use predicate::SelectionPredicate;
pub use register::{DomainDescriptor, Register, Runtime, DEFAULT_DOMAIN};
