//! Component C: the scan builder (`spec.md` §4.C).

use crate::bindings::{Bindings, Scope};
use crate::slots::SlotAllocation;
use sq_model::{CResult, CompileError};
use sq_plan::IndexOrder;
use sq_query_graph::TriplePattern;
use sq_runtime::{Operator, Register, Runtime, ScanPosition};

/// Which of the three scan operators to build; each applies a different
/// "which positions are materialized" rule (`spec.md` §4.C).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanKind {
    Plain,
    Aggregated,
    FullyAggregated,
}

/// Whether position `i` (0 = subject, 1 = predicate, 2 = object) is left
/// unused by `kind`'s scan over `order`.
///
/// `AggregatedIndexScan` leaves the order's last position unused;
/// `FullyAggregatedIndexScan` materializes only the order's first position.
fn is_unused(kind: ScanKind, order: IndexOrder, position: usize) -> bool {
    match kind {
        ScanKind::Plain => false,
        ScanKind::Aggregated => position == order.last_position(),
        ScanKind::FullyAggregated => position != order.first_position(),
    }
}

/// Builds an `IndexScan`/`AggregatedIndexScan`/`FullyAggregatedIndexScan`
/// over `pattern`, resolving each position to a [`ScanPosition`] per
/// `spec.md` §4.C and returning the bindings this scan materializes.
pub fn compile_scan(
    pattern: &TriplePattern,
    order: IndexOrder,
    kind: ScanKind,
    scope: &Scope,
    runtime: &Runtime,
    slots: &SlotAllocation,
) -> CResult<(Operator, Bindings)> {
    let base = *slots
        .pattern_slots
        .get(pattern)
        .ok_or(CompileError::MissingSlotAllocation)?;

    let mut positions = [ScanPosition::Unused; 3];
    let mut bindings = Bindings::default();

    for (i, term) in pattern.positions().into_iter().enumerate() {
        if is_unused(kind, order, i) {
            continue;
        }
        positions[i] = match term.as_variable() {
            None => {
                // A constant: the runtime pre-loads this slot's register
                // with the constant's dictionary id before the scan opens.
                ScanPosition::Constant(runtime.register(base + i))
            }
            Some(var) => match scope.context_register(var) {
                Some(context_register) => ScanPosition::Context(context_register),
                None => {
                    let register = runtime.register(base + i);
                    if scope.is_projected(var) {
                        bindings.insert(var, register);
                    }
                    ScanPosition::Free(register)
                }
            },
        };
    }

    let operator = match kind {
        ScanKind::Plain => Operator::IndexScan { positions, order },
        ScanKind::Aggregated => Operator::AggregatedIndexScan { positions, order },
        ScanKind::FullyAggregated => Operator::FullyAggregatedIndexScan { positions, order },
    };
    Ok((operator, bindings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashSet;
    use sq_query_graph::NodeTerm;

    fn pattern() -> TriplePattern {
        TriplePattern::new(
            NodeTerm::Variable(0),
            NodeTerm::Constant(7),
            NodeTerm::Variable(1),
        )
    }

    fn runtime_and_slots() -> (Runtime, SlotAllocation) {
        let mut allocation = SlotAllocation::default();
        allocation.pattern_slots.insert(pattern(), 0);
        allocation.total = 3;
        let mut runtime = Runtime::new();
        runtime.allocate_registers(3);
        (runtime, allocation)
    }

    #[test]
    fn plain_scan_materializes_projected_free_variables() {
        let (runtime, slots) = runtime_and_slots();
        let projection: FxHashSet<_> = [0, 1].into_iter().collect();
        let scope = Scope::new(Bindings::default(), projection);

        let (operator, bindings) =
            compile_scan(&pattern(), IndexOrder::Spo, ScanKind::Plain, &scope, &runtime, &slots)
                .unwrap();

        match operator {
            Operator::IndexScan { positions, order } => {
                assert_eq!(order, IndexOrder::Spo);
                assert!(matches!(positions[0], ScanPosition::Free(_)));
                assert!(matches!(positions[1], ScanPosition::Constant(_)));
                assert!(matches!(positions[2], ScanPosition::Free(_)));
            }
            other => panic!("expected IndexScan, got {other:?}"),
        }
        assert_eq!(bindings.len(), 2);
    }

    #[test]
    fn aggregated_scan_leaves_last_position_unused() {
        let (runtime, slots) = runtime_and_slots();
        let scope = Scope::new(Bindings::default(), FxHashSet::default());

        let (operator, bindings) = compile_scan(
            &pattern(),
            IndexOrder::Spo,
            ScanKind::Aggregated,
            &scope,
            &runtime,
            &slots,
        )
        .unwrap();

        match operator {
            Operator::AggregatedIndexScan { positions, .. } => {
                assert!(matches!(positions[2], ScanPosition::Unused));
            }
            other => panic!("expected AggregatedIndexScan, got {other:?}"),
        }
        assert!(bindings.is_empty());
    }

    #[test]
    fn fully_aggregated_scan_materializes_only_first_position() {
        let (runtime, slots) = runtime_and_slots();
        let projection: FxHashSet<_> = [0].into_iter().collect();
        let scope = Scope::new(Bindings::default(), projection);

        let (operator, _) = compile_scan(
            &pattern(),
            IndexOrder::Spo,
            ScanKind::FullyAggregated,
            &scope,
            &runtime,
            &slots,
        )
        .unwrap();

        match operator {
            Operator::FullyAggregatedIndexScan { positions, .. } => {
                assert!(matches!(positions[0], ScanPosition::Free(_)));
                assert!(matches!(positions[1], ScanPosition::Unused));
                assert!(matches!(positions[2], ScanPosition::Unused));
            }
            other => panic!("expected FullyAggregatedIndexScan, got {other:?}"),
        }
    }

    #[test]
    fn context_bound_position_reuses_context_register() {
        let (runtime, slots) = runtime_and_slots();
        let context_register = Register { slot: 42, domain: 0 };
        let mut context = Bindings::default();
        context.insert(0, context_register);
        let scope = Scope::new(context, FxHashSet::default());

        let (operator, bindings) =
            compile_scan(&pattern(), IndexOrder::Spo, ScanKind::Plain, &scope, &runtime, &slots)
                .unwrap();

        match operator {
            Operator::IndexScan { positions, .. } => {
                assert_eq!(positions[0], ScanPosition::Context(context_register));
            }
            other => panic!("expected IndexScan, got {other:?}"),
        }
        assert!(!bindings.contains_key(&0));
    }
}
