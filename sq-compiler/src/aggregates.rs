//! Component G: the aggregate & group-by compiler (`spec.md` §4.G).

use crate::bindings::Bindings;
use rustc_hash::{FxHashMap, FxHashSet};
use sq_model::{SlotId, VariableId};
use sq_runtime::{AggregateHandler, Operator, Register, Runtime};

/// Step 1 of `spec.md` §4.G: the left subtree's projection must be extended
/// with the handler's input variables before it is compiled.
pub fn extend_projection_for_aggregates(
    handler: &AggregateHandler,
    projection: &FxHashSet<VariableId>,
) -> FxHashSet<VariableId> {
    let (input_vars, _) = handler.input_output_vars();
    let mut extended = projection.clone();
    extended.extend(input_vars);
    extended
}

/// Builds the `AggrFunctions` operator (`spec.md` §4.G step 1): allocates
/// one register per aggregate output variable from the slots the allocator
/// pre-reserved for them, inserts those registers into the bindings, and
/// wraps `input` with the handler and group-key list.
///
/// `handler` must already have had [`AggregateHandler::prepare`] called.
pub fn compile_aggregates(
    handler: AggregateHandler,
    aggregate_output_slots: &FxHashMap<VariableId, SlotId>,
    runtime: &Runtime,
    input: (Operator, Bindings),
    group_keys: Vec<Register>,
) -> (Operator, Bindings) {
    let (input_operator, mut bindings) = input;
    let (_, output_vars) = handler.input_output_vars();
    for var in output_vars {
        if let Some(&slot) = aggregate_output_slots.get(&var) {
            bindings.insert(var, runtime.register(slot));
        }
    }

    let operator = Operator::AggrFunctions {
        input: Box::new(input_operator),
        handler,
        group_keys,
    };
    (operator, bindings)
}

/// Builds the `GroupBy` operator (`spec.md` §4.G step 2): collects the
/// group-by variables that are actually bound, silently dropping unbound
/// ones (`spec.md` §9 Open Question 3 — preserved deliberately, see
/// `DESIGN.md`).
pub fn compile_group_by(
    input: (Operator, Bindings),
    group_variables: &[VariableId],
    distinct: bool,
) -> (Operator, Bindings) {
    let (input_operator, bindings) = input;
    let group_registers: Vec<Register> = group_variables
        .iter()
        .filter_map(|var| bindings.get(var).copied())
        .collect();
    let operator = Operator::GroupBy {
        input: Box::new(input_operator),
        group_registers,
        distinct,
    };
    (operator, bindings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sq_query_graph::{AggregateCall, AggregateFunctionKind};

    fn reg(slot: usize) -> Register {
        Register { slot, domain: 0 }
    }

    #[test]
    fn extend_projection_adds_aggregate_inputs() {
        let mut handler = AggregateHandler::new();
        handler
            .register(AggregateCall {
                function: AggregateFunctionKind::Count,
                input: 5,
                output: 6,
            })
            .unwrap();
        let projection: FxHashSet<_> = [1].into_iter().collect();
        let extended = extend_projection_for_aggregates(&handler, &projection);
        assert!(extended.contains(&5));
        assert!(extended.contains(&1));
    }

    #[test]
    fn compile_aggregates_binds_output_register() {
        let mut handler = AggregateHandler::new();
        handler
            .register(AggregateCall {
                function: AggregateFunctionKind::Count,
                input: 5,
                output: 6,
            })
            .unwrap();
        handler.prepare();

        let mut runtime = Runtime::new();
        runtime.allocate_registers(1);
        let mut slots = FxHashMap::default();
        slots.insert(6, 0);

        let (operator, bindings) = compile_aggregates(
            handler,
            &slots,
            &runtime,
            (Operator::Singleton, Bindings::default()),
            vec![],
        );
        assert!(matches!(operator, Operator::AggrFunctions { .. }));
        assert_eq!(bindings[&6], reg(0));
    }

    #[test]
    fn group_by_drops_unbound_variables() {
        let mut bindings = Bindings::default();
        bindings.insert(1, reg(0));
        let (operator, _) =
            compile_group_by((Operator::Singleton, bindings), &[1, 2], false);
        match operator {
            Operator::GroupBy { group_registers, .. } => assert_eq!(group_registers, vec![reg(0)]),
            other => panic!("expected GroupBy, got {other:?}"),
        }
    }
}
