use rustc_hash::FxHashMap;
use sq_model::{CResult, CompileError, DictId, RuntimeValue, VariableId};
use sq_query_graph::{AggregateCall, AggregateFunctionKind};
use std::collections::BTreeSet;

/// The `inputmask`/`outputmask` bitset width, and so the hard cap on the
/// number of distinct aggregate variables one query can reference
/// (`spec.md` §9: "The 64-bit `inputmask` implicitly caps the number of
/// aggregate variables at 64. Document this as an explicit limit.").
const MAX_AGGREGATE_VARS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq)]
struct VarSlot {
    value: RuntimeValue,
    requires_number: bool,
}

impl Default for VarSlot {
    fn default() -> Self {
        Self {
            value: RuntimeValue::Null,
            requires_number: false,
        }
    }
}

/// One `(function, input-variable) -> output-variable` accumulator
/// (`spec.md` §3 "Aggregate state"), grounded in
/// `original_source/src/trident/sparql/aggrhandler.cpp`'s `FunctCall`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct FunctCall {
    kind: AggregateFunctionKind,
    input_var: VariableId,
    output_var: VariableId,
    input_bit: u8,
    output_bit: u8,
    acc_int: i64,
    acc_dec: f64,
    /// `arg1_bool` in the original: `true` while the accumulator is still
    /// in integer mode. `spec.md` §9 Open Question 4: the original leaves
    /// this implicitly initialized; the reimplementation must set it to
    /// `true` explicitly at reset.
    use_int: bool,
}

impl FunctCall {
    fn reset(&mut self) {
        use AggregateFunctionKind::*;
        self.use_int = true;
        match self.kind {
            Min => {
                self.acc_int = i64::MAX;
                self.acc_dec = f64::MAX;
            }
            Max => {
                self.acc_int = i64::MIN;
                self.acc_dec = -f64::MAX;
            }
            _ => {
                self.acc_int = 0;
                self.acc_dec = 0.0;
            }
        }
    }
}

/// The per-query aggregate evaluator state machine (`spec.md` §4.G, §6's
/// `AggregateHandler` consumed-interface list). Two-phase, mirroring the
/// original: [`AggregateHandler::register`] is called once per declared
/// aggregate during compilation; [`AggregateHandler::prepare`] builds the
/// flat execution list once compilation is done, and
/// `start_update`/`update_var_*`/`stop_update` drive evaluation per row
/// group at runtime.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateHandler {
    /// `function -> (input-variable -> output-variable)`, built by
    /// `register`. A repeated `register` call for the same `(function,
    /// input)` pair keeps the first output variable and ignores the rest —
    /// the `getNewOrExistingVar` dedup `spec.md` §3 (supplemented from
    /// `original_source/`) names explicitly.
    assignments: FxHashMap<AggregateFunctionKind, FxHashMap<VariableId, VariableId>>,
    bit_of_var: FxHashMap<VariableId, u8>,
    next_bit: u8,
    calls: Vec<FunctCall>,
    slots: Vec<VarSlot>,
    input_mask: u64,
}

impl AggregateHandler {
    pub fn new() -> Self {
        Self::default()
    }

    fn bit(&mut self, var: VariableId) -> CResult<u8> {
        if let Some(&bit) = self.bit_of_var.get(&var) {
            return Ok(bit);
        }
        if self.next_bit as usize >= MAX_AGGREGATE_VARS {
            return Err(CompileError::TooManyAggregateVariables);
        }
        let bit = self.next_bit;
        self.next_bit += 1;
        self.bit_of_var.insert(var, bit);
        Ok(bit)
    }

    /// Declares one `(function, input) -> output` aggregate call. Rejects
    /// `GROUP_CONCAT`/`SAMPLE` up front (`spec.md` §4.G: "explicitly
    /// unimplemented — surface a not-implemented failure").
    pub fn register(&mut self, call: AggregateCall) -> CResult<()> {
        if matches!(
            call.function,
            AggregateFunctionKind::GroupConcat | AggregateFunctionKind::Sample
        ) {
            return Err(CompileError::AggregateNotImplemented(format!(
                "{:?}",
                call.function
            )));
        }
        self.bit(call.input)?;
        self.bit(call.output)?;
        self.assignments
            .entry(call.function)
            .or_default()
            .entry(call.input)
            .or_insert(call.output);
        Ok(())
    }

    /// `spec.md` §6's `getInputOutputVars()`: input variables that are
    /// never themselves an aggregate output, and output variables that are
    /// never themselves an aggregate input — both sorted and deduplicated.
    /// A variable that is both (a chained aggregate feeding another) is
    /// excluded from both lists, matching
    /// `AggregateHandler::getInputOutputVars` in the original verbatim.
    pub fn input_output_vars(&self) -> (Vec<VariableId>, Vec<VariableId>) {
        let mut input_vars = BTreeSet::new();
        let mut output_vars = BTreeSet::new();
        for inputs in self.assignments.values() {
            for (&input_var, &output_var) in inputs {
                input_vars.insert(input_var);
                output_vars.insert(output_var);
            }
        }
        let inputs = input_vars
            .iter()
            .filter(|v| !output_vars.contains(v))
            .copied()
            .collect();
        let outputs = output_vars
            .iter()
            .filter(|v| !input_vars.contains(v))
            .copied()
            .collect();
        (inputs, outputs)
    }

    /// Whether any aggregate has been registered at all.
    pub fn is_empty(&self) -> bool {
        self.assignments.values().all(|m| m.is_empty())
    }

    /// Builds the flat execution list from the registered assignments and
    /// resets every accumulator. Iterates assignments in a fixed
    /// `(function, input-variable)` order so repeated calls over the same
    /// registrations produce an identical `calls` order.
    pub fn prepare(&mut self) {
        self.slots = vec![VarSlot::default(); MAX_AGGREGATE_VARS];
        self.calls.clear();

        let mut ordered: Vec<(AggregateFunctionKind, VariableId, VariableId)> = self
            .assignments
            .iter()
            .flat_map(|(&kind, inputs)| {
                inputs
                    .iter()
                    .map(move |(&input_var, &output_var)| (kind, input_var, output_var))
            })
            .collect();
        ordered.sort_by_key(|&(kind, input_var, _)| (kind, input_var));

        for (kind, input_var, output_var) in ordered {
            let input_bit = self.bit_of_var[&input_var];
            let output_bit = self.bit_of_var[&output_var];
            self.slots[input_bit as usize].requires_number =
                !matches!(kind, AggregateFunctionKind::Count);
            let mut call = FunctCall {
                kind,
                input_var,
                output_var,
                input_bit,
                output_bit,
                acc_int: 0,
                acc_dec: 0.0,
                use_int: true,
            };
            call.reset();
            self.calls.push(call);
        }
    }

    pub fn start_update(&mut self) {
        self.input_mask = 0;
    }

    pub fn update_var_int(&mut self, var: VariableId, value: i64) {
        self.set_var(var, RuntimeValue::Int(value));
    }

    pub fn update_var_dec(&mut self, var: VariableId, value: f64) {
        self.set_var(var, RuntimeValue::Decimal(value));
    }

    pub fn update_var_symbol(&mut self, var: VariableId, value: DictId) {
        self.set_var(var, RuntimeValue::Symbol(value));
    }

    pub fn update_var_null(&mut self, var: VariableId) {
        self.set_var(var, RuntimeValue::Null);
    }

    fn set_var(&mut self, var: VariableId, value: RuntimeValue) {
        if let Some(&bit) = self.bit_of_var.get(&var) {
            self.slots[bit as usize].value = value;
            self.input_mask |= 1u64 << bit;
        }
    }

    /// Runs every `FunctCall` whose input fired since `start_update`,
    /// repeating until no new output fires (`spec.md` §4.G, §8 property 7:
    /// "terminates in at most as many iterations as there are aggregate
    /// dependencies").
    pub fn stop_update(&mut self) -> CResult<()> {
        loop {
            let mut output_mask = 0u64;
            let input_mask = self.input_mask;
            for call in &mut self.calls {
                if input_mask & (1u64 << call.input_bit) != 0
                    && exec(call, &mut self.slots)?
                {
                    output_mask |= 1u64 << call.output_bit;
                }
            }
            self.input_mask = output_mask;
            if output_mask == 0 {
                break;
            }
        }
        Ok(())
    }

    pub fn value(&self, var: VariableId) -> RuntimeValue {
        self.bit_of_var
            .get(&var)
            .map(|&bit| self.slots[bit as usize].value)
            .unwrap_or(RuntimeValue::Null)
    }

    pub fn requires_number(&self, var: VariableId) -> bool {
        self.bit_of_var
            .get(&var)
            .map(|&bit| self.slots[bit as usize].requires_number)
            .unwrap_or(false)
    }
}

fn exec(call: &mut FunctCall, slots: &mut [VarSlot]) -> CResult<bool> {
    use AggregateFunctionKind::*;
    match call.kind {
        Count => Ok(exec_count(call, slots)),
        Sum => {
            exec_sum(call, slots);
            Ok(true)
        }
        Avg => {
            exec_avg(call, slots);
            Ok(true)
        }
        Min => {
            exec_min_max(call, slots, true);
            Ok(true)
        }
        Max => {
            exec_min_max(call, slots, false);
            Ok(true)
        }
        GroupConcat | Sample => Err(CompileError::AggregateNotImplemented(format!(
            "{kind:?}",
            kind = call.kind
        ))),
    }
}

fn write_int(slots: &mut [VarSlot], bit: u8, value: i64) {
    slots[bit as usize].value = RuntimeValue::Int(value);
}

fn write_dec(slots: &mut [VarSlot], bit: u8, value: f64) {
    slots[bit as usize].value = RuntimeValue::Decimal(value);
}

fn exec_count(call: &mut FunctCall, slots: &mut [VarSlot]) -> bool {
    if slots[call.input_bit as usize].value.is_null() {
        write_int(slots, call.output_bit, call.acc_int);
        true
    } else {
        call.acc_int += 1;
        false
    }
}

fn exec_avg(call: &mut FunctCall, slots: &mut [VarSlot]) {
    let input = slots[call.input_bit as usize].value;
    if input.is_null() {
        let avg = if call.acc_int == 0 {
            call.acc_dec
        } else {
            call.acc_dec / call.acc_int as f64
        };
        write_dec(slots, call.output_bit, avg);
    } else if let Some(n) = input.as_f64() {
        call.acc_dec += n;
        call.acc_int += 1;
    }
}

fn exec_sum(call: &mut FunctCall, slots: &mut [VarSlot]) {
    let input = slots[call.input_bit as usize].value;
    if input.is_null() {
        if call.use_int {
            write_int(slots, call.output_bit, call.acc_int);
        } else {
            write_dec(slots, call.output_bit, call.acc_dec);
        }
        return;
    }
    match input {
        RuntimeValue::Int(v) => {
            if call.use_int {
                call.acc_int += v;
            } else {
                call.acc_dec += v as f64;
            }
        }
        RuntimeValue::Decimal(v) => {
            if call.use_int {
                call.acc_dec = call.acc_int as f64;
                call.use_int = false;
            }
            call.acc_dec += v;
        }
        RuntimeValue::Symbol(_) | RuntimeValue::Null => {}
    }
}

fn exec_min_max(call: &mut FunctCall, slots: &mut [VarSlot], is_min: bool) {
    let input = slots[call.input_bit as usize].value;
    if input.is_null() {
        if call.use_int {
            write_int(slots, call.output_bit, call.acc_int);
        } else {
            write_dec(slots, call.output_bit, call.acc_dec);
        }
        return;
    }
    match input {
        RuntimeValue::Int(v) => {
            if call.use_int {
                if (is_min && call.acc_int > v) || (!is_min && call.acc_int < v) {
                    call.acc_int = v;
                }
            } else if (is_min && call.acc_dec > v as f64) || (!is_min && call.acc_dec < v as f64) {
                call.acc_dec = v as f64;
            }
        }
        RuntimeValue::Decimal(v) => {
            if call.use_int {
                call.acc_dec = call.acc_int as f64;
                call.use_int = false;
            }
            if (is_min && call.acc_dec > v) || (!is_min && call.acc_dec < v) {
                call.acc_dec = v;
            }
        }
        RuntimeValue::Symbol(_) | RuntimeValue::Null => {}
    }
}
