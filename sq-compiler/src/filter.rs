//! Component F: the filter/selection compiler (`spec.md` §4.F).

use crate::bindings::{remove_filter_only_bindings, Bindings};
use rustc_hash::FxHashSet;
use sq_model::{CResult, CompileError, DictId, LiteralValue, VariableId};
use sq_query_graph::{Filter, SubQuery};
use sq_runtime::{Operator, Register, SelectionPredicate};

/// The already-compiled inner tree for a filter's `NOT EXISTS` target,
/// carrying the outer/inner register pairing `spec.md` §4.F describes for
/// both subforms.
pub struct NotExistsCompiled {
    pub tree: Operator,
    pub regs_to_load: Vec<Register>,
    pub regs_to_check: Vec<Register>,
}

/// Builds the `(regs_to_load, regs_to_check)` pairing for a `subquery`-form
/// `NOT EXISTS`: every variable in the subquery's projection that is also
/// bound in the outer scope.
pub fn pair_subquery_registers(
    projection: &[VariableId],
    inner_bindings: &Bindings,
    outer_bindings: &Bindings,
) -> (Vec<Register>, Vec<Register>) {
    let mut load = Vec::new();
    let mut check = Vec::new();
    for &var in projection {
        if let (Some(&inner), Some(&outer)) = (inner_bindings.get(&var), outer_bindings.get(&var)) {
            load.push(inner);
            check.push(outer);
        }
    }
    (load, check)
}

/// Builds the same pairing for a `subpattern`-form `NOT EXISTS`: every free
/// variable of the subpattern that is also bound in the outer scope.
pub fn pair_subpattern_registers(
    subpattern: &SubQuery,
    inner_bindings: &Bindings,
    outer_bindings: &Bindings,
) -> (Vec<Register>, Vec<Register>) {
    let vars = subpattern_free_variables(subpattern);
    pair_subquery_registers(&vars, inner_bindings, outer_bindings)
}

/// The free variables of a logical group, sorted: every variable occurrence
/// in its triple patterns, nested optional/union groups, table functions,
/// VALUES blocks, and nested subqueries/minuses' projections.
///
/// Used both to pair a `NOT EXISTS` subpattern's registers and, by the
/// translate dispatcher, to build the projection scope the subpattern's own
/// plan is compiled against (`spec.md` §4.F/§4.H).
pub fn subpattern_free_variables(group: &SubQuery) -> Vec<VariableId> {
    let mut out = FxHashSet::default();
    collect_group_free_variables(group, &mut out);
    let mut vars: Vec<VariableId> = out.into_iter().collect();
    vars.sort_unstable();
    vars
}

fn collect_group_free_variables(group: &SubQuery, out: &mut FxHashSet<VariableId>) {
    for pattern in &group.patterns {
        for position in pattern.positions() {
            if let Some(var) = position.as_variable() {
                out.insert(var);
            }
        }
    }
    for nested in group.optional.iter().chain(group.unions.iter()) {
        collect_group_free_variables(nested, out);
    }
    for tf in &group.table_functions {
        out.extend(tf.outputs.iter().copied());
        for arg in &tf.inputs {
            let mut vars = Vec::new();
            arg.collect_variables(&mut vars);
            out.extend(vars);
        }
    }
    for values in &group.values {
        out.extend(values.variables.iter().copied());
    }
    for sub in group.subqueries.iter().chain(group.minuses.iter()) {
        out.extend(sub.projection.iter().copied());
    }
}

/// Recognizes the `InFilter` fast paths (`spec.md` §4.F): `Variable =
/// Literal|IRI` (or the reverse), `!=` of the same shape, and `IN(Variable,
/// literal, literal, ...)` where every haystack entry is a literal/IRI and
/// the variable is bound. Returns `None` when the filter doesn't match one
/// of these shapes, so the caller falls back to generic compilation.
fn try_fast_path(filter: &Filter, bindings: &Bindings) -> Option<(Register, Vec<DictId>, bool)> {
    fn literal_id(filter: &Filter) -> Option<DictId> {
        match filter {
            Filter::Literal(LiteralValue::Resolved(id)) | Filter::Iri(LiteralValue::Resolved(id)) => {
                Some(*id)
            }
            _ => None,
        }
    }
    fn variable_register(filter: &Filter, bindings: &Bindings) -> Option<Register> {
        match filter {
            Filter::Variable(var) => bindings.get(var).copied(),
            _ => None,
        }
    }

    match filter {
        Filter::Equal(a, b) | Filter::NotEqual(a, b) => {
            let negated = matches!(filter, Filter::NotEqual(_, _));
            let (register, literal) = variable_register(a, bindings)
                .zip(literal_id(b))
                .or_else(|| variable_register(b, bindings).zip(literal_id(a)))?;
            Some((register, vec![literal], negated))
        }
        Filter::In(needle, haystack) => {
            let register = variable_register(needle, bindings)?;
            let values: Option<Vec<DictId>> = haystack.iter().map(literal_id).collect();
            Some((register, values?, false))
        }
        _ => None,
    }
}

/// Folds a filter expression into a [`SelectionPredicate`] (`spec.md`
/// §4.F's generic predicate builder).
pub fn build_predicate(
    filter: &Filter,
    bindings: &Bindings,
    not_exists: Option<&NotExistsCompiled>,
) -> CResult<SelectionPredicate> {
    use SelectionPredicate as P;

    let recurse = |f: &Filter| build_predicate(f, bindings, not_exists);

    Ok(match filter {
        Filter::And(a, b) => P::And(Box::new(recurse(a)?), Box::new(recurse(b)?)),
        Filter::Or(a, b) => P::Or(Box::new(recurse(a)?), Box::new(recurse(b)?)),
        Filter::Not(a) => P::Not(Box::new(recurse(a)?)),

        Filter::Equal(a, b) => P::Equal(Box::new(recurse(a)?), Box::new(recurse(b)?)),
        Filter::NotEqual(a, b) => P::NotEqual(Box::new(recurse(a)?), Box::new(recurse(b)?)),
        // `Greater(a,b) ↦ Less(b,a)`, `GreaterOrEqual(a,b) ↦ LessOrEqual(b,a)`.
        Filter::Less(a, b) => P::Less(Box::new(recurse(a)?), Box::new(recurse(b)?)),
        Filter::LessOrEqual(a, b) => P::LessOrEqual(Box::new(recurse(a)?), Box::new(recurse(b)?)),
        Filter::Greater(a, b) => P::Less(Box::new(recurse(b)?), Box::new(recurse(a)?)),
        Filter::GreaterOrEqual(a, b) => {
            P::LessOrEqual(Box::new(recurse(b)?), Box::new(recurse(a)?))
        }

        Filter::Plus(a, b) => P::Plus(Box::new(recurse(a)?), Box::new(recurse(b)?)),
        Filter::Minus(a, b) => P::Minus(Box::new(recurse(a)?), Box::new(recurse(b)?)),
        Filter::Mul(a, b) => P::Mul(Box::new(recurse(a)?), Box::new(recurse(b)?)),
        Filter::Div(a, b) => P::Div(Box::new(recurse(a)?), Box::new(recurse(b)?)),
        // `UnaryPlus(x) ↦ x`.
        Filter::UnaryPlus(a) => recurse(a)?,
        Filter::UnaryMinus(a) => P::Neg(Box::new(recurse(a)?)),

        Filter::Literal(LiteralValue::Resolved(id)) => P::ConstantLiteral(*id),
        Filter::Literal(LiteralValue::Unresolved(raw)) => P::TemporaryConstantLiteral(raw.clone()),
        Filter::Iri(LiteralValue::Resolved(id)) => P::ConstantIri(*id),
        Filter::Iri(LiteralValue::Unresolved(raw)) => P::TemporaryConstantIri(raw.clone()),
        Filter::Variable(var) => match bindings.get(var) {
            Some(&register) => P::Variable(register),
            None => P::Null,
        },
        Filter::Null => P::Null,

        Filter::Function { iri, args } => P::FunctionCall {
            iri: iri.clone(),
            args: args.iter().map(&recurse).collect::<CResult<_>>()?,
        },

        Filter::Str(a) => P::Str(Box::new(recurse(a)?)),
        Filter::Lang(a) => P::Lang(Box::new(recurse(a)?)),
        Filter::LangMatches(a, b) => P::LangMatches(Box::new(recurse(a)?), Box::new(recurse(b)?)),
        Filter::Contains(a, b) => P::Contains(Box::new(recurse(a)?), Box::new(recurse(b)?)),
        Filter::Datatype(a) => P::Datatype(Box::new(recurse(a)?)),
        Filter::Bound(Some(var)) => match bindings.get(var) {
            Some(&register) => P::BoundCheck(register),
            None => P::False,
        },
        Filter::Bound(None) => P::False,
        Filter::SameTerm(a, b) => P::SameTerm(Box::new(recurse(a)?), Box::new(recurse(b)?)),
        Filter::IsIri(a) => P::IsIri(Box::new(recurse(a)?)),
        Filter::IsBlank(a) => P::IsBlank(Box::new(recurse(a)?)),
        Filter::IsLiteral(a) => P::IsLiteral(Box::new(recurse(a)?)),
        Filter::Regex(a, b, c) => P::Regex(
            Box::new(recurse(a)?),
            Box::new(recurse(b)?),
            c.as_deref().map(&recurse).transpose()?.map(Box::new),
        ),
        Filter::Replace(a, b, c, d) => P::Replace(
            Box::new(recurse(a)?),
            Box::new(recurse(b)?),
            c.as_deref().map(&recurse).transpose()?.map(Box::new),
            d.as_deref().map(&recurse).transpose()?.map(Box::new),
        ),
        Filter::In(needle, haystack) => P::In {
            needle: Box::new(recurse(needle)?),
            args: haystack.iter().map(&recurse).collect::<CResult<_>>()?,
            raw_haystack: Vec::new(),
            negated: false,
        },
        Filter::NotIn(needle, haystack) => P::In {
            needle: Box::new(recurse(needle)?),
            args: Vec::new(),
            raw_haystack: haystack.clone(),
            negated: true,
        },
        Filter::XsdDecimal(a) => P::XsdDecimal(Box::new(recurse(a)?)),

        Filter::NotExists(_) => {
            let compiled = not_exists.ok_or(CompileError::NotExistsMissingTarget)?;
            P::NotExists {
                tree: Box::new(compiled.tree.clone()),
                regs_to_load: compiled.regs_to_load.clone(),
                regs_to_check: compiled.regs_to_check.clone(),
            }
        }

        Filter::Aggregate(Some(var)) => match bindings.get(var) {
            Some(&register) => P::AggrFunction(register),
            None => P::Null,
        },
        Filter::Aggregate(None) => P::Null,
    })
}

/// Compiles a `FILTER` (`spec.md` §4.F): tries the `InFilter` fast paths
/// first, otherwise falls back to [`build_predicate`] wrapped in a generic
/// `Selection`. Removes bindings introduced solely for the filter's free
/// variables that the outer projection doesn't require.
pub fn compile_filter(
    filter: &Filter,
    input_operator: Operator,
    mut input_bindings: Bindings,
    outer_projection: &FxHashSet<VariableId>,
    not_exists: Option<&NotExistsCompiled>,
) -> CResult<(Operator, Bindings)> {
    let mut filter_vars = Vec::new();
    filter.collect_variables(&mut filter_vars);

    let operator = if let Some((register, values, negated)) = try_fast_path(filter, &input_bindings) {
        Operator::InFilter {
            input: Box::new(input_operator),
            register,
            values,
            negated,
        }
    } else {
        let predicate = build_predicate(filter, &input_bindings, not_exists)?;
        Operator::Selection {
            input: Box::new(input_operator),
            predicate,
        }
    };

    remove_filter_only_bindings(&mut input_bindings, &filter_vars, outer_projection);
    Ok((operator, input_bindings))
}

/// Compiles a `HAVING` (`spec.md` §4.F: "Identical to Filter except the
/// fast paths are not taken — always emit a generic Selection.").
pub fn compile_having(
    filter: &Filter,
    input_operator: Operator,
    mut input_bindings: Bindings,
    outer_projection: &FxHashSet<VariableId>,
    not_exists: Option<&NotExistsCompiled>,
) -> CResult<(Operator, Bindings)> {
    let mut filter_vars = Vec::new();
    filter.collect_variables(&mut filter_vars);

    let predicate = build_predicate(filter, &input_bindings, not_exists)?;
    let operator = Operator::Having {
        input: Box::new(input_operator),
        predicate,
    };
    remove_filter_only_bindings(&mut input_bindings, &filter_vars, outer_projection);
    Ok((operator, input_bindings))
}
