use crate::QueryGraph;
use sq_model::{LiteralValue, VariableId};

/// An expression tree from a `FILTER`, `HAVING`, `BIND`, or table-function
/// argument.
///
/// This is a direct translation of `QueryGraph::Filter` from the original,
/// with one representational change: the original chains `ArgumentList`
/// nodes through `arg2` to represent a variadic argument list; here that
/// list is just a `Vec<Filter>` on the node that needs it
/// ([`Filter::Function`], [`Filter::In`]). The fold in
/// `sq-compiler`'s selection builder walks the same shape either way.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Filter {
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
    Not(Box<Filter>),

    Equal(Box<Filter>, Box<Filter>),
    NotEqual(Box<Filter>, Box<Filter>),
    Less(Box<Filter>, Box<Filter>),
    LessOrEqual(Box<Filter>, Box<Filter>),
    Greater(Box<Filter>, Box<Filter>),
    GreaterOrEqual(Box<Filter>, Box<Filter>),

    Plus(Box<Filter>, Box<Filter>),
    Minus(Box<Filter>, Box<Filter>),
    Mul(Box<Filter>, Box<Filter>),
    Div(Box<Filter>, Box<Filter>),
    UnaryPlus(Box<Filter>),
    UnaryMinus(Box<Filter>),

    Literal(LiteralValue),
    Iri(LiteralValue),
    /// A variable reference; absent from the query's binding environment
    /// when the variable was never actually assigned a value (e.g. a
    /// group-by key eliminated by projection).
    Variable(VariableId),
    Null,

    /// `func(args...)`, where `func` is an IRI naming a registered
    /// extension function.
    Function { iri: String, args: Vec<Filter> },

    Str(Box<Filter>),
    Lang(Box<Filter>),
    LangMatches(Box<Filter>, Box<Filter>),
    Contains(Box<Filter>, Box<Filter>),
    Datatype(Box<Filter>),
    /// `BOUND(?v)`. `None` when the variable has no id at all (it never
    /// occurs anywhere else in the query) rather than merely being unbound
    /// in the current binding environment.
    Bound(Option<VariableId>),
    SameTerm(Box<Filter>, Box<Filter>),
    IsIri(Box<Filter>),
    IsBlank(Box<Filter>),
    IsLiteral(Box<Filter>),
    Regex(Box<Filter>, Box<Filter>, Option<Box<Filter>>),
    Replace(
        Box<Filter>,
        Box<Filter>,
        Option<Box<Filter>>,
        Option<Box<Filter>>,
    ),
    /// `IN(needle, haystack...)`.
    In(Box<Filter>, Vec<Filter>),
    /// `NOT IN(needle, haystack...)`. The haystack is collected as raw
    /// lexical strings rather than compiled sub-expressions, matching the
    /// original (`Builtin_notin` walks `arg2` collecting `iter->value`).
    NotIn(Box<Filter>, Vec<String>),
    XsdDecimal(Box<Filter>),

    NotExists(NotExistsTarget),

    /// A reference to an aggregate's output variable.
    Aggregate(Option<VariableId>),
}

/// The two shapes a `NOT EXISTS` filter can target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NotExistsTarget {
    /// A full nested `SELECT`-shaped query graph.
    Subquery(Box<QueryGraph>),
    /// A same-level group pattern (no projection/solution modifiers of its
    /// own).
    Subpattern(Box<crate::SubQuery>),
}

impl Filter {
    /// Collects the free variables of this expression: every
    /// [`Filter::Variable`] reached by a recursive walk.
    ///
    /// `NOT EXISTS` targets are opaque here — their free variables are
    /// resolved against the *outer* binding environment during filter
    /// compilation (`sq-compiler`'s selection builder), not during this
    /// walk, exactly as the original's `collectVariables(filterVariables,
    /// filter)` never descends into a `Builtin_notexists` subquery/subpattern.
    pub fn collect_variables(&self, out: &mut Vec<VariableId>) {
        match self {
            Filter::Variable(v) => out.push(*v),
            Filter::And(a, b)
            | Filter::Or(a, b)
            | Filter::Equal(a, b)
            | Filter::NotEqual(a, b)
            | Filter::Less(a, b)
            | Filter::LessOrEqual(a, b)
            | Filter::Greater(a, b)
            | Filter::GreaterOrEqual(a, b)
            | Filter::Plus(a, b)
            | Filter::Minus(a, b)
            | Filter::Mul(a, b)
            | Filter::Div(a, b)
            | Filter::LangMatches(a, b)
            | Filter::Contains(a, b)
            | Filter::SameTerm(a, b) => {
                a.collect_variables(out);
                b.collect_variables(out);
            }
            Filter::Not(a)
            | Filter::UnaryPlus(a)
            | Filter::UnaryMinus(a)
            | Filter::Str(a)
            | Filter::Lang(a)
            | Filter::Datatype(a)
            | Filter::IsIri(a)
            | Filter::IsBlank(a)
            | Filter::IsLiteral(a)
            | Filter::XsdDecimal(a) => a.collect_variables(out),
            Filter::Regex(a, b, c) => {
                a.collect_variables(out);
                b.collect_variables(out);
                if let Some(c) = c {
                    c.collect_variables(out);
                }
            }
            Filter::Replace(a, b, c, d) => {
                a.collect_variables(out);
                b.collect_variables(out);
                if let Some(c) = c {
                    c.collect_variables(out);
                }
                if let Some(d) = d {
                    d.collect_variables(out);
                }
            }
            Filter::Function { args, .. } => {
                for arg in args {
                    arg.collect_variables(out);
                }
            }
            Filter::In(needle, haystack) => {
                needle.collect_variables(out);
                for arg in haystack {
                    arg.collect_variables(out);
                }
            }
            Filter::NotIn(needle, _) => needle.collect_variables(out),
            Filter::Bound(v) => {
                if let Some(v) = v {
                    out.push(*v);
                }
            }
            // An aggregate reference is not itself a free variable to
            // propagate through projection: the output register is already
            // materialized by the aggregate stage. Re-running the
            // filter-cleanup erase in `sq-compiler` over it would drop a
            // binding that downstream operators still need. The original's
            // generic `collectVariables` walk has the same exclusion,
            // because `Builtin_aggr` stores its variable in `filter.id`
            // rather than in a recursed-into `arg1`.
            Filter::Aggregate(_)
            | Filter::Literal(_)
            | Filter::Iri(_)
            | Filter::Null
            | Filter::NotExists(_) => {}
        }
    }
}
