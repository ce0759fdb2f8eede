use crate::operator::Operator;
use crate::register::Register;
use sq_model::DictId;

/// The typed selection-predicate algebra built by the filter/selection
/// compiler (`spec.md` §3, §4.F), evaluated by the runtime's `Selection`
/// and `Having` operators over one row of registers at a time.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionPredicate {
    And(Box<SelectionPredicate>, Box<SelectionPredicate>),
    Or(Box<SelectionPredicate>, Box<SelectionPredicate>),
    Not(Box<SelectionPredicate>),

    Equal(Box<SelectionPredicate>, Box<SelectionPredicate>),
    NotEqual(Box<SelectionPredicate>, Box<SelectionPredicate>),
    /// Also stands in for `Greater`: `spec.md` §4.F folds
    /// `Greater(a,b)` into `Less(b,a)`, so no `Greater` variant exists here.
    Less(Box<SelectionPredicate>, Box<SelectionPredicate>),
    /// Also stands in for `GreaterOrEqual`, folded the same way.
    LessOrEqual(Box<SelectionPredicate>, Box<SelectionPredicate>),

    Plus(Box<SelectionPredicate>, Box<SelectionPredicate>),
    Minus(Box<SelectionPredicate>, Box<SelectionPredicate>),
    Mul(Box<SelectionPredicate>, Box<SelectionPredicate>),
    Div(Box<SelectionPredicate>, Box<SelectionPredicate>),
    Neg(Box<SelectionPredicate>),

    Variable(Register),
    ConstantLiteral(DictId),
    TemporaryConstantLiteral(String),
    ConstantIri(DictId),
    TemporaryConstantIri(String),
    Null,
    False,

    /// A reference to an aggregate output register (`spec.md` §4.F:
    /// "Aggregate reference: if the aggregate's output variable is bound,
    /// emit `AggrFunction(register)`; else `Null`").
    AggrFunction(Register),

    Str(Box<SelectionPredicate>),
    Lang(Box<SelectionPredicate>),
    LangMatches(Box<SelectionPredicate>, Box<SelectionPredicate>),
    Contains(Box<SelectionPredicate>, Box<SelectionPredicate>),
    Datatype(Box<SelectionPredicate>),
    /// `BOUND(?v)`; `spec.md` §4.F: unbound variables without even an id
    /// compile to `False` rather than this variant.
    BoundCheck(Register),
    SameTerm(Box<SelectionPredicate>, Box<SelectionPredicate>),
    IsIri(Box<SelectionPredicate>),
    IsBlank(Box<SelectionPredicate>),
    IsLiteral(Box<SelectionPredicate>),
    Regex(
        Box<SelectionPredicate>,
        Box<SelectionPredicate>,
        Option<Box<SelectionPredicate>>,
    ),
    Replace(
        Box<SelectionPredicate>,
        Box<SelectionPredicate>,
        Option<Box<SelectionPredicate>>,
        Option<Box<SelectionPredicate>>,
    ),
    /// `IN`/`NOT IN`, sharing one runtime op per `spec.md` §4.F ("`NotIn`
    /// collects the raw string values into a set and delegates to the same
    /// runtime op with an inversion flag"). `IN` populates `args` and
    /// leaves `raw_haystack` empty; `NOT IN` does the reverse.
    In {
        needle: Box<SelectionPredicate>,
        args: Vec<SelectionPredicate>,
        raw_haystack: Vec<String>,
        negated: bool,
    },
    XsdDecimal(Box<SelectionPredicate>),

    /// `FILTER NOT EXISTS`/`FILTER EXISTS`'s compiled form (`spec.md` §4.F,
    /// S6): `tree` is the compiled inner operator, `regs_to_load` the inner
    /// registers to materialize per outer row, `regs_to_check` the paired
    /// outer registers used to decide existence.
    NotExists {
        tree: Box<Operator>,
        regs_to_load: Vec<Register>,
        regs_to_check: Vec<Register>,
    },

    /// A registered extension function call, `func(args...)`.
    FunctionCall {
        iri: String,
        args: Vec<SelectionPredicate>,
    },
}
