//! Shared builders for the end-to-end scenario tests: small constructors
//! over the `sq-query-graph`/`sq-plan` types so each scenario reads close
//! to the SPARQL it compiles.

use sq_plan::{IndexOrder, Plan, PlanStats};
use sq_query_graph::{NodeTerm, TriplePattern};

pub fn stats() -> PlanStats {
    PlanStats {
        cardinality: 1.0,
        cost: 1.0,
    }
}

pub fn pattern(s: NodeTerm, p: NodeTerm, o: NodeTerm) -> TriplePattern {
    TriplePattern::new(s, p, o)
}

pub fn var(id: u32) -> NodeTerm {
    NodeTerm::Variable(id)
}

pub fn iri(id: u64) -> NodeTerm {
    NodeTerm::Constant(id)
}

pub fn scan(pattern: TriplePattern, order: IndexOrder) -> Plan {
    Plan::IndexScan {
        pattern,
        order,
        stats: stats(),
        optional: false,
    }
}
