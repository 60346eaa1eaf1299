//! Budget guard: impression and click ceilings against live counters.
//! Monetary daily/total budgets are stored on the candidate but not
//! enforced here.

use adserve_core::types::{BudgetKind, Candidate};

pub fn within_budget(candidate: &Candidate) -> bool {
    let budget = &candidate.budget;
    let perf = &candidate.performance;
    match budget.kind {
        BudgetKind::Impressions => budget
            .max_impressions
            .is_none_or(|max| perf.impressions < max),
        BudgetKind::Clicks => budget.max_clicks.is_none_or(|max| perf.clicks < max),
        BudgetKind::None => true,
    }
}

/// Drop candidates whose ceiling has been reached.
pub fn guard(candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.into_iter().filter(within_budget).collect()
}
