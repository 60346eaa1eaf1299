//! Targeting filter. Pure predicates over a candidate and a request
//! context; an empty dimension on the candidate never excludes it.

use crate::budget;
use adserve_core::context::{day_number, hhmm, SelectionContext};
use adserve_core::types::{Candidate, CandidateStatus, TargetingRules};
use chrono::{DateTime, Utc};

/// Order-preserving filter over every targeting dimension.
pub fn filter(
    candidates: Vec<Candidate>,
    ctx: &SelectionContext,
    now: DateTime<Utc>,
) -> Vec<Candidate> {
    candidates
        .into_iter()
        .filter(|c| matches(&c.targeting, ctx, now))
        .collect()
}

pub fn matches(rules: &TargetingRules, ctx: &SelectionContext, now: DateTime<Utc>) -> bool {
    includes_any(&rules.categories, &ctx.category_ids)
        && includes_any(&rules.tags, &ctx.tags)
        && !excludes_any(&rules.exclude_categories, &ctx.category_ids)
        && !excludes_any(&rules.exclude_tags, &ctx.tags)
        && (rules.device_types.is_empty()
            || ctx
                .device_type
                .is_some_and(|d| rules.device_types.contains(&d)))
        && (rules.user_roles.is_empty()
            || ctx
                .user_role
                .as_ref()
                .is_some_and(|r| rules.user_roles.contains(r)))
        && (rules.geo_countries.is_empty()
            || ctx.geo_country.as_ref().is_some_and(|g| {
                rules
                    .geo_countries
                    .iter()
                    .any(|c| c.eq_ignore_ascii_case(g))
            }))
        && (rules.days_of_week.is_empty() || rules.days_of_week.contains(&day_number(now)))
        && rules
            .time_of_day
            .as_ref()
            .is_none_or(|w| w.contains(&hhmm(now)))
}

/// The single "show-able right now" predicate: active status, inside the
/// schedule, and under its budget ceiling.
pub fn is_eligible(candidate: &Candidate, now: DateTime<Utc>) -> bool {
    candidate.status == CandidateStatus::Active
        && candidate.schedule.contains(now)
        && budget::within_budget(candidate)
}

fn includes_any(required: &[String], offered: &[String]) -> bool {
    required.is_empty() || required.iter().any(|r| offered.contains(r))
}

fn excludes_any(excluded: &[String], offered: &[String]) -> bool {
    !excluded.is_empty() && excluded.iter().any(|e| offered.contains(e))
}
