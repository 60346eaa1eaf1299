//! Feedback-weighted random selection.
//!
//! Each candidate's weight is `priority * (1 + ctr / 100)`, so the chance of
//! being picked grows with both the slot priority and historical CTR.

use adserve_core::types::Candidate;
use rand::Rng;

/// Selection weight for a priority and a CTR percentage.
pub fn selection_weight(priority: u8, ctr: f64) -> f64 {
    f64::from(priority) * (1.0 + ctr / 100.0)
}

/// Pick one candidate. Returns `None` only for an empty slice.
pub fn select<'a, R: Rng + ?Sized>(
    candidates: &'a [Candidate],
    position: &str,
    default_priority: u8,
    rng: &mut R,
) -> Option<&'a Candidate> {
    let weights: Vec<f64> = candidates
        .iter()
        .map(|c| selection_weight(c.priority_for(position, default_priority), c.performance.ctr))
        .collect();
    pick_weighted(&weights, rng).map(|i| &candidates[i])
}

/// Index of the chosen weight. Draws `r` in `[0, total)` and walks the
/// weights subtracting each until `r <= 0`; floating-point drift that
/// leaves nothing chosen falls back to the last index.
pub fn pick_weighted<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> Option<usize> {
    let last = weights.len().checked_sub(1)?;
    let total: f64 = weights.iter().sum();
    if !total.is_finite() || total <= 0.0 {
        return Some(last);
    }

    let mut r = rng.gen_range(0.0..total);
    for (i, w) in weights.iter().enumerate() {
        r -= w;
        if r <= 0.0 {
            return Some(i);
        }
    }
    Some(last)
}
