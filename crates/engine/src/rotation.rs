//! Rotation policies for configured slots.

use crate::selector;
use adserve_core::placement::RotationPolicy;
use adserve_core::types::Candidate;
use dashmap::DashMap;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Round-robin cursors, one per resolved pool.
pub struct RotationState {
    cursors: DashMap<String, AtomicUsize>,
}

impl RotationState {
    pub fn new() -> Self {
        Self {
            cursors: DashMap::new(),
        }
    }

    /// Choose among eligible candidates according to `policy`.
    #[allow(clippy::too_many_arguments)]
    pub fn choose<'a, R: Rng + ?Sized>(
        &self,
        policy: RotationPolicy,
        pool_key: &str,
        candidates: &'a [Candidate],
        position: &str,
        session_id: Option<&str>,
        default_priority: u8,
        rng: &mut R,
    ) -> Option<&'a Candidate> {
        if candidates.is_empty() {
            return None;
        }
        match policy {
            RotationPolicy::Weighted => {
                selector::select(candidates, position, default_priority, rng)
            }
            RotationPolicy::Random => candidates.get(rng.gen_range(0..candidates.len())),
            RotationPolicy::Sequential => {
                let turn = self.next_turn(pool_key);
                candidates.get(turn % candidates.len())
            }
            RotationPolicy::ABTest => match session_id {
                Some(session) => {
                    let bucket = session_bucket(session) as usize % candidates.len();
                    candidates.get(bucket)
                }
                None => candidates.get(rng.gen_range(0..candidates.len())),
            },
        }
    }

    fn next_turn(&self, pool_key: &str) -> usize {
        if let Some(cursor) = self.cursors.get(pool_key) {
            return cursor.fetch_add(1, Ordering::Relaxed);
        }
        self.cursors
            .entry(pool_key.to_string())
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for RotationState {
    fn default() -> Self {
        Self::new()
    }
}

/// Deterministic bucket for a session id.
fn session_bucket(session_id: &str) -> u64 {
    session_id
        .bytes()
        .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64))
}
