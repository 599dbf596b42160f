//! Synthetic visitor generation
//!
//! Visitor ids are six-digit decimal strings drawn from a seeded ChaCha8
//! stream, so a batch is reproducible for a given seed on every platform.
//! Ids are unique within one batch.

use crate::domain::types::VisitorId;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rustc_hash::FxHashSet;

const MIN_ID: u64 = 100_000;
const MAX_ID: u64 = 1_000_000;

/// Largest batch that can be served with unique six-digit ids
pub const MAX_VISITORS: usize = (MAX_ID - MIN_ID) as usize;

#[derive(Debug, Clone)]
pub struct VisitorGenerator {
    rng: ChaCha8Rng,
}

impl VisitorGenerator {
    pub fn new(seed: u64) -> Self {
        Self { rng: ChaCha8Rng::seed_from_u64(seed) }
    }

    /// Next id, possibly repeating an earlier one
    pub fn next_id(&mut self) -> VisitorId {
        let id = self.rng.gen_range(MIN_ID..MAX_ID);
        VisitorId::new(id.to_string())
    }

    /// Generate `n` distinct ids in draw order (`n` is capped at `MAX_VISITORS`)
    pub fn generate(&mut self, n: usize) -> Vec<VisitorId> {
        let n = n.min(MAX_VISITORS);
        let mut seen = FxHashSet::default();
        let mut ids = Vec::with_capacity(n);
        while ids.len() < n {
            let id = self.next_id();
            if seen.insert(id.clone()) {
                ids.push(id);
            }
        }
        ids
    }
}
