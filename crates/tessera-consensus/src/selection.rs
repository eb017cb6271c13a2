// crates/tessera-consensus/src/selection.rs
//
// SelectionScheduler: which miners are tasked in the next slot.
//
//   P(m) = trust(m) * (1 + beta * min(slots_since_selected(m), cap))
//
// Miners are drawn without replacement by weight. The RNG is a ChaCha20
// stream seeded from (selection_seed, slot_id) and candidates are ordered
// by uid, so every node computes the same selection for the same registry.

use std::collections::BTreeMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};

use tessera_core::params::ConsensusParams;
use tessera_core::registry::Registry;
use tessera_core::types::{Participant, SlotId, Uid};

/// Total weight below which the draw is uniform.
const MIN_TOTAL_WEIGHT: f64 = 1e-9;

/// Miners and validators taking part in one slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub slot_id: SlotId,
    /// In draw order.
    pub miners: Vec<Uid>,
    /// Active validators by descending trust.
    pub validators: Vec<Uid>,
    /// Normalized selection probability of every candidate miner.
    pub probabilities: BTreeMap<Uid, f64>,
}

/// Unnormalized selection weight of one miner.
pub fn selection_weight(trust: f64, idle_slots: u64, beta: f64, cap: u64) -> f64 {
    trust.max(0.0) * (1.0 + beta.max(0.0) * idle_slots.min(cap) as f64)
}

/// RNG seed for `slot_id`.
pub fn slot_seed(selection_seed: u64, slot_id: SlotId) -> u64 {
    selection_seed ^ slot_id.wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Draw up to `count` indices from `weights` without replacement.
pub fn weighted_sample(weights: &[f64], count: usize, rng: &mut impl Rng) -> Vec<usize> {
    let mut remaining: Vec<(usize, f64)> = weights
        .iter()
        .enumerate()
        .map(|(i, w)| (i, if w.is_finite() { w.max(0.0) } else { 0.0 }))
        .collect();
    let mut picked = Vec::with_capacity(count.min(weights.len()));

    while picked.len() < count && !remaining.is_empty() {
        let total: f64 = remaining.iter().map(|(_, w)| w).sum();
        let pos = if total <= MIN_TOTAL_WEIGHT {
            rng.gen_range(0..remaining.len())
        } else {
            let target = rng.gen::<f64>() * total;
            let mut acc = 0.0;
            let mut chosen = None;
            for (pos, (_, w)) in remaining.iter().enumerate() {
                acc += w;
                if target < acc {
                    chosen = Some(pos);
                    break;
                }
            }
            // Rounding can leave `target` just past the last bucket.
            chosen.unwrap_or_else(|| {
                remaining
                    .iter()
                    .rposition(|(_, w)| *w > 0.0)
                    .unwrap_or(remaining.len() - 1)
            })
        };
        picked.push(remaining.remove(pos).0);
    }

    picked
}

/// Draws the miners for a slot, weighted by trust and idle time.
pub struct SelectionScheduler<'a> {
    params: &'a ConsensusParams,
}

impl<'a> SelectionScheduler<'a> {
    /// Creates a scheduler bound to one parameter version.
    pub fn new(params: &'a ConsensusParams) -> Self {
        Self { params }
    }

    fn candidates<'r>(&self, registry: &'r Registry) -> Vec<&'r Participant> {
        // Registry iterates in uid order.
        registry.miners().filter(|p| p.is_active()).collect()
    }

    /// Selection for `slot_id` from the current registry.
    pub fn select(&self, registry: &Registry, slot_id: SlotId) -> Selection {
        let candidates = self.candidates(registry);
        let weights: Vec<f64> = candidates
            .iter()
            .map(|p| {
                selection_weight(
                    p.trust,
                    p.slots_since_selected(slot_id),
                    self.params.beta,
                    self.params.selection_cap,
                )
            })
            .collect();

        let total: f64 = weights.iter().sum();
        let probabilities = candidates
            .iter()
            .zip(&weights)
            .map(|(p, w)| {
                let prob = if total > MIN_TOTAL_WEIGHT {
                    w / total
                } else {
                    1.0 / candidates.len() as f64
                };
                (p.uid, prob)
            })
            .collect();

        let mut rng = ChaCha20Rng::seed_from_u64(slot_seed(self.params.selection_seed, slot_id));
        let miners = weighted_sample(&weights, self.params.miners_per_slot, &mut rng)
            .into_iter()
            .map(|i| candidates[i].uid)
            .collect();

        let mut validators: Vec<&Participant> =
            registry.validators().filter(|p| p.is_active()).collect();
        validators.sort_by(|a, b| b.trust.total_cmp(&a.trust).then(a.uid.cmp(&b.uid)));

        Selection {
            slot_id,
            miners,
            validators: validators.into_iter().map(|p| p.uid).collect(),
            probabilities,
        }
    }
}
