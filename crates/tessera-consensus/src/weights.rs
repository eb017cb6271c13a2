// crates/tessera-consensus/src/weights.rs
//
// WeightCalculator: long-run contribution of each participant.
//
// Miner:     W = sum_{t in window} adjusted_t * e^(-delta_w * (T - t))
// Validator: W = lambda * stake / total_stake
//              + (1 - lambda) * E * (1 + ln(max(tenure, 1)))
//
// Both are pure over bounded windows of committed history.

use tessera_core::params::ConsensusParams;
use tessera_core::registry::Registry;
use tessera_core::types::{AdjustedScore, Role, SlotId, ValidatorPerformance, WeightRecord};
use tessera_reputation::decay::decay_factor;
use tessera_store::SlotHistory;

/// Decayed sum of a miner's adjusted scores.
///
/// `history` holds earlier `(slot, adjusted)` pairs; slots outside the
/// window ending at `current_slot` are ignored.
pub fn miner_weight(
    history: &[(SlotId, f64)],
    current_slot: SlotId,
    current: Option<f64>,
    decay: f64,
    window: u64,
) -> f64 {
    let oldest = current_slot.saturating_sub(window.saturating_sub(1));
    let past: f64 = history
        .iter()
        .filter(|(slot, _)| *slot >= oldest && *slot < current_slot)
        .map(|(slot, value)| value.max(0.0) * decay_factor(decay, current_slot - slot))
        .sum();
    past + current.unwrap_or(0.0).max(0.0)
}

/// `lambda * stake_share + (1 - lambda) * E * (1 + ln(tenure))`.
pub fn validator_weight(stake: u64, total_stake: u64, performance: f64, tenure: u64, lambda: f64) -> f64 {
    let lambda = lambda.clamp(0.0, 1.0);
    let stake_term = if total_stake == 0 {
        0.0
    } else {
        stake as f64 / total_stake as f64
    };
    let tenure_factor = 1.0 + (tenure.max(1) as f64).ln();
    lambda * stake_term + (1.0 - lambda) * performance.max(0.0) * tenure_factor
}

/// Computes weight records for one slot.
pub struct WeightCalculator<'a> {
    params: &'a ConsensusParams,
}

impl<'a> WeightCalculator<'a> {
    pub fn new(params: &'a ConsensusParams) -> Self {
        Self { params }
    }

    /// Weights of every miner with an adjusted score this slot.
    pub fn miner_weights(
        &self,
        slot_id: SlotId,
        adjusted: &[AdjustedScore],
        history: &SlotHistory,
    ) -> Vec<WeightRecord> {
        let window = self.params.history_window.max(1);
        adjusted
            .iter()
            .map(|a| {
                let past = history.miner_history(a.miner_id, slot_id, window);
                WeightRecord {
                    participant_id: a.miner_id,
                    slot_id,
                    role: Role::Miner,
                    weight: miner_weight(
                        &past,
                        slot_id,
                        Some(a.value),
                        self.params.weight_decay(),
                        window,
                    ),
                }
            })
            .collect()
    }

    /// Weights of every evaluated validator.
    pub fn validator_weights(
        &self,
        slot_id: SlotId,
        performances: &[ValidatorPerformance],
        registry: &Registry,
    ) -> Vec<WeightRecord> {
        let total_stake = registry.active_validator_stake();
        performances
            .iter()
            .filter_map(|perf| {
                let p = registry.get(perf.validator_id)?;
                Some(WeightRecord {
                    participant_id: p.uid,
                    slot_id,
                    role: Role::Validator,
                    weight: validator_weight(
                        p.stake,
                        total_stake,
                        perf.score,
                        p.tenure(slot_id),
                        self.params.lambda,
                    ),
                })
            })
            .collect()
    }
}
