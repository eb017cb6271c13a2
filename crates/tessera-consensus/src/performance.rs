// crates/tessera-consensus/src/performance.rs
//
// Validator performance score E for one slot:
//
//   E = theta1 * Q + theta2 * accuracy + theta3 * e^(-k * dev / sigma)
//
// Q is the fraction of the slot's scored miners this validator scored,
// accuracy is the consistency of its past E values and the last term
// penalizes distance from consensus relative to the slot's typical spread.

use tessera_core::params::ConsensusParams;
use tessera_core::types::{SlotId, Uid, ValidatorPerformance};
use tessera_store::SlotHistory;

use crate::aggregator::{Aggregation, SIGMA_EPSILON};

/// Accuracy assigned while fewer than two past scores exist.
pub const NEUTRAL_ACCURACY: f64 = 0.5;

/// Share of the slot's scored miners this validator scored.
pub fn completion_rate(scored_by_validator: usize, scored_in_slot: usize) -> f64 {
    if scored_in_slot == 0 {
        return 0.0;
    }
    (scored_by_validator as f64 / scored_in_slot as f64).clamp(0.0, 1.0)
}

/// `1 - min(1, stddev(history) / max_stddev)`.
pub fn historical_consistency(history: &[f64], max_stddev: f64) -> f64 {
    if history.len() < 2 {
        return NEUTRAL_ACCURACY;
    }
    let n = history.len() as f64;
    let mean = history.iter().sum::<f64>() / n;
    let var = history.iter().map(|e| (e - mean).powi(2)).sum::<f64>() / n;
    if max_stddev <= 0.0 {
        return if var > 0.0 { 0.0 } else { 1.0 };
    }
    1.0 - (var.sqrt() / max_stddev).min(1.0)
}

/// `e^(-k * dev / sigma)`; 1 when sigma is negligible.
pub fn deviation_term(deviation: f64, sigma: f64, k: f64) -> f64 {
    if sigma < SIGMA_EPSILON {
        return 1.0;
    }
    (-k.max(0.0) * deviation.abs() / sigma).exp()
}

/// `theta1 * Q + theta2 * accuracy + theta3 * deviation_term`, clamped to [0, 1].
pub fn performance_score(
    completion: f64,
    accuracy: f64,
    deviation_term: f64,
    params: &ConsensusParams,
) -> f64 {
    let e = params.theta1 * completion + params.theta2 * accuracy + params.theta3 * deviation_term;
    if e.is_finite() {
        e.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Performance of every contributing validator, ordered by uid.
pub fn evaluate_validators(
    slot_id: SlotId,
    aggregation: &Aggregation,
    history: &SlotHistory,
    params: &ConsensusParams,
) -> Vec<ValidatorPerformance> {
    let scored = aggregation.scored_miners.len();
    aggregation
        .contributing_validators
        .iter()
        .map(|&validator_id| {
            let past: Vec<f64> =
                history.validator_history(validator_id, slot_id, params.history_window);
            let completion =
                completion_rate(aggregation.coverage.get(&validator_id).copied().unwrap_or(0), scored);
            let accuracy = historical_consistency(&past, params.accuracy_max_stddev);
            let deviation = aggregation.deviation.get(&validator_id).copied().unwrap_or(0.0);
            let term = deviation_term(deviation, aggregation.sigma, params.k_deviation);
            ValidatorPerformance {
                validator_id,
                slot_id,
                completion,
                accuracy,
                deviation,
                normalized_deviation: aggregation.normalized_deviation(validator_id),
                score: performance_score(completion, accuracy, term, params),
            }
        })
        .collect()
}

/// Performance lookup by validator.
pub fn score_of(performances: &[ValidatorPerformance], validator_id: Uid) -> Option<f64> {
    performances
        .iter()
        .find(|p| p.validator_id == validator_id)
        .map(|p| p.score)
}
