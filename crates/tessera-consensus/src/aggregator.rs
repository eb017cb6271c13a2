// crates/tessera-consensus/src/aggregator.rs
//
// Trust-weighted aggregation of raw scores.
//
//   adjusted(m) = sum_v trust(v) * raw(m, v) / sum_v trust(v)
//
// Only active validators count. A miner whose scorers all have zero trust
// is absent rather than scored zero. The result is a convex combination of
// the raw scores and is clamped to their [min, max] range so rounding can
// never push it outside.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use tessera_core::registry::Registry;
use tessera_core::types::{AdjustedScore, SlotId, Uid};
use tessera_store::SlotScores;

/// Result of aggregating one slot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Aggregation {
    pub slot_id: SlotId,
    /// Ordered by miner id.
    pub adjusted: Vec<AdjustedScore>,
    /// Miners scored only by zero-trust validators.
    pub absent_miners: Vec<Uid>,
    /// Eligible validators with at least one score.
    pub contributing_validators: BTreeSet<Uid>,
    /// Miners with at least one eligible score.
    pub scored_miners: BTreeSet<Uid>,
    /// Number of miners each validator scored.
    pub coverage: BTreeMap<Uid, usize>,
    /// Mean |raw - adjusted| per validator, over miners with an adjusted value.
    pub deviation: BTreeMap<Uid, f64>,
    /// Root-mean-square deviation of every raw score from its consensus value.
    pub sigma: f64,
}

impl Aggregation {
    pub fn adjusted_for(&self, miner_id: Uid) -> Option<f64> {
        self.adjusted
            .iter()
            .find(|a| a.miner_id == miner_id)
            .map(|a| a.value)
    }

    /// `deviation / sigma`, or 0 when the slot shows no spread at all.
    pub fn normalized_deviation(&self, validator_id: Uid) -> f64 {
        let dev = self.deviation.get(&validator_id).copied().unwrap_or(0.0);
        if self.sigma < SIGMA_EPSILON {
            0.0
        } else {
            dev / self.sigma
        }
    }
}

/// Spread below which all validators are considered in agreement.
pub const SIGMA_EPSILON: f64 = 1e-9;

/// Distinct eligible validators with at least one score in `scores`.
pub fn contributing_validators(scores: &SlotScores, registry: &Registry) -> BTreeSet<Uid> {
    scores
        .validators()
        .into_iter()
        .filter(|v| registry.is_eligible_validator(*v))
        .collect()
}

/// Weighted mean of `(trust, raw)` pairs, or `None` when total trust is zero.
pub fn weighted_consensus(pairs: &[(f64, f64)]) -> Option<f64> {
    let total_trust: f64 = pairs.iter().map(|(t, _)| t.max(0.0)).sum();
    if total_trust <= 0.0 || !total_trust.is_finite() {
        return None;
    }
    let weighted: f64 = pairs.iter().map(|(t, r)| t.max(0.0) * r).sum();
    let lo = pairs.iter().map(|(_, r)| *r).fold(f64::INFINITY, f64::min);
    let hi = pairs.iter().map(|(_, r)| *r).fold(f64::NEG_INFINITY, f64::max);
    Some((weighted / total_trust).clamp(lo, hi))
}

/// Aggregate one slot's raw scores against the frozen registry snapshot.
pub fn aggregate(slot_id: SlotId, scores: &SlotScores, registry: &Registry) -> Aggregation {
    let mut out = Aggregation {
        slot_id,
        ..Default::default()
    };

    for (miner_id, entries) in scores.by_miner() {
        let eligible: Vec<(Uid, f64, f64)> = entries
            .iter()
            .filter(|s| registry.is_eligible_validator(s.validator_id))
            .filter_map(|s| {
                registry
                    .get(s.validator_id)
                    .map(|p| (s.validator_id, p.trust, s.value))
            })
            .collect();
        if eligible.is_empty() {
            continue;
        }

        out.scored_miners.insert(miner_id);
        for (v, _, _) in &eligible {
            out.contributing_validators.insert(*v);
            *out.coverage.entry(*v).or_insert(0) += 1;
        }

        let pairs: Vec<(f64, f64)> = eligible.iter().map(|(_, t, r)| (*t, *r)).collect();
        match weighted_consensus(&pairs) {
            Some(value) => out.adjusted.push(AdjustedScore {
                slot_id,
                miner_id,
                value,
                contributing_validator_count: eligible.len(),
            }),
            None => out.absent_miners.push(miner_id),
        }
    }

    let mut dev_sum: BTreeMap<Uid, (f64, usize)> = BTreeMap::new();
    let mut sq_sum = 0.0;
    let mut pair_count = 0usize;
    for adjusted in &out.adjusted {
        for score in scores.iter().filter(|s| s.miner_id == adjusted.miner_id) {
            if !registry.is_eligible_validator(score.validator_id) {
                continue;
            }
            let d = (score.value - adjusted.value).abs();
            let entry = dev_sum.entry(score.validator_id).or_insert((0.0, 0));
            entry.0 += d;
            entry.1 += 1;
            sq_sum += d * d;
            pair_count += 1;
        }
    }
    out.deviation = dev_sum
        .into_iter()
        .map(|(v, (sum, n))| (v, sum / n as f64))
        .collect();
    out.sigma = if pair_count > 0 {
        (sq_sum / pair_count as f64).sqrt()
    } else {
        0.0
    };

    out
}
