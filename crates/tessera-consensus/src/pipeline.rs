// crates/tessera-consensus/src/pipeline.rs
//
// The slot pipeline: a pure function from frozen inputs to everything a
// committed slot emits.
//
//   aggregate -> validator performance -> weights -> incentives
//             -> trust plan -> penalties
//
// Nothing here writes to the registry. The coordinator applies the outcome
// in one step afterwards, so every stage reads the same trust snapshot.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use tessera_core::params::ConsensusParams;
use tessera_core::registry::Registry;
use tessera_core::types::{
    IncentiveRecord, PenaltyRecord, Role, SlotCommit, SlotId, TrustDelta, Uid,
    ValidatorPerformance, WeightRecord,
};
use tessera_economics::{slash_amount, split_pool, Contribution, IncentiveDistributor};
use tessera_reputation::{penalty, TrustLedger};
use tessera_store::{SlotHistory, SlotScores};

use crate::aggregator::{aggregate, Aggregation};
use crate::performance::evaluate_validators;
use crate::weights::WeightCalculator;

/// Frozen inputs of one slot.
pub struct SlotInputs<'a> {
    pub slot_id: SlotId,
    pub params: &'a ConsensusParams,
    pub registry: &'a Registry,
    pub scores: &'a SlotScores,
    pub history: &'a SlotHistory,
}

/// Everything computed for one slot, before it is applied.
#[derive(Debug, Clone)]
pub struct SlotOutcome {
    pub slot_id: SlotId,
    pub aggregation: Aggregation,
    pub performances: Vec<ValidatorPerformance>,
    pub weights: Vec<WeightRecord>,
    pub incentives: Vec<IncentiveRecord>,
    pub trust_deltas: Vec<TrustDelta>,
    pub penalties: Vec<PenaltyRecord>,
}

impl SlotOutcome {
    /// True when no miner received a usable score.
    pub fn is_empty(&self) -> bool {
        self.aggregation.adjusted.is_empty()
    }

    pub fn into_commit(self, params_version: u32, committed_at: DateTime<Utc>) -> SlotCommit {
        SlotCommit {
            slot_id: self.slot_id,
            params_version,
            adjusted: self.aggregation.adjusted,
            absent_miners: self.aggregation.absent_miners,
            performances: self.performances,
            weights: self.weights,
            incentives: self.incentives,
            trust_deltas: self.trust_deltas,
            penalties: self.penalties,
            committed_at,
        }
    }
}

fn contributions(weights: &[WeightRecord], values: &BTreeMap<Uid, f64>, registry: &Registry) -> Vec<Contribution> {
    weights
        .iter()
        .filter_map(|w| {
            let contribution = *values.get(&w.participant_id)?;
            let trust = registry.get(w.participant_id)?.trust;
            Some(Contribution {
                participant_id: w.participant_id,
                trust,
                weight: w.weight,
                contribution,
            })
        })
        .collect()
}

/// Run every stage for one slot.
pub fn compute_slot_outcome(inputs: SlotInputs<'_>) -> SlotOutcome {
    let SlotInputs {
        slot_id,
        params,
        registry,
        scores,
        history,
    } = inputs;

    let aggregation = aggregate(slot_id, scores, registry);
    let performances = evaluate_validators(slot_id, &aggregation, history, params);

    let calculator = WeightCalculator::new(params);
    let miner_weights = calculator.miner_weights(slot_id, &aggregation.adjusted, history);
    let validator_weights = calculator.validator_weights(slot_id, &performances, registry);

    let adjusted: BTreeMap<Uid, f64> = aggregation
        .adjusted
        .iter()
        .map(|a| (a.miner_id, a.value))
        .collect();
    let evaluated: BTreeMap<Uid, f64> = performances
        .iter()
        .map(|p| (p.validator_id, p.score))
        .collect();

    let pools = split_pool(params.reward_pool_per_slot, params.validator_pool_fraction);
    let distributor = IncentiveDistributor::new(params.incentive_trust_fn);
    let mut incentives = distributor.distribute(
        Role::Miner,
        slot_id,
        &contributions(&miner_weights, &adjusted, registry),
        pools.miner_pool,
    );
    incentives.extend(distributor.distribute(
        Role::Validator,
        slot_id,
        &contributions(&validator_weights, &evaluated, registry),
        pools.validator_pool,
    ));

    let mut trust_inputs = adjusted;
    trust_inputs.extend(evaluated);
    let mut trust_deltas = TrustLedger::new(params).plan(registry, slot_id, &trust_inputs);

    let contributing = aggregation.contributing_validators.len();
    let mut penalties = Vec::new();
    for perf in &performances {
        let Some(delta) = trust_deltas
            .iter_mut()
            .find(|d| d.participant_id == perf.validator_id)
        else {
            continue;
        };
        let Some(decision) =
            penalty::decide(delta.after, perf.normalized_deviation, contributing, &params.penalty)
        else {
            continue;
        };
        let stake = registry.get(perf.validator_id).map(|p| p.stake).unwrap_or(0);
        penalties.push(PenaltyRecord {
            participant_id: perf.validator_id,
            slot_id,
            severity: decision.severity,
            trust_before: delta.after,
            trust_after: decision.trust_after,
            slash_amount: slash_amount(stake, decision.severity, params.penalty.max_slash_rate),
            jailed: decision.jail,
        });
        delta.after = decision.trust_after;
    }

    let mut weights = miner_weights;
    weights.extend(validator_weights);

    SlotOutcome {
        slot_id,
        aggregation,
        performances,
        weights,
        incentives,
        trust_deltas,
        penalties,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::types::{Participant, RawScore};

    fn registry(validators: &[(Uid, f64)], miners: &[Uid]) -> Registry {
        let mut r = Registry::new();
        for (uid, trust) in validators {
            r.register(Participant::new(*uid, Role::Validator, [*uid as u8; 32], 100, *trust, 0))
                .unwrap();
        }
        for uid in miners {
            r.register(Participant::new(*uid, Role::Miner, [*uid as u8; 32], 0, 0.5, 0))
                .unwrap();
        }
        r
    }

    fn run(reg: &Registry, scores: &SlotScores, params: &ConsensusParams) -> SlotOutcome {
        let history = SlotHistory::new();
        compute_slot_outcome(SlotInputs {
            slot_id: scores.slot_id(),
            params,
            registry: reg,
            scores,
            history: &history,
        })
    }

    fn share_sum(outcome: &SlotOutcome, role: Role) -> f64 {
        outcome
            .incentives
            .iter()
            .filter(|i| i.role == role)
            .map(|i| i.share)
            .sum()
    }

    #[test]
    fn test_full_pipeline_shares_sum_to_one() {
        let reg = registry(&[(1, 0.9), (2, 0.7), (3, 0.5)], &[10, 11]);
        let scores = SlotScores::from_scores(
            1,
            vec![
                RawScore::new(1, 10, 1, 0.85),
                RawScore::new(1, 10, 2, 0.80),
                RawScore::new(1, 10, 3, 0.60),
                RawScore::new(1, 11, 1, 0.30),
                RawScore::new(1, 11, 2, 0.35),
            ],
        );
        let params = ConsensusParams::default();
        let outcome = run(&reg, &scores, &params);

        assert_eq!(outcome.aggregation.adjusted.len(), 2);
        assert_eq!(outcome.performances.len(), 3);
        assert!((share_sum(&outcome, Role::Miner) - 1.0).abs() < 1e-9);
        assert!((share_sum(&outcome, Role::Validator) - 1.0).abs() < 1e-9);
        assert_eq!(outcome.trust_deltas.len(), reg.len());
        assert!(outcome.penalties.is_empty());

        let commit = outcome.into_commit(params.version, Utc::now());
        assert_eq!(commit.params_version, 1);
        assert!(commit.adjusted_for(10).is_some());
    }

    /// `n - 1` validators agree and one reports `outlier` for every miner.
    /// With equal trust the outlier's normalized deviation is sqrt(n - 1).
    fn outlier_slot(n: Uid, outlier: f64) -> (Registry, SlotScores) {
        let validators: Vec<(Uid, f64)> = (1..=n).map(|v| (v, 0.8)).collect();
        let miners: Vec<Uid> = (100..104).collect();
        let reg = registry(&validators, &miners);
        let mut raws = Vec::new();
        for m in &miners {
            for v in 1..n {
                raws.push(RawScore::new(1, *m, v, 0.5));
            }
            raws.push(RawScore::new(1, *m, n, outlier));
        }
        (reg, SlotScores::from_scores(1, raws))
    }

    #[test]
    fn test_moderate_outlier_is_penalized() {
        let (reg, scores) = outlier_slot(7, 1.0);
        let outcome = run(&reg, &scores, &ConsensusParams::default());

        assert_eq!(outcome.penalties.len(), 1);
        let record = &outcome.penalties[0];
        assert_eq!(record.participant_id, 7);
        assert!((record.severity - 0.3).abs() < 1e-12);
        assert!(!record.jailed);
        assert_eq!(record.slash_amount, 20);
        let delta = outcome
            .trust_deltas
            .iter()
            .find(|d| d.participant_id == 7)
            .unwrap();
        assert_eq!(delta.after, record.trust_after);
        assert!(record.trust_after < record.trust_before);
    }

    #[test]
    fn test_severe_outlier_is_jailed() {
        let (reg, scores) = outlier_slot(12, 1.0);
        let outcome = run(&reg, &scores, &ConsensusParams::default());

        assert_eq!(outcome.penalties.len(), 1);
        let record = &outcome.penalties[0];
        assert_eq!(record.participant_id, 12);
        assert!((record.severity - 0.7).abs() < 1e-12);
        assert!(record.jailed);
        assert!((record.trust_after - record.trust_before * 0.65).abs() < 1e-12);
    }

    #[test]
    fn test_penalties_need_enough_validators() {
        let reg = registry(&[(1, 0.8), (2, 0.8)], &[10]);
        let scores = SlotScores::from_scores(
            1,
            vec![RawScore::new(1, 10, 1, 0.0), RawScore::new(1, 10, 2, 1.0)],
        );
        let outcome = run(&reg, &scores, &ConsensusParams::default());
        assert!(outcome.penalties.is_empty());
    }

    #[test]
    fn test_zero_trust_only_slot_is_empty() {
        let reg = registry(&[(1, 0.0)], &[10]);
        let scores = SlotScores::from_scores(1, vec![RawScore::new(1, 10, 1, 0.9)]);
        let outcome = run(&reg, &scores, &ConsensusParams::default());
        assert!(outcome.is_empty());
        assert_eq!(outcome.aggregation.absent_miners, vec![10]);
        assert!(outcome.incentives.iter().all(|i| i.role == Role::Validator));
    }
}
