// crates/tessera-reputation/src/ledger.rs
//
// TrustLedger: per-participant trust evolution.
//
//   trust_new = clamp01(trust_old * e^(-delta * dt) + alpha_eff * g(score))
//
// `dt` counts slots since the participant's last update, `g` is the
// configured bounding function and the update term is zero when the
// participant has no score (absence only decays). Planning is pure and
// reads a frozen registry; `apply` writes the planned values back.

use std::collections::BTreeMap;

use tessera_core::error::TesseraError;
use tessera_core::params::ConsensusParams;
use tessera_core::registry::{clamp_trust, Registry};
use tessera_core::types::{SlotId, TrustDelta, Uid};

use crate::decay::apply_decay;

/// Learning rate after damping around trust 0.5.
///
/// With `k_alpha = 0` this is exactly `alpha`. Larger `k_alpha` slows
/// movement of participants whose trust is already far from neutral.
pub fn effective_alpha(old_trust: f64, params: &ConsensusParams) -> f64 {
    let k = params.k_alpha.clamp(0.0, 2.0);
    (params.alpha * (1.0 - k * (old_trust - 0.5).abs())).max(0.0)
}

/// One trust update step.
pub fn update_trust(
    old_trust: f64,
    slots_elapsed: u64,
    score: Option<f64>,
    params: &ConsensusParams,
) -> f64 {
    let decayed = apply_decay(clamp_trust(old_trust), params.delta, slots_elapsed);
    let update = match score {
        Some(s) if s > 0.0 => {
            effective_alpha(old_trust, params) * params.trust_update_fn.apply(s)
        }
        _ => 0.0,
    };
    clamp_trust(decayed + update)
}

/// Plans and applies trust updates for one slot.
#[derive(Debug, Clone, Copy)]
pub struct TrustLedger<'a> {
    params: &'a ConsensusParams,
}

impl<'a> TrustLedger<'a> {
    pub fn new(params: &'a ConsensusParams) -> Self {
        Self { params }
    }

    /// Compute the new trust of every registered participant for `slot_id`.
    ///
    /// `scores` holds the adjusted score of each evaluated miner and the
    /// performance score of each evaluated validator. Everyone else decays.
    pub fn plan(
        &self,
        registry: &Registry,
        slot_id: SlotId,
        scores: &BTreeMap<Uid, f64>,
    ) -> Vec<TrustDelta> {
        registry
            .iter()
            .map(|p| {
                let elapsed = slot_id.saturating_sub(p.last_evaluated_slot);
                let after = update_trust(p.trust, elapsed, scores.get(&p.uid).copied(), self.params);
                TrustDelta {
                    participant_id: p.uid,
                    slot_id,
                    before: p.trust,
                    after,
                }
            })
            .collect()
    }

    /// Decay-only update for a slot that produced no results.
    pub fn plan_decay_only(&self, registry: &Registry, slot_id: SlotId) -> Vec<TrustDelta> {
        self.plan(registry, slot_id, &BTreeMap::new())
    }

    /// Write planned values into the registry.
    pub fn apply(registry: &mut Registry, deltas: &[TrustDelta]) -> Result<(), TesseraError> {
        for delta in deltas {
            registry.set_trust(delta.participant_id, delta.after, delta.slot_id)?;
        }
        Ok(())
    }
}
