// crates/tessera-economics/src/incentive.rs
//
// IncentiveDistributor: normalized reward shares per role.
//
//   share(x) = f(trust_x) * W_x * c_x / sum_i f(trust_i) * W_i * c_i
//
// `c` is the miner's adjusted score or the validator's performance score.
// Shares of one role sum to 1; the absolute amount is
// `floor(share * role_pool)`. An empty or all-zero role produces no records.

use serde::{Deserialize, Serialize};

use tessera_core::scaling::ScalingFn;
use tessera_core::types::{IncentiveRecord, Role, SlotId, Uid};

/// One participant's inputs to the share computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub participant_id: Uid,
    /// Trust from the frozen start-of-aggregation snapshot.
    pub trust: f64,
    pub weight: f64,
    pub contribution: f64,
}

/// Computes shares for one role in one slot.
#[derive(Debug, Clone, Copy)]
pub struct IncentiveDistributor {
    trust_fn: ScalingFn,
}

impl IncentiveDistributor {
    pub fn new(trust_fn: ScalingFn) -> Self {
        Self { trust_fn }
    }

    fn raw(&self, c: &Contribution) -> f64 {
        let value = self.trust_fn.apply(c.trust) * c.weight.max(0.0) * c.contribution.max(0.0);
        if value.is_finite() {
            value
        } else {
            0.0
        }
    }

    /// Shares for `role`, in the order of `contributions`.
    pub fn distribute(
        &self,
        role: Role,
        slot_id: SlotId,
        contributions: &[Contribution],
        role_pool: u64,
    ) -> Vec<IncentiveRecord> {
        let raws: Vec<f64> = contributions.iter().map(|c| self.raw(c)).collect();
        let total: f64 = raws.iter().sum();
        if !(total.is_finite() && total > 0.0) {
            return Vec::new();
        }

        contributions
            .iter()
            .zip(raws)
            .map(|(c, raw)| {
                let share = raw / total;
                IncentiveRecord {
                    participant_id: c.participant_id,
                    slot_id,
                    role,
                    share,
                    absolute_amount: (share * role_pool as f64).floor() as u64,
                }
            })
            .collect()
    }
}

impl Default for IncentiveDistributor {
    fn default() -> Self {
        Self::new(ScalingFn::Identity)
    }
}
