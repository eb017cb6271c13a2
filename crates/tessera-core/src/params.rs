// crates/tessera-core/src/params.rs
//
// Versioned consensus constants. Every tunable of the engine lives here so a
// historical slot can be replayed with exactly the values in effect when it
// ran. New versions only ever take effect in a future slot.

use serde::{Deserialize, Serialize};

use crate::error::TesseraError;
use crate::scaling::ScalingFn;
use crate::types::SlotId;

/// What to do with a slot that missed quorum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExpiredPolicy {
    /// Emit nothing; only decay trust.
    #[default]
    Discard,
    /// Commit with whatever scores exist, as long as there is at least one.
    CommitPartial,
}

/// Thresholds for punishing validators that stray from consensus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PenaltyPolicy {
    /// Normalized deviation at which severity 0.3 applies.
    pub moderate_factor: f64,
    /// Normalized deviation at which severity 0.7 applies.
    pub severe_factor: f64,
    /// Trust multiplier strength: `trust * (1 - eta * severity)`.
    pub penalty_eta: f64,
    /// Severity at or above which the validator is jailed.
    pub jail_severity: f64,
    /// Upper bound on the reported slash fraction of stake.
    pub max_slash_rate: f64,
    /// Fewer contributing validators than this and no penalties are applied.
    pub min_validators_for_penalty: usize,
}

impl Default for PenaltyPolicy {
    fn default() -> Self {
        Self {
            moderate_factor: 2.0,
            severe_factor: 3.0,
            penalty_eta: 0.5,
            jail_severity: 0.5,
            max_slash_rate: 0.2,
            min_validators_for_penalty: 4,
        }
    }
}

/// One version of the consensus constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusParams {
    pub version: u32,
    /// First slot governed by this version.
    pub effective_from_slot: SlotId,

    /// Trust decay rate per slot (`delta`).
    pub delta: f64,
    /// Trust learning rate (`alpha`).
    pub alpha: f64,
    /// Adaptive learning-rate damping around trust 0.5. Zero disables it.
    pub k_alpha: f64,
    /// Fairness bonus per idle slot (`beta`).
    pub beta: f64,
    /// Cap on idle slots counted by the fairness bonus.
    pub selection_cap: u64,
    /// Stake vs. performance mix of validator weight (`lambda`).
    pub lambda: f64,
    pub theta1: f64,
    pub theta2: f64,
    pub theta3: f64,
    /// Deviation penalty steepness (`k`).
    pub k_deviation: f64,
    pub quorum_min_validators: usize,

    pub slot_duration_ms: u64,
    /// Offset from slot start at which collection stops.
    pub collect_deadline_ms: u64,
    /// Offset from slot start at which peer exchange stops.
    pub exchange_deadline_ms: u64,

    /// Reward pool per slot in the smallest token unit.
    pub reward_pool_per_slot: u64,
    /// Fraction of the pool reserved for validators.
    pub validator_pool_fraction: f64,

    /// Number of slots (including the current one) in the weight lookback.
    pub history_window: u64,
    /// Decay applied to older slots in the miner weight; defaults to `delta`.
    pub weight_decay: Option<f64>,

    pub miners_per_slot: usize,
    pub max_concurrent_dispatch: usize,
    pub dispatch_timeout_ms: u64,
    pub dispatch_retries: u32,
    pub selection_seed: u64,

    pub expired_policy: ExpiredPolicy,
    /// Bounding function `g` of the trust update.
    pub trust_update_fn: ScalingFn,
    /// Trust factor `f` of the incentive share.
    pub incentive_trust_fn: ScalingFn,
    /// Standard deviation of past `E` values that maps to zero accuracy.
    pub accuracy_max_stddev: f64,
    pub penalty: PenaltyPolicy,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            version: 1,
            effective_from_slot: 0,
            delta: 0.1,
            alpha: 0.1,
            k_alpha: 0.0,
            beta: 0.2,
            selection_cap: 10,
            lambda: 0.5,
            theta1: 0.3,
            theta2: 0.4,
            theta3: 0.3,
            k_deviation: 0.5,
            quorum_min_validators: 1,
            slot_duration_ms: 60_000,
            collect_deadline_ms: 30_000,
            exchange_deadline_ms: 45_000,
            reward_pool_per_slot: 1_000_000_000,
            validator_pool_fraction: 0.41,
            history_window: 16,
            weight_decay: None,
            miners_per_slot: 8,
            max_concurrent_dispatch: 16,
            dispatch_timeout_ms: 5_000,
            dispatch_retries: 2,
            selection_seed: 0,
            expired_policy: ExpiredPolicy::Discard,
            trust_update_fn: ScalingFn::Identity,
            incentive_trust_fn: ScalingFn::Identity,
            accuracy_max_stddev: 0.2,
            penalty: PenaltyPolicy::default(),
        }
    }
}

impl ConsensusParams {
    /// Decay rate for the miner weight lookback.
    pub fn weight_decay(&self) -> f64 {
        self.weight_decay.unwrap_or(self.delta)
    }

    /// Check ranges and cross-field constraints.
    pub fn validate(&self) -> Result<(), TesseraError> {
        fn unit(name: &str, v: f64) -> Result<(), TesseraError> {
            if v.is_finite() && (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(TesseraError::Config(format!("{} must be in [0, 1], got {}", name, v)))
            }
        }
        fn non_negative(name: &str, v: f64) -> Result<(), TesseraError> {
            if v.is_finite() && v >= 0.0 {
                Ok(())
            } else {
                Err(TesseraError::Config(format!("{} must be >= 0, got {}", name, v)))
            }
        }

        non_negative("delta", self.delta)?;
        unit("alpha", self.alpha)?;
        if !(0.0..=2.0).contains(&self.k_alpha) {
            return Err(TesseraError::Config(format!(
                "k_alpha must be in [0, 2], got {}",
                self.k_alpha
            )));
        }
        non_negative("beta", self.beta)?;
        unit("lambda", self.lambda)?;
        non_negative("theta1", self.theta1)?;
        non_negative("theta2", self.theta2)?;
        non_negative("theta3", self.theta3)?;
        let theta_sum = self.theta1 + self.theta2 + self.theta3;
        if (theta_sum - 1.0).abs() > 1e-6 {
            return Err(TesseraError::Config(format!(
                "theta1 + theta2 + theta3 must be 1, got {}",
                theta_sum
            )));
        }
        non_negative("k_deviation", self.k_deviation)?;
        non_negative("weight_decay", self.weight_decay())?;
        unit("validator_pool_fraction", self.validator_pool_fraction)?;

        if self.quorum_min_validators == 0 {
            return Err(TesseraError::Config("quorum_min_validators must be >= 1".into()));
        }
        if self.history_window == 0 {
            return Err(TesseraError::Config("history_window must be >= 1".into()));
        }
        if self.miners_per_slot == 0 || self.max_concurrent_dispatch == 0 {
            return Err(TesseraError::Config(
                "miners_per_slot and max_concurrent_dispatch must be >= 1".into(),
            ));
        }
        if self.collect_deadline_ms > self.exchange_deadline_ms
            || self.exchange_deadline_ms > self.slot_duration_ms
        {
            return Err(TesseraError::Config(format!(
                "deadlines must satisfy collect ({}) <= exchange ({}) <= slot ({})",
                self.collect_deadline_ms, self.exchange_deadline_ms, self.slot_duration_ms
            )));
        }
        if self.accuracy_max_stddev.is_nan() || self.accuracy_max_stddev <= 0.0 {
            return Err(TesseraError::Config("accuracy_max_stddev must be > 0".into()));
        }

        let p = &self.penalty;
        if p.moderate_factor.is_nan() || p.moderate_factor <= 0.0 || p.moderate_factor > p.severe_factor {
            return Err(TesseraError::Config(
                "penalty factors must satisfy 0 < moderate <= severe".into(),
            ));
        }
        unit("penalty.penalty_eta", p.penalty_eta)?;
        unit("penalty.max_slash_rate", p.max_slash_rate)?;
        non_negative("penalty.jail_severity", p.jail_severity)?;
        Ok(())
    }
}

/// All parameter versions known to the node, ordered by activation slot.
///
/// Serialized as a flat list of versions. Deserialization runs the same
/// checks as [`ParamSchedule::from_versions`], so an empty or unordered list
/// is rejected instead of producing an unusable schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "Vec<ConsensusParams>", into = "Vec<ConsensusParams>")]
pub struct ParamSchedule {
    genesis: ConsensusParams,
    later: Vec<ConsensusParams>,
}

impl ParamSchedule {
    /// Start a schedule from the genesis parameters.
    pub fn new(initial: ConsensusParams) -> Result<Self, TesseraError> {
        initial.validate()?;
        Ok(Self {
            genesis: initial,
            later: Vec::new(),
        })
    }

    /// Rebuild a schedule from a full version list, genesis first.
    ///
    /// # Arguments
    /// * `versions` - Every known version. Version numbers and activation
    ///   slots must both be strictly increasing.
    pub fn from_versions(versions: Vec<ConsensusParams>) -> Result<Self, TesseraError> {
        let mut versions = versions.into_iter();
        let genesis = versions
            .next()
            .ok_or_else(|| TesseraError::Config("parameter schedule is empty".into()))?;
        let mut schedule = Self::new(genesis)?;
        for params in versions {
            schedule.push_checked(params)?;
        }
        Ok(schedule)
    }

    /// Parameters governing `slot`.
    pub fn for_slot(&self, slot: SlotId) -> &ConsensusParams {
        self.later
            .iter()
            .rev()
            .find(|p| p.effective_from_slot <= slot)
            .unwrap_or(&self.genesis)
    }

    pub fn latest(&self) -> &ConsensusParams {
        self.later.last().unwrap_or(&self.genesis)
    }

    /// Look up a version by number, e.g. to replay a historical commit.
    pub fn version(&self, version: u32) -> Option<&ConsensusParams> {
        self.versions().find(|p| p.version == version)
    }

    /// Add a new version. It must have a higher version number and start
    /// strictly after `current_slot` so running and past slots never change.
    pub fn schedule(
        &mut self,
        params: ConsensusParams,
        current_slot: SlotId,
    ) -> Result<(), TesseraError> {
        if params.effective_from_slot <= current_slot {
            return Err(TesseraError::Config(format!(
                "version {} must take effect after slot {}",
                params.version, current_slot
            )));
        }
        self.push_checked(params)
    }

    fn push_checked(&mut self, params: ConsensusParams) -> Result<(), TesseraError> {
        params.validate()?;
        let latest = self.latest();
        if params.version <= latest.version {
            return Err(TesseraError::Config(format!(
                "version {} is not newer than {}",
                params.version, latest.version
            )));
        }
        if params.effective_from_slot <= latest.effective_from_slot {
            return Err(TesseraError::Config(format!(
                "version {} must take effect after slot {}",
                params.version, latest.effective_from_slot
            )));
        }
        self.later.push(params);
        Ok(())
    }

    /// Every version, genesis first.
    pub fn versions(&self) -> impl Iterator<Item = &ConsensusParams> {
        std::iter::once(&self.genesis).chain(self.later.iter())
    }

    pub fn version_count(&self) -> usize {
        1 + self.later.len()
    }
}

impl TryFrom<Vec<ConsensusParams>> for ParamSchedule {
    type Error = TesseraError;

    fn try_from(versions: Vec<ConsensusParams>) -> Result<Self, Self::Error> {
        Self::from_versions(versions)
    }
}

impl From<ParamSchedule> for Vec<ConsensusParams> {
    fn from(schedule: ParamSchedule) -> Self {
        let mut versions = Vec::with_capacity(schedule.version_count());
        versions.push(schedule.genesis);
        versions.extend(schedule.later);
        versions
    }
}
