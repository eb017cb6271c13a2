// crates/tessera-core/src/types.rs
//
// Data model shared by every crate in the workspace: participants, raw and
// adjusted scores, and the per-slot records produced at commit time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TesseraError;

/// Network-assigned participant id.
pub type Uid = u16;

/// Monotonic slot number. Slot `n` covers `[n * slot_duration, (n + 1) * slot_duration)`.
pub type SlotId = u64;

/// Which side of the work market a participant is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Miner,
    Validator,
}

/// Lifecycle status of a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticipantStatus {
    /// Registered but not eligible for selection or scoring.
    Inactive,
    Active,
    /// Excluded after a policy violation. Still decays.
    Jailed,
}

/// A registered miner or validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    /// Network-assigned unique id.
    pub uid: Uid,
    /// Ed25519 public key used to verify peer messages.
    pub hotkey: [u8; 32],
    /// Miner or validator.
    pub role: Role,
    /// Stake in the smallest token unit.
    pub stake: u64,
    /// Trust score, always within [0, 1].
    pub trust: f64,
    /// Sum of absolute incentive amounts credited so far.
    pub accumulated_reward: u64,
    /// Slot at which the participant joined; tenure counts from here.
    pub registered_slot: SlotId,
    /// Most recent slot this miner was selected for. `None` until first picked.
    pub last_selected_slot: Option<SlotId>,
    /// Slot of the most recent trust update (decay reference point).
    pub last_evaluated_slot: SlotId,
    /// Active, inactive or jailed.
    pub status: ParticipantStatus,
    /// Where tasks (miners) or peer messages (validators) are sent.
    pub endpoint: String,
}

impl Participant {
    /// Create an active participant registered at `slot` with the given starting trust.
    pub fn new(uid: Uid, role: Role, hotkey: [u8; 32], stake: u64, trust: f64, slot: SlotId) -> Self {
        Self {
            uid,
            hotkey,
            role,
            stake,
            trust: trust.clamp(0.0, 1.0),
            accumulated_reward: 0,
            registered_slot: slot,
            last_selected_slot: None,
            last_evaluated_slot: slot,
            status: ParticipantStatus::Active,
            endpoint: String::new(),
        }
    }

    /// Set the network endpoint (builder style).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == ParticipantStatus::Active
    }

    pub fn is_validator(&self) -> bool {
        self.role == Role::Validator
    }

    /// Slots elapsed since the last selection, or since registration if never selected.
    pub fn slots_since_selected(&self, current: SlotId) -> u64 {
        let reference = self.last_selected_slot.unwrap_or(self.registered_slot);
        current.saturating_sub(reference)
    }

    /// Slots elapsed since registration.
    pub fn tenure(&self, current: SlotId) -> u64 {
        current.saturating_sub(self.registered_slot)
    }
}

/// One validator's score for one miner in one slot. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawScore {
    pub slot_id: SlotId,
    /// Miner being scored.
    pub miner_id: Uid,
    /// Validator that produced the score.
    pub validator_id: Uid,
    /// Quality in [0, 1].
    pub value: f64,
    /// When the score was produced (local clock of the scoring validator).
    pub submitted_at: DateTime<Utc>,
}

impl RawScore {
    /// Create a score stamped with the current time. Not validated.
    pub fn new(slot_id: SlotId, miner_id: Uid, validator_id: Uid, value: f64) -> Self {
        Self {
            slot_id,
            miner_id,
            validator_id,
            value,
            submitted_at: Utc::now(),
        }
    }

    /// Reject values outside [0, 1] and non-finite values.
    pub fn validate(&self) -> Result<(), TesseraError> {
        if self.value.is_finite() && (0.0..=1.0).contains(&self.value) {
            Ok(())
        } else {
            Err(TesseraError::InvalidScore {
                slot_id: self.slot_id,
                miner_id: self.miner_id,
                validator_id: self.validator_id,
                value: self.value,
            })
        }
    }
}

/// Trust-weighted consensus performance of one miner in one slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustedScore {
    pub slot_id: SlotId,
    pub miner_id: Uid,
    /// Trust-weighted mean of the raw scores, within [min(raw), max(raw)].
    pub value: f64,
    /// Validators with non-zero trust whose scores went into `value`.
    pub contributing_validator_count: usize,
}

/// Participation weight for one participant in one slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightRecord {
    pub participant_id: Uid,
    pub slot_id: SlotId,
    pub role: Role,
    /// Unnormalized weight; only ratios within one role matter.
    pub weight: f64,
}

/// Normalized share of the slot reward for one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncentiveRecord {
    pub participant_id: Uid,
    pub slot_id: SlotId,
    pub role: Role,
    /// In [0, 1]; shares of one role in one slot sum to 1.
    pub share: f64,
    /// `floor(share * role_pool)`.
    pub absolute_amount: u64,
}

/// Components of a validator's performance score `E` for one slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorPerformance {
    pub validator_id: Uid,
    pub slot_id: SlotId,
    /// Task-completion rate `Q`.
    pub completion: f64,
    /// Historical consistency of past `E` values.
    pub accuracy: f64,
    /// Mean absolute deviation from the consensus values.
    pub deviation: f64,
    /// `deviation / sigma` for the slot (0 when sigma is negligible).
    pub normalized_deviation: f64,
    /// Combined score `E`, clamped to [0, 1].
    pub score: f64,
}

/// Trust before and after a slot's update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustDelta {
    pub participant_id: Uid,
    pub slot_id: SlotId,
    pub before: f64,
    pub after: f64,
}

/// Penalty applied to a validator whose scores strayed far from consensus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PenaltyRecord {
    pub participant_id: Uid,
    pub slot_id: SlotId,
    /// Grows with the normalized deviation above the moderate threshold.
    pub severity: f64,
    pub trust_before: f64,
    pub trust_after: f64,
    /// Reported only; funds are never moved by the engine.
    pub slash_amount: u64,
    /// Severity reached the jail threshold; the validator is excluded from
    /// later slots.
    pub jailed: bool,
}

/// Everything the engine emits for one committed slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotCommit {
    pub slot_id: SlotId,
    /// `ConsensusParams::version` the slot ran under.
    pub params_version: u32,
    /// One entry per miner with at least one trusted score, by miner id.
    pub adjusted: Vec<AdjustedScore>,
    /// Miners with scores only from zero-trust validators.
    pub absent_miners: Vec<Uid>,
    pub performances: Vec<ValidatorPerformance>,
    pub weights: Vec<WeightRecord>,
    pub incentives: Vec<IncentiveRecord>,
    pub trust_deltas: Vec<TrustDelta>,
    pub penalties: Vec<PenaltyRecord>,
    pub committed_at: DateTime<Utc>,
}

impl SlotCommit {
    /// Adjusted score of `miner_id`, or `None` when the miner was absent.
    pub fn adjusted_for(&self, miner_id: Uid) -> Option<f64> {
        self.adjusted
            .iter()
            .find(|a| a.miner_id == miner_id)
            .map(|a| a.value)
    }

    pub fn performance_for(&self, validator_id: Uid) -> Option<&ValidatorPerformance> {
        self.performances
            .iter()
            .find(|p| p.validator_id == validator_id)
    }
}
