// crates/tessera-core/src/registry.rs
//
// Participant registry: the single owner of participant state.
//
// Every mutation goes through one of the methods below so trust stays in
// [0, 1] and participants are never removed. Iteration order is by uid,
// which keeps every downstream computation deterministic.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::TesseraError;
use crate::types::{Participant, ParticipantStatus, Role, SlotId, Uid};

/// Keyed store of all registered participants.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Registry {
    participants: BTreeMap<Uid, Participant>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a participant. Uids are never reused.
    pub fn register(&mut self, participant: Participant) -> Result<(), TesseraError> {
        if self.participants.contains_key(&participant.uid) {
            return Err(TesseraError::InvalidState(format!(
                "uid {} already registered",
                participant.uid
            )));
        }
        let mut participant = participant;
        participant.trust = clamp_trust(participant.trust);
        self.participants.insert(participant.uid, participant);
        Ok(())
    }

    pub fn get(&self, uid: Uid) -> Option<&Participant> {
        self.participants.get(&uid)
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// All participants, ordered by uid.
    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    /// Registered miners in uid order, whatever their status.
    pub fn miners(&self) -> impl Iterator<Item = &Participant> {
        self.iter().filter(|p| p.role == Role::Miner)
    }

    pub fn validators(&self) -> impl Iterator<Item = &Participant> {
        self.iter().filter(|p| p.role == Role::Validator)
    }

    /// Whether `uid` is a registered, active validator whose scores count.
    pub fn is_eligible_validator(&self, uid: Uid) -> bool {
        self.get(uid)
            .map(|p| p.is_validator() && p.is_active())
            .unwrap_or(false)
    }

    /// Trust of every participant, by uid.
    pub fn trust_snapshot(&self) -> BTreeMap<Uid, f64> {
        self.participants
            .iter()
            .map(|(uid, p)| (*uid, p.trust))
            .collect()
    }

    /// Total stake of active validators.
    pub fn active_validator_stake(&self) -> u64 {
        self.validators()
            .filter(|p| p.is_active())
            .fold(0u64, |acc, p| acc.saturating_add(p.stake))
    }

    /// Overwrite trust (clamped) and move the decay reference to `slot`.
    pub fn set_trust(&mut self, uid: Uid, trust: f64, slot: SlotId) -> Result<(), TesseraError> {
        let p = self.get_mut(uid)?;
        p.trust = clamp_trust(trust);
        p.last_evaluated_slot = p.last_evaluated_slot.max(slot);
        Ok(())
    }

    /// Add an emission share to the participant's accumulated reward.
    pub fn credit_reward(&mut self, uid: Uid, amount: u64) -> Result<(), TesseraError> {
        let p = self.get_mut(uid)?;
        p.accumulated_reward = p.accumulated_reward.saturating_add(amount);
        Ok(())
    }

    pub fn set_status(&mut self, uid: Uid, status: ParticipantStatus) -> Result<(), TesseraError> {
        self.get_mut(uid)?.status = status;
        Ok(())
    }

    /// Record that a miner was selected for `slot`. Feeds the idle-time weighting.
    pub fn mark_selected(&mut self, uid: Uid, slot: SlotId) -> Result<(), TesseraError> {
        let p = self.get_mut(uid)?;
        p.last_selected_slot = Some(p.last_selected_slot.map_or(slot, |s| s.max(slot)));
        Ok(())
    }

    fn get_mut(&mut self, uid: Uid) -> Result<&mut Participant, TesseraError> {
        self.participants
            .get_mut(&uid)
            .ok_or_else(|| TesseraError::NotFound(format!("participant {}", uid)))
    }
}

/// Clamp to [0, 1]; NaN collapses to 0.
pub fn clamp_trust(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
