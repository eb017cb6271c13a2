// crates/tessera-store/src/history.rs
//
// Commit history: the append-only record of finalized slots.
//
// A slot is finalized at most once, either committed (with its full
// `SlotCommit`) or expired. Weight and accuracy lookbacks read bounded
// windows of this history.

use std::collections::{BTreeMap, BTreeSet};

use tessera_core::error::TesseraError;
use tessera_core::types::{SlotCommit, SlotId, Uid};

/// Finalized slots known to this node.
#[derive(Debug, Default)]
pub struct SlotHistory {
    commits: BTreeMap<SlotId, SlotCommit>,
    expired: BTreeSet<SlotId>,
}

impl SlotHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a committed slot. Fails if the slot was already finalized.
    pub fn record_commit(&mut self, commit: SlotCommit) -> Result<(), TesseraError> {
        let slot_id = commit.slot_id;
        if self.is_finalized(slot_id) {
            return Err(TesseraError::AlreadyCommitted(slot_id));
        }
        self.commits.insert(slot_id, commit);
        Ok(())
    }

    /// Record an expired slot. Fails if the slot was already finalized.
    pub fn record_expired(&mut self, slot_id: SlotId) -> Result<(), TesseraError> {
        if self.is_finalized(slot_id) {
            return Err(TesseraError::AlreadyCommitted(slot_id));
        }
        self.expired.insert(slot_id);
        Ok(())
    }

    pub fn is_committed(&self, slot_id: SlotId) -> bool {
        self.commits.contains_key(&slot_id)
    }

    /// True once a slot was either committed or expired.
    pub fn is_finalized(&self, slot_id: SlotId) -> bool {
        self.commits.contains_key(&slot_id) || self.expired.contains(&slot_id)
    }

    pub fn commit(&self, slot_id: SlotId) -> Option<&SlotCommit> {
        self.commits.get(&slot_id)
    }

    pub fn latest_commit(&self) -> Option<&SlotCommit> {
        self.commits.values().next_back()
    }

    /// Adjusted scores of `miner_id` in the `window` slots before `before`
    /// (exclusive), oldest first. Slots where the miner was absent are skipped.
    pub fn miner_history(&self, miner_id: Uid, before: SlotId, window: u64) -> Vec<(SlotId, f64)> {
        let start = before.saturating_sub(window);
        self.commits
            .range(start..before)
            .filter_map(|(slot, c)| c.adjusted_for(miner_id).map(|v| (*slot, v)))
            .collect()
    }

    /// Past performance scores `E` of `validator_id`, oldest first.
    pub fn validator_history(&self, validator_id: Uid, before: SlotId, window: u64) -> Vec<f64> {
        let start = before.saturating_sub(window);
        self.commits
            .range(start..before)
            .filter_map(|(_, c)| c.performance_for(validator_id).map(|p| p.score))
            .collect()
    }

    /// Drop everything older than `slot_id`.
    pub fn prune_before(&mut self, slot_id: SlotId) {
        self.commits = self.commits.split_off(&slot_id);
        self.expired = self.expired.split_off(&slot_id);
    }

    pub fn committed_count(&self) -> usize {
        self.commits.len()
    }
}
