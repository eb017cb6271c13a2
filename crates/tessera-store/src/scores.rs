// crates/tessera-store/src/scores.rs
//
// ScoreStore: append-only raw scores partitioned by slot.
//
// Each slot has its own lock, so aggregation reading slot N never waits on
// ingestion into slot N+1. Within a slot the first write for a
// (miner, validator) pair wins and later writes are rejected. Once a slot is
// frozen for aggregation it accepts nothing.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use tessera_core::error::TesseraError;
use tessera_core::types::{RawScore, SlotId, Uid};

/// Immutable view of one slot's raw scores, keyed by (miner, validator).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlotScores {
    slot_id: SlotId,
    scores: BTreeMap<(Uid, Uid), RawScore>,
}

impl SlotScores {
    pub fn new(slot_id: SlotId) -> Self {
        Self {
            slot_id,
            scores: BTreeMap::new(),
        }
    }

    /// Build from a list, keeping the first score per (miner, validator).
    /// Scores for other slots or out of range are skipped.
    pub fn from_scores(slot_id: SlotId, scores: impl IntoIterator<Item = RawScore>) -> Self {
        let mut out = Self::new(slot_id);
        for score in scores {
            let _ = out.insert(score);
        }
        out
    }

    fn insert(&mut self, score: RawScore) -> Result<(), TesseraError> {
        if score.slot_id != self.slot_id {
            return Err(TesseraError::SlotClosed(score.slot_id));
        }
        score.validate()?;
        let key = (score.miner_id, score.validator_id);
        if self.scores.contains_key(&key) {
            return Err(TesseraError::DuplicateScore {
                slot_id: score.slot_id,
                miner_id: score.miner_id,
                validator_id: score.validator_id,
            });
        }
        self.scores.insert(key, score);
        Ok(())
    }

    pub fn slot_id(&self) -> SlotId {
        self.slot_id
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// All scores ordered by (miner, validator).
    pub fn iter(&self) -> impl Iterator<Item = &RawScore> {
        self.scores.values()
    }

    pub fn get(&self, miner_id: Uid, validator_id: Uid) -> Option<&RawScore> {
        self.scores.get(&(miner_id, validator_id))
    }

    /// Scores grouped by miner.
    pub fn by_miner(&self) -> BTreeMap<Uid, Vec<&RawScore>> {
        let mut grouped: BTreeMap<Uid, Vec<&RawScore>> = BTreeMap::new();
        for score in self.scores.values() {
            grouped.entry(score.miner_id).or_default().push(score);
        }
        grouped
    }

    /// Distinct validators with at least one score.
    pub fn validators(&self) -> BTreeSet<Uid> {
        self.scores.keys().map(|(_, v)| *v).collect()
    }

    /// Distinct miners with at least one score.
    pub fn miners(&self) -> BTreeSet<Uid> {
        self.scores.keys().map(|(m, _)| *m).collect()
    }

    pub fn to_vec(&self) -> Vec<RawScore> {
        self.scores.values().cloned().collect()
    }
}

#[derive(Debug)]
struct Partition {
    scores: SlotScores,
    frozen: bool,
}

/// Outcome of a batch ingestion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub stored: usize,
    pub duplicates: usize,
    pub rejected: usize,
}

/// Per-slot raw score storage.
#[derive(Debug, Default)]
pub struct ScoreStore {
    partitions: RwLock<BTreeMap<SlotId, Arc<RwLock<Partition>>>>,
}

impl ScoreStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the partition for `slot_id` if it does not exist yet.
    pub async fn open_slot(&self, slot_id: SlotId) {
        let mut partitions = self.partitions.write().await;
        partitions.entry(slot_id).or_insert_with(|| {
            Arc::new(RwLock::new(Partition {
                scores: SlotScores::new(slot_id),
                frozen: false,
            }))
        });
    }

    async fn partition(&self, slot_id: SlotId) -> Option<Arc<RwLock<Partition>>> {
        self.partitions.read().await.get(&slot_id).cloned()
    }

    /// Store one score.
    ///
    /// Errors: `InvalidScore` for out-of-range values, `DuplicateScore` when
    /// the pair already has a score, `SlotClosed` when the slot is unknown or
    /// frozen.
    pub async fn ingest(&self, score: RawScore) -> Result<(), TesseraError> {
        let slot_id = score.slot_id;
        let partition = self
            .partition(slot_id)
            .await
            .ok_or(TesseraError::SlotClosed(slot_id))?;
        let mut partition = partition.write().await;
        if partition.frozen {
            return Err(TesseraError::SlotClosed(slot_id));
        }
        partition.scores.insert(score)
    }

    /// Store many scores, counting instead of failing on bad entries.
    pub async fn ingest_many(&self, scores: impl IntoIterator<Item = RawScore>) -> IngestReport {
        let mut report = IngestReport::default();
        for score in scores {
            match self.ingest(score).await {
                Ok(()) => report.stored += 1,
                Err(TesseraError::DuplicateScore { .. }) => report.duplicates += 1,
                Err(e) => {
                    tracing::debug!("Rejected raw score: {}", e);
                    report.rejected += 1;
                }
            }
        }
        report
    }

    /// Freeze the slot and return its final contents. Idempotent.
    pub async fn freeze(&self, slot_id: SlotId) -> Result<SlotScores, TesseraError> {
        let partition = self
            .partition(slot_id)
            .await
            .ok_or_else(|| TesseraError::NotFound(format!("score partition for slot {}", slot_id)))?;
        let mut partition = partition.write().await;
        partition.frozen = true;
        Ok(partition.scores.clone())
    }

    /// True once the slot's scores have been frozen for aggregation.
    pub async fn is_frozen(&self, slot_id: SlotId) -> bool {
        match self.partition(slot_id).await {
            Some(p) => p.read().await.frozen,
            None => false,
        }
    }

    /// Current contents of a slot, frozen or not.
    pub async fn snapshot(&self, slot_id: SlotId) -> Option<SlotScores> {
        let partition = self.partition(slot_id).await?;
        let guard = partition.read().await;
        Some(guard.scores.clone())
    }

    /// Scores submitted by one validator in a slot.
    pub async fn scores_by(&self, slot_id: SlotId, validator_id: Uid) -> Vec<RawScore> {
        match self.snapshot(slot_id).await {
            Some(scores) => scores
                .iter()
                .filter(|s| s.validator_id == validator_id)
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Drop partitions older than `slot_id`.
    pub async fn prune_before(&self, slot_id: SlotId) -> usize {
        let mut partitions = self.partitions.write().await;
        let keep = partitions.split_off(&slot_id);
        let dropped = partitions.len();
        *partitions = keep;
        dropped
    }
}
