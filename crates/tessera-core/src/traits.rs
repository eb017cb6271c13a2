// crates/tessera-core/src/traits.rs
//
// Collaborator interfaces. The consensus engine only talks to the outside
// world through these; the daemon provides HTTP/RocksDB implementations and
// tests provide in-memory ones.

use async_trait::async_trait;

use crate::error::TesseraError;
use crate::messages::{PeerScoreMessage, TaskRequest, TaskResponse};
use crate::params::ParamSchedule;
use crate::registry::Registry;
use crate::types::{Participant, RawScore, SlotCommit, SlotId, Uid};

/// Sends a task to a miner and waits for its result.
///
/// Implementations should not retry; the coordinator owns retry and
/// timeout policy.
#[async_trait]
pub trait TaskDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        miner: &Participant,
        request: TaskRequest,
    ) -> Result<TaskResponse, TesseraError>;
}

/// Produces task payloads and scores miner results. Both are opaque to the
/// engine; the score must land in [0, 1].
#[async_trait]
pub trait TaskEvaluator: Send + Sync {
    fn build_payload(&self, slot_id: SlotId, miner_id: Uid) -> serde_json::Value;

    async fn score(
        &self,
        request: &TaskRequest,
        response: &TaskResponse,
    ) -> Result<f64, TesseraError>;
}

/// Best-effort broadcast of this validator's scores to its peers.
#[async_trait]
pub trait PeerExchange: Send + Sync {
    /// Returns the number of peers the message was handed to.
    async fn broadcast(&self, message: &PeerScoreMessage) -> Result<usize, TesseraError>;
}

/// Receives the committed result of each slot, exactly once per slot.
#[async_trait]
pub trait LedgerSink: Send + Sync {
    async fn commit(&self, commit: &SlotCommit) -> Result<(), TesseraError>;
}

/// Durable storage for registry snapshots, the parameter schedule, frozen
/// raw scores and commits.
///
/// Implemented by tessera-store (RocksDB backend).
#[async_trait]
pub trait SlotArchive: Send + Sync {
    async fn save_registry(&self, registry: &Registry) -> Result<(), TesseraError>;

    async fn load_registry(&self) -> Result<Option<Registry>, TesseraError>;

    /// Persist every known parameter version so historical slots can be
    /// replayed with the constants they ran under.
    async fn save_schedule(&self, schedule: &ParamSchedule) -> Result<(), TesseraError>;

    async fn load_schedule(&self) -> Result<Option<ParamSchedule>, TesseraError>;

    async fn save_scores(&self, slot_id: SlotId, scores: &[RawScore]) -> Result<(), TesseraError>;

    async fn save_commit(&self, commit: &SlotCommit) -> Result<(), TesseraError>;

    async fn load_commit(&self, slot_id: SlotId) -> Result<Option<SlotCommit>, TesseraError>;

    /// Re-check the integrity of persisted state. Returns `Corruption` on
    /// any checksum mismatch.
    async fn verify(&self) -> Result<(), TesseraError>;
}
