// crates/tessera-core/src/messages.rs
//
// Wire messages exchanged with miners and peer validators.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::{self, Keypair};
use crate::error::TesseraError;
use crate::types::{RawScore, SlotId, Uid};

/// Work sent to a miner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub task_id: Uuid,
    pub slot_id: SlotId,
    pub miner_id: Uid,
    /// Opaque task content.
    pub payload: serde_json::Value,
}

impl TaskRequest {
    pub fn new(slot_id: SlotId, miner_id: Uid, payload: serde_json::Value) -> Self {
        Self {
            task_id: Uuid::now_v7(),
            slot_id,
            miner_id,
            payload,
        }
    }
}

/// A miner's answer to a [`TaskRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResponse {
    pub task_id: Uuid,
    pub slot_id: SlotId,
    pub miner_id: Uid,
    pub result: serde_json::Value,
}

/// One entry of a peer score message.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeerScore {
    pub miner_id: Uid,
    pub value: f64,
}

/// A validator's raw scores for one slot, signed with its hotkey.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerScoreMessage {
    pub slot_id: SlotId,
    pub validator_id: Uid,
    /// Sorted by miner id.
    pub scores: Vec<PeerScore>,
    pub signature: Vec<u8>,
}

#[derive(Serialize)]
struct Unsigned<'a> {
    slot_id: SlotId,
    validator_id: Uid,
    scores: &'a [PeerScore],
}

impl PeerScoreMessage {
    /// Build and sign a message. Scores are sorted so the signed bytes do not
    /// depend on collection order.
    pub fn signed(
        slot_id: SlotId,
        validator_id: Uid,
        mut scores: Vec<PeerScore>,
        keypair: &Keypair,
    ) -> Result<Self, TesseraError> {
        scores.sort_by_key(|s| s.miner_id);
        let mut message = Self {
            slot_id,
            validator_id,
            scores,
            signature: Vec::new(),
        };
        message.signature = keypair.sign(&message.signing_bytes()?);
        Ok(message)
    }

    /// Canonical bytes covered by the signature.
    pub fn signing_bytes(&self) -> Result<Vec<u8>, TesseraError> {
        Ok(serde_json::to_vec(&Unsigned {
            slot_id: self.slot_id,
            validator_id: self.validator_id,
            scores: &self.scores,
        })?)
    }

    /// Check the signature against the sender's registered hotkey.
    pub fn verify(&self, hotkey: &[u8; 32]) -> Result<(), TesseraError> {
        crypto::verify(hotkey, &self.signing_bytes()?, &self.signature)
    }

    /// Expand into one [`RawScore`] per entry.
    pub fn to_raw_scores(&self) -> Vec<RawScore> {
        self.scores
            .iter()
            .map(|s| RawScore::new(self.slot_id, s.miner_id, self.validator_id, s.value))
            .collect()
    }
}
