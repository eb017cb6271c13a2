// crates/tessera-core/src/error.rs

use thiserror::Error;

use crate::types::{SlotId, Uid};

/// Engine-wide error type.
///
/// Variants fall into four classes: transient (absorbed as no-response),
/// data (rejected at ingestion), quorum (slot expires), and fatal (the
/// coordinator halts). See [`TesseraError::is_fatal`] and
/// [`TesseraError::is_transient`].
#[derive(Debug, Error)]
pub enum TesseraError {
    /// Transport failure talking to a miner, peer, or ledger.
    #[error("Network error: {0}")]
    Network(String),

    /// A remote call did not complete within its budget.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Raw score outside [0, 1] or not finite.
    #[error("Invalid score {value} for miner {miner_id} from validator {validator_id} in slot {slot_id}")]
    InvalidScore {
        slot_id: SlotId,
        miner_id: Uid,
        validator_id: Uid,
        value: f64,
    },

    /// A score for this (slot, miner, validator) already exists.
    #[error("Duplicate score for miner {miner_id} from validator {validator_id} in slot {slot_id}")]
    DuplicateScore {
        slot_id: SlotId,
        miner_id: Uid,
        validator_id: Uid,
    },

    /// The slot no longer (or does not yet) accept writes.
    #[error("Slot {0} is closed for writes")]
    SlotClosed(SlotId),

    /// Too few validators contributed to the slot.
    #[error("Quorum not met for slot {slot_id}: {contributed} of {required} validators")]
    QuorumNotMet {
        slot_id: SlotId,
        contributed: usize,
        required: usize,
    },

    /// Persisted state failed its integrity check.
    #[error("Corruption detected: {0}")]
    Corruption(String),

    /// Storage layer error (RocksDB).
    #[error("Storage error: {0}")]
    Storage(String),

    /// The coordinator stopped after a fatal error and refuses new slots.
    #[error("Coordinator halted: {0}")]
    Halted(String),

    /// The slot has already been committed.
    #[error("Slot {0} already committed")]
    AlreadyCommitted(SlotId),

    /// Cryptographic error (key decoding, signing, verification).
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration values.
    #[error("Config error: {0}")]
    Config(String),

    /// Invalid state transition.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl TesseraError {
    /// Errors after which the node must stop opening new slots.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TesseraError::Corruption(_) | TesseraError::Storage(_) | TesseraError::Halted(_)
        )
    }

    /// Errors that are retried and, when exhausted, treated as no-response.
    pub fn is_transient(&self) -> bool {
        matches!(self, TesseraError::Network(_) | TesseraError::Timeout(_))
    }
}

impl From<serde_json::Error> for TesseraError {
    fn from(e: serde_json::Error) -> Self {
        TesseraError::Serialization(e.to_string())
    }
}

impl From<ed25519_dalek::SignatureError> for TesseraError {
    fn from(e: ed25519_dalek::SignatureError) -> Self {
        TesseraError::Crypto(e.to_string())
    }
}
