// crates/tessera-rpc/src/handlers/slot.rs
//
// Slot handlers: slot/status and slot/commit.

use serde::{Deserialize, Serialize};

use tessera_consensus::SlotCoordinator;
use tessera_core::slot::SlotState;
use tessera_core::types::{SlotCommit, SlotId};

// ---------------------------------------------------------------------------
// slot/status
// ---------------------------------------------------------------------------

/// Parameters of slot/status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetSlotStatusRequest {
    pub slot_id: SlotId,
}

/// Phase of one slot as this node sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetSlotStatusResponse {
    pub slot_id: SlotId,
    /// None when the slot was never opened here or has been pruned.
    pub state: Option<SlotState>,
}

/// Report the published state of a slot.
pub async fn handle_get_slot_status(
    coordinator: &SlotCoordinator,
    request: GetSlotStatusRequest,
) -> Result<GetSlotStatusResponse, String> {
    Ok(GetSlotStatusResponse {
        slot_id: request.slot_id,
        state: coordinator.status(request.slot_id).await,
    })
}

// ---------------------------------------------------------------------------
// slot/commit
// ---------------------------------------------------------------------------

/// Parameters of slot/commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetSlotCommitRequest {
    /// Latest commit when omitted.
    #[serde(default)]
    pub slot_id: Option<SlotId>,
}

/// The requested commit, if one exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetSlotCommitResponse {
    pub commit: Option<SlotCommit>,
}

/// Look up a committed slot in memory, then in the archive.
pub async fn handle_get_slot_commit(
    coordinator: &SlotCoordinator,
    request: GetSlotCommitRequest,
) -> Result<GetSlotCommitResponse, String> {
    let commit = match request.slot_id {
        Some(slot_id) => coordinator
            .commit(slot_id)
            .await
            .map_err(|e| format!("Failed to load commit for slot {}: {}", slot_id, e))?,
        None => coordinator.latest_commit().await,
    };
    Ok(GetSlotCommitResponse { commit })
}
