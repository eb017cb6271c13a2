// crates/tessera-rpc/src/handlers/peer.rs
//
// peer/submit_scores: inbound signed score messages from other validators.

use serde::{Deserialize, Serialize};

use tessera_consensus::{PeerDelivery, SlotCoordinator};
use tessera_core::messages::PeerScoreMessage;
use tessera_core::types::SlotId;

/// A signed score message from another validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitScoresRequest {
    pub message: PeerScoreMessage,
}

/// Whether the message was accepted into the slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitScoresResponse {
    pub accepted: bool,
    pub slot_id: SlotId,
    /// Rejection reason, if any.
    pub reason: Option<String>,
}

/// Hand the message to the coordinator.
///
/// A rejection is a normal answer, not an RPC error: the sender may simply
/// be late for the slot.
pub async fn handle_submit_scores(
    coordinator: &SlotCoordinator,
    request: SubmitScoresRequest,
) -> Result<SubmitScoresResponse, String> {
    let slot_id = request.message.slot_id;
    let validator_id = request.message.validator_id;

    match coordinator.deliver_peer_scores(request.message).await {
        PeerDelivery::Accepted { slot_id } => Ok(SubmitScoresResponse {
            accepted: true,
            slot_id,
            reason: None,
        }),
        PeerDelivery::Rejected { reason } => {
            tracing::debug!(
                "Peer scores from validator {} for slot {} rejected: {}",
                validator_id,
                slot_id,
                reason
            );
            Ok(SubmitScoresResponse {
                accepted: false,
                slot_id,
                reason: Some(reason),
            })
        }
    }
}
