// crates/tessera-rpc/src/handlers/node.rs
//
// node/health: liveness plus the coordinator's halt status.

use serde::{Deserialize, Serialize};

use tessera_consensus::SlotCoordinator;
use tessera_core::types::{SlotId, Uid};

/// node/health takes no parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetHealthRequest {}

/// Liveness summary for operators and peers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetHealthResponse {
    /// "healthy" or "halted".
    pub status: String,
    pub version: String,
    pub uid: Uid,
    pub uptime_seconds: u64,
    pub peer_count: usize,
    pub latest_committed_slot: Option<SlotId>,
    pub halted_reason: Option<String>,
}

/// Build the health summary from the coordinator state.
pub async fn handle_get_health(
    coordinator: &SlotCoordinator,
    _request: GetHealthRequest,
    peer_count: usize,
    uptime_seconds: u64,
) -> Result<GetHealthResponse, String> {
    let halted_reason = coordinator.halted_reason().await;
    let status = if halted_reason.is_some() {
        "halted"
    } else {
        "healthy"
    };

    Ok(GetHealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uid: coordinator.local_uid(),
        uptime_seconds,
        peer_count,
        latest_committed_slot: coordinator.latest_commit().await.map(|c| c.slot_id),
        halted_reason,
    })
}
