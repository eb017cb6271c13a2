// crates/tessera-rpc/src/handlers/trust.rs
//
// trust/get: current trust and standing of one or all participants.

use serde::{Deserialize, Serialize};

use tessera_consensus::SlotCoordinator;
use tessera_core::types::{Participant, ParticipantStatus, Role, Uid};

/// Parameters of trust/get.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetTrustRequest {
    /// Every participant when omitted.
    #[serde(default)]
    pub uid: Option<Uid>,
}

/// Trust and standing of one participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustEntry {
    pub uid: Uid,
    pub role: Role,
    pub status: ParticipantStatus,
    pub trust: f64,
    pub stake: u64,
    pub accumulated_reward: u64,
}

impl From<&Participant> for TrustEntry {
    fn from(p: &Participant) -> Self {
        Self {
            uid: p.uid,
            role: p.role,
            status: p.status,
            trust: p.trust,
            stake: p.stake,
            accumulated_reward: p.accumulated_reward,
        }
    }
}

/// Entries in uid order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetTrustResponse {
    pub participants: Vec<TrustEntry>,
}

/// Read trust from a registry snapshot.
///
/// Fails when a requested uid is not registered.
pub async fn handle_get_trust(
    coordinator: &SlotCoordinator,
    request: GetTrustRequest,
) -> Result<GetTrustResponse, String> {
    let registry = coordinator.registry_snapshot().await;
    let participants = match request.uid {
        Some(uid) => {
            let p = registry
                .get(uid)
                .ok_or_else(|| format!("Unknown participant {}", uid))?;
            vec![TrustEntry::from(p)]
        }
        None => registry.iter().map(TrustEntry::from).collect(),
    };
    Ok(GetTrustResponse { participants })
}
