// crates/tessera-daemon/src/gossip.rs
//
// Single-hop score gossip: push this validator's signed scores to every peer
// via `peer/submit_scores`. Fire-and-forget; failures only mark the peer dead.

use std::sync::Arc;

use async_trait::async_trait;

use tessera_core::error::TesseraError;
use tessera_core::messages::PeerScoreMessage;
use tessera_core::traits::PeerExchange;
use tessera_rpc::{rpc_url, JsonRpcRequest, JsonRpcResponse};

use crate::peers::PeerRegistry;

/// Pushes this validator's signed scores to every known peer.
pub struct GossipExchange {
    peers: Arc<PeerRegistry>,
}

impl GossipExchange {
    /// Creates a gossip exchange over the given peers.
    pub fn new(peers: Arc<PeerRegistry>) -> Self {
        Self { peers }
    }
}

#[async_trait]
impl PeerExchange for GossipExchange {
    async fn broadcast(&self, message: &PeerScoreMessage) -> Result<usize, TesseraError> {
        let urls = self.peers.peer_urls().to_vec();
        if urls.is_empty() {
            return Ok(0);
        }

        let request = JsonRpcRequest {
            method: "peer/submit_scores".to_string(),
            params: serde_json::json!({ "message": message }),
        };

        tracing::debug!(
            "Slot {}: gossiping {} scores to {} peers",
            message.slot_id,
            message.scores.len(),
            urls.len()
        );

        for peer_url in &urls {
            let client = self.peers.http_client().clone();
            let registry = self.peers.clone();
            let peer_url = peer_url.clone();
            let request = request.clone();
            let slot_id = message.slot_id;

            tokio::spawn(async move {
                let sent = client.post(rpc_url(&peer_url)).json(&request).send().await;
                let alive = match sent {
                    Ok(resp) if resp.status().is_success() => {
                        match resp.json::<JsonRpcResponse>().await {
                            Ok(body) if body.success => {
                                let accepted = body
                                    .result
                                    .as_ref()
                                    .and_then(|r| r.get("accepted"))
                                    .and_then(|a| a.as_bool())
                                    .unwrap_or(false);
                                if !accepted {
                                    tracing::debug!(
                                        "Slot {}: peer {} declined scores: {:?}",
                                        slot_id,
                                        peer_url,
                                        body.result.as_ref().and_then(|r| r.get("reason"))
                                    );
                                }
                                true
                            }
                            Ok(body) => {
                                tracing::warn!(
                                    "Slot {}: peer {} returned error: {}",
                                    slot_id,
                                    peer_url,
                                    body.error.unwrap_or_default()
                                );
                                true
                            }
                            Err(e) => {
                                tracing::warn!(
                                    "Slot {}: unreadable reply from peer {}: {}",
                                    slot_id,
                                    peer_url,
                                    e
                                );
                                false
                            }
                        }
                    }
                    Ok(resp) => {
                        tracing::warn!(
                            "Slot {}: push to peer {} returned status {}",
                            slot_id,
                            peer_url,
                            resp.status()
                        );
                        false
                    }
                    Err(e) => {
                        tracing::warn!("Slot {}: failed to push to peer {}: {}", slot_id, peer_url, e);
                        false
                    }
                };
                registry.mark_peer(&peer_url, alive).await;
            });
        }

        Ok(urls.len())
    }
}
