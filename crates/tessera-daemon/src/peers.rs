// crates/tessera-daemon/src/peers.rs
//
// PeerRegistry: the validator peers this node gossips scores to, their
// liveness, and the shared HTTP client used for every outbound call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use tessera_core::registry::Registry;
use tessera_core::types::Uid;

/// Reachability of one peer validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerState {
    /// Base URL of the peer's RPC server.
    pub url: String,
    /// Registry uid, when the peer came from the registry.
    pub uid: Option<Uid>,
    /// Whether the last call succeeded.
    pub alive: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Static peer list plus the last observed state of each peer.
#[derive(Debug, Clone)]
pub struct PeerRegistry {
    pub self_url: Option<String>,
    peers: Vec<String>,
    peer_state: Arc<RwLock<HashMap<String, PeerState>>>,
    client: reqwest::Client,
}

impl PeerRegistry {
    /// Build from explicit peer URLs. `self_url` is dropped from the set.
    pub fn new(self_url: Option<String>, peers: Vec<(String, Option<Uid>)>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let mut urls = Vec::new();
        let mut state_map = HashMap::new();
        for (url, uid) in peers {
            let url = url.trim_end_matches('/').to_string();
            if self_url.as_deref().map(|s| s.trim_end_matches('/')) == Some(url.as_str())
                || state_map.contains_key(&url)
            {
                continue;
            }
            urls.push(url.clone());
            state_map.insert(
                url.clone(),
                PeerState {
                    url,
                    uid,
                    alive: false,
                    last_seen: None,
                },
            );
        }

        Self {
            self_url,
            peers: urls,
            peer_state: Arc::new(RwLock::new(state_map)),
            client,
        }
    }

    /// Peer set for a node: the configured URLs if any, otherwise every other
    /// active validator in the registry that has an endpoint.
    pub fn resolve(
        self_url: Option<String>,
        configured: &[String],
        registry: &Registry,
        local_uid: Uid,
        timeout: Duration,
    ) -> Self {
        let peers = if configured.is_empty() {
            registry
                .validators()
                .filter(|v| v.uid != local_uid && v.is_active() && !v.endpoint.is_empty())
                .map(|v| (v.endpoint.clone(), Some(v.uid)))
                .collect()
        } else {
            configured.iter().map(|url| (url.clone(), None)).collect()
        };
        Self::new(self_url, peers, timeout)
    }

    pub fn http_client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn peer_urls(&self) -> &[String] {
        &self.peers
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// URLs of peers whose last call succeeded.
    #[allow(dead_code)]
    pub async fn live_peer_urls(&self) -> Vec<String> {
        let state = self.peer_state.read().await;
        let mut live: Vec<String> = state
            .values()
            .filter(|p| p.alive)
            .map(|p| p.url.clone())
            .collect();
        live.sort();
        live
    }

    /// Observed state of every peer, sorted by URL.
    #[allow(dead_code)]
    pub async fn all_peer_states(&self) -> Vec<PeerState> {
        let state = self.peer_state.read().await;
        let mut all: Vec<PeerState> = state.values().cloned().collect();
        all.sort_by(|a, b| a.url.cmp(&b.url));
        all
    }

    /// Record the outcome of a call to `url`. Unknown URLs are ignored.
    pub async fn mark_peer(&self, url: &str, alive: bool) {
        let mut state = self.peer_state.write().await;
        if let Some(peer) = state.get_mut(url) {
            if alive {
                peer.last_seen = Some(Utc::now());
            } else if peer.alive {
                tracing::info!("Peer {} became unreachable", url);
            }
            peer.alive = alive;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::types::{Participant, Role};

    fn timeout() -> Duration {
        Duration::from_secs(1)
    }

    #[tokio::test]
    async fn test_mark_peer_tracks_liveness() {
        let peers = PeerRegistry::new(
            None,
            vec![
                ("http://a:1".to_string(), None),
                ("http://b:1/".to_string(), None),
            ],
            timeout(),
        );
        assert_eq!(peers.peer_count(), 2);
        assert!(peers.live_peer_urls().await.is_empty());

        peers.mark_peer("http://b:1", true).await;
        peers.mark_peer("http://zzz:1", true).await;
        assert_eq!(peers.live_peer_urls().await, vec!["http://b:1".to_string()]);

        peers.mark_peer("http://b:1", false).await;
        let states = peers.all_peer_states().await;
        assert!(states.iter().all(|p| !p.alive));
        assert!(states[1].last_seen.is_some());
    }

    #[test]
    fn test_self_and_duplicates_are_dropped() {
        let peers = PeerRegistry::new(
            Some("http://me:1".to_string()),
            vec![
                ("http://me:1/".to_string(), None),
                ("http://a:1".to_string(), None),
                ("http://a:1".to_string(), None),
            ],
            timeout(),
        );
        assert_eq!(peers.peer_urls(), &["http://a:1".to_string()]);
    }

    #[test]
    fn test_resolve_from_registry_validators() {
        let mut registry = Registry::new();
        registry
            .register(Participant::new(1, Role::Validator, [1; 32], 10, 0.5, 0).with_endpoint("http://me:1"))
            .unwrap();
        registry
            .register(Participant::new(2, Role::Validator, [2; 32], 10, 0.5, 0).with_endpoint("http://v2:1"))
            .unwrap();
        registry
            .register(Participant::new(3, Role::Validator, [3; 32], 10, 0.5, 0))
            .unwrap();
        registry
            .register(Participant::new(4, Role::Miner, [4; 32], 0, 0.5, 0).with_endpoint("http://m4:1"))
            .unwrap();

        let peers = PeerRegistry::resolve(None, &[], &registry, 1, timeout());
        assert_eq!(peers.peer_urls(), &["http://v2:1".to_string()]);

        let configured = vec!["http://x:1".to_string()];
        let peers = PeerRegistry::resolve(None, &configured, &registry, 1, timeout());
        assert_eq!(peers.peer_urls(), &configured[..]);
    }
}
