// crates/tessera-daemon/src/shared.rs
//
// DaemonSharedState: handles constructed once in main.rs and handed to the
// scheduler and the RPC server.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::RwLock;

use tessera_consensus::SlotCoordinator;

use crate::peers::PeerRegistry;
use crate::state::{NodeState, NodeStateMachine};

/// State shared between the scheduler loop and the RPC server.
#[derive(Clone)]
pub struct DaemonSharedState {
    pub coordinator: Arc<SlotCoordinator>,
    pub peers: Arc<PeerRegistry>,
    pub node_state: Arc<RwLock<NodeStateMachine>>,
    /// Daemon start time for uptime calculation.
    pub start_time: Instant,
}

impl DaemonSharedState {
    pub fn new(
        coordinator: Arc<SlotCoordinator>,
        peers: Arc<PeerRegistry>,
        node_state: NodeStateMachine,
    ) -> Self {
        Self {
            coordinator,
            peers,
            node_state: Arc::new(RwLock::new(node_state)),
            start_time: Instant::now(),
        }
    }

    pub async fn node_state(&self) -> NodeState {
        self.node_state.read().await.current
    }

    /// Stop scheduling after a fatal error. A node already halted or
    /// shutting down stays where it is.
    pub async fn halt(&self, reason: &str) {
        let mut state = self.node_state.write().await;
        if matches!(state.current, NodeState::Halted | NodeState::ShuttingDown) {
            return;
        }
        tracing::error!("Halting slot scheduling: {}", reason);
        if let Err(e) = state.transition(NodeState::Halted) {
            tracing::warn!("{}", e);
        }
    }
}
