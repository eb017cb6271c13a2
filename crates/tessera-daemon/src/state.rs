// crates/tessera-daemon/src/state.rs
//
// Node lifecycle for the Tessera daemon.
//
// Valid transitions:
//   Initializing -> Loading -> Ready -> Running
//   Any live state -> Halted (fatal storage/integrity error)
//   Any state -> ShuttingDown

use std::fmt;

use tessera_core::error::TesseraError;

/// Lifecycle of the daemon process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Reading configuration and keys.
    Initializing,
    /// Opening the archive, checking integrity, restoring the registry and history.
    Loading,
    /// Coordinator and RPC server built; slots not yet scheduled.
    Ready,
    /// Scheduler is opening a slot at every boundary.
    Running,
    /// A fatal error stopped slot scheduling. RPC stays up for inspection.
    Halted,
    ShuttingDown,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeState::Initializing => "Initializing",
            NodeState::Loading => "Loading",
            NodeState::Ready => "Ready",
            NodeState::Running => "Running",
            NodeState::Halted => "Halted",
            NodeState::ShuttingDown => "ShuttingDown",
        };
        f.write_str(name)
    }
}

/// Tracks the node state and rejects invalid transitions.
pub struct NodeStateMachine {
    pub current: NodeState,
}

impl NodeStateMachine {
    pub fn new() -> Self {
        Self {
            current: NodeState::Initializing,
        }
    }

    /// Move to `new_state`, or fail with `InvalidState` if the move is not allowed.
    pub fn transition(&mut self, new_state: NodeState) -> Result<(), TesseraError> {
        let valid = match (self.current, new_state) {
            (_, NodeState::ShuttingDown) => true,
            (NodeState::ShuttingDown, _) => false,
            (NodeState::Halted, _) => false,
            (_, NodeState::Halted) => true,
            (NodeState::Initializing, NodeState::Loading) => true,
            (NodeState::Loading, NodeState::Ready) => true,
            (NodeState::Ready, NodeState::Running) => true,
            _ => false,
        };

        if !valid {
            return Err(TesseraError::InvalidState(format!(
                "Invalid node state transition: {} -> {}",
                self.current, new_state
            )));
        }

        if new_state == NodeState::Halted {
            tracing::error!("State transition: {} -> {}", self.current, new_state);
        } else {
            tracing::info!("State transition: {} -> {}", self.current, new_state);
        }
        self.current = new_state;
        Ok(())
    }
}

impl Default for NodeStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
