// crates/tessera-daemon/src/scheduler.rs
//
// Wall-clock slot scheduler.
//
// Slot `n` starts at `genesis + n * slot_duration`. At every boundary the
// scheduler spawns one task running the full slot lifecycle, so slot N's
// finalize overlaps slot N+1's dispatch. Shutdown waits a bounded time for
// in-flight slots to commit.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinSet;

use tessera_consensus::FinalizeOutcome;
use tessera_core::error::TesseraError;
use tessera_core::types::SlotId;

use crate::shared::DaemonSharedState;
use crate::state::NodeState;

/// Maps wall-clock time to slot ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotClock {
    genesis_ms: i64,
    slot_duration_ms: u64,
}

impl SlotClock {
    pub fn new(genesis_ms: i64, slot_duration_ms: u64) -> Result<Self, TesseraError> {
        if slot_duration_ms == 0 {
            return Err(TesseraError::Config(
                "slot_duration_ms must be positive".to_string(),
            ));
        }
        Ok(Self {
            genesis_ms,
            slot_duration_ms,
        })
    }

    /// Slot containing `now_ms`. Times before genesis map to slot 0.
    pub fn slot_at(&self, now_ms: i64) -> SlotId {
        if now_ms <= self.genesis_ms {
            return 0;
        }
        (now_ms - self.genesis_ms) as u64 / self.slot_duration_ms
    }

    pub fn slot_start_ms(&self, slot: SlotId) -> i64 {
        self.genesis_ms
            .saturating_add(slot.saturating_mul(self.slot_duration_ms) as i64)
    }

    /// Time left until `slot` starts; zero if it already has.
    pub fn until_slot(&self, slot: SlotId, now_ms: i64) -> Duration {
        let wait = self.slot_start_ms(slot).saturating_sub(now_ms);
        Duration::from_millis(wait.max(0) as u64)
    }

    pub fn slot_duration(&self) -> Duration {
        Duration::from_millis(self.slot_duration_ms)
    }
}

/// Runs one slot per clock tick until shutdown.
pub struct SlotScheduler {
    shared: DaemonSharedState,
    clock: SlotClock,
}

impl SlotScheduler {
    /// Creates a scheduler driven by the given clock.
    pub fn new(shared: DaemonSharedState, clock: SlotClock) -> Self {
        Self { shared, clock }
    }

    /// Run until ctrl-c.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await
    }

    /// Run until `shutdown` resolves, starting with the first slot boundary
    /// after now.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<(), Box<dyn std::error::Error>>
    where
        F: Future<Output = ()>,
    {
        let mut next = self.clock.slot_at(Utc::now().timestamp_millis()) + 1;
        let mut inflight = JoinSet::new();
        tokio::pin!(shutdown);

        tracing::info!(
            "Slot scheduler started (slot_duration={}ms, first slot {})",
            self.clock.slot_duration_ms,
            next
        );

        loop {
            let wait = self.clock.until_slot(next, Utc::now().timestamp_millis());
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Slot scheduler received shutdown signal");
                    break;
                }
                _ = tokio::time::sleep(wait) => {
                    while inflight.try_join_next().is_some() {}

                    if self.shared.node_state().await == NodeState::Running {
                        let shared = self.shared.clone();
                        inflight.spawn(run_one_slot(shared, next));
                    } else {
                        tracing::debug!("Slot {}: node not running, skipped", next);
                    }

                    let current = self.clock.slot_at(Utc::now().timestamp_millis());
                    if current > next {
                        tracing::warn!(
                            "Slot scheduler fell behind: skipping slots {}..={}",
                            next + 1,
                            current
                        );
                        next = current + 1;
                    } else {
                        next += 1;
                    }
                }
            }
        }

        let grace = self.clock.slot_duration();
        let drained = tokio::time::timeout(grace, async {
            while inflight.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!("Abandoning {} in-flight slots at shutdown", inflight.len());
            inflight.abort_all();
        }

        Ok(())
    }
}

async fn run_one_slot(shared: DaemonSharedState, slot_id: SlotId) {
    match shared.coordinator.run_slot(slot_id).await {
        Ok(FinalizeOutcome::Committed(commit)) => {
            tracing::info!(
                "Slot {}: committed ({} miners scored, {} trust updates)",
                slot_id,
                commit.adjusted.len(),
                commit.trust_deltas.len()
            );
        }
        Ok(FinalizeOutcome::Expired { reason, committed }) => {
            tracing::warn!(
                "Slot {}: expired ({}){}",
                slot_id,
                reason,
                if committed { ", partial commit written" } else { "" }
            );
        }
        Ok(FinalizeOutcome::AlreadyFinal(phase)) => {
            tracing::debug!("Slot {}: already {}", slot_id, phase);
        }
        Err(TesseraError::AlreadyCommitted(_)) => {
            tracing::debug!("Slot {}: already committed", slot_id);
        }
        Err(e) if e.is_fatal() => {
            shared.halt(&e.to_string()).await;
        }
        Err(e) => {
            tracing::warn!("Slot {}: failed: {}", slot_id, e);
        }
    }

    // An archive failure halts the coordinator without failing the slot.
    if let Some(reason) = shared.coordinator.halted_reason().await {
        shared.halt(&reason).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_boundaries() {
        let clock = SlotClock::new(1_000, 500).unwrap();
        assert_eq!(clock.slot_at(0), 0);
        assert_eq!(clock.slot_at(1_000), 0);
        assert_eq!(clock.slot_at(1_499), 0);
        assert_eq!(clock.slot_at(1_500), 1);
        assert_eq!(clock.slot_start_ms(3), 2_500);
    }

    #[test]
    fn test_until_slot() {
        let clock = SlotClock::new(0, 1_000).unwrap();
        assert_eq!(clock.until_slot(2, 1_250), Duration::from_millis(750));
        assert_eq!(clock.until_slot(1, 1_250), Duration::ZERO);
    }

    #[test]
    fn test_zero_duration_rejected() {
        assert!(matches!(SlotClock::new(0, 0), Err(TesseraError::Config(_))));
    }
}
