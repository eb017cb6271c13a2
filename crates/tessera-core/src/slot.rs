// crates/tessera-core/src/slot.rs
//
// Slot lifecycle: Open -> Collecting -> Exchanging -> Aggregating -> Committed.
// Any non-terminal phase may fall through to Expired. Transitions never go
// backwards.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TesseraError;
use crate::types::{SlotId, Uid};

/// The current phase of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotPhase {
    /// Selection fixed, nothing dispatched yet.
    Open,
    /// Tasks dispatched to miners, results being scored.
    Collecting,
    /// Local scores broadcast, peers' scores merged.
    Exchanging,
    /// Raw scores frozen, consensus being computed.
    Aggregating,
    /// Results emitted to the ledger. Terminal.
    Committed,
    /// Deadline overrun or quorum not met. Terminal.
    Expired,
}

impl SlotPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SlotPhase::Committed | SlotPhase::Expired)
    }

    fn successor(&self) -> Option<SlotPhase> {
        match self {
            SlotPhase::Open => Some(SlotPhase::Collecting),
            SlotPhase::Collecting => Some(SlotPhase::Exchanging),
            SlotPhase::Exchanging => Some(SlotPhase::Aggregating),
            SlotPhase::Aggregating => Some(SlotPhase::Committed),
            SlotPhase::Committed | SlotPhase::Expired => None,
        }
    }
}

impl fmt::Display for SlotPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotPhase::Open => write!(f, "Open"),
            SlotPhase::Collecting => write!(f, "Collecting"),
            SlotPhase::Exchanging => write!(f, "Exchanging"),
            SlotPhase::Aggregating => write!(f, "Aggregating"),
            SlotPhase::Committed => write!(f, "Committed"),
            SlotPhase::Expired => write!(f, "Expired"),
        }
    }
}

/// Bookkeeping for one slot, owned by the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotState {
    pub slot_id: SlotId,
    pub phase: SlotPhase,
    pub opened_at: DateTime<Utc>,
    pub collect_deadline: DateTime<Utc>,
    pub exchange_deadline: DateTime<Utc>,
    /// Miners selected for this slot.
    pub participants_due: Vec<Uid>,
    /// Miners whose results were scored locally.
    pub participants_responded: BTreeSet<Uid>,
    /// Miners that timed out or failed after retries.
    pub no_response: BTreeSet<Uid>,
    pub expiry_reason: Option<String>,
}

impl SlotState {
    /// Create an `Open` slot whose deadlines are offsets from `opened_at`.
    pub fn open(
        slot_id: SlotId,
        opened_at: DateTime<Utc>,
        collect_after_ms: u64,
        exchange_after_ms: u64,
        participants_due: Vec<Uid>,
    ) -> Self {
        Self {
            slot_id,
            phase: SlotPhase::Open,
            opened_at,
            collect_deadline: opened_at + Duration::milliseconds(collect_after_ms as i64),
            exchange_deadline: opened_at + Duration::milliseconds(exchange_after_ms as i64),
            participants_due,
            participants_responded: BTreeSet::new(),
            no_response: BTreeSet::new(),
            expiry_reason: None,
        }
    }

    /// Move to `next`. Only the immediate successor, or `Expired` from a
    /// non-terminal phase, is accepted.
    pub fn advance(&mut self, next: SlotPhase) -> Result<(), TesseraError> {
        let valid = match next {
            SlotPhase::Expired => !self.phase.is_terminal(),
            _ => self.phase.successor() == Some(next),
        };

        if !valid {
            return Err(TesseraError::InvalidState(format!(
                "slot {}: {} -> {}",
                self.slot_id, self.phase, next
            )));
        }

        self.phase = next;
        Ok(())
    }

    /// Expire the slot, recording why.
    pub fn expire(&mut self, reason: impl Into<String>) -> Result<(), TesseraError> {
        self.advance(SlotPhase::Expired)?;
        self.expiry_reason = Some(reason.into());
        Ok(())
    }

    pub fn is_final(&self) -> bool {
        self.phase.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh(slot: SlotId) -> SlotState {
        SlotState::open(slot, Utc::now(), 4_000, 8_000, vec![1, 2, 3])
    }

    #[test]
    fn test_deadlines_are_offsets() {
        let now = Utc::now();
        let state = SlotState::open(1, now, 4_000, 8_000, vec![]);
        assert_eq!((state.collect_deadline - now).num_milliseconds(), 4_000);
        assert_eq!((state.exchange_deadline - now).num_milliseconds(), 8_000);
    }

    #[test]
    fn test_full_lifecycle() {
        let mut state = fresh(1);
        for phase in [
            SlotPhase::Collecting,
            SlotPhase::Exchanging,
            SlotPhase::Aggregating,
            SlotPhase::Committed,
        ] {
            state.advance(phase).unwrap();
        }
        assert!(state.is_final());
    }

    #[test]
    fn test_no_backwards_or_skipping() {
        let mut state = fresh(2);
        assert!(state.advance(SlotPhase::Aggregating).is_err());
        state.advance(SlotPhase::Collecting).unwrap();
        assert!(state.advance(SlotPhase::Open).is_err());
        assert!(state.advance(SlotPhase::Collecting).is_err());
        assert_eq!(state.phase, SlotPhase::Collecting);
    }

    #[test]
    fn test_expire_from_any_non_terminal() {
        for steps in 0..4 {
            let mut state = fresh(3);
            let path = [
                SlotPhase::Collecting,
                SlotPhase::Exchanging,
                SlotPhase::Aggregating,
            ];
            for phase in path.iter().take(steps) {
                state.advance(*phase).unwrap();
            }
            state.expire("deadline").unwrap();
            assert_eq!(state.phase, SlotPhase::Expired);
            assert_eq!(state.expiry_reason.as_deref(), Some("deadline"));
        }
    }

    #[test]
    fn test_terminal_phases_are_sticky() {
        let mut state = fresh(4);
        state.expire("quorum").unwrap();
        assert!(state.expire("again").is_err());
        assert!(state.advance(SlotPhase::Committed).is_err());
        assert_eq!(state.expiry_reason.as_deref(), Some("quorum"));
    }
}
