// crates/tessera-reputation/src/lib.rs
//
// tessera-reputation: trust evolution for miners and validators.

pub mod decay;
pub mod ledger;
pub mod penalty;

pub use ledger::{effective_alpha, update_trust, TrustLedger};
pub use penalty::PenaltyDecision;
