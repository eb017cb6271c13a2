// crates/tessera-consensus/src/lib.rs
//
// tessera-consensus: the slot engine.
//
// Pure stages (aggregation, validator performance, weights, selection and
// the pipeline that chains them) plus the async SlotCoordinator that drives
// each slot through its phases.

pub mod aggregator;
pub mod coordinator;
pub mod performance;
pub mod pipeline;
pub mod selection;
pub mod weights;

pub use aggregator::{aggregate, Aggregation};
pub use coordinator::{Collaborators, FinalizeOutcome, PeerDelivery, SlotCoordinator};
pub use pipeline::{compute_slot_outcome, SlotInputs, SlotOutcome};
pub use selection::{Selection, SelectionScheduler};
pub use weights::WeightCalculator;
