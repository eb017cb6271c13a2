// crates/tessera-core/src/lib.rs
//
// tessera-core: data model, errors, params, registry, collaborator traits,
// and crypto helpers for the Tessera consensus engine.
//
// This is the leaf crate every other crate in the workspace depends on.

pub mod crypto;
pub mod error;
pub mod messages;
pub mod params;
pub mod registry;
pub mod scaling;
pub mod slot;
pub mod traits;
pub mod types;

// Re-export key types for ergonomic access from downstream crates.
pub use error::TesseraError;
pub use messages::{PeerScore, PeerScoreMessage, TaskRequest, TaskResponse};
pub use params::{ConsensusParams, ExpiredPolicy, ParamSchedule, PenaltyPolicy};
pub use registry::Registry;
pub use scaling::ScalingFn;
pub use slot::{SlotPhase, SlotState};
pub use traits::{LedgerSink, PeerExchange, SlotArchive, TaskDispatcher, TaskEvaluator};
pub use types::{
    AdjustedScore, IncentiveRecord, Participant, ParticipantStatus, PenaltyRecord, RawScore,
    Role, SlotCommit, SlotId, TrustDelta, Uid, ValidatorPerformance, WeightRecord,
};
