// crates/tessera-store/src/lib.rs
//
// tessera-store: raw score storage, commit history, and the RocksDB archive.
//
// - `ScoreStore`: per-slot, first-write-wins raw scores.
// - `SlotHistory`: commit-once record of finalized slots.
// - `RocksStore`: checksummed persistence implementing `SlotArchive`.

pub mod history;
pub mod rocks;
pub mod scores;

pub use history::SlotHistory;
pub use rocks::RocksStore;
pub use scores::{IngestReport, ScoreStore, SlotScores};
