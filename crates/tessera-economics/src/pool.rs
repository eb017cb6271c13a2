// crates/tessera-economics/src/pool.rs
//
// Per-slot reward pool split between miners and validators.
//
// All amounts are in base units; 1 token = 10^9 base units.

use serde::{Deserialize, Serialize};

/// Base units per whole token.
pub const UNITS_PER_TOKEN: u64 = 1_000_000_000;

/// The two role pools of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePools {
    pub miner_pool: u64,
    pub validator_pool: u64,
}

/// Split `pool` so validators receive `floor(pool * validator_fraction)` and
/// miners the remainder. Nothing is lost to rounding.
pub fn split_pool(pool: u64, validator_fraction: f64) -> RolePools {
    let fraction = if validator_fraction.is_finite() {
        validator_fraction.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let validator_pool = ((pool as f64 * fraction) as u64).min(pool);
    RolePools {
        miner_pool: pool - validator_pool,
        validator_pool,
    }
}
