// crates/tessera-economics/src/lib.rs
//
// tessera-economics: reward shares and slash computation.
//
// All monetary values are in base units (10^9 per token).

pub mod incentive;
pub mod pool;
pub mod slashing;

pub use incentive::{Contribution, IncentiveDistributor};
pub use pool::{split_pool, RolePools, UNITS_PER_TOKEN};
pub use slashing::slash_amount;
