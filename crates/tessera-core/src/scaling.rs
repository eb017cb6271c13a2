// crates/tessera-core/src/scaling.rs
//
// Bounding functions used by the trust update (`g`) and by the incentive
// trust factor (`f`). Every variant maps [0, 1] into [0, 1], so a single
// slot can move trust by at most the learning rate.

use serde::{Deserialize, Serialize};

/// Pluggable monotone map from [0, 1] to [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScalingFn {
    /// `x`.
    #[default]
    Identity,
    /// Logistic curve `1 / (1 + e^(-steepness * (x - midpoint)))`.
    Sigmoid { steepness: f64, midpoint: f64 },
    /// `(1 - e^(-rate * x)) / (1 - e^(-rate))`: concave, fixes 0 and 1.
    Saturating { rate: f64 },
}

impl ScalingFn {
    /// Apply the map. Input is clamped to [0, 1] first and the output is
    /// clamped again so configuration mistakes cannot escape the range.
    pub fn apply(&self, x: f64) -> f64 {
        let x = if x.is_finite() { x.clamp(0.0, 1.0) } else { 0.0 };
        let y = match *self {
            ScalingFn::Identity => x,
            ScalingFn::Sigmoid {
                steepness,
                midpoint,
            } => 1.0 / (1.0 + (-steepness * (x - midpoint)).exp()),
            ScalingFn::Saturating { rate } => {
                if rate.abs() < 1e-12 {
                    x
                } else {
                    (1.0 - (-rate * x).exp()) / (1.0 - (-rate).exp())
                }
            }
        };
        if y.is_finite() {
            y.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}
