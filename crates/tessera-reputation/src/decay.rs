// crates/tessera-reputation/src/decay.rs
//
// Exponential time decay of trust.
//
// Trust that is not refreshed by participation fades as e^(-rate * slots).
// Decay is computed from the number of elapsed slots, so skipping an update
// never decays twice and never skips a slot.

/// Multiplier after `slots_elapsed` slots at `rate` per slot.
pub fn decay_factor(rate: f64, slots_elapsed: u64) -> f64 {
    if rate <= 0.0 {
        return 1.0;
    }
    (-rate * slots_elapsed as f64).exp()
}

/// Decay `value` over `slots_elapsed` slots. Never negative.
pub fn apply_decay(value: f64, rate: f64, slots_elapsed: u64) -> f64 {
    (value * decay_factor(rate, slots_elapsed)).max(0.0)
}

/// Slots until a value halves at `rate`, or `None` if it never decays.
pub fn half_life(rate: f64) -> Option<f64> {
    if rate > 0.0 {
        Some(std::f64::consts::LN_2 / rate)
    } else {
        None
    }
}
