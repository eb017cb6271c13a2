// crates/tessera-reputation/src/penalty.rs
//
// Deviation penalties for validators.
//
// A validator whose mean deviation from consensus is several times the
// slot's typical deviation is treated as dishonest or broken: its trust is
// cut by `trust * (1 - eta * severity)` and, at high severity, it is jailed.

use serde::Serialize;

use tessera_core::params::PenaltyPolicy;
use tessera_core::registry::clamp_trust;

/// Severity applied past `moderate_factor` deviations.
pub const MODERATE_SEVERITY: f64 = 0.3;
/// Severity applied past `severe_factor` deviations.
pub const SEVERE_SEVERITY: f64 = 0.7;

/// What happens to one validator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PenaltyDecision {
    pub severity: f64,
    pub trust_after: f64,
    pub jail: bool,
}

/// Severity for a normalized deviation, or `None` when within tolerance.
pub fn deviation_severity(normalized_deviation: f64, policy: &PenaltyPolicy) -> Option<f64> {
    if !normalized_deviation.is_finite() {
        return None;
    }
    if normalized_deviation >= policy.severe_factor {
        Some(SEVERE_SEVERITY)
    } else if normalized_deviation >= policy.moderate_factor {
        Some(MODERATE_SEVERITY)
    } else {
        None
    }
}

/// Decide the penalty for a validator currently at `trust`.
///
/// Returns `None` when fewer than `min_validators_for_penalty` validators
/// contributed or the deviation is within tolerance.
pub fn decide(
    trust: f64,
    normalized_deviation: f64,
    contributing_validators: usize,
    policy: &PenaltyPolicy,
) -> Option<PenaltyDecision> {
    if contributing_validators < policy.min_validators_for_penalty {
        return None;
    }
    let severity = deviation_severity(normalized_deviation, policy)?;
    Some(PenaltyDecision {
        severity,
        trust_after: clamp_trust(trust * (1.0 - policy.penalty_eta * severity)),
        jail: severity >= policy.jail_severity,
    })
}
