// crates/tessera-economics/src/slashing.rs
//
// Slash amounts for validator penalties.
//
// The engine reports how much stake a penalty would forfeit; moving the
// funds is left to whoever consumes the ledger commit.

/// Stake forfeited at `severity`, capped at `max_slash_rate` of the stake.
pub fn slash_amount(stake: u64, severity: f64, max_slash_rate: f64) -> u64 {
    if !(severity.is_finite() && max_slash_rate.is_finite()) {
        return 0;
    }
    let rate = severity.min(max_slash_rate).clamp(0.0, 1.0);
    ((stake as f64 * rate) as u64).min(stake)
}
