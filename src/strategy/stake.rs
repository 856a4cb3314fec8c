//! Progressive stake sizing.
//!
//! Doubles through the first four rounds of a cycle (1, 2, 4, 8 tokens),
//! then holds at 8 while the cycle's losses stay under 39 tokens and
//! switches to a flat 40 beyond that instead of escalating further.

use alloy::primitives::U256;

/// Stakes for rounds 1-4 of a cycle, in whole tokens.
const OPENING_STAKES: [u64; 4] = [1, 2, 4, 8];
/// Stake from round 5 on while losses stay under the threshold.
const HOLD_STAKE: u64 = 8;
/// Cumulative cycle loss (whole tokens) at which the flat stake kicks in.
const LOSS_THRESHOLD: u64 = 39;
/// Flat stake once the threshold is reached.
const FLAT_STAKE: u64 = 40;

/// Maps (round in cycle, cumulative cycle loss) to a stake in raw units.
#[derive(Debug, Clone, Copy)]
pub struct StakeSizer {
    /// Raw amount of one whole token.
    unit: U256,
}

impl StakeSizer {
    pub fn new(unit: U256) -> Self {
        Self { unit }
    }

    /// Stake for the `round_in_cycle`-th round (1-based) given the raw
    /// amount lost so far in this cycle. Round 0 is treated as round 1.
    pub fn next_stake(&self, round_in_cycle: u32, cumulative_loss: U256) -> U256 {
        let tokens = match round_in_cycle {
            0 | 1 => OPENING_STAKES[0],
            2 => OPENING_STAKES[1],
            3 => OPENING_STAKES[2],
            4 => OPENING_STAKES[3],
            _ if cumulative_loss < self.unit * U256::from(LOSS_THRESHOLD) => HOLD_STAKE,
            _ => FLAT_STAKE,
        };
        self.unit * U256::from(tokens)
    }
}
