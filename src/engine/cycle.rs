//! Cycle bookkeeping.
//!
//! A cycle runs from one balance peak to the next. It accumulates losses
//! and round counts, and ends the moment a sampled balance strictly beats
//! the all-time peak.

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// Peak
// ---------------------------------------------------------------------------

/// Highest wallet balance observed since engine start. Never decreases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peak(U256);

impl Peak {
    pub fn new(initial: U256) -> Self {
        Self(initial)
    }

    pub fn value(&self) -> U256 {
        self.0
    }

    /// Raise the peak if `balance` strictly exceeds it. Returns whether it moved.
    pub fn observe(&mut self, balance: U256) -> bool {
        if balance > self.0 {
            self.0 = balance;
            true
        } else {
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Cycle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cycle {
    pub index: u64,
    pub start_balance: U256,
    pub cumulative_loss: U256,
    pub rounds_played: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Active,
    Peaked,
}

/// What the engine does after a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Stay in the cycle; play again after the delay.
    Continue { after: Duration },
    /// New peak reached; the cycle is over.
    Peaked { new_peak: U256 },
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CycleController {
    cycle: Cycle,
    state: CycleState,
    round_interval: Duration,
}

impl CycleController {
    /// Open cycle `index` at the current balance with zero loss.
    pub fn start(index: u64, balance: U256, round_interval: Duration) -> Self {
        info!(cycle = index, start_balance = %balance, "Cycle started");
        Self {
            cycle: Cycle {
                index,
                start_balance: balance,
                cumulative_loss: U256::ZERO,
                rounds_played: 0,
            },
            state: CycleState::Active,
            round_interval,
        }
    }

    pub fn cycle(&self) -> &Cycle {
        &self.cycle
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    /// 1-based index of the round about to be played.
    pub fn next_round_index(&self) -> u32 {
        self.cycle.rounds_played + 1
    }

    /// Fold a completed round into the cycle and decide whether it ends.
    pub fn complete_round(
        &mut self,
        stake: U256,
        won: bool,
        balance_after: U256,
        peak: &mut Peak,
    ) -> Transition {
        if self.state == CycleState::Peaked {
            return Transition::Peaked { new_peak: peak.value() };
        }

        self.cycle.rounds_played += 1;
        if !won {
            self.cycle.cumulative_loss = self.cycle.cumulative_loss.saturating_add(stake);
        }

        if peak.observe(balance_after) {
            self.state = CycleState::Peaked;
            info!(
                cycle = self.cycle.index,
                rounds = self.cycle.rounds_played,
                new_peak = %balance_after,
                "New peak, cycle complete"
            );
            return Transition::Peaked { new_peak: balance_after };
        }

        debug!(
            cycle = self.cycle.index,
            rounds = self.cycle.rounds_played,
            cumulative_loss = %self.cycle.cumulative_loss,
            balance = %balance_after,
            peak = %peak.value(),
            "Cycle continues"
        );
        Transition::Continue { after: self.round_interval }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
