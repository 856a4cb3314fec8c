//! Accountant — session history and running statistics.
//!
//! Every confirmed round lands here as an immutable `RoundRecord`. The
//! ledger also tracks cycle completions and produces the serialisable
//! snapshot that storage writes after each round and at halt.

use alloy::primitives::{B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::engine::cycle::Cycle;
use crate::engine::executor::RoundResult;
use crate::types::RoundRecord;

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub rounds: u64,
    pub wins: u64,
    pub losses: u64,
    pub cycles_completed: u64,
    pub total_staked: U256,
    pub total_payout: U256,
    pub gas_used: u64,
    pub approvals: u64,
}

impl SessionStats {
    pub fn win_rate(&self) -> f64 {
        if self.rounds == 0 {
            0.0
        } else {
            self.wins as f64 / self.rounds as f64
        }
    }
}

/// Everything persisted about one engine lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub start_balance: U256,
    pub last_balance: U256,
    pub peak: U256,
    pub stats: SessionStats,
    pub history: Vec<RoundRecord>,
    /// Set once the engine has stopped.
    pub halt_reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

pub struct SessionLedger {
    state: SessionState,
}

impl SessionLedger {
    pub fn new(start_balance: U256) -> Self {
        let now = Utc::now();
        Self {
            state: SessionState {
                session_id: Uuid::new_v4(),
                started_at: now,
                updated_at: now,
                start_balance,
                last_balance: start_balance,
                peak: start_balance,
                stats: SessionStats::default(),
                history: Vec::new(),
                halt_reason: None,
            },
        }
    }

    /// Append a confirmed round. Returns the stored record.
    ///
    /// `balance_after` is `None` when the post-round balance read failed; the
    /// round still happened on-chain and is recorded.
    pub fn record_round(
        &mut self,
        cycle_index: u64,
        round_in_cycle: u32,
        result: &RoundResult,
        balance_after: Option<U256>,
        peak: U256,
    ) -> &RoundRecord {
        let stats = &mut self.state.stats;
        stats.rounds += 1;
        if result.won {
            stats.wins += 1;
        } else {
            stats.losses += 1;
        }
        stats.total_staked = stats.total_staked.saturating_add(result.stake);
        stats.total_payout = stats.total_payout.saturating_add(result.payout);
        stats.gas_used = stats.gas_used.saturating_add(result.gas_used);
        if result.approval_tx.is_some() {
            stats.approvals += 1;
        }

        let record = RoundRecord {
            cycle_index,
            round_in_cycle,
            global_index: stats.rounds,
            stake: result.stake,
            chosen_side: result.chosen_side,
            client_seed: result.client_seed,
            tx_hash: result.tx_hash,
            result_side: result.result_side,
            won: result.won,
            payout: result.payout,
            balance_after,
            gas_used: result.gas_used,
            timestamp: Utc::now(),
        };
        info!(round = %record, balance = ?balance_after, "Round recorded");

        if let Some(balance) = balance_after {
            self.state.last_balance = balance;
        }
        self.state.peak = self.state.peak.max(peak);
        self.state.updated_at = record.timestamp;
        self.state.history.push(record);
        // Just pushed.
        &self.state.history[self.state.history.len() - 1]
    }

    pub fn close_cycle(&mut self, cycle: &Cycle, new_peak: U256) {
        self.state.stats.cycles_completed += 1;
        self.state.peak = self.state.peak.max(new_peak);
        info!(
            cycle = cycle.index,
            rounds = cycle.rounds_played,
            start_balance = %cycle.start_balance,
            new_peak = %new_peak,
            cycles_completed = self.state.stats.cycles_completed,
            "Cycle closed"
        );
    }

    pub fn observe_balance(&mut self, balance: U256) {
        self.state.last_balance = balance;
        self.state.updated_at = Utc::now();
    }

    pub fn mark_halted(&mut self, reason: impl Into<String>) {
        self.state.halt_reason = Some(reason.into());
        self.state.updated_at = Utc::now();
    }

    pub fn stats(&self) -> &SessionStats {
        &self.state.stats
    }

    pub fn history(&self) -> &[RoundRecord] {
        &self.state.history
    }

    pub fn last_tx(&self) -> Option<B256> {
        self.state.history.last().map(|r| r.tx_hash)
    }

    pub fn snapshot(&self) -> &SessionState {
        &self.state
    }

    pub fn log_summary(&self) {
        log_session_summary(&self.state);
    }
}

/// `(is_gain, magnitude)` of `to - from`.
pub fn net(from: U256, to: U256) -> (bool, U256) {
    if to >= from {
        (true, to - from)
    } else {
        (false, from - to)
    }
}

pub fn log_session_summary(state: &SessionState) {
    let (gain, delta) = net(state.start_balance, state.last_balance);
    info!(
        session = %state.session_id,
        started_at = %state.started_at,
        rounds = state.stats.rounds,
        wins = state.stats.wins,
        losses = state.stats.losses,
        win_rate = format!("{:.1}%", state.stats.win_rate() * 100.0),
        cycles = state.stats.cycles_completed,
        net = format!("{}{}", if gain { "+" } else { "-" }, delta),
        peak = %state.peak,
        halt = state.halt_reason.as_deref().unwrap_or("-"),
        "Session summary"
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
