//! Round executor.
//!
//! Turns a cleared stake into exactly one confirmed, decoded round or one
//! error: top up the allowance if needed, mint a fresh client seed, simulate,
//! estimate gas with headroom, submit, wait for the receipt, decode the
//! outcome event. Nothing here retries.

use alloy::primitives::{B256, U256};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::chain::events::{scan_outcome, OutcomeScan};
use crate::chain::seed::SeedSource;
use crate::chain::{CallOutcome, ChainClient, GasEstimate, PlayCall, TxReceipt};
use crate::strategy::Clearance;
use crate::types::Side;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Percent added on top of the gas estimate.
    pub gas_buffer_pct: u64,
    /// Upper bound on waiting for any receipt.
    pub confirmation_timeout: Duration,
    pub receipt_poll: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            gas_buffer_pct: 20,
            confirmation_timeout: Duration::from_secs(180),
            receipt_poll: Duration::from_millis(1_500),
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// A confirmed round with its decoded outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundResult {
    pub stake: U256,
    pub chosen_side: Side,
    pub client_seed: U256,
    pub tx_hash: B256,
    pub result_side: Side,
    pub won: bool,
    /// Twice the stake on a win, zero on a loss.
    pub payout: U256,
    pub gas_used: u64,
    pub approval_tx: Option<B256>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The round produced no usable outcome.
    Abort,
    /// The agent can no longer operate safely.
    Fatal,
}

#[derive(Debug, thiserror::Error)]
pub enum RoundError {
    #[error("would revert: {0}")]
    WouldRevert(String),

    #[error("play transaction {0} reverted on-chain")]
    Reverted(B256),

    #[error("play transaction {0} confirmed but no Played event from the game contract")]
    OutcomeMissing(B256),

    #[error("approval transaction {0} reverted")]
    ApprovalReverted(B256),

    #[error("allowance still short after approval: have {allowance}, need {stake}")]
    ApprovalShortfall { allowance: U256, stake: U256 },

    #[error("no receipt for {tx_hash} within {timeout:?}")]
    ConfirmationTimeout { tx_hash: B256, timeout: Duration },

    #[error("seed source repeated a recent client seed")]
    SeedReused,

    #[error("RPC failure: {0:#}")]
    Rpc(#[from] anyhow::Error),
}

impl RoundError {
    pub fn severity(&self) -> Severity {
        match self {
            RoundError::WouldRevert(_) | RoundError::Reverted(_) | RoundError::OutcomeMissing(_) => {
                Severity::Abort
            }
            _ => Severity::Fatal,
        }
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// How many past client seeds a new seed is checked against.
pub const RECENT_SEED_WINDOW: usize = 256;

pub struct TransactionExecutor<C, S> {
    chain: Arc<C>,
    seeds: S,
    config: ExecutorConfig,
    recent_seeds: VecDeque<U256>,
}

impl<C: ChainClient, S: SeedSource> TransactionExecutor<C, S> {
    pub fn new(chain: Arc<C>, seeds: S, config: ExecutorConfig) -> Self {
        Self {
            chain,
            seeds,
            config,
            recent_seeds: VecDeque::with_capacity(RECENT_SEED_WINDOW),
        }
    }

    /// Gas limit for a given estimate, with the configured headroom.
    pub fn gas_limit(&self, estimate: u64) -> u64 {
        gas_with_buffer(estimate, self.config.gas_buffer_pct)
    }

    /// Grant the standing approval requested by the risk gate, if any, and
    /// confirm the allowance now covers the stake.
    pub async fn ensure_allowance(&self, clearance: &Clearance) -> Result<Option<B256>, RoundError> {
        let Some(amount) = clearance.approval else {
            return Ok(None);
        };

        let spender = self.chain.game_address();
        info!(spender = %spender, amount = %amount, "Approving game contract");

        let tx_hash = self.chain.send_approval(spender, amount).await?;
        info!(tx = %tx_hash, "Approval sent");

        let receipt = self.wait_for_receipt(tx_hash).await?;
        if !receipt.success {
            return Err(RoundError::ApprovalReverted(tx_hash));
        }

        let allowance = self.chain.allowance(self.chain.wallet(), spender).await?;
        if allowance < clearance.stake {
            return Err(RoundError::ApprovalShortfall {
                allowance,
                stake: clearance.stake,
            });
        }

        info!(tx = %tx_hash, allowance = %allowance, "Approval confirmed");
        Ok(Some(tx_hash))
    }

    /// Play one round for a cleared stake on `side`.
    pub async fn play_round(&mut self, clearance: &Clearance, side: Side) -> Result<RoundResult, RoundError> {
        let approval_tx = self.ensure_allowance(clearance).await?;

        let client_seed = self.fresh_seed()?;
        let call = PlayCall {
            amount: clearance.stake,
            side,
            client_seed,
        };

        if let CallOutcome::Revert(reason) = self.chain.simulate_play(call).await? {
            warn!(reason = %reason, stake = %call.amount, side = %side, "Simulation predicts revert, not submitting");
            return Err(RoundError::WouldRevert(reason));
        }

        let estimate = match self.chain.estimate_play_gas(call).await? {
            GasEstimate::Units(units) => units,
            GasEstimate::Revert(reason) => {
                warn!(reason = %reason, "Gas estimation predicts revert, not submitting");
                return Err(RoundError::WouldRevert(reason));
            }
        };
        let gas_limit = self.gas_limit(estimate);
        debug!(estimate, gas_limit, "Gas budget set");

        let tx_hash = self.chain.submit_play(call, gas_limit).await?;
        info!(tx = %tx_hash, stake = %call.amount, side = %side, "Play sent");

        let receipt = self.wait_for_receipt(tx_hash).await?;
        if !receipt.success {
            warn!(tx = %tx_hash, "Play reverted on-chain, round inconclusive");
            return Err(RoundError::Reverted(tx_hash));
        }

        let outcome = match scan_outcome(&receipt.logs, self.chain.game_address(), self.chain.wallet()) {
            OutcomeScan::Found(outcome) => outcome,
            OutcomeScan::Missing { game_logs } => {
                warn!(tx = %tx_hash, logs = receipt.logs.len(), game_logs, "Played event not found in receipt");
                return Err(RoundError::OutcomeMissing(tx_hash));
            }
        };

        if outcome.stake != call.amount || outcome.chosen_side != side {
            warn!(
                tx = %tx_hash,
                event_stake = %outcome.stake,
                event_side = %outcome.chosen_side,
                "Played event disagrees with the submitted call"
            );
        }

        let payout = if outcome.won {
            call.amount.saturating_mul(U256::from(2))
        } else {
            U256::ZERO
        };

        info!(
            tx = %tx_hash,
            chosen = %side,
            result = %outcome.result_side,
            won = outcome.won,
            payout = %payout,
            gas_used = receipt.gas_used,
            "Round settled"
        );

        Ok(RoundResult {
            stake: call.amount,
            chosen_side: side,
            client_seed,
            tx_hash,
            result_side: outcome.result_side,
            won: outcome.won,
            payout,
            gas_used: receipt.gas_used,
            approval_tx,
        })
    }

    fn fresh_seed(&mut self) -> Result<U256, RoundError> {
        let seed = self.seeds.next_seed();
        if self.recent_seeds.contains(&seed) {
            return Err(RoundError::SeedReused);
        }
        if self.recent_seeds.len() == RECENT_SEED_WINDOW {
            self.recent_seeds.pop_front();
        }
        self.recent_seeds.push_back(seed);
        Ok(seed)
    }

    pub async fn wait_for_receipt(&self, tx_hash: B256) -> Result<TxReceipt, RoundError> {
        await_receipt(self.chain.as_ref(), tx_hash, &self.config).await
    }
}

/// Poll for a receipt until it appears or the confirmation timeout hits.
pub async fn await_receipt<C: ChainClient + ?Sized>(
    chain: &C,
    tx_hash: B256,
    config: &ExecutorConfig,
) -> Result<TxReceipt, RoundError> {
    let timeout = config.confirmation_timeout;
    let poll = async {
        loop {
            if let Some(receipt) = chain.receipt(tx_hash).await? {
                return Ok::<_, anyhow::Error>(receipt);
            }
            tokio::time::sleep(config.receipt_poll).await;
        }
    };

    match tokio::time::timeout(timeout, poll).await {
        Ok(result) => result.map_err(RoundError::Rpc),
        Err(_) => Err(RoundError::ConfirmationTimeout { tx_hash, timeout }),
    }
}

/// `estimate × (100 + pct) / 100`, saturating.
pub fn gas_with_buffer(estimate: u64, pct: u64) -> u64 {
    estimate.saturating_mul(100 + pct) / 100
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
