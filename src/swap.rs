//! Fixed-rate swap desk.
//!
//! Moves value between the wager token and the native gas coin through the
//! swap contract at 1 whole token = 1 whole native coin, no fee. Used to top
//! up gas or wager funds outside the engine loop.

use alloy::primitives::{B256, U256};
use std::sync::Arc;
use tracing::{info, warn};

use crate::chain::{ChainClient, GasEstimate, SwapDirection, SwapVenue};
use crate::engine::executor::{await_receipt, gas_with_buffer, ExecutorConfig, RoundError};
use crate::types::TokenUnits;

/// The native coin always has 18 decimals.
pub const NATIVE_DECIMALS: u8 = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapQuote {
    pub direction: SwapDirection,
    pub amount_in: U256,
    pub amount_out: U256,
    /// Contract reserve of the asset being bought.
    pub reserve_out: U256,
}

impl SwapQuote {
    /// Whether the contract holds enough of the output asset.
    pub fn covered(&self) -> bool {
        self.reserve_out >= self.amount_out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapOutcome {
    pub quote: SwapQuote,
    pub tx_hash: B256,
    pub approval_tx: Option<B256>,
    pub gas_used: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum SwapError {
    #[error("swap amount must be greater than zero")]
    ZeroAmount,

    #[error("insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: U256, available: U256 },

    #[error("swap would revert: {0}")]
    WouldRevert(String),

    #[error("approval transaction {0} reverted")]
    ApprovalReverted(B256),

    #[error("swap transaction {0} reverted on-chain")]
    Reverted(B256),

    #[error(transparent)]
    Confirmation(#[from] RoundError),

    #[error("RPC failure: {0:#}")]
    Rpc(#[from] anyhow::Error),
}

pub struct SwapDesk<C, V> {
    chain: Arc<C>,
    venue: Arc<V>,
    token: TokenUnits,
    config: ExecutorConfig,
}

impl<C: ChainClient, V: SwapVenue> SwapDesk<C, V> {
    pub fn new(chain: Arc<C>, venue: Arc<V>, token: TokenUnits, config: ExecutorConfig) -> Self {
        Self { chain, venue, token, config }
    }

    /// Output for `amount_in` raw units of the input asset at the fixed rate.
    pub fn convert(&self, direction: SwapDirection, amount_in: U256) -> U256 {
        let (from, to) = match direction {
            SwapDirection::ToNative => (self.token.decimals(), NATIVE_DECIMALS),
            SwapDirection::ToToken => (NATIVE_DECIMALS, self.token.decimals()),
        };
        let from_one = TokenUnits::new(from).one();
        let to_one = TokenUnits::new(to).one();
        amount_in.saturating_mul(to_one) / from_one
    }

    pub async fn quote(&self, direction: SwapDirection, amount_in: U256) -> anyhow::Result<SwapQuote> {
        let reserves = self.venue.reserves().await?;
        let reserve_out = match direction {
            SwapDirection::ToNative => reserves.native,
            SwapDirection::ToToken => reserves.token,
        };
        Ok(SwapQuote {
            direction,
            amount_in,
            amount_out: self.convert(direction, amount_in),
            reserve_out,
        })
    }

    /// Validate, approve if needed, estimate, submit and confirm one swap.
    pub async fn execute(&self, direction: SwapDirection, amount_in: U256) -> Result<SwapOutcome, SwapError> {
        if amount_in.is_zero() {
            return Err(SwapError::ZeroAmount);
        }

        let wallet = self.chain.wallet();
        let available = match direction {
            SwapDirection::ToNative => self.chain.token_balance(wallet).await?,
            SwapDirection::ToToken => self.chain.native_balance(wallet).await?,
        };
        if available < amount_in {
            return Err(SwapError::InsufficientBalance {
                needed: amount_in,
                available,
            });
        }

        let quote = self.quote(direction, amount_in).await?;
        if !quote.covered() {
            warn!(
                amount_out = %quote.amount_out,
                reserve = %quote.reserve_out,
                "Swap reserve looks short, relying on estimation"
            );
        }

        let approval_tx = match direction {
            SwapDirection::ToNative => self.ensure_allowance(amount_in).await?,
            SwapDirection::ToToken => None,
        };

        let estimate = match self.venue.estimate_swap(direction, amount_in).await? {
            GasEstimate::Units(units) => units,
            GasEstimate::Revert(reason) => return Err(SwapError::WouldRevert(reason)),
        };
        let gas_limit = gas_with_buffer(estimate, self.config.gas_buffer_pct);

        let tx_hash = self.venue.submit_swap(direction, amount_in, gas_limit).await?;
        info!(tx = %tx_hash, direction = ?direction, amount = %amount_in, "Swap sent");

        let receipt = await_receipt(self.chain.as_ref(), tx_hash, &self.config).await?;
        if !receipt.success {
            return Err(SwapError::Reverted(tx_hash));
        }

        info!(tx = %tx_hash, amount_out = %quote.amount_out, gas_used = receipt.gas_used, "Swap confirmed");
        Ok(SwapOutcome {
            quote,
            tx_hash,
            approval_tx,
            gas_used: receipt.gas_used,
        })
    }

    async fn ensure_allowance(&self, amount: U256) -> Result<Option<B256>, SwapError> {
        let spender = self.venue.swap_address();
        let allowance = self.chain.allowance(self.chain.wallet(), spender).await?;
        if allowance >= amount {
            return Ok(None);
        }

        info!(spender = %spender, "Approving swap contract");
        let tx_hash = self.chain.send_approval(spender, U256::MAX).await?;
        let receipt = await_receipt(self.chain.as_ref(), tx_hash, &self.config).await?;
        if !receipt.success {
            return Err(SwapError::ApprovalReverted(tx_hash));
        }
        Ok(Some(tx_hash))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
