//! Shared types for the DICEBOT agent.
//!
//! These types form the data model used across all modules.
//! Strategy, chain, and engine modules depend on them without
//! referencing each other.

use alloy::primitives::utils::{format_units, parse_units};
use alloy::primitives::{B256, U256};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Side
// ---------------------------------------------------------------------------

/// The parity a round wagers on. The contract encodes Even as 0 and Odd as 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Even,
    Odd,
}

impl Side {
    /// Wire encoding used by `play(uint256,uint8,uint256)` and the `Played` event.
    pub fn as_u8(self) -> u8 {
        match self {
            Side::Even => 0,
            Side::Odd => 1,
        }
    }
}

impl TryFrom<u8> for Side {
    type Error = AgentError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Side::Even),
            1 => Ok(Side::Odd),
            other => Err(AgentError::Decode(format!("side out of range: {other}"))),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Even => write!(f, "EVEN"),
            Side::Odd => write!(f, "ODD"),
        }
    }
}

// ---------------------------------------------------------------------------
// Token units
// ---------------------------------------------------------------------------

/// Converts between human token amounts and raw base units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenUnits {
    decimals: u8,
}

impl TokenUnits {
    pub fn new(decimals: u8) -> Self {
        Self { decimals }
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    /// Raw amount of exactly one whole token.
    pub fn one(&self) -> U256 {
        U256::from(10u64).pow(U256::from(self.decimals))
    }

    /// Convert a decimal token amount (e.g. from config) into raw units.
    pub fn to_raw(&self, amount: Decimal) -> Result<U256, AgentError> {
        if amount.is_sign_negative() {
            return Err(AgentError::Config(format!("negative token amount: {amount}")));
        }
        let parsed = parse_units(&amount.normalize().to_string(), self.decimals)
            .map_err(|e| AgentError::Config(format!("invalid token amount {amount}: {e}")))?;
        Ok(parsed.get_absolute())
    }

    /// Render a raw amount as a trimmed decimal string.
    pub fn format(&self, raw: U256) -> String {
        match format_units(raw, self.decimals) {
            Ok(s) if s.contains('.') => s.trim_end_matches('0').trim_end_matches('.').to_string(),
            Ok(s) => s,
            Err(_) => raw.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Contract limits
// ---------------------------------------------------------------------------

/// Live wagering limits read from the game contract. Refreshed every round
/// because other players move the bankroll between our rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractLimits {
    pub min_bet: U256,
    pub max_bet: U256,
    pub bankroll: U256,
}

// ---------------------------------------------------------------------------
// Round record
// ---------------------------------------------------------------------------

/// One confirmed, decoded round. Immutable once appended to the history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub cycle_index: u64,
    pub round_in_cycle: u32,
    pub global_index: u64,
    pub stake: U256,
    pub chosen_side: Side,
    pub client_seed: U256,
    pub tx_hash: B256,
    pub result_side: Side,
    pub won: bool,
    pub payout: U256,
    /// `None` when the balance could not be read after confirmation.
    pub balance_after: Option<U256>,
    pub gas_used: u64,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for RoundRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cycle #{} round #{} (global #{}): {} on {} -> {} ({})",
            self.cycle_index,
            self.round_in_cycle,
            self.global_index,
            self.stake,
            self.chosen_side,
            self.result_side,
            if self.won { "won" } else { "lost" },
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// General errors outside the round/risk state machine.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
